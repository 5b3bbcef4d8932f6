use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// A dispatched method answered with `ok: false`.
    #[error("{message}")]
    Method {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Builds the error from the `error` object of a method response.
    pub fn from_envelope(error: &serde_json::Value) -> Self {
        ApiError::Method {
            code: error
                .get("code")
                .and_then(|v| v.as_str())
                .unwrap_or("internal")
                .to_string(),
            message: error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            details: error.get("details").cloned(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ApiError::Method { code, .. } => code,
            ApiError::MalformedPayload(_) => "bad_json",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "bad_params" | "bad_json" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "not_found" | "not_implemented" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "no_workspace" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::Method {
            details: Some(d), ..
        } = &self
        {
            error["details"] = d.clone();
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
