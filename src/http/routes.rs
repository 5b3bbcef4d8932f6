use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::error::ApiError;
use super::SharedState;
use crate::ipc::{handle_request, Request};

type QueryParams = Query<HashMap<String, String>>;

/// Auth schemes are case-insensitive, so `bearer` and `BEARER` count too.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn query_params(query: HashMap<String, String>) -> Value {
    Value::Object(query.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

fn body_params(payload: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::MalformedPayload(e.body_text()))?;
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::MalformedPayload("expected a JSON object".to_string())),
    }
}

/// Runs one method through the shared dispatcher on the blocking pool.
async fn dispatch(
    state: &SharedState,
    headers: &HeaderMap,
    method: &str,
    params: Value,
) -> Result<Value, ApiError> {
    let mut req = Request::new(Uuid::new_v4().to_string(), method, params);
    req.token = bearer_token(headers);
    debug!(request_id = %req.id, method, "http dispatch");

    let state = state.clone();
    let resp = tokio::task::spawn_blocking(move || {
        let mut guard = state
            .lock()
            .map_err(|_| ApiError::Internal("state lock poisoned".to_string()))?;
        Ok::<_, ApiError>(handle_request(&mut guard, req))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    if resp.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
        Ok(resp.get("result").cloned().unwrap_or_else(|| json!({})))
    } else {
        Err(ApiError::from_envelope(
            resp.get("error").unwrap_or(&Value::Null),
        ))
    }
}

fn created(result: Value) -> Response {
    (StatusCode::CREATED, Json(result)).into_response()
}

fn csv_or_json(result: Value, params: &HashMap<String, String>) -> Response {
    let wants_csv = params
        .get("format")
        .is_some_and(|f| f.eq_ignore_ascii_case("csv"));
    match result.get("csv").and_then(|v| v.as_str()) {
        Some(csv) if wants_csv => (
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv.to_string(),
        )
            .into_response(),
        _ => Json(result).into_response(),
    }
}

pub async fn health_handler(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "health", json!({})).await.map(Json)
}

pub async fn register_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let params = body_params(payload)?;
    dispatch(&state, &headers, "auth.register", Value::Object(params))
        .await
        .map(created)
}

pub async fn login_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let params = body_params(payload)?;
    dispatch(&state, &headers, "auth.login", Value::Object(params))
        .await
        .map(Json)
}

pub async fn me_handler(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "auth.me", json!({})).await.map(Json)
}

pub async fn list_classes_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "classes.list", json!({})).await.map(Json)
}

pub async fn get_class_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "classes.get", json!({ "classId": id }))
        .await
        .map(Json)
}

pub async fn create_class_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let params = body_params(payload)?;
    dispatch(&state, &headers, "classes.create", Value::Object(params))
        .await
        .map(created)
}

pub async fn update_class_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut params = body_params(payload)?;
    params.insert("classId".to_string(), json!(id));
    dispatch(&state, &headers, "classes.update", Value::Object(params))
        .await
        .map(Json)
}

pub async fn delete_class_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    dispatch(&state, &headers, "classes.delete", json!({ "classId": id })).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_students_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): QueryParams,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "students.list", query_params(query))
        .await
        .map(Json)
}

pub async fn get_student_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "students.get", json!({ "studentId": id }))
        .await
        .map(Json)
}

pub async fn create_student_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let params = body_params(payload)?;
    dispatch(&state, &headers, "students.create", Value::Object(params))
        .await
        .map(created)
}

pub async fn update_student_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut params = body_params(payload)?;
    params.insert("studentId".to_string(), json!(id));
    dispatch(&state, &headers, "students.update", Value::Object(params))
        .await
        .map(Json)
}

pub async fn delete_student_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    dispatch(&state, &headers, "students.delete", json!({ "studentId": id })).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_attendance_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): QueryParams,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "attendance.get", query_params(query))
        .await
        .map(Json)
}

pub async fn save_attendance_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let params = body_params(payload)?;
    dispatch(&state, &headers, "attendance.save", Value::Object(params))
        .await
        .map(created)
}

pub async fn clear_attendance_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): QueryParams,
) -> Result<StatusCode, ApiError> {
    dispatch(&state, &headers, "attendance.clear", query_params(query)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dashboard_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): QueryParams,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &headers, "dashboard.get", query_params(query))
        .await
        .map(Json)
}

pub async fn student_reports_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): QueryParams,
) -> Result<Response, ApiError> {
    let result = dispatch(&state, &headers, "reports.students", query_params(query.clone())).await?;
    Ok(csv_or_json(result, &query))
}

pub async fn date_reports_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): QueryParams,
) -> Result<Response, ApiError> {
    let result = dispatch(&state, &headers, "reports.date", query_params(query.clone())).await?;
    Ok(csv_or_json(result, &query))
}
