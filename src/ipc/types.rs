use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Bearer token as issued by `auth.login`.
    #[serde(default)]
    pub token: Option<String>,
    /// Verified caller, filled in by the router. Never read from the wire.
    #[serde(skip)]
    pub actor: Option<i64>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
            token: None,
            actor: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub secret: Vec<u8>,
    pub token_ttl_secs: u64,
    pub require_auth: bool,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(auth: AuthSettings) -> Self {
        Self {
            workspace: None,
            db: None,
            auth,
        }
    }
}
