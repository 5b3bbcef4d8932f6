use crate::auth;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, get_required_str, now_rfc3339};
use crate::ipc::types::{AppState, AuthSettings, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct UserRow {
    id: i64,
    full_name: String,
    email: String,
    password_hash: String,
}

impl UserRow {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "fullName": self.full_name,
            "email": self.email,
        })
    }
}

fn find_user(conn: &Connection, sql_where: &str, key: &dyn rusqlite::ToSql) -> Result<Option<UserRow>, HandlerErr> {
    let sql = format!(
        "SELECT id, full_name, email, password_hash FROM users WHERE {}",
        sql_where
    );
    conn.query_row(&sql, [key], |r| {
        Ok(UserRow {
            id: r.get(0)?,
            full_name: r.get(1)?,
            email: r.get(2)?,
            password_hash: r.get(3)?,
        })
    })
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub fn user_exists(conn: &Connection, user_id: i64) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

// Passwords are taken verbatim; only an all-blank password is rejected.
fn get_password(params: &serde_json::Value) -> Result<String, HandlerErr> {
    match params.get("password").and_then(|v| v.as_str()) {
        Some(p) if !p.trim().is_empty() => Ok(p.to_string()),
        _ => Err(HandlerErr::bad_params("missing password")),
    }
}

fn issue_token(settings: &AuthSettings, user_id: i64) -> Result<String, HandlerErr> {
    auth::issue_token(user_id, &settings.secret, settings.token_ttl_secs)
        .map_err(|e| HandlerErr::new("token_failed", e.to_string()))
}

fn auth_register(
    conn: &Connection,
    settings: &AuthSettings,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let full_name = get_required_str(params, "fullName")?;
    let email = normalize_email(&get_required_str(params, "email")?);
    let password = get_password(params)?;
    if !email.contains('@') {
        return Err(HandlerErr::bad_params("email must be a valid address")
            .with_details(json!({ "email": email })));
    }

    if find_user(conn, "email = ?", &email)?.is_some() {
        return Err(HandlerErr::conflict("Email already registered"));
    }

    let password_hash =
        auth::hash_password(&password).map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    conn.execute(
        "INSERT INTO users(full_name, email, password_hash, created_at) VALUES(?, ?, ?, ?)",
        (&full_name, &email, &password_hash, now_rfc3339()),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "users" }))
    })?;
    let user = UserRow {
        id: conn.last_insert_rowid(),
        full_name,
        email,
        password_hash,
    };
    info!(user_id = user.id, "user registered");

    let token = issue_token(settings, user.id)?;
    Ok(json!({
        "user": user.to_json(),
        "token": token,
        "message": "Registered successfully",
    }))
}

fn auth_login(
    conn: &Connection,
    settings: &AuthSettings,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = normalize_email(&get_required_str(params, "email")?);
    let password = get_password(params)?;

    let user = find_user(conn, "email = ?", &email)?
        .filter(|u| auth::verify_password(&password, &u.password_hash));
    let Some(user) = user else {
        warn!("login rejected");
        return Err(HandlerErr::unauthorized("Invalid credentials"));
    };

    let token = issue_token(settings, user.id)?;
    Ok(json!({
        "user": user.to_json(),
        "token": token,
        "message": "Login successful",
    }))
}

fn auth_me(conn: &Connection, actor: Option<i64>) -> Result<serde_json::Value, HandlerErr> {
    let Some(user_id) = actor else {
        return Err(HandlerErr::unauthorized("sign in first"));
    };
    let user = find_user(conn, "id = ?", &user_id)?
        .ok_or_else(|| HandlerErr::unauthorized("sign in first"))?;
    Ok(json!({ "user": user.to_json() }))
}

/// Resolves the caller from `req.token`.
///
/// A token that fails verification is an error. A verified token whose user is
/// gone resolves to no caller, same as an absent token.
pub fn resolve_actor(state: &AppState, req: &Request) -> Result<Option<i64>, HandlerErr> {
    let Some(token) = req.token.as_deref().filter(|t| !t.trim().is_empty()) else {
        if state.auth.require_auth {
            return Err(HandlerErr::unauthorized("authentication required"));
        }
        return Ok(None);
    };

    let claims = auth::verify_token(token, &state.auth.secret).map_err(|e| {
        warn!(method = %req.method, error = %e, "token rejected");
        HandlerErr::unauthorized(e.to_string())
    })?;

    let Some(conn) = state.db.as_ref() else {
        return Ok(None);
    };
    if user_exists(conn, claims.uid)? {
        Ok(Some(claims.uid))
    } else {
        Ok(None)
    }
}

fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.register" => db_conn(state).and_then(|c| auth_register(c, &state.auth, &req.params)),
        "auth.login" => db_conn(state).and_then(|c| auth_login(c, &state.auth, &req.params)),
        "auth.me" => db_conn(state).and_then(|c| auth_me(c, req.actor)),
        _ => return None,
    };
    Some(respond(req, result))
}
