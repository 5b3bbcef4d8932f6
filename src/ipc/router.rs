use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use tracing::debug;

/// Methods reachable without a token even when auth is required.
const PUBLIC_METHODS: [&str; 4] = ["health", "workspace.select", "auth.register", "auth.login"];

pub fn handle_request(state: &mut AppState, mut req: Request) -> serde_json::Value {
    debug!(id = %req.id, method = %req.method, "dispatch");

    req.actor = None;
    if !PUBLIC_METHODS.contains(&req.method.as_str()) {
        match handlers::auth::resolve_actor(state, &req) {
            Ok(actor) => req.actor = actor,
            Err(e) => return e.response(&req.id),
        }
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
