use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::session::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::marks::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::assessment::try_handle(state, &req) {
        return resp;
    }

    tracing::debug!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
