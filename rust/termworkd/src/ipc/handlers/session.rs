use crate::ipc::error::{err, get_required_str, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let token = match get_required_str(&req.params, "token") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match state.session.login(&token) {
        Ok(claims) => ok(
            &req.id,
            json!({
                "loggedIn": true,
                "role": claims.role,
                "userId": claims.id,
                "email": claims.email,
            }),
        ),
        Err(e) => err(&req.id, "bad_token", e.to_string(), None),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.logout();
    ok(&req.id, json!({ "loggedIn": false }))
}

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "loggedIn": state.session.is_logged_in(),
            "role": state.session.role(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.status" => Some(handle_status(state, req)),
        _ => None,
    }
}
