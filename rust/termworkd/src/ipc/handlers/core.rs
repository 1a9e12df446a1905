use crate::db::{LocalAssessmentService, DB_FILE_NAME};
use crate::http_client::HttpAssessmentService;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Backend, Request};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (api_url, store_path) = match state.backend.as_ref() {
        Some(Backend::Http { api_url, .. }) => (Some(api_url.clone()), None),
        Some(Backend::Local { path, .. }) => (
            None,
            Some(path.join(DB_FILE_NAME).to_string_lossy().to_string()),
        ),
        None => (None, None),
    };
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "backend": state.backend.as_ref().map(|b| b.kind()),
            "apiUrl": api_url,
            "storePath": store_path,
            "openDialogs": state.dialogs.len(),
        }),
    )
}

/// Opens the workspace store and makes it the active backend.
pub fn select_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let service = LocalAssessmentService::open(path)?;
    state.workspace = Some(path.to_path_buf());
    state.set_backend(Backend::Local {
        path: path.to_path_buf(),
        service: Arc::new(service),
    });
    Ok(())
}

/// Connects the REST backend, sharing the process session for auth.
pub fn connect_http(state: &mut AppState, api_url: &str) -> anyhow::Result<String> {
    let service =
        HttpAssessmentService::new(api_url, state.config.http_timeout, state.session.clone())?;
    let api_url = service.api_url().to_string();
    state.set_backend(Backend::Http {
        api_url: api_url.clone(),
        service: Arc::new(service),
    });
    Ok(api_url)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_backend_connect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let api_url = req
        .params
        .get("apiUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.config.api_url.clone());

    match connect_http(state, &api_url) {
        Ok(api_url) => ok(&req.id, json!({ "backend": "http", "apiUrl": api_url })),
        Err(e) => err(
            &req.id,
            "bad_params",
            format!("invalid apiUrl: {e}"),
            Some(json!({ "apiUrl": api_url })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "backend.connect" => Some(handle_backend_connect(state, req)),
        _ => None,
    }
}
