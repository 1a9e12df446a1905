mod calc;
mod config;
mod db;
mod error;
mod http_client;
mod ipc;
mod logging;
mod manager;
mod model;
mod service;
mod session;

use std::io::{self, BufRead, Write};

fn main() {
    if let Err(e) = logging::init() {
        eprintln!("termworkd: logging disabled: {e}");
    }

    let config = config::DaemonConfig::from_env();
    let mut state = ipc::AppState::new(config.clone());

    if let Some(path) = config.workspace.as_ref() {
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            tracing::warn!(path = %path.display(), "could not open workspace: {e:?}");
        }
    } else if config.connect_on_start {
        if let Err(e) = ipc::connect_http(&mut state, &config.api_url) {
            tracing::warn!(api_url = %config.api_url, "could not connect backend: {e:?}");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "termworkd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!("bad request line: {e}");
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
