use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

const ENV_API_URL: &str = "TERMWORK_API_URL";
const ENV_HTTP_TIMEOUT_SECS: &str = "TERMWORK_HTTP_TIMEOUT_SECS";
const ENV_WORKSPACE: &str = "TERMWORK_WORKSPACE";

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub api_url: String,
    /// The API URL came from the environment, so the REST backend is
    /// connected at startup.
    pub connect_on_start: bool,
    pub http_timeout: Duration,
    pub workspace: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            connect_on_start: false,
            http_timeout: Duration::from_secs(10),
            workspace: None,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            let url = url.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                cfg.api_url = url.to_string();
                cfg.connect_on_start = true;
            } else {
                tracing::warn!(value = url, "ignoring {ENV_API_URL}: not an http(s) URL");
            }
        }

        if let Some(raw) = lookup(ENV_HTTP_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.http_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "ignoring {ENV_HTTP_TIMEOUT_SECS}: expected positive integer"),
            }
        }

        cfg.workspace = lookup(ENV_WORKSPACE)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        cfg
    }
}
