use crate::config::DaemonConfig;
use crate::manager::ExperimentRecordManager;
use crate::service::AssessmentService;
use crate::session::SessionContext;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Clone)]
pub enum Backend {
    Http {
        api_url: String,
        service: Arc<dyn AssessmentService>,
    },
    Local {
        path: PathBuf,
        service: Arc<dyn AssessmentService>,
    },
}

impl Backend {
    pub fn service(&self) -> Arc<dyn AssessmentService> {
        match self {
            Backend::Http { service, .. } | Backend::Local { service, .. } => Arc::clone(service),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Http { .. } => "http",
            Backend::Local { .. } => "local",
        }
    }
}

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub session: SessionContext,
    pub backend: Option<Backend>,
    /// Open assessment dialogs keyed by student roll number.
    pub dialogs: HashMap<String, ExperimentRecordManager>,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            workspace: None,
            session: SessionContext::new(),
            backend: None,
            dialogs: HashMap::new(),
        }
    }

    /// Swaps the active backend. Open dialogs were loaded from the old one
    /// and are dropped.
    pub fn set_backend(&mut self, backend: Backend) {
        if !self.dialogs.is_empty() {
            tracing::info!(closed = self.dialogs.len(), "backend changed; closing open dialogs");
            self.dialogs.clear();
        }
        tracing::info!(backend = backend.kind(), "assessment backend selected");
        self.backend = Some(backend);
    }
}
