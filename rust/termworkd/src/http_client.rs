//! REST implementation of [`AssessmentService`].

use crate::model::{AssessmentListWire, AssessmentPayload, StoredAssessment};
use crate::service::{AssessmentService, ServiceError};
use crate::session::SessionContext;
use std::time::Duration;
use url::Url;

const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct HttpAssessmentService {
    base: Url,
    agent: ureq::Agent,
    session: SessionContext,
}

impl HttpAssessmentService {
    pub fn new(api_url: &str, timeout: Duration, session: SessionContext) -> anyhow::Result<Self> {
        let base = Url::parse(api_url.trim())?;
        if base.cannot_be_a_base() {
            anyhow::bail!("api url cannot be used as a base: {}", api_url);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Ok(Self {
            base,
            agent,
            session,
        })
    }

    pub fn api_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport(format!("bad api url: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, req: ureq::Request) -> ureq::Request {
        let req = req.set("Accept", "application/json");
        match self.session.bearer_token() {
            Some(token) => req.set("Authorization", &format!("Bearer {}", token)),
            None => req,
        }
    }
}

impl AssessmentService for HttpAssessmentService {
    fn save_assessment(&self, payload: &AssessmentPayload) -> Result<StoredAssessment, ServiceError> {
        let url = self.endpoint(&["assessments"])?;
        tracing::debug!(
            url = %url,
            roll = %payload.student_roll_no,
            experiment = payload.experiment_no,
            "POST assessment"
        );
        let req = self.authorized(self.agent.post(url.as_str()));
        let body = read_body(req.send_json(payload))?;
        serde_json::from_str::<StoredAssessment>(&body)
            .map_err(|e| ServiceError::Decode(format!("{e}: {}", truncate(&body))))
    }

    fn student_assessments(&self, roll_number: &str) -> Result<Vec<StoredAssessment>, ServiceError> {
        let url = self.endpoint(&["assessments", "student", roll_number])?;
        tracing::debug!(url = %url, "GET student assessments");
        let req = self.authorized(self.agent.get(url.as_str()));
        let body = read_body(req.call())?;
        serde_json::from_str::<AssessmentListWire>(&body)
            .map(AssessmentListWire::into_records)
            .map_err(|e| ServiceError::Decode(format!("{e}: {}", truncate(&body))))
    }
}

fn read_body(result: Result<ureq::Response, ureq::Error>) -> Result<String, ServiceError> {
    match result {
        Ok(response) => response
            .into_string()
            .map_err(|e| ServiceError::Decode(e.to_string())),
        Err(ureq::Error::Status(401, _)) => Err(ServiceError::Unauthorized),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(ServiceError::Status {
                code,
                body: truncate(&body),
            })
        }
        Err(ureq::Error::Transport(err)) => Err(ServiceError::Transport(err.to_string())),
    }
}

fn truncate(body: &str) -> String {
    let t = body.trim();
    match t.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &t[..idx]),
        None => t.to_string(),
    }
}
