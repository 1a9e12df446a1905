//! The persistence seam for assessment records.
//!
//! The dialog state machine only talks to an [`AssessmentService`]; the REST
//! client and the local SQLite store are interchangeable behind it.

use crate::model::{AssessmentPayload, StoredAssessment};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Token invalid or expired")]
    Unauthorized,
    #[error("Server responded with status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("No response received from server: {0}")]
    Transport(String),
    #[error("Invalid response from server: {0}")]
    Decode(String),
    #[error("Local store error: {0}")]
    Store(String),
}

/// Implementations must be shareable across threads: pending rows are
/// saved in parallel.
pub trait AssessmentService: Send + Sync {
    /// Creates or updates one record and returns what was stored.
    fn save_assessment(&self, payload: &AssessmentPayload) -> Result<StoredAssessment, ServiceError>;

    /// Every persisted record for one student, final record included.
    fn student_assessments(&self, roll_number: &str) -> Result<Vec<StoredAssessment>, ServiceError>;
}
