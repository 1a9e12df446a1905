use crate::calc::MarkRejection;
use crate::service::ServiceError;

/// Failures scoped to one record or one save operation. None of these are
/// fatal to the daemon.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssessmentError {
    #[error("{message}")]
    Validation { field: String, message: String },
    #[error("Please fill all fields in experiment {experiment_no} before saving")]
    IncompleteRow { experiment_no: u8 },
    #[error("experiment {experiment_no} is already saved")]
    RecordLocked { experiment_no: u8 },
    #[error("experiment {experiment_no} already has a save in progress")]
    SaveInFlight { experiment_no: u8 },
    #[error("Please fill the proportionate assignment marks")]
    MissingProportionateAssignment,
    #[error("experiment number must be between 1 and 12 (got {0})")]
    UnknownExperiment(i64),
    #[error("{0}")]
    Transport(#[from] ServiceError),
    #[error("Invalid response from server: {0}")]
    ServerRejection(String),
}

impl AssessmentError {
    pub fn code(&self) -> &'static str {
        match self {
            AssessmentError::Validation { .. } => "validation_failed",
            AssessmentError::IncompleteRow { .. } => "incomplete_row",
            AssessmentError::RecordLocked { .. } => "record_locked",
            AssessmentError::SaveInFlight { .. } => "save_in_flight",
            AssessmentError::MissingProportionateAssignment => "missing_proportionate_assignment",
            AssessmentError::UnknownExperiment(_) => "bad_params",
            AssessmentError::Transport(_) => "transport_failed",
            AssessmentError::ServerRejection(_) => "server_rejected",
        }
    }

    pub fn invalid_date(field: &str, value: &str) -> Self {
        AssessmentError::Validation {
            field: field.to_string(),
            message: format!("{} must be a date (YYYY-MM-DD), got {:?}", field, value),
        }
    }
}

impl From<MarkRejection> for AssessmentError {
    fn from(e: MarkRejection) -> Self {
        AssessmentError::Validation {
            field: e.kind.as_str().to_string(),
            message: e.message,
        }
    }
}
