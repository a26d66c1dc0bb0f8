use thiserror::Error;

use crate::classify::ErrorCategory;
use crate::db::DatabaseError;
use crate::error::WorkerError;
use crate::jobs::TransitionError;

#[derive(Error, Debug)]
pub enum IntakeError {
    /// Rejected before any job exists.
    #[error("InputValidationError: {reason}")]
    InputValidation { reason: String },

    #[error("Upload '{path}' could not be read: {source}")]
    UploadRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not queue document: {0}")]
    Queue(#[from] WorkerError),

    #[error("Job store failure: {0}")]
    Store(#[from] DatabaseError),

    #[error("Job state update failed: {0}")]
    Transition(#[from] TransitionError),

    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job '{job_id}' failed: {}", category.user_message())]
    ProcessingFailed {
        job_id: String,
        category: ErrorCategory,
    },
}

impl IntakeError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        IntakeError::InputValidation {
            reason: reason.into(),
        }
    }
}
