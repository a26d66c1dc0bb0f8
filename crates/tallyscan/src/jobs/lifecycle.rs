//! Terminal transitions of a document job.
//!
//! A job is created in `processing` and moves exactly once into
//! `completed` or `failed`. Both writes are conditional on the row still
//! being `processing`, so a second terminal write is rejected with
//! [`TransitionError::AlreadyTerminal`] instead of overwriting the first.

use thiserror::Error;
use tracing::debug;

use crate::classify::ErrorCategory;
use crate::db::DatabaseError;

use super::model::{JobError, JobOutcome};
use super::store::JobStore;

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Job '{job_id}' has already reached a terminal state")]
    AlreadyTerminal { job_id: String },

    #[error("Job '{job_id}' does not exist")]
    NotFound { job_id: String },

    #[error("Failed to persist job transition: {0}")]
    Store(#[from] DatabaseError),
}

pub fn complete(
    store: &dyn JobStore,
    job_id: &str,
    outcome: &JobOutcome,
) -> Result<(), TransitionError> {
    if store.mark_completed(job_id, outcome)? {
        debug!(job_id, "job completed");
        Ok(())
    } else {
        Err(rejected(store, job_id)?)
    }
}

/// Fails the job with the user-facing sentence of `category`.
pub fn fail(
    store: &dyn JobStore,
    job_id: &str,
    category: ErrorCategory,
) -> Result<(), TransitionError> {
    let error = JobError::from_category(category);
    if store.mark_failed(job_id, &error)? {
        debug!(job_id, category = %category, "job failed");
        Ok(())
    } else {
        Err(rejected(store, job_id)?)
    }
}

/// Explains why a conditional write changed no row.
fn rejected(store: &dyn JobStore, job_id: &str) -> Result<TransitionError, DatabaseError> {
    Ok(match store.find_job(job_id)? {
        Some(_) => TransitionError::AlreadyTerminal {
            job_id: job_id.to_string(),
        },
        None => TransitionError::NotFound {
            job_id: job_id.to_string(),
        },
    })
}
