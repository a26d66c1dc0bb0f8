use chrono::{DateTime, Utc};

use crate::db::DatabaseError;
use crate::transaction::{NewTransaction, Transaction};

use super::model::{DocumentJob, JobError, JobOutcome, JobStatus, NewDocumentJob};

/// Keyed persistence for document jobs.
///
/// The two terminal writes are conditional: they only touch a row that is
/// still `processing` and report whether a row was changed.
pub trait JobStore: Send + Sync {
    fn create_job(&self, new: NewDocumentJob) -> Result<DocumentJob, DatabaseError>;

    fn find_job(&self, id: &str) -> Result<Option<DocumentJob>, DatabaseError>;

    fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<DocumentJob>, DatabaseError>;

    fn mark_completed(&self, id: &str, outcome: &JobOutcome) -> Result<bool, DatabaseError>;

    /// Failing a job also drops any transactions it materialized.
    fn mark_failed(&self, id: &str, error: &JobError) -> Result<bool, DatabaseError>;

    /// Takes over a `processing` job left by another run once that run's
    /// claim is older than `stale_before`. Returns whether it was taken.
    fn claim_orphan(&self, id: &str, stale_before: DateTime<Utc>) -> Result<bool, DatabaseError>;
}

pub trait TransactionStore: Send + Sync {
    fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, DatabaseError>;

    fn find_transaction(&self, id: &str) -> Result<Option<Transaction>, DatabaseError>;

    fn list_transactions_for_job(&self, job_id: &str) -> Result<Vec<Transaction>, DatabaseError>;

    fn delete_transaction(&self, id: &str) -> Result<bool, DatabaseError>;

    fn delete_transactions_for_job(&self, job_id: &str) -> Result<usize, DatabaseError>;
}
