use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::ErrorCategory;
use crate::error::WorkerError;
use crate::jobs::{
    lifecycle, DocumentJob, DocumentKind, JobStatus, JobStatusView, JobStore, NewDocumentJob,
    TransactionStore, TransitionError,
};
use crate::sanitize;
use crate::transaction::Transaction;
use crate::worker::{QueueSlot, WorkerPool};

use super::error::IntakeError;
use super::upload::{UploadGuard, UploadedFile};

/// Reads a job and its linked transaction for `owner_id`.
pub fn job_status_view(
    jobs: &dyn JobStore,
    transactions: &dyn TransactionStore,
    job_id: &str,
    owner_id: &str,
) -> Result<JobStatusView, IntakeError> {
    let job = jobs
        .find_job(job_id)?
        .filter(|job| job.owner_id == owner_id)
        .ok_or_else(|| IntakeError::JobNotFound {
            job_id: job_id.to_string(),
        })?;

    let transaction = match job.linked_transaction_id.as_deref() {
        Some(id) => transactions.find_transaction(id)?,
        None => None,
    };

    Ok(JobStatusView {
        status: job.status,
        extracted_data: job.extracted_data,
        transaction,
        error: job.error,
    })
}

/// Counts from one orphan recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub redispatched: usize,
    pub failed: usize,
    /// Still claimed by a live run, or by this one.
    pub skipped: usize,
}

/// How long another run's claim on a `processing` job is honoured.
pub const DEFAULT_ORPHAN_AFTER_SECS: u64 = 900;

/// Entry point for uploaded documents.
///
/// Submission reserves a queue slot, creates the job in `processing` and
/// returns its id; extraction happens on the worker pool.
pub struct Dispatcher {
    pool: WorkerPool,
    jobs: Arc<dyn JobStore>,
    transactions: Arc<dyn TransactionStore>,
    orphan_after: chrono::Duration,
}

impl Dispatcher {
    pub fn new(
        pool: WorkerPool,
        jobs: Arc<dyn JobStore>,
        transactions: Arc<dyn TransactionStore>,
    ) -> Self {
        Self {
            pool,
            jobs,
            transactions,
            orphan_after: chrono::Duration::seconds(DEFAULT_ORPHAN_AFTER_SECS as i64),
        }
    }

    /// Age after which another run's `processing` job counts as orphaned.
    pub fn with_orphan_after(mut self, secs: u64) -> Self {
        self.orphan_after = chrono::Duration::seconds(secs.min(i32::MAX as u64) as i64);
        self
    }

    /// Queues `file` for background extraction and returns the job id.
    ///
    /// The upload is deleted if the queue is full or the job cannot be
    /// created.
    pub async fn submit_document(
        &self,
        file: UploadedFile,
        owner_id: &str,
        kind: DocumentKind,
    ) -> Result<String, IntakeError> {
        let (job, slot) = self.admit(file, owner_id, kind)?;
        let job_id = job.id.clone();
        slot.dispatch(job);
        Ok(job_id)
    }

    /// Runs a statement through the same protected pipeline and waits for it.
    ///
    /// Returns the transactions created for the statement, or
    /// `ProcessingFailed` with the job's classified error.
    pub async fn process_statement_synchronously(
        &self,
        file: UploadedFile,
        owner_id: &str,
        kind: DocumentKind,
    ) -> Result<Vec<Transaction>, IntakeError> {
        if !kind.is_statement() {
            return Err(IntakeError::invalid(format!("{} is not a statement kind", kind)));
        }

        let (job, slot) = self.admit(file, owner_id, kind)?;
        let job_id = job.id.clone();
        let status = slot
            .dispatch_with_reply(job)
            .await
            .map_err(|_| IntakeError::Queue(WorkerError::ChannelClosed))?;

        match status {
            JobStatus::Completed => Ok(self.transactions.list_transactions_for_job(&job_id)?),
            _ => {
                let category = self
                    .jobs
                    .find_job(&job_id)?
                    .and_then(|job| job.error)
                    .map(|error| error.classified_type)
                    .unwrap_or(ErrorCategory::SystemError);
                Err(IntakeError::ProcessingFailed { job_id, category })
            }
        }
    }

    /// The owner's view of a job. Jobs of other owners are reported as not found.
    pub fn job_status(&self, job_id: &str, owner_id: &str) -> Result<JobStatusView, IntakeError> {
        job_status_view(self.jobs.as_ref(), self.transactions.as_ref(), job_id, owner_id)
    }

    /// Re-queues jobs a previous process left in `processing`.
    ///
    /// A job is only taken once its claim is older than the orphan age and
    /// belongs to another run; jobs still in flight are skipped. Jobs whose
    /// file no longer exists are failed with `FileNotFound`. Waits for queue
    /// space rather than rejecting.
    pub async fn recover_orphaned_jobs(&self) -> Result<RecoveryReport, IntakeError> {
        let orphans = self.jobs.list_jobs_by_status(JobStatus::Processing)?;
        let stale_before = Utc::now() - self.orphan_after;
        let mut report = RecoveryReport::default();

        for job in orphans {
            if !self.jobs.claim_orphan(&job.id, stale_before)? {
                debug!(job_id = %job.id, "job still claimed, leaving it");
                report.skipped += 1;
                continue;
            }

            if !tokio::fs::try_exists(&job.file_path).await.unwrap_or(false) {
                warn!(
                    job_id = %job.id,
                    file = %sanitize::redact_path(&job.file_path),
                    "orphaned job lost its file"
                );
                match lifecycle::fail(self.jobs.as_ref(), &job.id, ErrorCategory::FileNotFound) {
                    Ok(()) => report.failed += 1,
                    Err(TransitionError::AlreadyTerminal { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                continue;
            }

            let slot = self.pool.reserve_wait().await?;
            slot.dispatch(job);
            report.redispatched += 1;
        }

        if report.redispatched + report.failed > 0 {
            info!(
                redispatched = report.redispatched,
                failed = report.failed,
                skipped = report.skipped,
                "recovered orphaned jobs"
            );
        }
        Ok(report)
    }

    /// Stops the pool after in-flight and queued jobs finish.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }

    /// Reserves a queue slot and creates the job. The upload is removed on
    /// any failure before the job exists.
    fn admit(
        &self,
        file: UploadedFile,
        owner_id: &str,
        kind: DocumentKind,
    ) -> Result<(DocumentJob, QueueSlot), IntakeError> {
        let guard = UploadGuard::new(&file.path);

        let slot = self.pool.reserve().inspect_err(|e| {
            warn!(error = %e, "rejecting upload");
        })?;

        let job = self.jobs.create_job(NewDocumentJob {
            owner_id: owner_id.to_string(),
            original_filename: file.original_filename,
            stored_filename: file.stored_filename,
            file_path: file.path,
            mime_type: file.mime_type,
            size_bytes: file.size_bytes,
            kind,
        })?;

        guard.disarm();
        info!(
            job_id = %job.id,
            kind = %kind,
            file = %sanitize::redact_path(&job.file_path),
            "document accepted"
        );
        Ok((job, slot))
    }
}
