//! Job repository: reads and writes for the `document_jobs` table.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::classify::ErrorCategory;
use crate::jobs::model::{
    DocumentJob, DocumentKind, ExtractedData, JobError, JobOutcome, JobStatus,
};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub kind: String,
    pub status: String,
    pub ocr_text: Option<String>,
    pub extracted_data: Option<String>,
    pub linked_transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub error_timestamp: Option<String>,
    pub error_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            original_filename: row.get("original_filename")?,
            stored_filename: row.get("stored_filename")?,
            file_path: row.get("file_path")?,
            mime_type: row.get("mime_type")?,
            size_bytes: row.get("size_bytes")?,
            kind: row.get("kind")?,
            status: row.get("status")?,
            ocr_text: row.get("ocr_text")?,
            extracted_data: row.get("extracted_data")?,
            linked_transaction_id: row.get("linked_transaction_id")?,
            error_message: row.get("error_message")?,
            error_timestamp: row.get("error_timestamp")?,
            error_type: row.get("error_type")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn from_job(job: &DocumentJob) -> Result<Self, DatabaseError> {
        let extracted_data = job
            .extracted_data
            .as_ref()
            .map(ExtractedData::to_json)
            .transpose()?;
        Ok(Self {
            id: job.id.clone(),
            owner_id: job.owner_id.clone(),
            original_filename: job.original_filename.clone(),
            stored_filename: job.stored_filename.clone(),
            file_path: job.file_path.to_string_lossy().into_owned(),
            mime_type: job.mime_type.clone(),
            size_bytes: job.size_bytes as i64,
            kind: job.kind.as_str().to_string(),
            status: job.status.as_str().to_string(),
            ocr_text: job.ocr_text.clone(),
            extracted_data,
            linked_transaction_id: job.linked_transaction_id.clone(),
            error_message: job.error.as_ref().map(|e| e.message.clone()),
            error_timestamp: job.error.as_ref().map(|e| e.timestamp.clone()),
            error_type: job
                .error
                .as_ref()
                .map(|e| e.classified_type.as_str().to_string()),
            created_at: job.created_at.clone(),
            updated_at: job.updated_at.clone(),
        })
    }

    /// Decodes the row into the domain type.
    pub fn into_job(self) -> Result<DocumentJob, DatabaseError> {
        let kind: DocumentKind = self.kind.parse().map_err(|reason| DatabaseError::Decode {
            column: "kind",
            reason,
        })?;
        let status: JobStatus = self.status.parse().map_err(|reason| DatabaseError::Decode {
            column: "status",
            reason,
        })?;
        let extracted_data = self
            .extracted_data
            .as_deref()
            .map(|json| ExtractedData::from_json(kind, json))
            .transpose()
            .map_err(|e| DatabaseError::Decode {
                column: "extracted_data",
                reason: e.to_string(),
            })?;
        let error = match (self.error_message, self.error_timestamp, self.error_type) {
            (Some(message), Some(timestamp), Some(error_type)) => {
                let classified_type: ErrorCategory =
                    error_type.parse().map_err(|reason| DatabaseError::Decode {
                        column: "error_type",
                        reason,
                    })?;
                Some(JobError {
                    message,
                    timestamp,
                    classified_type,
                })
            }
            _ => None,
        };

        Ok(DocumentJob {
            id: self.id,
            owner_id: self.owner_id,
            original_filename: self.original_filename,
            stored_filename: self.stored_filename,
            file_path: PathBuf::from(self.file_path),
            mime_type: self.mime_type,
            size_bytes: self.size_bytes.max(0) as u64,
            kind,
            status,
            ocr_text: self.ocr_text,
            extracted_data,
            linked_transaction_id: self.linked_transaction_id,
            error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Claim timestamps compare as text, so they share one fixed format.
pub fn claim_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Inserts a new job row claimed by `claimant`.
pub fn insert(db: &Database, job: &DocumentJob, claimant: &str) -> Result<(), DatabaseError> {
    let row = JobRow::from_job(job)?;
    let claimed_at = claim_timestamp(Utc::now());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO document_jobs (id, owner_id, original_filename, stored_filename,
             file_path, mime_type, size_bytes, kind, status, ocr_text, extracted_data,
             linked_transaction_id, error_message, error_timestamp, error_type,
             created_at, updated_at, claimed_by, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
             ?18, ?19)",
            params![
                row.id,
                row.owner_id,
                row.original_filename,
                row.stored_filename,
                row.file_path,
                row.mime_type,
                row.size_bytes,
                row.kind,
                row.status,
                row.ocr_text,
                row.extracted_data,
                row.linked_transaction_id,
                row.error_message,
                row.error_timestamp,
                row.error_type,
                row.created_at,
                row.updated_at,
                claimant,
                claimed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocumentJob>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM document_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Lists jobs in the given status, oldest first.
pub fn list_by_status(db: &Database, status: JobStatus) -> Result<Vec<DocumentJob>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM document_jobs WHERE status = ?1 ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map(params![status.as_str()], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Moves a `processing` job to `completed`. Returns false if no row was
/// in `processing` under that id.
pub fn mark_completed(
    db: &Database,
    id: &str,
    outcome: &JobOutcome,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    let extracted_data = outcome.extracted_data.to_json()?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE document_jobs SET status = 'completed', ocr_text = ?2, extracted_data = ?3,
             linked_transaction_id = ?4, updated_at = ?5
             WHERE id = ?1 AND status = 'processing'",
            params![
                id,
                outcome.ocr_text,
                extracted_data,
                outcome.linked_transaction_id,
                updated_at,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Hands a `processing` job to `claimant` when its current claim belongs
/// to someone else and is older than `stale_before`. Returns false if the
/// job is terminal, already ours, or still held.
pub fn claim_stale(
    db: &Database,
    id: &str,
    claimant: &str,
    stale_before: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE document_jobs SET claimed_by = ?2, claimed_at = ?3
             WHERE id = ?1 AND status = 'processing'
             AND (claimed_by IS NULL OR claimed_by != ?2)
             AND (claimed_at IS NULL OR claimed_at < ?4)",
            params![
                id,
                claimant,
                claim_timestamp(Utc::now()),
                claim_timestamp(stale_before),
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a `processing` job to `failed` and drops any transactions it
/// materialized. Returns false if no row was in `processing` under that id.
pub fn mark_failed(db: &Database, id: &str, error: &JobError) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE document_jobs SET status = 'failed', error_message = ?2,
             error_timestamp = ?3, error_type = ?4, updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![
                id,
                error.message,
                error.timestamp,
                error.classified_type.as_str(),
            ],
        )?;
        if changed == 1 {
            let dropped = tx.execute(
                "DELETE FROM transactions WHERE document_job_id = ?1",
                params![id],
            )?;
            if dropped > 0 {
                log::warn!("Dropped {} transaction(s) of failed job {}", dropped, id);
            }
        }
        tx.commit()?;
        Ok(changed == 1)
    })
}
