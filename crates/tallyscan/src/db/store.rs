//! SQLite-backed implementation of the job and transaction stores.

use chrono::{DateTime, Utc};

use crate::jobs::model::{DocumentJob, JobError, JobOutcome, JobStatus, NewDocumentJob};
use crate::jobs::store::{JobStore, TransactionStore};
use crate::transaction::{NewTransaction, Transaction};

use super::{job_repo, transaction_repo, Database, DatabaseError};

/// Clones share one run id; every job they create is claimed by it.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
    run_id: String,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl JobStore for SqliteStore {
    fn create_job(&self, new: NewDocumentJob) -> Result<DocumentJob, DatabaseError> {
        let job = DocumentJob::from_new(new);
        job_repo::insert(&self.db, &job, &self.run_id)?;
        log::debug!("Created document job {} ({})", job.id, job.kind);
        Ok(job)
    }

    fn find_job(&self, id: &str) -> Result<Option<DocumentJob>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)
    }

    fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<DocumentJob>, DatabaseError> {
        job_repo::list_by_status(&self.db, status)
    }

    fn mark_completed(&self, id: &str, outcome: &JobOutcome) -> Result<bool, DatabaseError> {
        let now = chrono::Utc::now().to_rfc3339();
        job_repo::mark_completed(&self.db, id, outcome, &now)
    }

    fn mark_failed(&self, id: &str, error: &JobError) -> Result<bool, DatabaseError> {
        job_repo::mark_failed(&self.db, id, error)
    }

    fn claim_orphan(&self, id: &str, stale_before: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let claimed = job_repo::claim_stale(&self.db, id, &self.run_id, stale_before)?;
        if claimed {
            log::debug!("Claimed orphaned job {}", id);
        }
        Ok(claimed)
    }
}

impl TransactionStore for SqliteStore {
    fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, DatabaseError> {
        let tx = Transaction::from_new(new);
        transaction_repo::insert(&self.db, &tx)?;
        Ok(tx)
    }

    fn find_transaction(&self, id: &str) -> Result<Option<Transaction>, DatabaseError> {
        transaction_repo::find_by_id(&self.db, id)
    }

    fn list_transactions_for_job(&self, job_id: &str) -> Result<Vec<Transaction>, DatabaseError> {
        transaction_repo::list_by_document_job(&self.db, job_id)
    }

    fn delete_transaction(&self, id: &str) -> Result<bool, DatabaseError> {
        transaction_repo::delete_by_id(&self.db, id)
    }

    fn delete_transactions_for_job(&self, job_id: &str) -> Result<usize, DatabaseError> {
        transaction_repo::delete_by_document_job(&self.db, job_id)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::jobs::model::DocumentKind;
    use crate::transaction::{TransactionMetadata, TransactionSource, TransactionType};

    #[test]
    fn test_transactions_listed_per_job() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        let job = store
            .create_job(NewDocumentJob {
                owner_id: "owner-1".to_string(),
                original_filename: "march.pdf".to_string(),
                stored_filename: "stored-march.pdf".to_string(),
                file_path: PathBuf::from("/uploads/stored-march.pdf"),
                mime_type: "application/pdf".to_string(),
                size_bytes: 80_000,
                kind: DocumentKind::PdfStatement,
            })
            .unwrap();

        for description in ["Coffee", "Rent", "Salary"] {
            store
                .create_transaction(NewTransaction {
                    owner_id: "owner-1".to_string(),
                    amount: 10.0,
                    transaction_type: TransactionType::Expense,
                    category: "Other".to_string(),
                    description: description.to_string(),
                    date: "2024-03-01".to_string(),
                    source: TransactionSource::Pdf,
                    metadata: TransactionMetadata::default(),
                    document_job_id: Some(job.id.clone()),
                })
                .unwrap();
        }

        let listed = store.list_transactions_for_job(&job.id).unwrap();
        let descriptions: Vec<&str> = listed.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Coffee", "Rent", "Salary"]);
        assert!(store.list_transactions_for_job("other").unwrap().is_empty());
    }

    #[test]
    fn test_separate_runs_share_database_but_not_claims() {
        let first = SqliteStore::new(Database::open_in_memory().unwrap());
        let second = SqliteStore::new(first.database().clone());
        assert_ne!(first.run_id(), second.run_id());
        assert_eq!(first.clone().run_id(), first.run_id());

        let job = first
            .create_job(NewDocumentJob {
                owner_id: "owner-1".to_string(),
                original_filename: "r.jpg".to_string(),
                stored_filename: "stored-r.jpg".to_string(),
                file_path: PathBuf::from("/uploads/stored-r.jpg"),
                mime_type: "image/jpeg".to_string(),
                size_bytes: 2048,
                kind: DocumentKind::Receipt,
            })
            .unwrap();

        let later = Utc::now() + chrono::Duration::minutes(1);
        assert!(!first.claim_orphan(&job.id, later).unwrap());
        assert!(second.claim_orphan(&job.id, later).unwrap());
        // The new claim is fresh again.
        let earlier = Utc::now() - chrono::Duration::minutes(1);
        assert!(!first.claim_orphan(&job.id, earlier).unwrap());
    }
}
