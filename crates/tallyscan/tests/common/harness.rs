//! Test harness for isolated pipeline and intake runs.
//!
//! Each harness owns a temp directory for uploads and an in-memory SQLite
//! store, and wires fakes into the real pipeline, pool and dispatcher.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tallyscan::ai::StructuredExtractor;
use tallyscan::config::Config;
use tallyscan::db::{Database, SqliteStore};
use tallyscan::intake::{Dispatcher, UploadedFile};
use tallyscan::jobs::{DocumentJob, DocumentKind, JobStore, NewDocumentJob, TransactionStore};
use tallyscan::materialize::Materializer;
use tallyscan::pipeline::Pipeline;
use tallyscan::processor::{OcrExtractor, PdfExtractor};
use tallyscan::worker::WorkerPool;

use super::builders::Fakes;

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub store: SqliteStore,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        let config = Config {
            worker_count: 2,
            queue_capacity: 8,
            ..Config::default()
        };

        Self {
            temp_dir,
            upload_dir,
            store: SqliteStore::new(Database::open_in_memory().expect("in-memory database")),
            config,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a stored upload and describes it as the upload layer would.
    pub fn write_upload(&self, original_filename: &str, content: &[u8]) -> UploadedFile {
        let extension = Path::new(original_filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stored = self
            .upload_dir
            .join(format!("{}{}", uuid::Uuid::new_v4(), extension));
        std::fs::write(&stored, content).expect("Failed to write upload");
        UploadedFile::from_path(&stored, original_filename).expect("Failed to describe upload")
    }

    /// A 2 KiB "image"; the fake OCR engine never decodes it.
    pub fn write_image(&self, original_filename: &str) -> UploadedFile {
        self.write_upload(original_filename, &[0u8; 2048])
    }

    pub fn write_pdf(&self, original_filename: &str) -> UploadedFile {
        self.write_upload(original_filename, b"%PDF-1.4\n% placeholder body for fake parser\n")
    }

    /// Creates a `processing` job directly, as a separate earlier run would.
    pub fn create_job(&self, file: &UploadedFile, kind: DocumentKind) -> DocumentJob {
        SqliteStore::new(self.store.database().clone())
            .create_job(NewDocumentJob {
                owner_id: "owner-1".to_string(),
                original_filename: file.original_filename.clone(),
                stored_filename: file.stored_filename.clone(),
                file_path: file.path.clone(),
                mime_type: file.mime_type.clone(),
                size_bytes: file.size_bytes,
                kind,
            })
            .expect("Failed to create job")
    }

    /// Backdates the job's claim past any orphan age.
    pub fn expire_claim(&self, job_id: &str) {
        self.store
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE document_jobs SET claimed_at = '2000-01-01T00:00:00.000Z'
                     WHERE id = ?1",
                    [job_id],
                )?;
                Ok(())
            })
            .expect("Failed to expire claim");
    }

    pub fn pipeline(&self, fakes: &Fakes) -> Pipeline {
        self.pipeline_with_stores(fakes, Arc::new(self.store.clone()), Arc::new(self.store.clone()))
    }

    pub fn pipeline_with_stores(
        &self,
        fakes: &Fakes,
        jobs: Arc<dyn JobStore>,
        transactions: Arc<dyn TransactionStore>,
    ) -> Pipeline {
        let ocr = OcrExtractor::new(fakes.ocr_engine.clone(), &self.config.ocr);
        let pdf = PdfExtractor::new(
            fakes.pdf_parser.clone(),
            fakes.renderer.clone(),
            ocr.clone(),
            &self.config.pdf,
        );
        let extractor = StructuredExtractor::new(fakes.generator.clone(), &self.config.ai);
        let materializer = Materializer::new(transactions, &self.config.materializer);
        Pipeline::new(ocr, pdf, extractor, materializer, jobs)
    }

    pub fn dispatcher(&self, fakes: &Fakes) -> Dispatcher {
        self.dispatcher_with_stores(fakes, Arc::new(self.store.clone()), Arc::new(self.store.clone()))
    }

    pub fn dispatcher_with_stores(
        &self,
        fakes: &Fakes,
        jobs: Arc<dyn JobStore>,
        transactions: Arc<dyn TransactionStore>,
    ) -> Dispatcher {
        let pipeline = self.pipeline_with_stores(fakes, jobs.clone(), transactions.clone());
        let pool = WorkerPool::start(
            Arc::new(pipeline),
            self.config.worker_count,
            self.config.queue_capacity,
        );
        Dispatcher::new(pool, jobs, transactions)
    }

    /// Polls until the job leaves `processing`.
    pub async fn wait_for_terminal(&self, job_id: &str) -> DocumentJob {
        let poll = async {
            loop {
                let job = self
                    .store
                    .find_job(job_id)
                    .expect("store read")
                    .expect("job exists");
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(30), poll)
            .await
            .expect("job never reached a terminal state")
    }
}
