//! In-process stand-ins for the OCR engine, PDF collaborators, text
//! generator and stores.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tallyscan::ai::TextGenerator;
use tallyscan::db::{DatabaseError, SqliteStore};
use tallyscan::error::{AiError, OcrError, PdfError};
use tallyscan::jobs::{
    DocumentJob, JobError, JobOutcome, JobStatus, JobStore, NewDocumentJob, TransactionStore,
};
use tallyscan::processor::{
    DocumentInfo, OcrEngine, OcrWorker, PageRenderer, ParsedPdf, PdfParser, RenderedPage,
};
use tallyscan::transaction::{NewTransaction, Transaction};

#[derive(Clone, Debug)]
pub enum OcrBehavior {
    Text(String),
    Fail(String),
    Hang,
    Panic,
}

#[derive(Default)]
pub struct OcrCounters {
    pub created: AtomicUsize,
    pub terminated: AtomicUsize,
}

impl OcrCounters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

pub struct FakeOcrEngine {
    pub behavior: OcrBehavior,
    pub counters: Arc<OcrCounters>,
}

struct FakeOcrWorker {
    behavior: OcrBehavior,
    counters: Arc<OcrCounters>,
}

#[async_trait]
impl OcrEngine for FakeOcrEngine {
    async fn create_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOcrWorker {
            behavior: self.behavior.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[async_trait]
impl OcrWorker for FakeOcrWorker {
    async fn recognize(&mut self, _image_path: &Path) -> Result<String, OcrError> {
        match &self.behavior {
            OcrBehavior::Text(text) => Ok(text.clone()),
            OcrBehavior::Fail(message) => Err(OcrError::Recognition(message.clone())),
            OcrBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(String::new())
            }
            OcrBehavior::Panic => panic!("ocr engine crashed"),
        }
    }

    async fn terminate(&mut self) {
        self.counters.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakePdfParser {
    pub text: Result<String, String>,
}

impl PdfParser for FakePdfParser {
    fn parse(&self, _bytes: &[u8]) -> Result<ParsedPdf, PdfError> {
        match &self.text {
            Ok(text) => Ok(ParsedPdf {
                text: text.clone(),
                page_count: 1,
                info: DocumentInfo::default(),
            }),
            Err(reason) => Err(PdfError::Parse(reason.clone())),
        }
    }
}

/// Writes `pages` placeholder PNGs large enough to pass image validation.
pub struct FakeRenderer {
    pub pages: u32,
    pub rendered: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, _pdf_path: &Path, out_dir: &Path) -> Result<Vec<RenderedPage>, PdfError> {
        let mut pages = Vec::new();
        for page_number in 1..=self.pages {
            let path = out_dir.join(format!("page-{}.png", page_number));
            std::fs::write(&path, vec![0u8; 512]).map_err(|e| PdfError::Render(e.to_string()))?;
            self.rendered.lock().unwrap().push(path.clone());
            pages.push(RenderedPage { page_number, path });
        }
        Ok(pages)
    }
}

#[derive(Clone, Debug)]
pub enum Reply {
    Text(String),
    Fail(String),
    Panic,
}

pub struct ScriptedGenerator {
    pub reply: Reply,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(message) => Err(AiError::AnalysisFailed(message.clone())),
            Reply::Panic => panic!("generator crashed"),
        }
    }
}

/// Job store that can be told to fail specific writes.
pub struct FlakyJobStore {
    pub inner: SqliteStore,
    pub fail_create: AtomicBool,
    pub fail_complete: AtomicBool,
}

impl FlakyJobStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_complete: AtomicBool::new(false),
        }
    }
}

impl JobStore for FlakyJobStore {
    fn create_job(&self, new: NewDocumentJob) -> Result<DocumentJob, DatabaseError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.create_job(new)
    }

    fn find_job(&self, id: &str) -> Result<Option<DocumentJob>, DatabaseError> {
        self.inner.find_job(id)
    }

    fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<DocumentJob>, DatabaseError> {
        self.inner.list_jobs_by_status(status)
    }

    fn mark_completed(&self, id: &str, outcome: &JobOutcome) -> Result<bool, DatabaseError> {
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.mark_completed(id, outcome)
    }

    fn mark_failed(&self, id: &str, error: &JobError) -> Result<bool, DatabaseError> {
        self.inner.mark_failed(id, error)
    }

    fn claim_orphan(&self, id: &str, stale_before: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.inner.claim_orphan(id, stale_before)
    }
}

/// Transaction store that rejects transactions with a given description.
pub struct RejectingTransactionStore {
    pub inner: SqliteStore,
    pub reject_description: String,
}

impl TransactionStore for RejectingTransactionStore {
    fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, DatabaseError> {
        if new.description == self.reject_description {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.create_transaction(new)
    }

    fn find_transaction(&self, id: &str) -> Result<Option<Transaction>, DatabaseError> {
        self.inner.find_transaction(id)
    }

    fn list_transactions_for_job(&self, job_id: &str) -> Result<Vec<Transaction>, DatabaseError> {
        self.inner.list_transactions_for_job(job_id)
    }

    fn delete_transaction(&self, id: &str) -> Result<bool, DatabaseError> {
        self.inner.delete_transaction(id)
    }

    fn delete_transactions_for_job(&self, job_id: &str) -> Result<usize, DatabaseError> {
        self.inner.delete_transactions_for_job(job_id)
    }
}
