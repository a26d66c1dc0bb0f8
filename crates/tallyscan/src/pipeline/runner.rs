use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::ai::StructuredExtractor;
use crate::classify::{Classify, ErrorCategory};
use crate::jobs::{
    lifecycle, DocumentJob, DocumentKind, ExtractedData, JobOutcome, JobStatus, JobStore,
    StatementData, TransitionError,
};
use crate::materialize::Materializer;
use crate::processor::ocr::panic_message;
use crate::processor::{scan_line_items, OcrExtractor, PdfExtractor};
use crate::sanitize;

use super::error::PipelineError;

/// Extraction pipeline for a single document job.
///
/// Steps: extract text (OCR or PDF), structure it with the AI extractor,
/// materialize transactions, then write the terminal job state.
#[derive(Clone)]
pub struct Pipeline {
    ocr: OcrExtractor,
    pdf: PdfExtractor,
    extractor: StructuredExtractor,
    materializer: Materializer,
    jobs: Arc<dyn JobStore>,
}

impl Pipeline {
    pub fn new(
        ocr: OcrExtractor,
        pdf: PdfExtractor,
        extractor: StructuredExtractor,
        materializer: Materializer,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            ocr,
            pdf,
            extractor,
            materializer,
            jobs,
        }
    }

    /// Runs `job` and guarantees it leaves `processing`.
    ///
    /// If the pipeline panics or cannot record its own outcome, the job is
    /// force-failed with `SystemError`. A job that already reached a terminal
    /// state is left untouched. Returns the status the job ended in.
    pub async fn run_protected(&self, job: DocumentJob) -> JobStatus {
        let job_id = job.id.clone();
        let span = info_span!("pipeline",
            job_id = %job.id,
            kind = %job.kind,
            filename = %sanitize::redact_path(&job.file_path),
        );

        let outcome = AssertUnwindSafe(self.run(job))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(status)) => return status,
            Ok(Err(PipelineError::Transition(TransitionError::AlreadyTerminal { .. }))) => {
                debug!(job_id = %job_id, "job already terminal, leaving it as is");
                return self.current_status(&job_id);
            }
            Ok(Err(e)) => error!(
                job_id = %job_id,
                error = %e,
                "pipeline did not record a terminal state"
            ),
            Err(panic) => error!(
                job_id = %job_id,
                panic = %panic_message(panic.as_ref()),
                "pipeline panicked"
            ),
        }

        match lifecycle::fail(self.jobs.as_ref(), &job_id, ErrorCategory::SystemError) {
            Ok(()) => JobStatus::Failed,
            Err(TransitionError::AlreadyTerminal { .. }) => {
                debug!(job_id = %job_id, "job already terminal, leaving it as is");
                self.current_status(&job_id)
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to force-fail job");
                JobStatus::Processing
            }
        }
    }

    /// Runs the steps and writes `completed` or a classified `failed`.
    ///
    /// Errors only when the terminal write itself fails.
    pub async fn run(&self, job: DocumentJob) -> Result<JobStatus, PipelineError> {
        self.ensure_processing(&job.id)?;

        match self.execute(&job).await {
            Ok(outcome) => {
                if let Err(e) = lifecycle::complete(self.jobs.as_ref(), &job.id, &outcome) {
                    self.materializer.discard(&job.id, &outcome.transaction_ids());
                    return Err(e.into());
                }
                info!(
                    job_id = %job.id,
                    linked = outcome.linked_transaction_id.is_some(),
                    "job completed"
                );
                Ok(JobStatus::Completed)
            }
            Err(e) => {
                let category = e.category();
                warn!(job_id = %job.id, error = %e, category = %category, "job failed");
                lifecycle::fail(self.jobs.as_ref(), &job.id, category)?;
                Ok(JobStatus::Failed)
            }
        }
    }

    async fn execute(&self, job: &DocumentJob) -> Result<JobOutcome, PipelineError> {
        let text = self
            .step_extract_text(job)
            .instrument(info_span!("extract_text"))
            .await?;

        let extracted = self
            .step_structure(job.kind, &text)
            .instrument(info_span!("structure"))
            .await?;

        let (extracted_data, linked_transaction_id) = {
            let _step = info_span!("materialize").entered();
            self.materializer
                .clear_leftovers(job)
                .map_err(TransitionError::from)?;
            self.step_materialize(job, extracted, &text)
        };

        Ok(JobOutcome {
            ocr_text: Some(text),
            extracted_data,
            linked_transaction_id,
        })
    }

    async fn step_extract_text(&self, job: &DocumentJob) -> Result<String, PipelineError> {
        match job.kind {
            DocumentKind::Receipt | DocumentKind::ImageStatement => {
                Ok(self.ocr.extract_text(&job.file_path).await?)
            }
            DocumentKind::PdfStatement => {
                let extraction = self.pdf.extract(&job.file_path).await?;
                info!(
                    method = extraction.extraction_method.as_str(),
                    pages = extraction.page_count,
                    chars = extraction.text.chars().count(),
                    "pdf text extracted"
                );
                Ok(extraction.text)
            }
        }
    }

    async fn step_structure(
        &self,
        kind: DocumentKind,
        text: &str,
    ) -> Result<ExtractedData, PipelineError> {
        if text.trim().is_empty() {
            debug!("no text recognized, skipping structured extraction");
            return Ok(if kind.is_statement() {
                ExtractedData::Statement(StatementData::default())
            } else {
                ExtractedData::Receipt(crate::ai::ReceiptExtraction::empty())
            });
        }

        if !kind.is_statement() {
            let receipt = self.extractor.extract_receipt(text).await?;
            debug!(confidence = receipt.confidence, "receipt structured");
            return Ok(ExtractedData::Receipt(receipt));
        }

        let lines = self.extractor.extract_statement(text).await?;
        if lines.is_empty() {
            let candidates = scan_line_items(text).len();
            if candidates > 0 {
                warn!(
                    candidates,
                    "no statement lines extracted although the text contains line items"
                );
            }
        }
        Ok(ExtractedData::Statement(StatementData {
            lines,
            transaction_ids: Vec::new(),
        }))
    }

    fn step_materialize(
        &self,
        job: &DocumentJob,
        extracted: ExtractedData,
        text: &str,
    ) -> (ExtractedData, Option<String>) {
        match extracted {
            ExtractedData::Receipt(receipt) => {
                let linked = self
                    .materializer
                    .materialize_receipt(job, &receipt, text)
                    .map(|tx| tx.id);
                (ExtractedData::Receipt(receipt), linked)
            }
            ExtractedData::Statement(mut data) => {
                data.transaction_ids = self
                    .materializer
                    .materialize_statement(job, &data.lines)
                    .into_iter()
                    .map(|tx| tx.id)
                    .collect();
                (ExtractedData::Statement(data), None)
            }
        }
    }

    fn ensure_processing(&self, job_id: &str) -> Result<(), TransitionError> {
        match self.jobs.find_job(job_id)? {
            Some(job) if job.status == JobStatus::Processing => Ok(()),
            Some(_) => Err(TransitionError::AlreadyTerminal {
                job_id: job_id.to_string(),
            }),
            None => Err(TransitionError::NotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    fn current_status(&self, job_id: &str) -> JobStatus {
        match self.jobs.find_job(job_id) {
            Ok(Some(job)) => job.status,
            Ok(None) | Err(_) => JobStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use async_trait::async_trait;

    use super::*;
    use crate::ai::TextGenerator;
    use crate::config::Config;
    use crate::db::{Database, SqliteStore};
    use crate::error::{AiError, OcrError, PdfError};
    use crate::jobs::{NewDocumentJob, TransactionStore};
    use crate::processor::{
        DocumentInfo, OcrEngine, OcrWorker, PageRenderer, ParsedPdf, PdfParser, RenderedPage,
    };

    struct TextEngine(&'static str);
    struct TextWorker(&'static str);

    #[async_trait]
    impl OcrEngine for TextEngine {
        async fn create_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
            Ok(Box::new(TextWorker(self.0)))
        }
    }

    #[async_trait]
    impl OcrWorker for TextWorker {
        async fn recognize(&mut self, _image_path: &Path) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }

        async fn terminate(&mut self) {}
    }

    struct TextLayer(&'static str);

    impl PdfParser for TextLayer {
        fn parse(&self, _bytes: &[u8]) -> Result<ParsedPdf, PdfError> {
            Ok(ParsedPdf {
                text: self.0.to_string(),
                page_count: 1,
                info: DocumentInfo::default(),
            })
        }
    }

    struct NoPages;

    #[async_trait]
    impl PageRenderer for NoPages {
        async fn render(&self, _: &Path, _: &Path) -> Result<Vec<RenderedPage>, PdfError> {
            Err(PdfError::Render("renderer unavailable".to_string()))
        }
    }

    enum Reply {
        Text(&'static str),
        Fail,
        Panic,
    }

    struct ScriptedGenerator(Reply);

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            match self.0 {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(AiError::AnalysisFailed("401 Unauthorized".to_string())),
                Reply::Panic => panic!("generator bug"),
            }
        }
    }

    struct Harness {
        _dir: TempDir,
        store: SqliteStore,
        pipeline: Pipeline,
        image: std::path::PathBuf,
        pdf: std::path::PathBuf,
    }

    fn harness(ocr_text: &'static str, pdf_text: &'static str, reply: Reply) -> Harness {
        let dir = TempDir::new().unwrap();
        let image = dir.child("receipt.png");
        image.write_binary(&[0u8; 512]).unwrap();
        let pdf = dir.child("statement.pdf");
        pdf.write_binary(b"%PDF-1.4 placeholder").unwrap();

        let config = Config::default();
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        let ocr = OcrExtractor::new(Arc::new(TextEngine(ocr_text)), &config.ocr);
        let pdf_extractor = PdfExtractor::new(
            Arc::new(TextLayer(pdf_text)),
            Arc::new(NoPages),
            ocr.clone(),
            &config.pdf,
        );
        let extractor = StructuredExtractor::new(Arc::new(ScriptedGenerator(reply)), &config.ai);
        let materializer = Materializer::new(Arc::new(store.clone()), &config.materializer);
        let pipeline = Pipeline::new(
            ocr,
            pdf_extractor,
            extractor,
            materializer,
            Arc::new(store.clone()),
        );

        Harness {
            image: image.path().to_path_buf(),
            pdf: pdf.path().to_path_buf(),
            _dir: dir,
            store,
            pipeline,
        }
    }

    fn create_job(h: &Harness, kind: DocumentKind) -> DocumentJob {
        let (file_path, mime) = match kind {
            DocumentKind::PdfStatement => (h.pdf.clone(), "application/pdf"),
            _ => (h.image.clone(), "image/png"),
        };
        h.store
            .create_job(NewDocumentJob {
                owner_id: "owner-1".to_string(),
                original_filename: "upload".to_string(),
                stored_filename: "upload-stored".to_string(),
                file_path,
                mime_type: mime.to_string(),
                size_bytes: 512,
                kind,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_receipt_completes_with_link() {
        let h = harness(
            "FRESH MART\nTOTAL 42.75",
            "",
            Reply::Text(r#"{"amount": 42.75, "merchant": "Fresh Mart", "confidence": 0.92}"#),
        );
        let job = create_job(&h, DocumentKind::Receipt);

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Completed);

        let stored = h.store.find_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.ocr_text.as_deref(), Some("FRESH MART\nTOTAL 42.75"));
        let tx_id = stored.linked_transaction_id.unwrap();
        let tx = h.store.find_transaction(&tx_id).unwrap().unwrap();
        assert_eq!(tx.amount, 42.75);
        assert_eq!(tx.document_job_id.as_deref(), Some(job.id.as_str()));
    }

    #[tokio::test]
    async fn test_statement_pdf_records_transaction_ids() {
        let h = harness(
            "",
            "ACME BANK March 2024 statement\n2024-03-01 Salary 2500.00\n2024-03-02 Coffee 4.50",
            Reply::Text(
                r#"[{"date":"2024-03-01","description":"Salary","amount":2500,"type":"income"},
                    {"date":"2024-03-02","description":"Coffee","amount":4.5,"type":"expense"}]"#,
            ),
        );
        let job = create_job(&h, DocumentKind::PdfStatement);

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Completed);

        let stored = h.store.find_job(&job.id).unwrap().unwrap();
        assert!(stored.linked_transaction_id.is_none());
        match stored.extracted_data.unwrap() {
            ExtractedData::Statement(data) => {
                assert_eq!(data.lines.len(), 2);
                assert_eq!(data.transaction_ids.len(), 2);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(h.store.list_transactions_for_job(&job.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ai_failure_is_classified() {
        let h = harness("TOTAL 9.99", "", Reply::Fail);
        let job = create_job(&h, DocumentKind::Receipt);

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Failed);

        let error = h.store.find_job(&job.id).unwrap().unwrap().error.unwrap();
        assert_eq!(error.classified_type, ErrorCategory::AiAnalysisFailed);
        assert_eq!(error.message, ErrorCategory::AiAnalysisFailed.user_message());
    }

    #[tokio::test]
    async fn test_panic_becomes_system_error() {
        let h = harness("TOTAL 9.99", "", Reply::Panic);
        let job = create_job(&h, DocumentKind::Receipt);

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Failed);

        let stored = h.store.find_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.unwrap().classified_type, ErrorCategory::SystemError);
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_rewritten() {
        let h = harness(
            "TOTAL 9.99",
            "",
            Reply::Text(r#"{"amount": 9.99, "confidence": 0.5}"#),
        );
        let job = create_job(&h, DocumentKind::Receipt);

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Completed);
        // A second run cannot complete again and must not fail the job either.
        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Completed);

        let stored = h.store.find_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_rerun_replaces_leftover_transactions() {
        use crate::transaction::{
            NewTransaction, TransactionMetadata, TransactionSource, TransactionType,
        };

        let h = harness(
            "FRESH MART\nTOTAL 42.75",
            "",
            Reply::Text(r#"{"amount": 42.75, "merchant": "Fresh Mart", "confidence": 0.92}"#),
        );
        let job = create_job(&h, DocumentKind::Receipt);
        // Written by a run that died before completing the job.
        h.store
            .create_transaction(NewTransaction {
                owner_id: "owner-1".to_string(),
                amount: 42.75,
                transaction_type: TransactionType::Expense,
                category: "Groceries".to_string(),
                description: "Fresh Mart".to_string(),
                date: "2024-02-14".to_string(),
                source: TransactionSource::Receipt,
                metadata: TransactionMetadata::default(),
                document_job_id: Some(job.id.clone()),
            })
            .unwrap();

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Completed);

        let stored = h.store.find_job(&job.id).unwrap().unwrap();
        let transactions = h.store.list_transactions_for_job(&job.id).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(stored.linked_transaction_id, Some(transactions[0].id.clone()));
    }

    #[tokio::test]
    async fn test_blank_text_skips_ai() {
        let h = harness("", "", Reply::Panic);
        let job = create_job(&h, DocumentKind::Receipt);

        assert_eq!(h.pipeline.run_protected(job.clone()).await, JobStatus::Completed);
        let stored = h.store.find_job(&job.id).unwrap().unwrap();
        assert_eq!(
            stored.extracted_data,
            Some(ExtractedData::Receipt(crate::ai::ReceiptExtraction::empty()))
        );
    }
}
