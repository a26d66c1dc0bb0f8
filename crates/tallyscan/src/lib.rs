pub mod ai;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod jobs;
pub mod logging;
pub mod materialize;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod transaction;
pub mod worker;

pub use ai::{HttpGenerator, ReceiptExtraction, StatementLine, StructuredExtractor, TextGenerator};
pub use classify::{Classify, ErrorCategory};
pub use config::{load_config, Config};
pub use db::{Database, SqliteStore};
pub use error::{AiError, ConfigError, OcrError, PdfError, Result, TallyError, WorkerError};
pub use intake::{validate_upload, Dispatcher, IntakeError, UploadedFile};
pub use jobs::{DocumentJob, DocumentKind, JobStatus, JobStatusView, JobStore, TransactionStore};
pub use materialize::Materializer;
pub use pipeline::{Pipeline, PipelineError};
pub use processor::{OcrExtractor, PdfExtractor};
pub use transaction::{Transaction, TransactionSource, TransactionType};
pub use worker::WorkerPool;
