use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Intake error: {0}")]
    Intake(#[from] crate::intake::IntakeError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Environment variable '{name}' is not set")]
    MissingSecret { name: String },
}

/// Failures of a single OCR call. Each variant is a stable kind.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Image file not found: '{0}'")]
    FileNotFound(PathBuf),

    #[error("Image file '{path}' is too large ({size} bytes, limit {max} bytes)")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("Image file '{path}' is too small ({size} bytes, minimum {min} bytes)")]
    FileTooSmall { path: PathBuf, size: u64, min: u64 },

    #[error("Unsupported image format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to initialize OCR engine: {0}")]
    EngineInitialization(String),

    #[error("Image data could not be decoded: {0}")]
    CorruptImage(String),

    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("Text recognition timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("OCR worker configuration error: {0}")]
    Configuration(String),
}

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF file not found: '{0}'")]
    FileNotFound(PathBuf),

    #[error("Failed to read PDF '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse PDF text layer: {0}")]
    Parse(String),

    #[error("Failed to render PDF pages: {0}")]
    Render(String),

    /// The page renderer could not be started at all.
    #[error("Failed to run '{binary}': {source}. Make sure poppler-utils is installed.")]
    RendererUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Every OCR page failed. Carries the last page's error.
    #[error("OCR failed on every rendered page: {0}")]
    PageOcr(#[source] OcrError),

    /// Terminal failure after the OCR fallback retry.
    #[error("PDF text extraction failed for '{path}': {source}")]
    ExtractionFailed {
        path: PathBuf,
        #[source]
        source: Box<PdfError>,
    },
}

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("AI analysis timed out after {secs} seconds")]
    Timeout { secs: u64 },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Job queue is full ({capacity} pending jobs)")]
    QueueFull { capacity: usize },

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, TallyError>;
