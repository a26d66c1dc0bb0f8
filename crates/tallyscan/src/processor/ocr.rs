//! OCR text extraction for receipt and statement images.
//!
//! Every call validates the file, creates a private recognition worker,
//! races recognition against a timer and terminates the worker before
//! returning, whatever the outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use regex::Regex;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::sanitize;

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Characters kept by [`clean_text`]: word characters, whitespace and a
/// small set of punctuation that shows up in amounts and dates.
static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s$.,\-:()/]").expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Creates recognition workers. One worker serves exactly one call.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn create_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError>;
}

#[async_trait]
pub trait OcrWorker: Send {
    async fn recognize(&mut self, image_path: &Path) -> Result<String, OcrError>;

    /// Releases the worker's resources. Called exactly once per worker.
    async fn terminate(&mut self);
}

#[derive(Clone)]
pub struct OcrExtractor {
    inner: Arc<OcrExtractorInner>,
}

struct OcrExtractorInner {
    engine: Arc<dyn OcrEngine>,
    timeout: Duration,
    min_file_bytes: u64,
    max_file_bytes: u64,
}

impl OcrExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self {
            inner: Arc::new(OcrExtractorInner {
                engine,
                timeout: Duration::from_secs(config.timeout_secs),
                min_file_bytes: config.min_file_bytes,
                max_file_bytes: config.max_file_bytes,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Recognizes the text of an image and returns it cleaned.
    pub async fn extract_text(&self, image_path: &Path) -> Result<String, OcrError> {
        let span = info_span!("processor.ocr", file = %sanitize::redact_path(image_path));
        async {
            self.validate_image(image_path).await?;
            let raw = self.recognize(image_path).await?;
            let cleaned = clean_text(&raw);
            debug!(
                raw_chars = raw.chars().count(),
                cleaned_chars = cleaned.chars().count(),
                "ocr finished"
            );
            Ok(cleaned)
        }
        .instrument(span)
        .await
    }

    /// Checks, in order: existence, size bounds, extension.
    pub async fn validate_image(&self, image_path: &Path) -> Result<(), OcrError> {
        let metadata = match tokio::fs::metadata(image_path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(OcrError::FileNotFound(image_path.to_path_buf())),
        };

        let size = metadata.len();
        if size <= self.inner.min_file_bytes {
            return Err(OcrError::FileTooSmall {
                path: image_path.to_path_buf(),
                size,
                min: self.inner.min_file_bytes,
            });
        }
        if size >= self.inner.max_file_bytes {
            return Err(OcrError::FileTooLarge {
                path: image_path.to_path_buf(),
                size,
                max: self.inner.max_file_bytes,
            });
        }

        let extension = image_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(OcrError::UnsupportedFormat(extension));
        }

        Ok(())
    }

    async fn recognize(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut worker = self.inner.engine.create_worker().await?;

        let outcome = tokio::time::timeout(
            self.inner.timeout,
            AssertUnwindSafe(worker.recognize(image_path)).catch_unwind(),
        )
        .await;

        worker.terminate().await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!(%message, "ocr worker panicked");
                Err(OcrError::Recognition(message))
            }
            Err(_) => {
                warn!(timeout_secs = self.inner.timeout.as_secs(), "ocr timed out");
                Err(OcrError::Timeout {
                    secs: self.inner.timeout.as_secs(),
                })
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Normalizes OCR output line by line. Idempotent.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .filter_map(|line| {
            let stripped = DISALLOWED_CHARS.replace_all(line, "");
            let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
            let trimmed = collapsed.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
