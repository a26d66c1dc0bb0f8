//! Stand-in engine used when the `tesseract` feature is disabled.
//!
//! Building without Tesseract avoids linking leptonica/tesseract on hosts
//! where they are not installed. Every worker request fails with
//! `EngineInitialization`, which surfaces as a `WorkerError` on the job.

use async_trait::async_trait;

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::processor::ocr::{OcrEngine, OcrWorker};

pub struct TesseractEngine;

impl TesseractEngine {
    pub fn new(_config: &OcrConfig) -> Self {
        Self
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn create_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
        Err(OcrError::EngineInitialization(
            "OCR support not compiled in; rebuild with --features tesseract".to_string(),
        ))
    }
}
