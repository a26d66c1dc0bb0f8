use thiserror::Error;

use crate::classify::{Classify, ErrorCategory};
use crate::error::{AiError, OcrError, PdfError};
use crate::jobs::TransitionError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Text extraction failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("PDF extraction failed: {0}")]
    Pdf(#[from] PdfError),

    #[error("Structured extraction failed: {0}")]
    Ai(#[from] AiError),

    #[error("Could not record job state: {0}")]
    Transition(#[from] TransitionError),
}

impl Classify for PipelineError {
    fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Ocr(e) => e.category(),
            PipelineError::Pdf(e) => e.category(),
            PipelineError::Ai(e) => e.category(),
            PipelineError::Transition(_) => ErrorCategory::SystemError,
        }
    }
}
