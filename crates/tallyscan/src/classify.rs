//! Error classification.
//!
//! Every failure that can end a document job is mapped to an
//! [`ErrorCategory`]. Only the category (and its user-facing sentence) is
//! persisted; raw engine messages stay in the logs.
//!
//! Typed errors report their category through [`Classify`]. Opaque strings
//! coming back from third-party engines go through [`classify_message`], a
//! fixed-priority keyword table where the first matching rule wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;
use crate::error::{AiError, OcrError, PdfError, WorkerError};

/// Stable, user-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    ConfigurationError,
    CorruptedOrUnsupportedImage,
    #[serde(rename = "AIAnalysisFailed")]
    AiAnalysisFailed,
    FileNotFound,
    FileTooLarge,
    Timeout,
    WorkerError,
    GenericProcessingError,
    /// Written by the outer protective handler when the pipeline could not
    /// record a terminal state itself.
    SystemError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ConfigurationError => "ConfigurationError",
            ErrorCategory::CorruptedOrUnsupportedImage => "CorruptedOrUnsupportedImage",
            ErrorCategory::AiAnalysisFailed => "AIAnalysisFailed",
            ErrorCategory::FileNotFound => "FileNotFound",
            ErrorCategory::FileTooLarge => "FileTooLarge",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::WorkerError => "WorkerError",
            ErrorCategory::GenericProcessingError => "GenericProcessingError",
            ErrorCategory::SystemError => "SystemError",
        }
    }

    /// Human-readable sentence shown to the document owner.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::ConfigurationError => {
                "The document processor is misconfigured. Please try again later."
            }
            ErrorCategory::CorruptedOrUnsupportedImage => {
                "The image appears to be corrupted or in an unsupported format. Please upload a clear JPG, PNG, GIF or WebP image."
            }
            ErrorCategory::AiAnalysisFailed => {
                "We could not analyze the document text. Please try again later."
            }
            ErrorCategory::FileNotFound => {
                "The uploaded file could not be found. Please upload it again."
            }
            ErrorCategory::FileTooLarge => {
                "The file is too large to process. Please upload a file under 10 MB."
            }
            ErrorCategory::Timeout => {
                "Processing took too long and was stopped. Please try again with a clearer or smaller document."
            }
            ErrorCategory::WorkerError => {
                "The text recognition engine failed to start. Please try again later."
            }
            ErrorCategory::GenericProcessingError => {
                "The document could not be processed. Please try again or enter the details manually."
            }
            ErrorCategory::SystemError => {
                "An unexpected system error occurred while processing the document."
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ConfigurationError" => Ok(ErrorCategory::ConfigurationError),
            "CorruptedOrUnsupportedImage" => Ok(ErrorCategory::CorruptedOrUnsupportedImage),
            "AIAnalysisFailed" => Ok(ErrorCategory::AiAnalysisFailed),
            "FileNotFound" => Ok(ErrorCategory::FileNotFound),
            "FileTooLarge" => Ok(ErrorCategory::FileTooLarge),
            "Timeout" => Ok(ErrorCategory::Timeout),
            "WorkerError" => Ok(ErrorCategory::WorkerError),
            "GenericProcessingError" => Ok(ErrorCategory::GenericProcessingError),
            "SystemError" => Ok(ErrorCategory::SystemError),
            other => Err(format!("unknown error category '{}'", other)),
        }
    }
}

/// Implemented by errors that know their own category at the point of failure.
pub trait Classify {
    fn category(&self) -> ErrorCategory;
}

/// Keyword rules in priority order. Matching is case-insensitive.
const KEYWORD_RULES: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::ConfigurationError,
        &["datacloneerror", "could not be cloned", "configuration"],
    ),
    (
        ErrorCategory::CorruptedOrUnsupportedImage,
        &[
            "corrupt",
            "unsupported image",
            "unsupported format",
            "invalid image",
            "premature end",
            "could not be decoded",
        ],
    ),
    (
        ErrorCategory::AiAnalysisFailed,
        &["ai analysis", "generate content", "quota", "api key"],
    ),
    (
        ErrorCategory::FileNotFound,
        &["not found", "no such file", "enoent"],
    ),
    (ErrorCategory::FileTooLarge, &["too large", "file size"]),
    (ErrorCategory::Timeout, &["timed out", "timeout"]),
    (ErrorCategory::WorkerError, &["worker", "tesseract"]),
];

/// Maps a free-text failure message to a category. First match wins;
/// anything unrecognised is a [`ErrorCategory::GenericProcessingError`].
pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::GenericProcessingError)
}

impl Classify for OcrError {
    fn category(&self) -> ErrorCategory {
        match self {
            OcrError::FileNotFound(_) => ErrorCategory::FileNotFound,
            OcrError::FileTooLarge { .. } => ErrorCategory::FileTooLarge,
            OcrError::FileTooSmall { .. }
            | OcrError::UnsupportedFormat(_)
            | OcrError::CorruptImage(_) => ErrorCategory::CorruptedOrUnsupportedImage,
            OcrError::EngineInitialization(_) => ErrorCategory::WorkerError,
            OcrError::Recognition(detail) => classify_message(detail),
            OcrError::Timeout { .. } => ErrorCategory::Timeout,
            OcrError::Configuration(_) => ErrorCategory::ConfigurationError,
        }
    }
}

impl Classify for PdfError {
    fn category(&self) -> ErrorCategory {
        match self {
            PdfError::FileNotFound(_) => ErrorCategory::FileNotFound,
            PdfError::ReadDocument { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                ErrorCategory::FileNotFound
            }
            PdfError::ReadDocument { .. } => ErrorCategory::GenericProcessingError,
            PdfError::Parse(_) | PdfError::Render(_) => ErrorCategory::GenericProcessingError,
            PdfError::RendererUnavailable { .. } => ErrorCategory::ConfigurationError,
            PdfError::PageOcr(source) => source.category(),
            PdfError::ExtractionFailed { source, .. } => source.category(),
        }
    }
}

impl Classify for AiError {
    fn category(&self) -> ErrorCategory {
        match self {
            AiError::AnalysisFailed(_) => ErrorCategory::AiAnalysisFailed,
            AiError::Timeout { .. } => ErrorCategory::Timeout,
        }
    }
}

impl Classify for WorkerError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::WorkerError
    }
}

impl Classify for DatabaseError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::SystemError
    }
}
