use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ai::{ReceiptExtraction, StatementLine};
use crate::classify::ErrorCategory;
use crate::transaction::{Transaction, TransactionSource};

/// What kind of document an upload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Receipt,
    PdfStatement,
    ImageStatement,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Receipt => "receipt",
            DocumentKind::PdfStatement => "pdf_statement",
            DocumentKind::ImageStatement => "image_statement",
        }
    }

    pub fn is_statement(&self) -> bool {
        !matches!(self, DocumentKind::Receipt)
    }

    pub fn transaction_source(&self) -> TransactionSource {
        match self {
            DocumentKind::Receipt => TransactionSource::Receipt,
            DocumentKind::PdfStatement => TransactionSource::Pdf,
            DocumentKind::ImageStatement => TransactionSource::Image,
        }
    }

    /// Whether a file with this mime type can be processed as this kind.
    pub fn accepts_mime(&self, mime: &str) -> bool {
        let mime = mime.trim().to_ascii_lowercase();
        match self {
            DocumentKind::PdfStatement => mime == "application/pdf",
            DocumentKind::Receipt | DocumentKind::ImageStatement => matches!(
                mime.as_str(),
                "image/jpeg" | "image/jpg" | "image/png" | "image/gif" | "image/webp"
            ),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(DocumentKind::Receipt),
            "pdf_statement" => Ok(DocumentKind::PdfStatement),
            "image_statement" => Ok(DocumentKind::ImageStatement),
            other => Err(format!("unknown document kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Error recorded on a failed job. `message` is always the category's
/// user-facing sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub timestamp: String,
    pub classified_type: ErrorCategory,
}

impl JobError {
    pub fn from_category(category: ErrorCategory) -> Self {
        Self {
            message: category.user_message().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            classified_type: category,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementData {
    pub lines: Vec<StatementLine>,
    #[serde(default)]
    pub transaction_ids: Vec<String>,
}

/// Structured payload stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedData {
    Receipt(ReceiptExtraction),
    Statement(StatementData),
}

impl ExtractedData {
    /// Decodes a stored payload. The shape depends on the job kind.
    pub fn from_json(kind: DocumentKind, json: &str) -> Result<Self, serde_json::Error> {
        if kind.is_statement() {
            serde_json::from_str(json).map(ExtractedData::Statement)
        } else {
            serde_json::from_str(json).map(ExtractedData::Receipt)
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fields supplied by intake when a job is created.
#[derive(Debug, Clone)]
pub struct NewDocumentJob {
    pub owner_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    pub kind: DocumentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentJob {
    pub id: String,
    pub owner_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    pub kind: DocumentKind,
    pub status: JobStatus,
    pub ocr_text: Option<String>,
    pub extracted_data: Option<ExtractedData>,
    pub linked_transaction_id: Option<String>,
    pub error: Option<JobError>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentJob {
    /// A fresh job in `processing` with a new id.
    pub fn from_new(new: NewDocumentJob) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            original_filename: new.original_filename,
            stored_filename: new.stored_filename,
            file_path: new.file_path,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            kind: new.kind,
            status: JobStatus::Processing,
            ocr_text: None,
            extracted_data: None,
            linked_transaction_id: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Everything written by the completing transition.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub ocr_text: Option<String>,
    pub extracted_data: ExtractedData,
    pub linked_transaction_id: Option<String>,
}

impl JobOutcome {
    /// Transactions materialized for this outcome.
    pub fn transaction_ids(&self) -> Vec<&str> {
        match &self.extracted_data {
            ExtractedData::Statement(data) => {
                data.transaction_ids.iter().map(String::as_str).collect()
            }
            ExtractedData::Receipt(_) => self.linked_transaction_id.as_deref().into_iter().collect(),
        }
    }
}

/// What an owner sees when polling a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub extracted_data: Option<ExtractedData>,
    pub transaction: Option<Transaction>,
    pub error: Option<JobError>,
}
