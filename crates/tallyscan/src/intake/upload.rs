//! Uploaded files and their pre-submission checks.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::schema::MAX_UPLOAD_BYTES;
use crate::jobs::DocumentKind;
use crate::sanitize;

use super::error::IntakeError;

/// A file already written to disk by the upload layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub original_filename: String,
    pub stored_filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl UploadedFile {
    /// Describes a stored file, taking size from disk and the mime type from
    /// the original file name's extension.
    pub fn from_path(path: &Path, original_filename: &str) -> Result<Self, IntakeError> {
        let metadata = fs::metadata(path).map_err(|source| IntakeError::UploadRead {
            path: sanitize::redact_path(path),
            source,
        })?;

        let mime_type = mime_guess::from_path(original_filename)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let stored_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| original_filename.to_string());

        Ok(Self {
            path: path.to_path_buf(),
            original_filename: original_filename.to_string(),
            stored_filename,
            mime_type,
            size_bytes: metadata.len(),
        })
    }
}

/// Upload check run by the caller before submitting: non-empty, at most
/// 10 MB, and a mime type that matches the document kind.
pub fn validate_upload(file: &UploadedFile, kind: DocumentKind) -> Result<(), IntakeError> {
    if file.size_bytes == 0 {
        return Err(IntakeError::invalid("file is empty"));
    }
    if file.size_bytes > MAX_UPLOAD_BYTES {
        return Err(IntakeError::invalid(format!(
            "file is {} bytes, the limit is {} bytes",
            file.size_bytes, MAX_UPLOAD_BYTES
        )));
    }
    if !kind.accepts_mime(&file.mime_type) {
        return Err(IntakeError::invalid(format!(
            "{} is not accepted for {}",
            file.mime_type, kind
        )));
    }
    Ok(())
}

/// Deletes the uploaded file on drop unless disarmed.
pub struct UploadGuard {
    path: Option<PathBuf>,
}

impl UploadGuard {
    pub fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    /// Keeps the file; ownership has passed to a job.
    pub fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!(file = %sanitize::redact_path(&path), "removed rejected upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                file = %sanitize::redact_path(&path),
                error = %e,
                "failed to remove rejected upload"
            ),
        }
    }
}
