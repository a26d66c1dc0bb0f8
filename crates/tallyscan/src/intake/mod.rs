//! Document intake: upload checks, job creation and dispatch.

pub mod dispatcher;
pub mod error;
pub mod upload;

pub use dispatcher::{job_status_view, Dispatcher, RecoveryReport, DEFAULT_ORPHAN_AFTER_SECS};
pub use error::IntakeError;
pub use upload::{validate_upload, UploadGuard, UploadedFile};
