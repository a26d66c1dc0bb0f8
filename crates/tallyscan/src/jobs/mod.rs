pub mod lifecycle;
pub mod model;
pub mod store;

pub use lifecycle::TransitionError;
pub use model::{
    DocumentJob, DocumentKind, ExtractedData, JobError, JobOutcome, JobStatus, JobStatusView,
    NewDocumentJob, StatementData,
};
pub use store::{JobStore, TransactionStore};
