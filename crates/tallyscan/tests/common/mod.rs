//! Shared test utilities for tallyscan integration tests.
//!
//! - `TestHarness` for an isolated store, upload directory and wiring
//! - `FakesBuilder` for the OCR, PDF and AI collaborators
//! - fake stores that fail on demand

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
