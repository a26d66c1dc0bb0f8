//! AI-backed structured extraction.
//!
//! A `TextGenerator` turns a prompt into raw text; `StructuredExtractor`
//! owns prompting and tolerant parsing of the reply.

pub mod client;
pub mod extractor;
pub mod prompts;

pub use client::{HttpGenerator, TextGenerator};
pub use extractor::{
    parse_amount, parse_receipt, parse_statement, LineItem, ReceiptExtraction, StatementLine,
    StructuredExtractor,
};
