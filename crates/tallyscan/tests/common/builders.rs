//! Builder for the fake collaborators a test pipeline runs against.

#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use super::fakes::{
    FakeOcrEngine, FakePdfParser, FakeRenderer, OcrBehavior, OcrCounters, Reply, ScriptedGenerator,
};

pub struct FakesBuilder {
    ocr: OcrBehavior,
    pdf_text: Result<String, String>,
    pages: u32,
    reply: Reply,
}

/// Built fakes, with handles the test can inspect afterwards.
pub struct Fakes {
    pub ocr_engine: Arc<FakeOcrEngine>,
    pub ocr_counters: Arc<OcrCounters>,
    pub pdf_parser: Arc<FakePdfParser>,
    pub renderer: Arc<FakeRenderer>,
    pub generator: Arc<ScriptedGenerator>,
}

impl FakesBuilder {
    pub fn new() -> Self {
        Self {
            ocr: OcrBehavior::Text("TOTAL 0.00".to_string()),
            pdf_text: Err("no text layer".to_string()),
            pages: 1,
            reply: Reply::Text("{}".to_string()),
        }
    }

    pub fn ocr_text(mut self, text: &str) -> Self {
        self.ocr = OcrBehavior::Text(text.to_string());
        self
    }

    pub fn ocr(mut self, behavior: OcrBehavior) -> Self {
        self.ocr = behavior;
        self
    }

    pub fn pdf_text(mut self, text: &str) -> Self {
        self.pdf_text = Ok(text.to_string());
        self
    }

    pub fn pdf_parse_error(mut self, reason: &str) -> Self {
        self.pdf_text = Err(reason.to_string());
        self
    }

    pub fn pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    pub fn reply(mut self, text: &str) -> Self {
        self.reply = Reply::Text(text.to_string());
        self
    }

    pub fn reply_with(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    /// A receipt reply with the given amount (JSON `null` when `None`) and confidence.
    pub fn receipt_reply(self, amount: Option<f64>, confidence: f64) -> Self {
        let amount = amount
            .map(|a| a.to_string())
            .unwrap_or_else(|| "null".to_string());
        let json = format!(
            r#"{{"amount": {}, "merchant": "Fresh Mart", "date": "2024-02-14", "category": "Groceries", "items": [], "confidence": {}}}"#,
            amount, confidence
        );
        self.reply(&json)
    }

    pub fn build(self) -> Fakes {
        let ocr_counters = Arc::new(OcrCounters::default());
        Fakes {
            ocr_engine: Arc::new(FakeOcrEngine {
                behavior: self.ocr,
                counters: Arc::clone(&ocr_counters),
            }),
            ocr_counters,
            pdf_parser: Arc::new(FakePdfParser {
                text: self.pdf_text,
            }),
            renderer: Arc::new(FakeRenderer {
                pages: self.pages,
                rendered: Mutex::new(Vec::new()),
            }),
            generator: Arc::new(ScriptedGenerator {
                reply: self.reply,
                calls: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for FakesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
