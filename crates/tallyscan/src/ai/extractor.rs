//! Structured extraction on top of a `TextGenerator`.
//!
//! The model output is parsed leniently. A reply that cannot be parsed
//! degrades to an empty, zero-confidence result; only a failure of the
//! generator call itself is an error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::ai::client::TextGenerator;
use crate::ai::prompts;
use crate::config::AiConfig;
use crate::error::AiError;
use crate::sanitize::preview;
use crate::transaction::TransactionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub name: String,
    #[serde(default = "one", deserialize_with = "de_number_or")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "de_number_or")]
    pub price: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    #[serde(default, deserialize_with = "de_optional_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Reported by the model as-is.
    #[serde(default, deserialize_with = "de_number_or")]
    pub confidence: f64,
}

impl ReceiptExtraction {
    /// Result used when the model reply is unusable.
    pub fn empty() -> Self {
        Self {
            amount: None,
            merchant: None,
            date: None,
            category: Some("Other".to_string()),
            items: Vec::new(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub date: String,
    pub description: String,
    /// Always non-negative; the direction is carried by `transaction_type`.
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub category: Option<String>,
}

/// Loose shape of one statement element as the model returns it.
#[derive(Deserialize)]
struct RawStatementLine {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    amount: Option<NumberOrText>,
    #[serde(default, rename = "type")]
    transaction_type: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl RawStatementLine {
    fn into_line(self) -> Option<StatementLine> {
        let amount = self.amount.and_then(NumberOrText::into_f64)?;
        let description = self.description.filter(|d| !d.trim().is_empty())?;
        let date = self.date.unwrap_or_default();

        // Missing or unknown type falls back to the sign of the amount.
        let transaction_type = self
            .transaction_type
            .and_then(|t| t.parse::<TransactionType>().ok())
            .unwrap_or(if amount < 0.0 {
                TransactionType::Expense
            } else {
                TransactionType::Income
            });

        Some(StatementLine {
            date,
            description: description.trim().to_string(),
            amount: amount.abs(),
            transaction_type,
            category: self.category,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    fn into_f64(self) -> Option<f64> {
        match self {
            NumberOrText::Number(n) => Some(n),
            NumberOrText::Text(s) => parse_amount(&s),
        }
    }
}

fn de_optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<NumberOrText> = Option::deserialize(deserializer)?;
    Ok(value.and_then(NumberOrText::into_f64))
}

fn de_number_or<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<NumberOrText> = Option::deserialize(deserializer)?;
    Ok(value.and_then(NumberOrText::into_f64).unwrap_or(0.0))
}

/// Parses amounts like `"$1,234.50"`, `"-12"` or `"(8.00)"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value.abs() } else { value })
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Finds the first balanced `open`..`close` span, skipping delimiters that
/// appear inside JSON strings.
fn extract_json(response: &str, open: char, close: char) -> Option<&str> {
    let start = response.find(open)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a receipt reply, falling back to `ReceiptExtraction::empty()`.
pub fn parse_receipt(response: &str) -> ReceiptExtraction {
    let body = strip_code_fences(response);
    let parsed = serde_json::from_str::<ReceiptExtraction>(body).or_else(|e| {
        extract_json(body, '{', '}')
            .ok_or(e)
            .and_then(|json| serde_json::from_str::<ReceiptExtraction>(json))
    });

    match parsed {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!(error = %e, reply = %preview(response, 120), "unparseable receipt reply");
            ReceiptExtraction::empty()
        }
    }
}

/// Parses a statement reply. Elements missing an amount or description are
/// dropped; an unparseable reply yields no lines.
pub fn parse_statement(response: &str) -> Vec<StatementLine> {
    let body = strip_code_fences(response);
    let parsed = serde_json::from_str::<Vec<serde_json::Value>>(body).or_else(|e| {
        extract_json(body, '[', ']')
            .ok_or(e)
            .and_then(|json| serde_json::from_str::<Vec<serde_json::Value>>(json))
    });

    let values = match parsed {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, reply = %preview(response, 120), "unparseable statement reply");
            return Vec::new();
        }
    };

    let total = values.len();
    let lines: Vec<StatementLine> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawStatementLine>(v).ok())
        .filter_map(RawStatementLine::into_line)
        .collect();

    if lines.len() < total {
        debug!(kept = lines.len(), total, "dropped incomplete statement lines");
    }
    lines
}

/// Turns document text into structured data via the configured generator.
#[derive(Clone)]
pub struct StructuredExtractor {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    max_prompt_chars: usize,
}

impl StructuredExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &AiConfig) -> Self {
        Self {
            generator,
            timeout: Duration::from_secs(config.timeout_secs),
            max_prompt_chars: config.max_prompt_chars,
        }
    }

    pub async fn extract_receipt(&self, text: &str) -> Result<ReceiptExtraction, AiError> {
        let prompt = prompts::receipt_prompt(text, self.max_prompt_chars);
        let response = self.generate(&prompt).await?;
        Ok(parse_receipt(&response))
    }

    pub async fn extract_statement(&self, text: &str) -> Result<Vec<StatementLine>, AiError> {
        let prompt = prompts::statement_prompt(text, self.max_prompt_chars);
        let response = self.generate(&prompt).await?;
        Ok(parse_statement(&response))
    }

    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        tokio::time::timeout(self.timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| AiError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}
