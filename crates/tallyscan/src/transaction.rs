//! Persisted financial transactions produced from documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ai::LineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Where a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    Manual,
    Receipt,
    Pdf,
    Image,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Manual => "manual",
            TransactionSource::Receipt => "receipt",
            TransactionSource::Pdf => "pdf",
            TransactionSource::Image => "image",
        }
    }
}

impl FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TransactionSource::Manual),
            "receipt" => Ok(TransactionSource::Receipt),
            "pdf" => Ok(TransactionSource::Pdf),
            "image" => Ok(TransactionSource::Image),
            other => Err(format!("unknown transaction source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LineItem>,
}

/// A transaction that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub owner_id: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub category: String,
    pub description: String,
    /// Calendar date as `YYYY-MM-DD`.
    pub date: String,
    pub source: TransactionSource,
    pub metadata: TransactionMetadata,
    pub document_job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub owner_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub category: String,
    pub description: String,
    pub date: String,
    pub source: TransactionSource,
    pub metadata: TransactionMetadata,
    pub document_job_id: Option<String>,
    pub created_at: String,
}

impl Transaction {
    /// Assigns an id and creation timestamp to a new transaction.
    pub fn from_new(new: NewTransaction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            amount: new.amount,
            transaction_type: new.transaction_type,
            category: new.category,
            description: new.description,
            date: new.date,
            source: new.source,
            metadata: new.metadata,
            document_job_id: new.document_job_id,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
