//! Turns extraction results into persisted transactions.
//!
//! Receipts are gated on the model's confidence; statement lines are
//! created one by one and a failing line never stops the rest.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::{ReceiptExtraction, StatementLine};
use crate::config::MaterializerConfig;
use crate::db::DatabaseError;
use crate::jobs::{DocumentJob, TransactionStore};
use crate::processor::patterns::normalize_date;
use crate::transaction::{NewTransaction, Transaction, TransactionMetadata, TransactionType};

const FALLBACK_CATEGORY: &str = "Other";

#[derive(Clone)]
pub struct Materializer {
    transactions: Arc<dyn TransactionStore>,
    confidence_threshold: f64,
}

impl Materializer {
    pub fn new(transactions: Arc<dyn TransactionStore>, config: &MaterializerConfig) -> Self {
        Self {
            transactions,
            confidence_threshold: config.confidence_threshold,
        }
    }

    /// Strictly above the threshold and with an amount.
    pub fn passes_gate(&self, receipt: &ReceiptExtraction) -> bool {
        receipt.amount.is_some() && receipt.confidence > self.confidence_threshold
    }

    /// Creates the receipt's expense transaction when the gate passes.
    ///
    /// Returns `None` when gated out or when the store rejects the write; in
    /// both cases the job still completes, just without a linked transaction.
    pub fn materialize_receipt(
        &self,
        job: &DocumentJob,
        receipt: &ReceiptExtraction,
        ocr_text: &str,
    ) -> Option<Transaction> {
        if !self.passes_gate(receipt) {
            debug!(
                job_id = %job.id,
                confidence = receipt.confidence,
                has_amount = receipt.amount.is_some(),
                "receipt left for manual confirmation"
            );
            return None;
        }
        let amount = receipt.amount?;

        let new = NewTransaction {
            owner_id: job.owner_id.clone(),
            amount: amount.abs(),
            transaction_type: TransactionType::Expense,
            category: category_or_fallback(receipt.category.as_deref()),
            description: receipt
                .merchant
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Receipt".to_string()),
            date: transaction_date(receipt.date.as_deref()),
            source: job.kind.transaction_source(),
            metadata: TransactionMetadata {
                confidence: Some(receipt.confidence),
                original_text: Some(ocr_text.to_string()),
                merchant: receipt.merchant.clone(),
                items: receipt.items.clone(),
            },
            document_job_id: Some(job.id.clone()),
        };

        match self.transactions.create_transaction(new) {
            Ok(tx) => {
                info!(job_id = %job.id, transaction_id = %tx.id, "receipt transaction created");
                Some(tx)
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "failed to create receipt transaction");
                None
            }
        }
    }

    /// Removes transactions an interrupted earlier run left on `job`.
    pub fn clear_leftovers(&self, job: &DocumentJob) -> Result<(), DatabaseError> {
        let removed = self.transactions.delete_transactions_for_job(&job.id)?;
        if removed > 0 {
            warn!(job_id = %job.id, removed, "removed transactions of an earlier run");
        }
        Ok(())
    }

    /// Rolls back transactions created for a job that did not complete.
    pub fn discard(&self, job_id: &str, transaction_ids: &[&str]) {
        for id in transaction_ids {
            if let Err(e) = self.transactions.delete_transaction(id) {
                warn!(job_id, transaction_id = %id, error = %e, "failed to roll back transaction");
            }
        }
        if !transaction_ids.is_empty() {
            info!(job_id, count = transaction_ids.len(), "rolled back transactions");
        }
    }

    /// Attempts one transaction per line, skipping lines the store rejects.
    pub fn materialize_statement(
        &self,
        job: &DocumentJob,
        lines: &[StatementLine],
    ) -> Vec<Transaction> {
        let mut created = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let new = NewTransaction {
                owner_id: job.owner_id.clone(),
                amount: line.amount.abs(),
                transaction_type: line.transaction_type,
                category: category_or_fallback(line.category.as_deref()),
                description: line.description.clone(),
                date: transaction_date(Some(&line.date)),
                source: job.kind.transaction_source(),
                metadata: TransactionMetadata::default(),
                document_job_id: Some(job.id.clone()),
            };

            match self.transactions.create_transaction(new) {
                Ok(tx) => created.push(tx),
                Err(e) => warn!(
                    job_id = %job.id,
                    line = index + 1,
                    error = %e,
                    "skipping statement line"
                ),
            }
        }

        info!(
            job_id = %job.id,
            created = created.len(),
            total = lines.len(),
            "statement transactions created"
        );
        created
    }
}

fn category_or_fallback(category: Option<&str>) -> String {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(FALLBACK_CATEGORY)
        .to_string()
}

/// Normalized `YYYY-MM-DD`, today when the date is missing or unreadable.
fn transaction_date(raw: Option<&str>) -> String {
    raw.and_then(normalize_date)
        .unwrap_or_else(|| chrono::Local::now().date_naive().format("%Y-%m-%d").to_string())
}
