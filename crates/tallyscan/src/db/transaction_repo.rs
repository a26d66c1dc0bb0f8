//! Transaction repository: reads and writes for the `transactions` table.

use rusqlite::{params, OptionalExtension, Row};

use crate::transaction::{Transaction, TransactionMetadata};

use super::{Database, DatabaseError};

struct TransactionRow {
    id: String,
    owner_id: String,
    amount: f64,
    transaction_type: String,
    category: String,
    description: String,
    date: String,
    source: String,
    metadata: Option<String>,
    document_job_id: Option<String>,
    created_at: String,
}

impl TransactionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            amount: row.get("amount")?,
            transaction_type: row.get("type")?,
            category: row.get("category")?,
            description: row.get("description")?,
            date: row.get("date")?,
            source: row.get("source")?,
            metadata: row.get("metadata")?,
            document_job_id: row.get("document_job_id")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_transaction(self) -> Result<Transaction, DatabaseError> {
        let metadata = match self.metadata.as_deref() {
            Some(json) => {
                serde_json::from_str::<TransactionMetadata>(json).map_err(|e| {
                    DatabaseError::Decode {
                        column: "metadata",
                        reason: e.to_string(),
                    }
                })?
            }
            None => TransactionMetadata::default(),
        };
        Ok(Transaction {
            id: self.id,
            owner_id: self.owner_id,
            amount: self.amount,
            transaction_type: self.transaction_type.parse().map_err(|reason| {
                DatabaseError::Decode {
                    column: "type",
                    reason,
                }
            })?,
            category: self.category,
            description: self.description,
            date: self.date,
            source: self
                .source
                .parse()
                .map_err(|reason| DatabaseError::Decode {
                    column: "source",
                    reason,
                })?,
            metadata,
            document_job_id: self.document_job_id,
            created_at: self.created_at,
        })
    }
}

pub fn insert(db: &Database, tx: &Transaction) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&tx.metadata)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO transactions (id, owner_id, amount, type, category, description,
             date, source, metadata, document_job_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                tx.id,
                tx.owner_id,
                tx.amount,
                tx.transaction_type.as_str(),
                tx.category,
                tx.description,
                tx.date,
                tx.source.as_str(),
                metadata,
                tx.document_job_id,
                tx.created_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Transaction>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM transactions WHERE id = ?1",
                params![id],
                TransactionRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(TransactionRow::into_transaction).transpose()
}

/// Transactions materialized from one document job, in insertion order.
pub fn list_by_document_job(
    db: &Database,
    job_id: &str,
) -> Result<Vec<Transaction>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM transactions WHERE document_job_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], TransactionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter()
        .map(TransactionRow::into_transaction)
        .collect()
}

pub fn delete_by_id(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute("DELETE FROM transactions WHERE id = ?1", params![id])? == 1)
    })
}

/// Removes every transaction materialized from `job_id`.
pub fn delete_by_document_job(db: &Database, job_id: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM transactions WHERE document_job_id = ?1",
            params![job_id],
        )?)
    })
}
