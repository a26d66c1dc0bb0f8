//! Schema versioning.
//!
//! Applied versions are recorded in `_migrations`; each pending script runs
//! in its own transaction together with its bookkeeping row.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_document_jobs_table",
        sql: include_str!("sql/001_create_document_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "create_transactions_table",
        sql: include_str!("sql/002_create_transactions.sql"),
    },
    Migration {
        version: 3,
        description: "add_job_claims",
        sql: include_str!("sql/003_add_job_claims.sql"),
    },
];

pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        log::info!(
            "Applying schema v{} ({})",
            migration.version,
            migration.description
        );
        apply(conn, migration).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), rusqlite::Error> {
    // Rolled back on drop unless committed.
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        params![migration.version, migration.description],
    )?;
    tx.commit()
}
