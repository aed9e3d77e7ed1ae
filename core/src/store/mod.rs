//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The pipeline hands over a finished `PipelineOutput`; nothing in the
//! computation stages executes SQL.

mod metrics;
mod publish;

use crate::error::PipelineResult;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

/// Text layout of every persisted timestamp.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn datetime_text(ts: NaiveDateTime) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

pub struct PipelineStore {
    conn: Connection,
}

impl PipelineStore {
    /// Open (or create) the pipeline database at `path`.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is ignored for :memory:, so a failure here is not fatal.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, version: &str) -> PipelineResult<()> {
        let started_at = datetime_text(chrono::Utc::now().naive_utc());
        self.conn.execute(
            "INSERT INTO run (run_id, version, started_at) VALUES (?1, ?2, ?3)",
            params![run_id, version, started_at],
        )?;
        Ok(())
    }
}
