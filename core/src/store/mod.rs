//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Matchers, the engine, reports and alerting call store methods —
//! they never execute SQL directly.

use crate::error::ReconResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

mod items;
mod payments;
mod runs;

pub struct ReconStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl ReconStore {
    pub fn open(path: &str) -> ReconResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database
    /// (isolated). For file-based databases, this opens the same file.
    pub fn reopen(&self) -> ReconResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ReconResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_payments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_reconciliation.sql"))?;
        Ok(())
    }

    // ── Test helpers ───────────────────────────────────────────

    /// Raw SQL escape hatch for tests and tooling (fault injection,
    /// fixture surgery). Production code goes through typed methods.
    pub fn execute_batch(&self, sql: &str) -> ReconResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Timestamps persist as epoch milliseconds UTC.
pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
