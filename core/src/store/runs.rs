use super::{from_millis, to_millis, ReconStore};
use crate::{
    error::{ReconError, ReconResult},
    model::{ReconciliationRun, RunStatus, RunSummary},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

/// Column image of a recon_run row. Samples and errors stay as raw JSON
/// until the row is converted outside the rusqlite closure.
struct RawRunRow {
    run_id: String,
    provider: Option<String>,
    status: String,
    started_at: i64,
    completed_at: Option<i64>,
    total_payments: i64,
    total_webhooks: i64,
    matched_count: i64,
    orphaned_webhook_count: i64,
    missing_webhook_count: i64,
    amount_mismatch_count: i64,
    other_error_count: i64,
    matched_sample: String,
    orphaned_sample: String,
    missing_sample: String,
    mismatch_sample: String,
    errors: String,
}

const RUN_COLUMNS: &str = "run_id, provider, status, started_at, completed_at,
       total_payments, total_webhooks, matched_count, orphaned_webhook_count,
       missing_webhook_count, amount_mismatch_count, other_error_count,
       matched_sample, orphaned_sample, missing_sample, mismatch_sample, errors";

impl ReconStore {
    /// Insert the opening state of a run. Counts, samples and errors are
    /// written at finalization.
    pub fn insert_run(&self, run: &ReconciliationRun) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO recon_run (run_id, provider, status, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run.id,
                run.provider,
                run.status.as_str(),
                to_millis(run.started_at),
            ],
        )?;
        Ok(())
    }

    /// Write the terminal state of a run: status, completion time,
    /// summary counts, bounded samples and the error list.
    pub fn finalize_run(&self, run: &ReconciliationRun) -> ReconResult<()> {
        self.conn.execute(
            "UPDATE recon_run
             SET status = ?1, completed_at = ?2,
                 total_payments = ?3, total_webhooks = ?4,
                 matched_count = ?5, orphaned_webhook_count = ?6,
                 missing_webhook_count = ?7, amount_mismatch_count = ?8,
                 other_error_count = ?9,
                 matched_sample = ?10, orphaned_sample = ?11,
                 missing_sample = ?12, mismatch_sample = ?13,
                 errors = ?14
             WHERE run_id = ?15",
            params![
                run.status.as_str(),
                run.completed_at.map(to_millis),
                run.summary.total_payments,
                run.summary.total_webhooks,
                run.summary.matched_count,
                run.summary.orphaned_webhook_count,
                run.summary.missing_webhook_count,
                run.summary.amount_mismatch_count,
                run.summary.other_error_count,
                serde_json::to_string(&run.matched)?,
                serde_json::to_string(&run.orphaned_webhooks)?,
                serde_json::to_string(&run.missing_webhooks)?,
                serde_json::to_string(&run.amount_mismatches)?,
                serde_json::to_string(&run.errors)?,
                run.id,
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> ReconResult<ReconciliationRun> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM recon_run WHERE run_id = ?1");
        let raw = self
            .conn
            .query_row(&sql, params![run_id], |row| Self::map_run_row(row))
            .optional()?;
        match raw {
            Some(raw) => run_from_raw(raw),
            None => Err(ReconError::RunNotFound {
                run_id: run_id.to_string(),
            }),
        }
    }

    /// Historical runs, newest first, optionally scoped by provider and
    /// a started_at lower bound.
    pub fn recent_runs(
        &self,
        provider: Option<&str>,
        started_since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> ReconResult<Vec<ReconciliationRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM recon_run
             WHERE (?1 IS NULL OR provider = ?1)
               AND (?2 IS NULL OR started_at >= ?2)
             ORDER BY started_at DESC, run_id DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![provider, started_since.map(to_millis), limit as i64],
            |row| Self::map_run_row(row),
        )?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(run_from_raw(row?)?);
        }
        Ok(runs)
    }

    fn map_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRunRow> {
        Ok(RawRunRow {
            run_id: row.get(0)?,
            provider: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            total_payments: row.get(5)?,
            total_webhooks: row.get(6)?,
            matched_count: row.get(7)?,
            orphaned_webhook_count: row.get(8)?,
            missing_webhook_count: row.get(9)?,
            amount_mismatch_count: row.get(10)?,
            other_error_count: row.get(11)?,
            matched_sample: row.get(12)?,
            orphaned_sample: row.get(13)?,
            missing_sample: row.get(14)?,
            mismatch_sample: row.get(15)?,
            errors: row.get(16)?,
        })
    }
}

fn run_from_raw(raw: RawRunRow) -> ReconResult<ReconciliationRun> {
    let status = RunStatus::parse(&raw.status).ok_or_else(|| {
        ReconError::Other(anyhow::anyhow!(
            "run {} has unknown status '{}'",
            raw.run_id,
            raw.status
        ))
    })?;

    Ok(ReconciliationRun {
        id: raw.run_id,
        provider: raw.provider,
        status,
        started_at: from_millis(raw.started_at),
        completed_at: raw.completed_at.map(from_millis),
        summary: RunSummary {
            total_payments: raw.total_payments,
            total_webhooks: raw.total_webhooks,
            matched_count: raw.matched_count,
            orphaned_webhook_count: raw.orphaned_webhook_count,
            missing_webhook_count: raw.missing_webhook_count,
            amount_mismatch_count: raw.amount_mismatch_count,
            other_error_count: raw.other_error_count,
        },
        matched: serde_json::from_str(&raw.matched_sample)?,
        orphaned_webhooks: serde_json::from_str(&raw.orphaned_sample)?,
        missing_webhooks: serde_json::from_str(&raw.missing_sample)?,
        amount_mismatches: serde_json::from_str(&raw.mismatch_sample)?,
        errors: serde_json::from_str(&raw.errors)?,
    })
}
