//! Report rendering — a pure projection of a run into JSON or CSV.
//!
//! Two entry points on purpose: `from_outcome` renders the triggering
//! call's complete in-memory lists, `from_run` renders a historical run
//! from its persisted bounded samples. Immediate reports are complete;
//! re-reports are best-effort.

use crate::{
    engine::RunOutcome,
    error::ReconResult,
    model::{
        AmountMismatch, MatchedPair, MissingWebhook, OrphanedWebhook, ReconciliationRun,
        RunStatus, RunSummary,
    },
    types::{MinorUnits, ProviderId, RunId},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport {
    pub run: RunHeader,
    pub discrepancies: Discrepancies,
    pub matched: Vec<MatchedPair>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHeader {
    pub id: RunId,
    pub provider: Option<ProviderId>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancies {
    pub orphaned_webhooks: Vec<OrphanedWebhook>,
    pub missing_webhooks: Vec<MissingWebhook>,
    pub amount_mismatches: Vec<AmountMismatch>,
}

impl JsonReport {
    /// Complete report for the triggering call.
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self::build(
            &outcome.run,
            &outcome.matched,
            &outcome.orphaned_webhooks,
            &outcome.missing_webhooks,
            &outcome.amount_mismatches,
        )
    }

    /// Historical re-report: only the run's bounded samples survive.
    pub fn from_run(run: &ReconciliationRun) -> Self {
        Self::build(
            run,
            &run.matched,
            &run.orphaned_webhooks,
            &run.missing_webhooks,
            &run.amount_mismatches,
        )
    }

    fn build(
        run: &ReconciliationRun,
        matched: &[MatchedPair],
        orphaned: &[OrphanedWebhook],
        missing: &[MissingWebhook],
        mismatches: &[AmountMismatch],
    ) -> Self {
        Self {
            run: RunHeader {
                id: run.id.clone(),
                provider: run.provider.clone(),
                status: run.status,
                started_at: run.started_at,
                completed_at: run.completed_at,
                summary: run.summary.clone(),
            },
            discrepancies: Discrepancies {
                orphaned_webhooks: orphaned.to_vec(),
                missing_webhooks: missing.to_vec(),
                amount_mismatches: mismatches.to_vec(),
            },
            matched: matched.to_vec(),
        }
    }

    pub fn to_json_string(&self) -> ReconResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── CSV ────────────────────────────────────────────────────────────

pub const CSV_HEADER: [&str; 9] = [
    "type",
    "provider",
    "transactionId",
    "paymentId",
    "webhookId",
    "paymentAmount",
    "webhookAmount",
    "paymentStatus",
    "eventType",
];

/// One CSV row per discrepancy. Matched entries never appear in the CSV.
/// Absent fields serialize as the empty string.
#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    provider: &'a str,
    transaction_id: &'a str,
    payment_id: Option<&'a str>,
    webhook_id: Option<&'a str>,
    payment_amount: Option<MinorUnits>,
    webhook_amount: Option<MinorUnits>,
    payment_status: Option<&'a str>,
    event_type: Option<&'a str>,
}

/// Flat CSV of all discrepancies: orphaned rows first, then missing,
/// then mismatches, each list in the order it was provided. Escaping is
/// standard CSV quoting (wrap in double quotes, double embedded quotes).
pub fn csv_report(
    orphaned: &[OrphanedWebhook],
    missing: &[MissingWebhook],
    mismatches: &[AmountMismatch],
) -> ReconResult<String> {
    // Header written explicitly so an empty report still carries it.
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;

    for o in orphaned {
        wtr.serialize(CsvRow {
            kind: "orphaned_webhook",
            provider: &o.provider,
            transaction_id: &o.transaction_id,
            payment_id: None,
            webhook_id: Some(&o.webhook_id),
            payment_amount: None,
            webhook_amount: Some(o.amount),
            payment_status: None,
            event_type: Some(&o.event_type),
        })?;
    }
    for m in missing {
        wtr.serialize(CsvRow {
            kind: "missing_webhook",
            provider: &m.provider,
            transaction_id: &m.transaction_id,
            payment_id: Some(&m.payment_id),
            webhook_id: None,
            payment_amount: Some(m.amount),
            webhook_amount: None,
            payment_status: Some(&m.status),
            event_type: None,
        })?;
    }
    for mm in mismatches {
        wtr.serialize(CsvRow {
            kind: "amount_mismatch",
            provider: &mm.provider,
            transaction_id: &mm.transaction_id,
            payment_id: Some(&mm.payment_id),
            webhook_id: Some(&mm.webhook_id),
            payment_amount: Some(mm.payment_amount),
            webhook_amount: Some(mm.webhook_amount),
            payment_status: Some(&mm.payment_status),
            event_type: Some(&mm.event_type),
        })?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv buffer: {e}"))?;
    Ok(String::from_utf8(bytes).map_err(|e| anyhow::anyhow!("csv not utf-8: {e}"))?)
}

pub fn csv_from_outcome(outcome: &RunOutcome) -> ReconResult<String> {
    csv_report(
        &outcome.orphaned_webhooks,
        &outcome.missing_webhooks,
        &outcome.amount_mismatches,
    )
}

/// Historical CSV from the persisted bounded samples.
pub fn csv_from_run(run: &ReconciliationRun) -> ReconResult<String> {
    csv_report(
        &run.orphaned_webhooks,
        &run.missing_webhooks,
        &run.amount_mismatches,
    )
}

/// Attachment filename used by the layer that serves the CSV.
pub fn csv_filename(run_id: &str) -> String {
    format!("reconciliation-{run_id}.csv")
}
