//! The run orchestrator — owns the lifecycle of one reconciliation run.
//!
//! Lifecycle: pending → running → {completed | failed}, terminal states
//! final. The run row is inserted as `running` before matching starts,
//! so a crash mid-run leaves an inspectable non-terminal row behind.
//!
//! RULES:
//!   - Only matcher/store failures fail a run; item persistence and
//!     alert delivery degrade to logged warnings.
//!   - The returned outcome carries the FULL discrepancy lists for
//!     immediate reporting; the persisted run keeps only the bounded
//!     samples. A report regenerated later is best-effort.
//!   - The engine never mutates the source record sets.

use crate::{
    config::ReconConfig,
    error::ReconResult,
    matcher::{self, PaymentMatchOutput, RecordFilter, WebhookMatchOutput},
    model::{
        AmountMismatch, ItemType, MatchedPair, MissingWebhook, OrphanedWebhook,
        ReconciliationItem, ReconciliationRun, RunStatus, RunSummary,
    },
    store::ReconStore,
};
use chrono::Utc;
use uuid::Uuid;

pub struct ReconEngine {
    store: ReconStore,
    config: ReconConfig,
}

/// Everything the triggering caller needs for immediate reporting.
/// The four lists are complete; `run` holds only the bounded samples.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: ReconciliationRun,
    pub matched: Vec<MatchedPair>,
    pub orphaned_webhooks: Vec<OrphanedWebhook>,
    pub missing_webhooks: Vec<MissingWebhook>,
    pub amount_mismatches: Vec<AmountMismatch>,
}

impl ReconEngine {
    pub fn new(store: ReconStore, config: ReconConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &ReconStore {
        &self.store
    }

    /// Execute one reconciliation run over the given scope.
    ///
    /// Running twice over an unchanged dataset with the same filter
    /// yields identical summary counts; the stores are treated as
    /// immutable for the duration of a run.
    pub fn start_reconciliation_run(&self, filter: RecordFilter) -> ReconResult<RunOutcome> {
        let run_id = format!("recon-{}", Uuid::new_v4());
        let mut run = ReconciliationRun::new(run_id.clone(), filter.provider.clone());
        run.status = RunStatus::Running;
        self.store.insert_run(&run)?;
        log::info!(
            "run {run_id} started (provider={:?}, since={:?})",
            filter.provider,
            filter.since
        );

        match self.execute_matchers(&filter) {
            Ok((webhooks, payments)) => self.complete_run(run, webhooks, payments),
            Err(e) => {
                run.errors.push(e.to_string());
                run.summary.other_error_count = run.errors.len() as i64;
                run.status = RunStatus::Failed;
                run.completed_at = Some(Utc::now());
                if let Err(persist) = self.store.finalize_run(&run) {
                    log::error!("run {run_id} failed and could not be finalized: {persist}");
                }
                log::error!("run {run_id} failed: {e}");
                Err(e)
            }
        }
    }

    /// The two passes read disjoint perspectives of stores that are
    /// immutable for the duration of the run; order between them does
    /// not affect the result.
    fn execute_matchers(
        &self,
        filter: &RecordFilter,
    ) -> ReconResult<(WebhookMatchOutput, PaymentMatchOutput)> {
        let webhooks = matcher::match_webhooks_to_payments(&self.store, filter)?;
        let payments = matcher::match_payments_to_webhooks(&self.store, filter)?;
        Ok((webhooks, payments))
    }

    fn complete_run(
        &self,
        mut run: ReconciliationRun,
        webhooks: WebhookMatchOutput,
        payments: PaymentMatchOutput,
    ) -> ReconResult<RunOutcome> {
        let WebhookMatchOutput {
            matched,
            orphaned,
            mismatched,
            total_webhooks,
        } = webhooks;
        let PaymentMatchOutput {
            missing,
            total_payments,
        } = payments;

        run.summary = RunSummary {
            total_payments,
            total_webhooks,
            matched_count: matched.len() as i64,
            orphaned_webhook_count: orphaned.len() as i64,
            missing_webhook_count: missing.len() as i64,
            amount_mismatch_count: mismatched.len() as i64,
            other_error_count: 0,
        };

        // Unbounded detail channel: one durable item per discrepancy.
        // A partial insert failure does not fail the run; the in-memory
        // summary and samples stay authoritative.
        let items = build_items(&run.id, &orphaned, &missing, &mismatched);
        let written = self.store.insert_items(&items);
        if written < items.len() {
            log::warn!(
                "run {}: only {written} of {} items persisted",
                run.id,
                items.len()
            );
        }

        // Bounded sample channel: first N in iteration order.
        let cap = self.config.sample_cap;
        run.matched = matched.iter().take(cap).cloned().collect();
        run.orphaned_webhooks = orphaned.iter().take(cap).cloned().collect();
        run.missing_webhooks = missing.iter().take(cap).cloned().collect();
        run.amount_mismatches = mismatched.iter().take(cap).cloned().collect();
        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        self.store.finalize_run(&run)?;

        log::info!(
            "run {} completed: {} payments / {} webhooks, {} matched, {} orphaned, {} missing, {} mismatched",
            run.id,
            total_payments,
            total_webhooks,
            run.summary.matched_count,
            run.summary.orphaned_webhook_count,
            run.summary.missing_webhook_count,
            run.summary.amount_mismatch_count
        );

        Ok(RunOutcome {
            run,
            matched,
            orphaned_webhooks: orphaned,
            missing_webhooks: missing,
            amount_mismatches: mismatched,
        })
    }
}

/// Map every discrepancy to a durable item row. Orphaned webhooks have no
/// local payment, so they carry no local transaction link.
fn build_items(
    run_id: &str,
    orphaned: &[OrphanedWebhook],
    missing: &[MissingWebhook],
    mismatched: &[AmountMismatch],
) -> Vec<ReconciliationItem> {
    let now = Utc::now();
    let mut items = Vec::with_capacity(orphaned.len() + missing.len() + mismatched.len());

    for o in orphaned {
        items.push(ReconciliationItem {
            id: format!("item-{}", Uuid::new_v4()),
            run_id: run_id.to_string(),
            provider: o.provider.clone(),
            local_transaction_id: None,
            item_type: ItemType::MissingLocal,
            details: serde_json::json!({
                "webhookId": o.webhook_id,
                "transactionId": o.transaction_id,
                "amount": o.amount,
                "currency": o.currency,
                "eventType": o.event_type,
            })
            .to_string(),
            alerted: false,
            created_at: now,
        });
    }

    for m in missing {
        items.push(ReconciliationItem {
            id: format!("item-{}", Uuid::new_v4()),
            run_id: run_id.to_string(),
            provider: m.provider.clone(),
            local_transaction_id: Some(m.transaction_id.clone()),
            item_type: ItemType::MissingProvider,
            details: serde_json::json!({
                "paymentId": m.payment_id,
                "transactionId": m.transaction_id,
                "amount": m.amount,
                "currency": m.currency,
                "status": m.status,
            })
            .to_string(),
            alerted: false,
            created_at: now,
        });
    }

    for mm in mismatched {
        items.push(ReconciliationItem {
            id: format!("item-{}", Uuid::new_v4()),
            run_id: run_id.to_string(),
            provider: mm.provider.clone(),
            local_transaction_id: Some(mm.transaction_id.clone()),
            item_type: ItemType::AmountMismatch,
            details: serde_json::json!({
                "paymentId": mm.payment_id,
                "webhookId": mm.webhook_id,
                "transactionId": mm.transaction_id,
                "paymentAmount": mm.payment_amount,
                "webhookAmount": mm.webhook_amount,
                "paymentCurrency": mm.payment_currency,
                "webhookCurrency": mm.webhook_currency,
            })
            .to_string(),
            alerted: false,
            created_at: now,
        });
    }

    items
}
