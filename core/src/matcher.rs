//! The two matching passes over the source record sets.
//!
//! webhook→payment classifies every in-scope webhook as matched,
//! orphaned, or amount-mismatched; payment→webhook finds payments no
//! webhook ever arrived for. The passes read disjoint perspectives of
//! the same two stores and have no data dependency on each other.
//!
//! Join strategy: build a hash index over payments keyed by
//! (provider, transaction_id), then stream webhooks one row at a time
//! doing O(1) lookups; the larger set is never materialized in full.
//! Duplicate payment keys canonicalize to the earliest created_at row.

use crate::{
    error::ReconResult,
    model::{AmountMismatch, MatchedPair, MissingWebhook, OrphanedWebhook},
    store::ReconStore,
    types::ProviderId,
};
use chrono::{DateTime, Utc};

/// Scope of one reconciliation pass.
///
/// `since` applies to the streamed side's own timestamp: received_at for
/// webhooks in the webhook→payment pass, created_at for payments in the
/// payment→webhook pass. The lookup side is provider-scoped only, so a
/// record just outside the window still counts as present.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub provider: Option<ProviderId>,
    pub since: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn for_provider(provider: impl Into<ProviderId>) -> Self {
        Self {
            provider: Some(provider.into()),
            since: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct WebhookMatchOutput {
    pub matched: Vec<MatchedPair>,
    pub orphaned: Vec<OrphanedWebhook>,
    pub mismatched: Vec<AmountMismatch>,
    pub total_webhooks: i64,
}

#[derive(Debug, Default)]
pub struct PaymentMatchOutput {
    pub missing: Vec<MissingWebhook>,
    pub total_payments: i64,
}

/// Scan every in-scope webhook and classify it against the payment index.
/// Every webhook lands in exactly one of the three buckets.
pub fn match_webhooks_to_payments(
    store: &ReconStore,
    filter: &RecordFilter,
) -> ReconResult<WebhookMatchOutput> {
    let index = store.payment_index(filter.provider.as_deref())?;
    let mut out = WebhookMatchOutput::default();

    store.for_each_webhook(filter, |wh| {
        out.total_webhooks += 1;
        let key = wh.key();
        match index.get(&key) {
            None => out.orphaned.push(OrphanedWebhook {
                webhook_id: wh.id,
                provider: wh.provider,
                transaction_id: wh.transaction_id,
                amount: wh.amount,
                currency: wh.currency,
                event_type: wh.event_type,
            }),
            // Currency comparison is exact and case-sensitive.
            Some(p) if p.amount == wh.amount && p.currency == wh.currency => {
                out.matched.push(MatchedPair {
                    payment_id: p.id.clone(),
                    webhook_id: wh.id,
                    provider: wh.provider,
                    transaction_id: wh.transaction_id,
                    amount: wh.amount,
                    currency: wh.currency,
                })
            }
            Some(p) => out.mismatched.push(AmountMismatch {
                payment_id: p.id.clone(),
                webhook_id: wh.id,
                provider: wh.provider,
                transaction_id: wh.transaction_id,
                payment_amount: p.amount,
                webhook_amount: wh.amount,
                payment_currency: p.currency.clone(),
                webhook_currency: wh.currency,
                payment_status: p.status.clone(),
                event_type: wh.event_type,
            }),
        }
    })?;

    log::debug!(
        "webhook pass: {} total, {} matched, {} orphaned, {} mismatched",
        out.total_webhooks,
        out.matched.len(),
        out.orphaned.len(),
        out.mismatched.len()
    );

    Ok(out)
}

/// Scan every in-scope payment and flag the ones no webhook exists for.
/// Presence check only: a payment with a webhook was already classified
/// by the webhook pass.
pub fn match_payments_to_webhooks(
    store: &ReconStore,
    filter: &RecordFilter,
) -> ReconResult<PaymentMatchOutput> {
    let keys = store.webhook_key_set(filter.provider.as_deref())?;
    let mut out = PaymentMatchOutput::default();

    store.for_each_payment(filter, |p| {
        out.total_payments += 1;
        if !keys.contains(&p.key()) {
            out.missing.push(MissingWebhook {
                payment_id: p.id,
                provider: p.provider,
                transaction_id: p.transaction_id,
                amount: p.amount,
                currency: p.currency,
                status: p.status,
            });
        }
    })?;

    log::debug!(
        "payment pass: {} total, {} missing webhooks",
        out.total_payments,
        out.missing.len()
    );

    Ok(out)
}
