//! Classification behaviour of a reconciliation run.
//!
//! Covers the webhook partition (matched / orphaned / mismatched), the
//! payment-side missing-webhook check, filter scoping, the duplicate-key
//! tie-break, and the summary invariants.

use chrono::{Duration, Utc};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use recon_core::{
    config::ReconConfig,
    engine::ReconEngine,
    matcher::RecordFilter,
    model::{Payment, PaymentWebhook},
    store::ReconStore,
};

fn engine() -> ReconEngine {
    let store = ReconStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    ReconEngine::new(store, ReconConfig::default())
}

fn payment(provider: &str, txn: &str, amount: i64, currency: &str) -> Payment {
    Payment {
        id: format!("pay-{txn}"),
        provider: provider.to_string(),
        transaction_id: txn.to_string(),
        reference: None,
        amount,
        currency: currency.to_string(),
        status: "succeeded".to_string(),
        created_at: Utc::now() - Duration::hours(2),
    }
}

fn webhook(provider: &str, txn: &str, amount: i64, currency: &str) -> PaymentWebhook {
    PaymentWebhook {
        id: format!("wh-{txn}"),
        provider: provider.to_string(),
        transaction_id: txn.to_string(),
        amount,
        currency: currency.to_string(),
        event_type: "payment.succeeded".to_string(),
        received_at: Utc::now() - Duration::hours(1),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: the full classification mix
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn full_classification_mix() {
    let engine = engine();
    let store = engine.store();

    store
        .insert_payment(&payment("test-gateway", "tx-matched", 100, "USD"))
        .unwrap();
    store
        .insert_payment(&payment("test-gateway", "tx-missing-webhook", 75, "USD"))
        .unwrap();
    store
        .insert_payment(&payment("test-gateway", "tx-mismatch", 200, "USD"))
        .unwrap();
    store
        .insert_webhook(&webhook("test-gateway", "tx-matched", 100, "USD"))
        .unwrap();
    store
        .insert_webhook(&webhook("test-gateway", "tx-orphan", 50, "USD"))
        .unwrap();
    store
        .insert_webhook(&webhook("test-gateway", "tx-mismatch", 300, "USD"))
        .unwrap();

    let outcome = engine
        .start_reconciliation_run(RecordFilter::for_provider("test-gateway"))
        .unwrap();

    let s = &outcome.run.summary;
    assert_eq!(s.total_payments, 3);
    assert_eq!(s.total_webhooks, 3);
    assert_eq!(s.matched_count, 1);
    assert_eq!(s.orphaned_webhook_count, 1);
    assert_eq!(s.missing_webhook_count, 1);
    assert_eq!(s.amount_mismatch_count, 1);

    assert_eq!(outcome.matched[0].payment_id, "pay-tx-matched");
    assert_eq!(outcome.orphaned_webhooks[0].transaction_id, "tx-orphan");
    assert_eq!(
        outcome.missing_webhooks[0].transaction_id,
        "tx-missing-webhook"
    );
    let mm = &outcome.amount_mismatches[0];
    assert_eq!(mm.payment_amount, 200);
    assert_eq!(mm.webhook_amount, 300);
    assert_eq!(mm.payment_id, "pay-tx-mismatch");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: empty dataset
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_dataset_yields_zero_counts_and_no_items() {
    let engine = engine();

    let outcome = engine
        .start_reconciliation_run(RecordFilter::for_provider("ghost-gateway"))
        .unwrap();

    let s = &outcome.run.summary;
    assert_eq!(s.total_payments, 0);
    assert_eq!(s.total_webhooks, 0);
    assert_eq!(s.matched_count, 0);
    assert_eq!(s.orphaned_webhook_count, 0);
    assert_eq!(s.missing_webhook_count, 0);
    assert_eq!(s.amount_mismatch_count, 0);
    assert_eq!(engine.store().item_count(&outcome.run.id).unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: currency comparison is exact and case-sensitive
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn currency_comparison_is_case_sensitive() {
    let engine = engine();
    let store = engine.store();

    store
        .insert_payment(&payment("test-gateway", "tx-1", 100, "usd"))
        .unwrap();
    store
        .insert_webhook(&webhook("test-gateway", "tx-1", 100, "USD"))
        .unwrap();

    let outcome = engine
        .start_reconciliation_run(RecordFilter::for_provider("test-gateway"))
        .unwrap();

    assert_eq!(outcome.run.summary.matched_count, 0);
    assert_eq!(outcome.run.summary.amount_mismatch_count, 1);
    let mm = &outcome.amount_mismatches[0];
    assert_eq!(mm.payment_currency, "usd");
    assert_eq!(mm.webhook_currency, "USD");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: idempotence over an unchanged dataset
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn rerun_over_unchanged_dataset_yields_identical_summary() {
    let engine = engine();
    let store = engine.store();

    store
        .insert_payment(&payment("test-gateway", "tx-a", 100, "USD"))
        .unwrap();
    store
        .insert_payment(&payment("test-gateway", "tx-b", 75, "USD"))
        .unwrap();
    store
        .insert_webhook(&webhook("test-gateway", "tx-a", 100, "USD"))
        .unwrap();
    store
        .insert_webhook(&webhook("test-gateway", "tx-c", 50, "USD"))
        .unwrap();

    let first = engine
        .start_reconciliation_run(RecordFilter::for_provider("test-gateway"))
        .unwrap();
    let second = engine
        .start_reconciliation_run(RecordFilter::for_provider("test-gateway"))
        .unwrap();

    assert_eq!(first.run.summary, second.run.summary);
    assert_ne!(first.run.id, second.run.id, "each run is its own aggregate");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: provider filter scopes the run
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn provider_filter_scopes_the_run() {
    let engine = engine();
    let store = engine.store();

    store
        .insert_payment(&payment("stripe", "tx-s", 100, "USD"))
        .unwrap();
    store
        .insert_webhook(&webhook("stripe", "tx-s", 100, "USD"))
        .unwrap();
    store
        .insert_payment(&payment("adyen", "tx-a", 300, "EUR"))
        .unwrap();

    let outcome = engine
        .start_reconciliation_run(RecordFilter::for_provider("stripe"))
        .unwrap();

    assert_eq!(outcome.run.summary.total_payments, 1);
    assert_eq!(outcome.run.summary.total_webhooks, 1);
    assert_eq!(outcome.run.summary.matched_count, 1);
    assert_eq!(outcome.run.summary.missing_webhook_count, 0);

    // Unscoped run sees both providers.
    let all = engine
        .start_reconciliation_run(RecordFilter::default())
        .unwrap();
    assert_eq!(all.run.summary.total_payments, 2);
    assert_eq!(all.run.summary.missing_webhook_count, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: since windows the streamed side, not the lookup side
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn since_filter_windows_streamed_side_only() {
    let engine = engine();
    let store = engine.store();
    let now = Utc::now();

    // Old payment whose webhook arrived recently: the webhook is in
    // scope and must still find its payment.
    let mut old_payment = payment("test-gateway", "tx-old", 100, "USD");
    old_payment.created_at = now - Duration::days(10);
    store.insert_payment(&old_payment).unwrap();
    let mut late_webhook = webhook("test-gateway", "tx-old", 100, "USD");
    late_webhook.received_at = now - Duration::days(1);
    store.insert_webhook(&late_webhook).unwrap();

    // Old webhook: out of scope for the webhook pass.
    let mut old_pair_payment = payment("test-gateway", "tx-stale", 80, "USD");
    old_pair_payment.created_at = now - Duration::days(10);
    store.insert_payment(&old_pair_payment).unwrap();
    let mut old_webhook = webhook("test-gateway", "tx-stale", 80, "USD");
    old_webhook.received_at = now - Duration::days(10);
    store.insert_webhook(&old_webhook).unwrap();

    // Recent payment with no webhook at all.
    let mut fresh_payment = payment("test-gateway", "tx-fresh", 60, "USD");
    fresh_payment.created_at = now - Duration::days(1);
    store.insert_payment(&fresh_payment).unwrap();

    let filter = RecordFilter {
        provider: Some("test-gateway".to_string()),
        since: Some(now - Duration::days(5)),
    };
    let outcome = engine.start_reconciliation_run(filter).unwrap();

    let s = &outcome.run.summary;
    assert_eq!(s.total_webhooks, 1, "only the late webhook is in scope");
    assert_eq!(s.matched_count, 1, "late webhook matches the old payment");
    assert_eq!(s.orphaned_webhook_count, 0);
    assert_eq!(s.total_payments, 1, "only the fresh payment is in scope");
    assert_eq!(s.missing_webhook_count, 1);
    assert_eq!(outcome.missing_webhooks[0].transaction_id, "tx-fresh");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: duplicate payment keys canonicalize to the earliest created_at
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn duplicate_payment_key_uses_earliest_created() {
    let engine = engine();
    let store = engine.store();
    let now = Utc::now();

    let mut early = payment("test-gateway", "tx-dup", 100, "USD");
    early.id = "pay-early".to_string();
    early.created_at = now - Duration::hours(5);
    store.insert_payment(&early).unwrap();

    let mut late = payment("test-gateway", "tx-dup", 200, "USD");
    late.id = "pay-late".to_string();
    late.created_at = now - Duration::hours(1);
    store.insert_payment(&late).unwrap();

    store
        .insert_webhook(&webhook("test-gateway", "tx-dup", 100, "USD"))
        .unwrap();

    let outcome = engine
        .start_reconciliation_run(RecordFilter::for_provider("test-gateway"))
        .unwrap();

    assert_eq!(outcome.run.summary.matched_count, 1);
    assert_eq!(outcome.matched[0].payment_id, "pay-early");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: partition and coverage invariants over a generated dataset
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn partition_invariant_over_generated_dataset() {
    let engine = engine();
    let store = engine.store();
    let mut rng = Pcg64Mcg::seed_from_u64(7);
    let base = Utc::now() - Duration::days(7);

    for i in 0..300usize {
        let provider = if rng.next_u64() % 2 == 0 { "stripe" } else { "adyen" };
        let amount = 100 + (rng.next_u64() % 50_000) as i64;
        let at = base + Duration::minutes((rng.next_u64() % 10_000) as i64);
        let txn = format!("txn-{i:05}");
        let roll = rng.next_u64() % 100;

        if roll < 95 {
            let mut p = payment(provider, &txn, amount, "USD");
            p.created_at = at;
            store.insert_payment(&p).unwrap();
        }
        if roll < 70 || roll >= 85 {
            let wh_amount = if (85..95).contains(&roll) { amount + 7 } else { amount };
            let mut w = webhook(provider, &txn, wh_amount, "USD");
            w.received_at = at + Duration::seconds(30);
            store.insert_webhook(&w).unwrap();
        }
    }

    let outcome = engine
        .start_reconciliation_run(RecordFilter::default())
        .unwrap();

    let s = &outcome.run.summary;
    assert_eq!(
        s.matched_count + s.orphaned_webhook_count + s.amount_mismatch_count,
        s.total_webhooks,
        "every webhook lands in exactly one bucket"
    );
    assert!(s.total_payments >= s.missing_webhook_count);
    assert_eq!(outcome.matched.len() as i64, s.matched_count);
    assert_eq!(outcome.orphaned_webhooks.len() as i64, s.orphaned_webhook_count);
    assert_eq!(outcome.missing_webhooks.len() as i64, s.missing_webhook_count);
    assert_eq!(outcome.amount_mismatches.len() as i64, s.amount_mismatch_count);

    // Every discrepancy became an item.
    let discrepancies =
        s.orphaned_webhook_count + s.missing_webhook_count + s.amount_mismatch_count;
    assert_eq!(
        engine.store().item_count(&outcome.run.id).unwrap(),
        discrepancies
    );
}
