//! Domain records: the two read-only source sets, the run aggregate, and
//! per-discrepancy items.
//!
//! RULES:
//!   - Payment and PaymentWebhook are owned upstream. The engine reads
//!     them and never mutates them.
//!   - A run is mutated in place while running and becomes immutable once
//!     terminal (completed or failed), except for being read by report
//!     and alert consumers.
//!   - Items are written once; the only later update is the alerted flag.

use crate::types::{MinorUnits, ProviderId, RunId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite natural key shared by payments and webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
}

/// Local source of truth for a charge. Written by upstream payment
/// processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
    pub reference: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            provider: self.provider.clone(),
            transaction_id: self.transaction_id.clone(),
        }
    }
}

/// Raw provider callback. Written by upstream webhook ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    pub id: String,
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
    pub amount: MinorUnits,
    pub currency: String,
    pub event_type: String,
    pub received_at: DateTime<Utc>,
}

impl PaymentWebhook {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            provider: self.provider.clone(),
            transaction_id: self.transaction_id.clone(),
        }
    }
}

// ── Classification entries ─────────────────────────────────────────
// Produced by the matchers, sampled into the run record, and rendered
// by the report builder.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub payment_id: String,
    pub webhook_id: String,
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
    pub amount: MinorUnits,
    pub currency: String,
}

/// Provider callback with no corresponding local payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedWebhook {
    pub webhook_id: String,
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
    pub amount: MinorUnits,
    pub currency: String,
    pub event_type: String,
}

/// Local payment no provider callback ever arrived for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingWebhook {
    pub payment_id: String,
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: String,
}

/// Payment and webhook share a key but disagree on amount or currency.
/// Both sides are recorded for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountMismatch {
    pub payment_id: String,
    pub webhook_id: String,
    pub provider: ProviderId,
    pub transaction_id: TransactionId,
    pub payment_amount: MinorUnits,
    pub webhook_amount: MinorUnits,
    pub payment_currency: String,
    pub webhook_currency: String,
    pub payment_status: String,
    pub event_type: String,
}

// ── Run aggregate ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_payments: i64,
    pub total_webhooks: i64,
    pub matched_count: i64,
    pub orphaned_webhook_count: i64,
    pub missing_webhook_count: i64,
    pub amount_mismatch_count: i64,
    pub other_error_count: i64,
}

/// Aggregate root for one reconciliation execution.
///
/// The four entry lists here are the bounded samples (first N in
/// iteration order); the complete lists live only in the in-memory
/// `RunOutcome` of the triggering call and in the per-item table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRun {
    pub id: RunId,
    pub provider: Option<ProviderId>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
    pub matched: Vec<MatchedPair>,
    pub orphaned_webhooks: Vec<OrphanedWebhook>,
    pub missing_webhooks: Vec<MissingWebhook>,
    pub amount_mismatches: Vec<AmountMismatch>,
    pub errors: Vec<String>,
}

impl ReconciliationRun {
    pub fn new(id: RunId, provider: Option<ProviderId>) -> Self {
        Self {
            id,
            provider,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            summary: RunSummary::default(),
            matched: Vec::new(),
            orphaned_webhooks: Vec::new(),
            missing_webhooks: Vec::new(),
            amount_mismatches: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// ── Items ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    MissingLocal,
    MissingProvider,
    AmountMismatch,
    RefundMissing,
    Other,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingLocal => "MISSING_LOCAL",
            Self::MissingProvider => "MISSING_PROVIDER",
            Self::AmountMismatch => "AMOUNT_MISMATCH",
            Self::RefundMissing => "REFUND_MISSING",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MISSING_LOCAL" => Some(Self::MissingLocal),
            "MISSING_PROVIDER" => Some(Self::MissingProvider),
            "AMOUNT_MISMATCH" => Some(Self::AmountMismatch),
            "REFUND_MISSING" => Some(Self::RefundMissing),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// One durable record per discrepancy, independent of the run's bounded
/// samples. Downstream alert pipelines consume these individually and
/// flip `alerted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationItem {
    pub id: String,
    pub run_id: RunId,
    pub provider: ProviderId,
    pub local_transaction_id: Option<TransactionId>,
    pub item_type: ItemType,
    pub details: String,
    pub alerted: bool,
    pub created_at: DateTime<Utc>,
}
