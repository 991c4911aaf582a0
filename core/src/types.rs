//! Shared primitive types used across the reconciliation engine.

/// The canonical run identifier.
pub type RunId = String;

/// Payment provider identifier ("stripe", "adyen", ...).
pub type ProviderId = String;

/// Provider-assigned transaction identifier.
pub type TransactionId = String;

/// Monetary amount in minor units (cents, pence, ...).
pub type MinorUnits = i64;
