use super::{from_millis, to_millis, ReconStore};
use crate::{
    error::ReconResult,
    matcher::RecordFilter,
    model::{Payment, PaymentWebhook, RecordKey},
};
use rusqlite::params;
use std::collections::{HashMap, HashSet};

impl ReconStore {
    // ── Source record writes (upstream ingestion, seeders, tests) ──

    pub fn insert_payment(&self, p: &Payment) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO payment
             (payment_id, provider, transaction_id, reference, amount, currency, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                p.id,
                p.provider,
                p.transaction_id,
                p.reference,
                p.amount,
                p.currency,
                p.status,
                to_millis(p.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn insert_webhook(&self, w: &PaymentWebhook) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO payment_webhook
             (webhook_id, provider, transaction_id, amount, currency, event_type, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                w.id,
                w.provider,
                w.transaction_id,
                w.amount,
                w.currency,
                w.event_type,
                to_millis(w.received_at),
            ],
        )?;
        Ok(())
    }

    // ── Matching reads ─────────────────────────────────────────

    /// Hash index over payments keyed by (provider, transaction_id).
    /// Duplicate keys keep the earliest created_at row (tie-break).
    pub fn payment_index(
        &self,
        provider: Option<&str>,
    ) -> ReconResult<HashMap<RecordKey, Payment>> {
        let mut stmt = self.conn.prepare(
            "SELECT payment_id, provider, transaction_id, reference,
                    amount, currency, status, created_at
             FROM payment
             WHERE (?1 IS NULL OR provider = ?1)
             ORDER BY created_at ASC, payment_id ASC",
        )?;
        let rows = stmt.query_map(params![provider], |row| Self::map_payment_row(row))?;

        let mut index = HashMap::new();
        for row in rows {
            let payment = row?;
            index.entry(payment.key()).or_insert(payment);
        }
        Ok(index)
    }

    /// Set of webhook keys for the provider scope. Used for the
    /// payment→webhook presence check.
    pub fn webhook_key_set(&self, provider: Option<&str>) -> ReconResult<HashSet<RecordKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT provider, transaction_id
             FROM payment_webhook
             WHERE (?1 IS NULL OR provider = ?1)",
        )?;
        let rows = stmt.query_map(params![provider], |row| {
            Ok(RecordKey {
                provider: row.get(0)?,
                transaction_id: row.get(1)?,
            })
        })?;
        rows.collect::<Result<HashSet<_>, _>>().map_err(Into::into)
    }

    /// Stream in-scope webhooks in deterministic order (received_at,
    /// then id) without materializing the full set.
    pub fn for_each_webhook<F>(&self, filter: &RecordFilter, mut f: F) -> ReconResult<()>
    where
        F: FnMut(PaymentWebhook),
    {
        let mut stmt = self.conn.prepare(
            "SELECT webhook_id, provider, transaction_id, amount, currency, event_type, received_at
             FROM payment_webhook
             WHERE (?1 IS NULL OR provider = ?1)
               AND (?2 IS NULL OR received_at >= ?2)
             ORDER BY received_at ASC, webhook_id ASC",
        )?;
        let rows = stmt.query_map(
            params![filter.provider, filter.since.map(to_millis)],
            |row| Self::map_webhook_row(row),
        )?;
        for row in rows {
            f(row?);
        }
        Ok(())
    }

    /// Stream in-scope payments in deterministic order (created_at,
    /// then id). The since filter applies to the payment's own
    /// creation timestamp.
    pub fn for_each_payment<F>(&self, filter: &RecordFilter, mut f: F) -> ReconResult<()>
    where
        F: FnMut(Payment),
    {
        let mut stmt = self.conn.prepare(
            "SELECT payment_id, provider, transaction_id, reference,
                    amount, currency, status, created_at
             FROM payment
             WHERE (?1 IS NULL OR provider = ?1)
               AND (?2 IS NULL OR created_at >= ?2)
             ORDER BY created_at ASC, payment_id ASC",
        )?;
        let rows = stmt.query_map(
            params![filter.provider, filter.since.map(to_millis)],
            |row| Self::map_payment_row(row),
        )?;
        for row in rows {
            f(row?);
        }
        Ok(())
    }

    pub fn payment_count(&self) -> ReconResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM payment", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn webhook_count(&self) -> ReconResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM payment_webhook", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_payment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
        Ok(Payment {
            id: row.get(0)?,
            provider: row.get(1)?,
            transaction_id: row.get(2)?,
            reference: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            status: row.get(6)?,
            created_at: from_millis(row.get(7)?),
        })
    }

    fn map_webhook_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentWebhook> {
        Ok(PaymentWebhook {
            id: row.get(0)?,
            provider: row.get(1)?,
            transaction_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            event_type: row.get(5)?,
            received_at: from_millis(row.get(6)?),
        })
    }
}
