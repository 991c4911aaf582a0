use super::{from_millis, to_millis, ReconStore};
use crate::{
    error::{ReconError, ReconResult},
    model::{ItemType, ReconciliationItem},
};
use rusqlite::params;

impl ReconStore {
    /// Best-effort bulk insert: a failing row is logged and skipped, the
    /// remaining rows still insert. Returns the number durably written.
    pub fn insert_items(&self, items: &[ReconciliationItem]) -> usize {
        let mut written = 0;
        for item in items {
            match self.insert_item(item) {
                Ok(()) => written += 1,
                Err(e) => log::warn!("recon item {} not persisted: {e}", item.id),
            }
        }
        written
    }

    fn insert_item(&self, item: &ReconciliationItem) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO recon_item
             (item_id, run_id, provider, local_transaction_id, item_type, details, alerted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.id,
                item.run_id,
                item.provider,
                item.local_transaction_id,
                item.item_type.as_str(),
                item.details,
                item.alerted,
                to_millis(item.created_at),
            ],
        )?;
        Ok(())
    }

    /// Items for a run, optionally narrowed to one type, in insertion
    /// order. This is the unbounded detail channel, not the sample.
    pub fn items_for_run(
        &self,
        run_id: &str,
        item_type: Option<ItemType>,
    ) -> ReconResult<Vec<ReconciliationItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, run_id, provider, local_transaction_id,
                    item_type, details, alerted, created_at
             FROM recon_item
             WHERE run_id = ?1 AND (?2 IS NULL OR item_type = ?2)
             ORDER BY created_at ASC, item_id ASC",
        )?;
        let rows = stmt.query_map(
            params![run_id, item_type.map(|t| t.as_str())],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        )?;

        let mut items = Vec::new();
        for row in rows {
            let (id, run_id, provider, local_transaction_id, kind, details, alerted, created_at) =
                row?;
            let item_type = ItemType::parse(&kind).ok_or_else(|| {
                ReconError::Other(anyhow::anyhow!("item {id} has unknown type '{kind}'"))
            })?;
            items.push(ReconciliationItem {
                id,
                run_id,
                provider,
                local_transaction_id,
                item_type,
                details,
                alerted,
                created_at: from_millis(created_at),
            });
        }
        Ok(items)
    }

    /// The only permitted item update: flag it as processed by a
    /// downstream alert pipeline.
    pub fn mark_item_alerted(&self, item_id: &str) -> ReconResult<()> {
        self.conn.execute(
            "UPDATE recon_item SET alerted = 1 WHERE item_id = ?1",
            params![item_id],
        )?;
        Ok(())
    }

    pub fn item_count(&self, run_id: &str) -> ReconResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recon_item WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
