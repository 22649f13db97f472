use anyhow::Result;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::sync::Arc;

// Keyed by `{provider}:{event-or-transaction-id}`.
const PROCESSED_TABLE: TableDefinition<&str, i64> = TableDefinition::new("processed_webhook_events");

/// Dedup markers for webhook redelivery. The marker is written after a
/// successful apply; a crash in between means one extra re-apply, which the
/// apply paths tolerate because they derive target state instead of
/// incrementing.
#[derive(Clone)]
pub struct WebhookEventStorage {
    db: Arc<Database>,
}

impl WebhookEventStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(PROCESSED_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn is_processed(&self, provider: &str, event_id: &str) -> Result<bool> {
        let key = format!("{provider}:{event_id}");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROCESSED_TABLE)?;
        Ok(table.get(key.as_str())?.is_some())
    }

    pub fn mark_processed(&self, provider: &str, event_id: &str) -> Result<()> {
        let key = format!("{provider}:{event_id}");
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROCESSED_TABLE)?;
            table.insert(key.as_str(), chrono::Utc::now().timestamp_millis())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
