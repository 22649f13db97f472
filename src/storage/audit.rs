use crate::models::ActivityEntry;
use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;
use uuid::Uuid;

// Keyed by `{org|-}:{zero-padded millis}:{uuid}` so per-org entries sort
// chronologically and can be range-scanned. Append-only: no update path.
const AUDIT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("activity_log");

#[derive(Clone)]
pub struct AuditStorage {
    db: Arc<Database>,
}

impl AuditStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(AUDIT_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    fn key_for(entry: &ActivityEntry) -> String {
        let org = entry
            .org_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{org}:{:020}:{}", entry.created_at, entry.uuid)
    }

    pub fn append(&self, entry: &ActivityEntry) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_TABLE)?;
            let json = serde_json::to_vec(entry)?;
            table.insert(Self::key_for(entry).as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Newest-first entries for one organization, bounded by `limit`.
    pub fn list_for_org(&self, org_id: &Uuid, limit: usize) -> Result<Vec<ActivityEntry>> {
        let prefix = format!("{org_id}:");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_TABLE)?;

        let mut entries = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            entries.push(serde_json::from_slice(value.value())?);
        }
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientMeta;
    use std::collections::HashMap;

    fn setup() -> (AuditStorage, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("test.db")).unwrap());
        (AuditStorage::new(db).unwrap(), temp_dir)
    }

    #[test]
    fn entries_come_back_newest_first() {
        let (storage, _tmp) = setup();
        let org = Uuid::new_v4();
        let actor = Uuid::new_v4();

        for (i, ts) in [1_000i64, 2_000, 3_000].into_iter().enumerate() {
            let mut entry = ActivityEntry::new(
                actor,
                Some(org),
                format!("event_{i}"),
                &ClientMeta::default(),
                HashMap::new(),
            );
            entry.created_at = ts;
            storage.append(&entry).unwrap();
        }

        let listed = storage.list_for_org(&org, 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].activity_type, "event_2");
        assert_eq!(listed[1].activity_type, "event_1");
    }

    #[test]
    fn listing_is_scoped_to_org() {
        let (storage, _tmp) = setup();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let actor = Uuid::new_v4();

        storage
            .append(&ActivityEntry::new(actor, Some(org_a), "a", &ClientMeta::default(), HashMap::new()))
            .unwrap();
        storage
            .append(&ActivityEntry::new(actor, Some(org_b), "b", &ClientMeta::default(), HashMap::new()))
            .unwrap();

        let listed = storage.list_for_org(&org_a, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].activity_type, "a");
    }
}
