use crate::models::ItemShare;
use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;
use uuid::Uuid;

const SHARES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("item_shares");

#[derive(Clone)]
pub struct ShareStorage {
    db: Arc<Database>,
}

impl ShareStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(SHARES_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn insert(&self, share: &ItemShare) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SHARES_TABLE)?;
            let json = serde_json::to_vec(share)?;
            table.insert(share.uuid.to_string().as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, uuid: &Uuid) -> Result<Option<ItemShare>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARES_TABLE)?;

        if let Some(value) = table.get(uuid.to_string().as_str())? {
            Ok(Some(serde_json::from_slice(value.value())?))
        } else {
            Ok(None)
        }
    }

    /// Hard delete. Returns false when the share was already gone.
    pub fn remove(&self, uuid: &Uuid) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SHARES_TABLE)?;
            table.remove(uuid.to_string().as_str())?.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn list_for_item(&self, item_uuid: &Uuid) -> Result<Vec<ItemShare>> {
        self.scan(|s| s.item_uuid == *item_uuid)
    }

    pub fn list_for_recipient(&self, user_id: &Uuid) -> Result<Vec<ItemShare>> {
        self.scan(|s| s.shared_with_user_id == Some(*user_id))
    }

    /// Active share of `item_uuid` held by `user_id`, if any. Expired shares
    /// are inert and not returned here.
    pub fn find_active_for(&self, item_uuid: &Uuid, user_id: &Uuid) -> Result<Option<ItemShare>> {
        Ok(self
            .scan(|s| {
                s.item_uuid == *item_uuid
                    && s.shared_with_user_id == Some(*user_id)
                    && s.is_active()
            })?
            .into_iter()
            .next())
    }

    fn scan(&self, pred: impl Fn(&ItemShare) -> bool) -> Result<Vec<ItemShare>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARES_TABLE)?;

        let mut shares = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let share: ItemShare = serde_json::from_slice(value.value())?;
            if pred(&share) {
                shares.push(share);
            }
        }
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SharePermissions;
    use tempfile::tempdir;

    fn setup() -> (ShareStorage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("test.db")).unwrap());
        (ShareStorage::new(db).unwrap(), temp_dir)
    }

    fn sample_share(item: Uuid, owner: Uuid, recipient: Uuid) -> ItemShare {
        let now = chrono::Utc::now().timestamp_millis();
        ItemShare {
            uuid: Uuid::new_v4(),
            item_uuid: item,
            owner_id: owner,
            shared_with_user_id: Some(recipient),
            shared_with_email: "u2@example.com".into(),
            permissions: SharePermissions::view_only(),
            encrypted_key: Some("wrapped".into()),
            expires_at: None,
            created_by: owner,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_get() {
        let (storage, _tmp) = setup();
        let share = sample_share(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        storage.insert(&share).unwrap();
        let loaded = storage.get(&share.uuid).unwrap().unwrap();
        assert_eq!(loaded.shared_with_email, "u2@example.com");
    }

    #[test]
    fn remove_twice_reports_absent() {
        let (storage, _tmp) = setup();
        let share = sample_share(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        storage.insert(&share).unwrap();
        assert!(storage.remove(&share.uuid).unwrap());
        assert!(!storage.remove(&share.uuid).unwrap());
    }

    #[test]
    fn expired_share_is_not_active() {
        let (storage, _tmp) = setup();
        let item = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let mut share = sample_share(item, Uuid::new_v4(), recipient);
        share.expires_at = Some(chrono::Utc::now().timestamp_millis() - 1_000);
        storage.insert(&share).unwrap();

        assert!(storage.find_active_for(&item, &recipient).unwrap().is_none());
        // The row is still there, just inert.
        assert!(storage.get(&share.uuid).unwrap().is_some());
    }
}
