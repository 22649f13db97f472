use crate::models::Item;
use crate::storage::encryption::FieldEncryptor;
use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;
use uuid::Uuid;

const ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("items");

/// Vault item storage. Sensitive metadata members are sealed on the way in
/// and opened on the way out; the opaque client ciphertext passes through.
#[derive(Clone)]
pub struct ItemStorage {
    db: Arc<Database>,
    encryptor: Arc<FieldEncryptor>,
}

impl ItemStorage {
    pub fn new(db: Arc<Database>, encryptor: Arc<FieldEncryptor>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(ITEMS_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db, encryptor })
    }

    pub fn insert(&self, item: &Item) -> Result<()> {
        let mut sealed = item.clone();
        self.encryptor.seal_fields(&mut sealed.metadata)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ITEMS_TABLE)?;
            let json = serde_json::to_vec(&sealed)?;
            table.insert(sealed.uuid.to_string().as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, uuid: &Uuid) -> Result<Option<Item>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ITEMS_TABLE)?;

        if let Some(value) = table.get(uuid.to_string().as_str())? {
            let mut item: Item = serde_json::from_slice(value.value())?;
            self.encryptor.open_fields(&mut item.metadata)?;
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    pub fn update(&self, item: &Item) -> Result<()> {
        // Same write path; redb insert is an upsert.
        self.insert(item)
    }

    pub fn soft_delete(&self, uuid: &Uuid) -> Result<bool> {
        let existing = self.get(uuid)?;
        match existing {
            Some(mut item) => {
                let now = chrono::Utc::now().timestamp_millis();
                item.deleted_at = Some(now);
                item.updated_at = now;
                self.update(&item)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn list_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Item>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ITEMS_TABLE)?;

        let mut items = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let mut item: Item = serde_json::from_slice(value.value())?;
            if item.owner_id == *owner_id && !item.is_deleted() {
                self.encryptor.open_fields(&mut item.metadata)?;
                items.push(item);
            }
        }
        Ok(items)
    }
}
