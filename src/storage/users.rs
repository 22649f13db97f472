use crate::models::User;
use anyhow::Result;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::sync::Arc;
use uuid::Uuid;

const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
// Secondary index: lowercased email -> user id.
const EMAIL_INDEX: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");

#[derive(Clone)]
pub struct UserStorage {
    db: Arc<Database>,
}

impl UserStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(USERS_TABLE)?;
        write_txn.open_table(EMAIL_INDEX)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn insert(&self, user: &User) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS_TABLE)?;
            let json = serde_json::to_vec(user)?;
            table.insert(user.id.to_string().as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(EMAIL_INDEX)?;
            index.insert(
                user.email.to_lowercase().as_str(),
                user.id.to_string().as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;

        if let Some(value) = table.get(id.to_string().as_str())? {
            Ok(Some(serde_json::from_slice(value.value())?))
        } else {
            Ok(None)
        }
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(EMAIL_INDEX)?;

        let id = match index.get(email.to_lowercase().as_str())? {
            Some(value) => value.value().parse::<Uuid>()?,
            None => return Ok(None),
        };
        drop(index);
        self.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn email_lookup_is_case_insensitive() {
        let temp_dir = tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("test.db")).unwrap());
        let storage = UserStorage::new(db).unwrap();

        let user = User::new("Alice@Example.com".into());
        storage.insert(&user).unwrap();

        let found = storage.find_by_email("alice@example.COM").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(storage.find_by_email("bob@example.com").unwrap().is_none());
    }
}
