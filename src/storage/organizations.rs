use crate::models::{Organization, OrganizationUser, Role};
use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;
use uuid::Uuid;

const ORGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("organizations");
// Keyed by `{org_id}:{user_id}` so one org's memberships form a contiguous range.
const MEMBERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("organization_users");

#[derive(Clone)]
pub struct OrganizationStorage {
    db: Arc<Database>,
}

impl OrganizationStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(ORGS_TABLE)?;
        write_txn.open_table(MEMBERS_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn insert(&self, org: &Organization) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ORGS_TABLE)?;
            let json = serde_json::to_vec(org)?;
            table.insert(org.id.to_string().as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Organization>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORGS_TABLE)?;

        if let Some(value) = table.get(id.to_string().as_str())? {
            Ok(Some(serde_json::from_slice(value.value())?))
        } else {
            Ok(None)
        }
    }

    pub fn upsert_member(&self, member: &OrganizationUser) -> Result<()> {
        let key = format!("{}:{}", member.org_id, member.user_id);
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MEMBERS_TABLE)?;
            let json = serde_json::to_vec(member)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn role_of(&self, org_id: &Uuid, user_id: &Uuid) -> Result<Option<Role>> {
        let key = format!("{org_id}:{user_id}");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMBERS_TABLE)?;

        if let Some(value) = table.get(key.as_str())? {
            let member: OrganizationUser = serde_json::from_slice(value.value())?;
            Ok(Some(member.role))
        } else {
            Ok(None)
        }
    }

    pub fn is_admin(&self, org_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        Ok(self
            .role_of(org_id, user_id)?
            .is_some_and(|role| role.is_admin()))
    }

    pub fn list_members(&self, org_id: &Uuid) -> Result<Vec<OrganizationUser>> {
        let prefix = format!("{org_id}:");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMBERS_TABLE)?;

        let mut members = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            members.push(serde_json::from_slice(value.value())?);
        }
        Ok(members)
    }
}
