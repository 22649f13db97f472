use crate::models::Plan;
use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;

const PLANS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("plans");

/// Read-only reference data for the subscription engine; seeded at startup.
#[derive(Clone)]
pub struct PlanStorage {
    db: Arc<Database>,
}

impl PlanStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(PLANS_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Seed the default catalog, keeping any existing rows.
    pub fn init(&self) -> Result<()> {
        let defaults = [
            Plan {
                code: "free".into(),
                name: "Free".into(),
                is_active: true,
                seat_based: false,
            },
            Plan {
                code: "premium".into(),
                name: "Premium".into(),
                is_active: true,
                seat_based: false,
            },
            Plan {
                code: "family".into(),
                name: "Family".into(),
                is_active: true,
                seat_based: false,
            },
            Plan {
                code: "team".into(),
                name: "Team".into(),
                is_active: true,
                seat_based: true,
            },
            Plan {
                code: "business".into(),
                name: "Business".into(),
                is_active: true,
                seat_based: true,
            },
        ];
        for plan in defaults {
            if self.get_by_code(&plan.code)?.is_none() {
                self.upsert(&plan)?;
            }
        }
        Ok(())
    }

    pub fn upsert(&self, plan: &Plan) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PLANS_TABLE)?;
            let json = serde_json::to_vec(plan)?;
            table.insert(plan.code.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_by_code(&self, code: &str) -> Result<Option<Plan>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLANS_TABLE)?;

        if let Some(value) = table.get(code)? {
            Ok(Some(serde_json::from_slice(value.value())?))
        } else {
            Ok(None)
        }
    }

    pub fn list(&self) -> Result<Vec<Plan>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLANS_TABLE)?;

        let mut plans = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            plans.push(serde_json::from_slice(value.value())?);
        }
        Ok(plans)
    }
}
