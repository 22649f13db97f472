use crate::models::{Subscription, SubscriptionScope};
use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;

const SUBSCRIPTIONS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("subscriptions");

/// One subscription row per scope (`org:<uuid>` / `user:<uuid>`).
///
/// All mutations go through [`SubscriptionStorage::mutate`], which performs
/// the read-modify-write inside a single write transaction. redb admits one
/// writer at a time, so racing admin actions and webhook deliveries for the
/// same scope serialize on the row with no lost-update window.
#[derive(Clone)]
pub struct SubscriptionStorage {
    db: Arc<Database>,
}

impl SubscriptionStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(SUBSCRIPTIONS_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn get(&self, scope: &SubscriptionScope) -> Result<Option<Subscription>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBSCRIPTIONS_TABLE)?;

        if let Some(value) = table.get(scope.storage_key().as_str())? {
            Ok(Some(serde_json::from_slice(value.value())?))
        } else {
            Ok(None)
        }
    }

    /// Read-modify-write under the write lock. `f` receives the current row
    /// (or `None`) and returns the row to persist, or an error to abort with
    /// nothing written.
    pub fn mutate<E, F>(&self, scope: &SubscriptionScope, f: F) -> Result<Subscription, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(Option<Subscription>) -> Result<Subscription, E>,
    {
        let key = scope.storage_key();
        let write_txn = self.db.begin_write().map_err(anyhow::Error::from)?;
        let updated = {
            let mut table = write_txn
                .open_table(SUBSCRIPTIONS_TABLE)
                .map_err(anyhow::Error::from)?;

            let current = match table.get(key.as_str()).map_err(anyhow::Error::from)? {
                Some(value) => {
                    Some(serde_json::from_slice(value.value()).map_err(anyhow::Error::from)?)
                }
                None => None,
            };

            let updated = f(current)?;
            let json = serde_json::to_vec(&updated).map_err(anyhow::Error::from)?;
            table
                .insert(key.as_str(), json.as_slice())
                .map_err(anyhow::Error::from)?;
            updated
        };
        write_txn.commit().map_err(anyhow::Error::from)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::SubscriptionState;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn setup() -> (SubscriptionStorage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("test.db")).unwrap());
        (SubscriptionStorage::new(db).unwrap(), temp_dir)
    }

    fn fresh(scope: SubscriptionScope) -> Subscription {
        Subscription {
            scope,
            state: SubscriptionState::Active,
            plan_code: "team".into(),
            stripe_subscription_id: None,
            seats: 1,
            started_at: chrono::Utc::now().timestamp_millis(),
            renew_at: None,
            cancel_at: None,
            ended_at: None,
            grace_period_ends_at: None,
            trial_ends_at: None,
        }
    }

    #[test]
    fn mutate_creates_when_absent() {
        let (storage, _tmp) = setup();
        let scope = SubscriptionScope::Organization(Uuid::new_v4());

        let sub = storage
            .mutate::<AppError, _>(&scope, |current| {
                assert!(current.is_none());
                Ok(fresh(scope))
            })
            .unwrap();
        assert_eq!(sub.plan_code, "team");
        assert!(storage.get(&scope).unwrap().is_some());
    }

    #[test]
    fn mutate_error_leaves_row_untouched() {
        let (storage, _tmp) = setup();
        let scope = SubscriptionScope::Organization(Uuid::new_v4());
        storage
            .mutate::<AppError, _>(&scope, |_| Ok(fresh(scope)))
            .unwrap();

        let result = storage.mutate::<AppError, _>(&scope, |current| {
            let mut sub = current.unwrap();
            sub.plan_code = "enterprise".into();
            Err(AppError::StripeManaged)
        });
        assert!(matches!(result, Err(AppError::StripeManaged)));
        assert_eq!(storage.get(&scope).unwrap().unwrap().plan_code, "team");
    }

    #[test]
    fn org_and_user_scopes_do_not_collide() {
        let (storage, _tmp) = setup();
        let id = Uuid::new_v4();
        let org_scope = SubscriptionScope::Organization(id);
        let user_scope = SubscriptionScope::User(id);

        storage
            .mutate::<AppError, _>(&org_scope, |_| Ok(fresh(org_scope)))
            .unwrap();
        assert!(storage.get(&user_scope).unwrap().is_none());
    }
}
