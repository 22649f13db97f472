//! Persistence layer: redb embedded KV, one table per entity, JSON values.

pub mod audit;
pub mod encryption;
pub mod items;
pub mod organizations;
pub mod plans;
pub mod shares;
pub mod subscriptions;
pub mod users;
pub mod webhook_events;

use anyhow::Result;
use redb::Database;
use std::sync::Arc;

pub use audit::AuditStorage;
pub use encryption::{EncryptedFields, FieldEncryptor};
pub use items::ItemStorage;
pub use organizations::OrganizationStorage;
pub use plans::PlanStorage;
pub use shares::ShareStorage;
pub use subscriptions::SubscriptionStorage;
pub use users::UserStorage;
pub use webhook_events::WebhookEventStorage;

/// Central storage manager that initializes all storage subsystems.
pub struct Storage {
    pub items: ItemStorage,
    pub shares: ShareStorage,
    pub subscriptions: SubscriptionStorage,
    pub plans: PlanStorage,
    pub organizations: OrganizationStorage,
    pub users: UserStorage,
    pub audit: AuditStorage,
    pub webhook_events: WebhookEventStorage,
}

impl Storage {
    /// Open (or create) the database and initialize every table. The
    /// passphrase feeds the at-rest field encryptor only; vault payloads are
    /// client-side ciphertext and never touch it.
    pub fn new(path: &str, at_rest_passphrase: &str) -> Result<Self> {
        let db = Arc::new(Database::create(path)?);
        let encryptor = Arc::new(FieldEncryptor::new(at_rest_passphrase));

        let items = ItemStorage::new(db.clone(), encryptor)?;
        let shares = ShareStorage::new(db.clone())?;
        let subscriptions = SubscriptionStorage::new(db.clone())?;
        let plans = PlanStorage::new(db.clone())?;
        let organizations = OrganizationStorage::new(db.clone())?;
        let users = UserStorage::new(db.clone())?;
        let audit = AuditStorage::new(db.clone())?;
        let webhook_events = WebhookEventStorage::new(db.clone())?;

        plans.init()?;

        Ok(Self {
            items,
            shares,
            subscriptions,
            plans,
            organizations,
            users,
            audit,
            webhook_events,
        })
    }
}
