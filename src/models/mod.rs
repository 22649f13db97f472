pub mod audit;
pub mod billing;
pub mod item;
pub mod organization;
pub mod share;
pub mod subscription;

pub use audit::{ActivityEntry, ClientMeta};
pub use billing::{
    BillingCycle, ProductMapping, RevenueCatEvent, RevenueCatEventType, RevenueCatWebhook,
    StripeEvent, map_product_id,
};
pub use item::{Item, ItemMetadata};
pub use organization::{Organization, OrganizationUser, Role, User};
pub use share::{ItemShare, ShareOutcome, SharePermissions};
pub use subscription::{Plan, Subscription, SubscriptionScope, SubscriptionState};
