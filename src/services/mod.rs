pub mod audit;
pub mod billing;
pub mod bulk_email;
pub mod items;
pub mod shares;
pub mod subscriptions;
