pub mod files;
pub mod quota;
pub mod subscriptions;
pub mod usage;
