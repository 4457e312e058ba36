mod common;

mod auth;
mod subscriptions;
