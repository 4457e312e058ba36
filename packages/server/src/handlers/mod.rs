pub mod auth;
pub mod payment;
pub mod storage;
pub mod subscription;
