pub mod directory;
pub mod file;
pub mod plan;
pub mod storage_usage;
pub mod subscription;
pub mod user;
