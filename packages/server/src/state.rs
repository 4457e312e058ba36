use std::sync::Arc;

use common::storage::BlobStore;
use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, mailer::Mailer, utils::otp::OtpStore};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob_store: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
    pub otp: Arc<OtpStore>,
    pub config: AppConfig,
}
