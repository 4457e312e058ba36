use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    /// Argon2 hash, never the plain password.
    pub password: String,
    /// Set once the email verification code has been confirmed.
    pub is_active: bool,
    pub is_admin: bool,
    /// Fallback ceiling in megabytes, used while no subscription is active.
    pub storage_quota_mb: i32,
    #[sea_orm(has_many)]
    pub subscriptions: HasMany<super::subscription::Entity>,
    #[sea_orm(has_many)]
    pub files: HasMany<super::file::Entity>,
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
