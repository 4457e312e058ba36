use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-user usage ledger, one row per account. `used_storage_mb` is a
/// cached aggregate over the file catalog and is rebuilt from scratch on
/// every recompute rather than adjusted incrementally.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,
    pub used_storage_mb: f64,
    pub last_calculated: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
