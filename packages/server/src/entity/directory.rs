use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A flat, user-owned folder. Directory names are unique per owner but not
/// globally; the composite index lives in `seed::ensure_indexes` since the
/// schema registry only covers single-column constraints declared inline.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "directory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub dir_name: String,
    pub owner_id: i32,
    #[sea_orm(belongs_to, from = "owner_id", to = "id")]
    pub owner: HasOne<super::user::Entity>,
    /// Owner display name frozen at creation; not synced with later renames.
    pub owner_name: String,
    #[sea_orm(has_many)]
    pub files: HasMany<super::file::Entity>,
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
