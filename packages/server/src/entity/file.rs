use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog row for one stored file. The row is the system of record for
/// name, ownership and size; the bytes live in the blob store under
/// `blob_key`, and several rows may share one blob. `(file_name,
/// directory_id)` carries no schema-level uniqueness; name collisions are
/// resolved in the upload path.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub owner_id: i32,
    #[sea_orm(belongs_to, from = "owner_id", to = "id")]
    pub owner: HasOne<super::user::Entity>,
    /// Owner display name frozen at upload time.
    pub owner_name: String,
    pub size_bytes: i64,
    /// Hex SHA-256 of the content, the key into the blob store.
    pub blob_key: String,
    pub directory_id: Uuid,
    #[sea_orm(belongs_to, from = "directory_id", to = "id")]
    pub directory: HasOne<super::directory::Entity>,
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
