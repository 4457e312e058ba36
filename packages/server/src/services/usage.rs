use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect,
    Set,
};
use tracing::{debug, instrument, warn};

use crate::entity::{file, storage_usage};

pub const BYTES_PER_MB: f64 = (1024 * 1024) as f64;

/// Rebuilds the ledger row for `user_id` from the file catalog and
/// returns the fresh value in megabytes.
///
/// The aggregate is always recomputed from scratch rather than adjusted
/// by a delta, so a missed or failed update is repaired by whichever
/// recompute runs next.
#[instrument(skip(db))]
pub async fn recompute<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<f64, DbErr> {
    let sizes: Vec<i64> = file::Entity::find()
        .select_only()
        .column(file::Column::SizeBytes)
        .filter(file::Column::OwnerId.eq(user_id))
        .into_tuple()
        .all(db)
        .await?;
    let total_bytes: i64 = sizes.iter().sum();
    let used_mb = total_bytes as f64 / BYTES_PER_MB;

    let now = Utc::now();
    let row = storage_usage::ActiveModel {
        user_id: Set(user_id),
        used_storage_mb: Set(used_mb),
        last_calculated: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    storage_usage::Entity::insert(row)
        .on_conflict(
            OnConflict::column(storage_usage::Column::UserId)
                .update_columns([
                    storage_usage::Column::UsedStorageMb,
                    storage_usage::Column::LastCalculated,
                    storage_usage::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    debug!(user_id, used_mb, "usage ledger recomputed");
    Ok(used_mb)
}

/// Recompute after an upload or delete has already changed the catalog.
/// Never fails the caller, since the catalog mutation is already
/// committed. One retry, then a warning; the next catalog change repairs
/// the value.
pub async fn recompute_after_change(db: &DatabaseConnection, user_id: i32) {
    for attempt in 1..=2u8 {
        match recompute(db, user_id).await {
            Ok(_) => return,
            Err(err) if attempt < 2 => {
                debug!(user_id, "usage recompute failed, retrying once: {err}");
            }
            Err(err) => {
                warn!(
                    user_id,
                    "usage recompute failed after catalog change, ledger stale until next change: {err}"
                );
            }
        }
    }
}

/// Current ledger value without touching the catalog; accounts that never
/// uploaded read as zero.
pub async fn current_used_mb<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<f64, DbErr> {
    let row = storage_usage::Entity::find()
        .filter(storage_usage::Column::UserId.eq(user_id))
        .one(db)
        .await?;
    Ok(row.map(|r| r.used_storage_mb).unwrap_or(0.0))
}

/// Fetches the ledger row for `user_id`, creating a zeroed one on first
/// access.
pub async fn get_or_init(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<storage_usage::Model, DbErr> {
    if let Some(row) = storage_usage::Entity::find()
        .filter(storage_usage::Column::UserId.eq(user_id))
        .one(db)
        .await?
    {
        return Ok(row);
    }

    let now = Utc::now();
    let fresh = storage_usage::ActiveModel {
        user_id: Set(user_id),
        used_storage_mb: Set(0.0),
        last_calculated: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    match storage_usage::Entity::insert(fresh)
        .on_conflict(
            OnConflict::column(storage_usage::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
    {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(err) => return Err(err),
    }

    storage_usage::Entity::find()
        .filter(storage_usage::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| DbErr::Custom("usage row vanished after insert".into()))
}
