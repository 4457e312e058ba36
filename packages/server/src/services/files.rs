use chrono::Utc;
use common::storage::{BlobKey, BlobStore, BoxReader};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entity::{directory, file, user};
use crate::error::AppError;
use crate::services::{quota, usage};
use crate::utils::filename;

/// Everything the upload path needs besides the bytes themselves. The
/// byte count must already be known, since admission control runs before
/// the blob store is touched.
pub struct NewUpload<'a> {
    pub owner: &'a user::Model,
    pub directory: &'a str,
    pub file_name: &'a str,
    /// Content type reported by the client; when absent or empty the type
    /// is guessed from the file extension.
    pub content_type: Option<String>,
    pub size_bytes: i64,
    /// On a name collision: true puts the new upload under a timestamped
    /// name, false replaces the existing file.
    pub keep_existing: bool,
}

pub async fn find_directory(
    db: &DatabaseConnection,
    owner_id: i32,
    name: &str,
) -> Result<Option<directory::Model>, AppError> {
    let dir = directory::Entity::find()
        .filter(directory::Column::OwnerId.eq(owner_id))
        .filter(directory::Column::DirName.eq(name))
        .one(db)
        .await?;
    Ok(dir)
}

/// Creates a directory for `owner`, failing on a duplicate name. The
/// procedural check catches most duplicates; the unique index closes the
/// race between two concurrent creates.
pub async fn create_directory(
    db: &DatabaseConnection,
    owner: &user::Model,
    name: &str,
) -> Result<directory::Model, AppError> {
    let name = filename::validate_directory_name(name)
        .map_err(|e| AppError::Validation(e.message().into()))?;

    if find_directory(db, owner.id, name).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Directory '{name}' already exists"
        )));
    }

    let row = directory::ActiveModel {
        id: Set(Uuid::now_v7()),
        dir_name: Set(name.to_owned()),
        owner_id: Set(owner.id),
        owner_name: Set(owner.name.clone()),
        created_at: Set(Utc::now()),
    };
    match row.insert(db).await {
        Ok(dir) => {
            info!(owner_id = owner.id, directory = %dir.dir_name, "directory created");
            Ok(dir)
        }
        Err(err) => {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                return Err(AppError::Conflict(format!(
                    "Directory '{name}' already exists"
                )));
            }
            Err(err.into())
        }
    }
}

pub async fn list_directories(
    db: &DatabaseConnection,
    owner_id: i32,
) -> Result<Vec<directory::Model>, AppError> {
    let dirs = directory::Entity::find()
        .filter(directory::Column::OwnerId.eq(owner_id))
        .order_by_asc(directory::Column::DirName)
        .all(db)
        .await?;
    Ok(dirs)
}

/// Renames one of the owner's directories. Contained files keep their
/// `directory_id`, so they follow the rename without being touched.
pub async fn rename_directory(
    db: &DatabaseConnection,
    owner_id: i32,
    current: &str,
    new_name: &str,
) -> Result<directory::Model, AppError> {
    let new_name = filename::validate_directory_name(new_name)
        .map_err(|e| AppError::Validation(e.message().into()))?;

    let Some(dir) = find_directory(db, owner_id, current).await? else {
        return Err(AppError::NotFound(format!("Directory '{current}' not found")));
    };
    if dir.dir_name == new_name {
        return Ok(dir);
    }
    if find_directory(db, owner_id, new_name).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Directory '{new_name}' already exists"
        )));
    }

    let mut renamed: directory::ActiveModel = dir.into();
    renamed.dir_name = Set(new_name.to_owned());
    match renamed.update(db).await {
        Ok(dir) => Ok(dir),
        Err(err) => {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                return Err(AppError::Conflict(format!(
                    "Directory '{new_name}' already exists"
                )));
            }
            Err(err.into())
        }
    }
}

/// Uploads run the directory default: a missing directory is created on
/// the fly rather than rejected.
async fn resolve_or_create_directory(
    db: &DatabaseConnection,
    owner: &user::Model,
    name: &str,
) -> Result<directory::Model, AppError> {
    if let Some(dir) = find_directory(db, owner.id, name).await? {
        return Ok(dir);
    }
    match create_directory(db, owner, name).await {
        Ok(dir) => Ok(dir),
        // Lost a concurrent create; the directory exists now.
        Err(AppError::Conflict(_)) => find_directory(db, owner.id, name)
            .await?
            .ok_or_else(|| AppError::Internal(format!("directory '{name}' vanished after create"))),
        Err(err) => Err(err),
    }
}

async fn find_file(
    db: &DatabaseConnection,
    directory_id: Uuid,
    file_name: &str,
) -> Result<Option<file::Model>, AppError> {
    let record = file::Entity::find()
        .filter(file::Column::DirectoryId.eq(directory_id))
        .filter(file::Column::FileName.eq(file_name))
        .one(db)
        .await?;
    Ok(record)
}

/// Removes a catalog row and, when no other row references the same
/// content, its blob. The blob goes first; if the row delete then fails
/// the record is left dangling and logged.
async fn remove_file_record(
    db: &DatabaseConnection,
    store: &dyn BlobStore,
    record: &file::Model,
) -> Result<(), AppError> {
    let other_refs = file::Entity::find()
        .filter(file::Column::BlobKey.eq(&record.blob_key))
        .filter(file::Column::Id.ne(record.id))
        .count(db)
        .await?;

    let mut blob_removed = false;
    if other_refs == 0 {
        let key = BlobKey::from_hex(&record.blob_key)?;
        blob_removed = store.delete(&key).await?;
    }

    if let Err(err) = file::Entity::delete_by_id(record.id).exec(db).await {
        if blob_removed {
            warn!(
                file_id = %record.id,
                blob_key = %record.blob_key,
                "blob removed but catalog row deletion failed, row is dangling: {err}"
            );
        }
        return Err(err.into());
    }
    Ok(())
}

/// Full upload pipeline: validate the name, resolve the directory,
/// admission-check against the quota, settle name collisions, write the
/// blob, insert the catalog row, refresh the ledger.
pub async fn upload(
    db: &DatabaseConnection,
    store: &dyn BlobStore,
    new: NewUpload<'_>,
    reader: BoxReader,
) -> Result<file::Model, AppError> {
    let validated = filename::validate_file_name(new.file_name)
        .map_err(|e| AppError::Validation(e.message().into()))?;

    let dir = resolve_or_create_directory(db, new.owner, new.directory).await?;

    let decision = quota::check(db, new.owner, new.size_bytes).await?;
    if !decision.admitted {
        return Err(AppError::QuotaExceeded {
            used_mb: decision.used_mb,
            limit_mb: decision.ceiling_mb,
            requested_mb: decision.requested_mb,
        });
    }

    let mut final_name = validated.to_owned();
    if let Some(existing) = find_file(db, dir.id, &final_name).await? {
        if new.keep_existing {
            final_name = filename::disambiguate(&final_name, Utc::now());
        } else {
            remove_file_record(db, store, &existing).await?;
        }
    }

    let blob_key = store.insert_stream(reader).await?;

    let content_type = new
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| {
            mime_guess::from_path(&final_name)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_owned())
        });

    let record = file::ActiveModel {
        id: Set(Uuid::now_v7()),
        file_name: Set(final_name),
        content_type: Set(content_type),
        owner_id: Set(new.owner.id),
        owner_name: Set(new.owner.name.clone()),
        size_bytes: Set(new.size_bytes),
        blob_key: Set(blob_key.to_hex()),
        directory_id: Set(dir.id),
        created_at: Set(Utc::now()),
    };
    let stored = match record.insert(db).await {
        Ok(stored) => stored,
        Err(err) => {
            // The blob is already written; without its catalog row it is
            // orphaned until the same content is uploaded again.
            warn!(
                blob_key = %blob_key,
                "catalog insert failed after blob write, blob may be orphaned: {err}"
            );
            return Err(err.into());
        }
    };

    usage::recompute_after_change(db, new.owner.id).await;
    info!(
        owner_id = new.owner.id,
        file_id = %stored.id,
        directory = %dir.dir_name,
        size_bytes = stored.size_bytes,
        "file uploaded"
    );
    Ok(stored)
}

/// Resolves a file by owner, directory name and file name, and opens its
/// content for streaming.
pub async fn open_download(
    db: &DatabaseConnection,
    store: &dyn BlobStore,
    owner_id: i32,
    directory: &str,
    file_name: &str,
) -> Result<(file::Model, BoxReader), AppError> {
    let Some(dir) = find_directory(db, owner_id, directory).await? else {
        return Err(AppError::NotFound(format!("Directory '{directory}' not found")));
    };
    let Some(record) = find_file(db, dir.id, file_name).await? else {
        return Err(AppError::NotFound(format!("File '{file_name}' not found")));
    };

    let key = BlobKey::from_hex(&record.blob_key)?;
    let reader = store.open_read(&key).await?;
    Ok((record, reader))
}

/// Deletes a file: blob (when last reference) first, then the catalog
/// row, then the ledger refresh.
pub async fn delete(
    db: &DatabaseConnection,
    store: &dyn BlobStore,
    requester: &user::Model,
    directory: &str,
    file_name: &str,
) -> Result<(), AppError> {
    let Some(dir) = find_directory(db, requester.id, directory).await? else {
        return Err(AppError::NotFound(format!("Directory '{directory}' not found")));
    };
    let Some(record) = find_file(db, dir.id, file_name).await? else {
        return Err(AppError::NotFound(format!("File '{file_name}' not found")));
    };
    if record.owner_id != requester.id {
        return Err(AppError::PermissionDenied);
    }

    remove_file_record(db, store, &record).await?;
    usage::recompute_after_change(db, requester.id).await;
    info!(
        owner_id = requester.id,
        file_id = %record.id,
        "file deleted"
    );
    Ok(())
}

/// Newest-first page of the owner's files, optionally scoped to one
/// directory. Returns the page plus the total matching count.
pub async fn list_files(
    db: &DatabaseConnection,
    owner_id: i32,
    directory: Option<&str>,
    limit: u64,
    offset: u64,
) -> Result<(Vec<file::Model>, u64), AppError> {
    let mut query = file::Entity::find().filter(file::Column::OwnerId.eq(owner_id));

    if let Some(name) = directory {
        let Some(dir) = find_directory(db, owner_id, name).await? else {
            return Err(AppError::NotFound(format!("Directory '{name}' not found")));
        };
        query = query.filter(file::Column::DirectoryId.eq(dir.id));
    }

    let total = query.clone().count(db).await?;
    let page = query
        .order_by_desc(file::Column::CreatedAt)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await?;
    Ok((page, total))
}
