use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::entity::{directory, file, storage_usage};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDirectoryRequest {
    pub dir_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameDirectoryRequest {
    pub new_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DirectoryResponse {
    pub id: String,
    pub dir_name: String,
    pub owner_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<directory::Model> for DirectoryResponse {
    fn from(dir: directory::Model) -> Self {
        DirectoryResponse {
            id: dir.id.to_string(),
            dir_name: dir.dir_name,
            owner_name: dir.owner_name,
            created_at: dir.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DirectoryListResponse {
    pub directories: Vec<DirectoryResponse>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub directory_id: String,
    pub owner_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<file::Model> for FileResponse {
    fn from(record: file::Model) -> Self {
        FileResponse {
            id: record.id.to_string(),
            file_name: record.file_name,
            content_type: record.content_type,
            size_bytes: record.size_bytes,
            blob_key: record.blob_key,
            directory_id: record.directory_id.to_string(),
            owner_name: record.owner_name,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    pub used_storage_mb: f64,
    pub last_calculated: DateTime<Utc>,
}

impl From<storage_usage::Model> for UsageResponse {
    fn from(row: storage_usage::Model) -> Self {
        UsageResponse {
            used_storage_mb: row.used_storage_mb,
            last_calculated: row.last_calculated,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UploadParams {
    /// Overrides the filename carried by the multipart field.
    pub filename: Option<String>,
    /// On a name collision keep the existing file and store the upload
    /// under a timestamped name (default), or replace it when false.
    pub keep: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListFilesParams {
    /// Restrict the listing to one directory.
    pub directory: Option<String>,
    /// Page size, clamped to 1..=100. Defaults to 20.
    pub limit: Option<u64>,
    /// Rows to skip before the page starts.
    pub offset: Option<u64>,
}
