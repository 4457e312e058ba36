use std::path::PathBuf;

use axum::{
    Json,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use common::storage::BoxReader;
use tokio::{fs::File as TokioFile, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entity::file,
    error::{AppError, ErrorBody},
    extractors::{AppJson, AuthUser},
    models::storage::{
        CreateDirectoryRequest, DirectoryListResponse, DirectoryResponse, FileListResponse,
        FileResponse, ListFilesParams, RenameDirectoryRequest, UploadParams, UsageResponse,
    },
    services::{files, files::NewUpload, usage},
    state::AppState,
};

/// Body cap for the multipart upload route. Slightly above the blob limit
/// so the multipart framing itself does not trip the cap before the
/// per-file check does.
pub fn upload_body_limit(config: &AppConfig) -> DefaultBodyLimit {
    DefaultBodyLimit::max(config.storage.max_upload_size as usize + 1024 * 1024)
}

#[utoipa::path(
    post,
    path = "/directories",
    tag = "Files",
    operation_id = "files_create_directory",
    summary = "Create a directory",
    request_body = CreateDirectoryRequest,
    responses(
        (status = 201, description = "Directory created", body = DirectoryResponse),
        (status = 400, description = "Invalid name", body = ErrorBody),
        (status = 409, description = "Name already used", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn create_directory(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateDirectoryRequest>,
) -> Result<(StatusCode, Json<DirectoryResponse>), AppError> {
    let account = auth_user.fetch_account(&state.db).await?;
    let dir = files::create_directory(&state.db, &account, &payload.dir_name).await?;
    Ok((StatusCode::CREATED, Json(dir.into())))
}

#[utoipa::path(
    get,
    path = "/directories",
    tag = "Files",
    operation_id = "files_list_directories",
    summary = "List the caller's directories",
    responses(
        (status = 200, description = "Directories sorted by name", body = DirectoryListResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_directories(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DirectoryListResponse>, AppError> {
    let dirs = files::list_directories(&state.db, auth_user.user_id).await?;
    let total = dirs.len() as u64;
    Ok(Json(DirectoryListResponse {
        directories: dirs.into_iter().map(DirectoryResponse::from).collect(),
        total,
    }))
}

#[utoipa::path(
    patch,
    path = "/directories/{directory}",
    tag = "Files",
    operation_id = "files_rename_directory",
    summary = "Rename a directory",
    description = "Files inside keep their directory id and follow the rename.",
    params(("directory" = String, Path, description = "Current directory name")),
    request_body = RenameDirectoryRequest,
    responses(
        (status = 200, description = "Directory renamed", body = DirectoryResponse),
        (status = 404, description = "No such directory", body = ErrorBody),
        (status = 409, description = "Target name already used", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, directory = %directory))]
pub async fn rename_directory(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(directory): Path<String>,
    AppJson(payload): AppJson<RenameDirectoryRequest>,
) -> Result<Json<DirectoryResponse>, AppError> {
    let dir =
        files::rename_directory(&state.db, auth_user.user_id, &directory, &payload.new_name)
            .await?;
    Ok(Json(dir.into()))
}

#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: String,
}

#[utoipa::path(
    post,
    path = "/upload/{directory}",
    tag = "Files",
    operation_id = "files_upload",
    summary = "Upload a file",
    description = "Streams the `file` multipart field into the blob store. The directory is \
                   created on the fly if it does not exist. A name collision keeps the existing \
                   file and stores the upload under a timestamped name unless `keep=false`, \
                   which replaces it.",
    params(
        ("directory" = String, Path, description = "Target directory name"),
        UploadParams,
    ),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = FileResponse),
        (status = 400, description = "Invalid name or malformed body", body = ErrorBody),
        (status = 507, description = "Upload would exceed the storage quota", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, params, multipart), fields(user_id = auth_user.user_id, directory = %directory))]
pub async fn upload_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(directory): Path<String>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>), AppError> {
    let account = auth_user.fetch_account(&state.db).await?;

    let mut spooled: Option<(PathBuf, i64)> = None;
    let mut field_file_name: Option<String> = None;
    let mut field_content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if let Some((stale, _)) = spooled.take() {
            let _ = tokio::fs::remove_file(&stale).await;
        }
        field_file_name = field.file_name().map(str::to_owned);
        field_content_type = field.content_type().map(str::to_owned);
        spooled = Some(spool_field_to_temp(field, state.config.storage.max_upload_size).await?);
    }

    let Some((temp_path, size_bytes)) = spooled else {
        return Err(AppError::Validation("Multipart field 'file' is required".into()));
    };

    let chosen_name = params
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .or(field_file_name);

    let result = async {
        let Some(file_name) = chosen_name.as_deref() else {
            return Err(AppError::Validation("No filename provided".into()));
        };
        let reader: BoxReader = Box::new(
            TokioFile::open(&temp_path)
                .await
                .map_err(|e| AppError::Internal(format!("reopening spooled upload: {e}")))?,
        );
        files::upload(
            &state.db,
            &*state.blob_store,
            NewUpload {
                owner: &account,
                directory: &directory,
                file_name,
                content_type: field_content_type.clone(),
                size_bytes,
                keep_existing: params.keep.unwrap_or(true),
            },
            reader,
        )
        .await
    }
    .await;
    let _ = tokio::fs::remove_file(&temp_path).await;

    let stored = result?;
    Ok((StatusCode::CREATED, Json(stored.into())))
}

#[utoipa::path(
    get,
    path = "/download/{directory}/{filename}",
    tag = "Files",
    operation_id = "files_download",
    summary = "Download a file",
    description = "Streams the file content. Sends a strong ETag derived from the content hash \
                   and honours `If-None-Match` with 304.",
    params(
        ("directory" = String, Path, description = "Directory name"),
        ("filename" = String, Path, description = "File name"),
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Client copy is current"),
        (status = 404, description = "No such file", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(user_id = auth_user.user_id, directory = %directory, filename = %filename))]
pub async fn download_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((directory, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (record, reader) = files::open_download(
        &state.db,
        &*state.blob_store,
        auth_user.user_id,
        &directory,
        &filename,
    )
    .await?;

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());
    build_file_response(&record, reader, if_none_match)
}

#[utoipa::path(
    get,
    path = "/list",
    tag = "Files",
    operation_id = "files_list",
    summary = "List files",
    description = "Newest first. Scope with `directory`, page with `limit` and `offset`.",
    params(ListFilesParams),
    responses(
        (status = 200, description = "One page of files plus the total count", body = FileListResponse),
        (status = 404, description = "Scoping directory does not exist", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, params), fields(user_id = auth_user.user_id))]
pub async fn list_files(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListFilesParams>,
) -> Result<Json<FileListResponse>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);

    let (page, total) = files::list_files(
        &state.db,
        auth_user.user_id,
        params.directory.as_deref(),
        limit,
        offset,
    )
    .await?;

    Ok(Json(FileListResponse {
        files: page.into_iter().map(FileResponse::from).collect(),
        total,
    }))
}

#[utoipa::path(
    delete,
    path = "/{directory}/{filename}",
    tag = "Files",
    operation_id = "files_delete",
    summary = "Delete a file",
    description = "Removes the content from the blob store (unless other files still share it) \
                   and then the catalog entry.",
    params(
        ("directory" = String, Path, description = "Directory name"),
        ("filename" = String, Path, description = "File name"),
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 404, description = "No such file", body = ErrorBody),
        (status = 503, description = "Blob store unreachable", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id, directory = %directory, filename = %filename))]
pub async fn delete_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((directory, filename)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let account = auth_user.fetch_account(&state.db).await?;
    files::delete(&state.db, &*state.blob_store, &account, &directory, &filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/usage",
    tag = "Files",
    operation_id = "files_usage",
    summary = "Current storage usage",
    description = "Reads the usage ledger; a first call for a fresh account reports zero.",
    responses(
        (status = 200, description = "Usage in megabytes", body = UsageResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_usage(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UsageResponse>, AppError> {
    let row = usage::get_or_init(&state.db, auth_user.user_id).await?;
    Ok(Json(row.into()))
}

/// Spools one multipart field to a private temp file, counting bytes and
/// enforcing the upload cap. The temp file is removed on failure; on
/// success the caller owns it.
async fn spool_field_to_temp(
    mut field: Field<'_>,
    max_size: u64,
) -> Result<(PathBuf, i64), AppError> {
    let path = std::env::temp_dir().join(format!("cumulus-upload-{}", Uuid::new_v4()));
    let mut out = TokioFile::create(&path)
        .await
        .map_err(|e| AppError::Internal(format!("creating spool file: {e}")))?;

    let mut written: u64 = 0;
    let result = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
        {
            written += chunk.len() as u64;
            if written > max_size {
                return Err(AppError::Validation(format!(
                    "File exceeds the {max_size} byte upload limit"
                )));
            }
            out.write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("writing spool file: {e}")))?;
        }
        out.flush()
            .await
            .map_err(|e| AppError::Internal(format!("flushing spool file: {e}")))?;
        Ok(written as i64)
    }
    .await;

    match result {
        Ok(size) => Ok((path, size)),
        Err(err) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(err)
        }
    }
}

/// Assembles the streaming download response: content headers, strong
/// ETag from the content hash, 304 when the client already holds the
/// current bytes.
fn build_file_response(
    record: &file::Model,
    reader: BoxReader,
    if_none_match: Option<&str>,
) -> Result<Response, AppError> {
    let etag = format!("\"{}\"", record.blob_key);

    if let Some(candidate) = if_none_match
        && candidate == etag
    {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, etag)
            .body(Body::empty())
            .map_err(|e| AppError::Internal(format!("building 304 response: {e}")));
    }

    let stream = ReaderStream::new(reader);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, record.content_type.as_str())
        .header(header::CONTENT_LENGTH, record.size_bytes)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&record.file_name),
        )
        .header(header::ETAG, etag)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("building download response: {e}")))
}

/// `attachment` disposition with an ASCII fallback name plus an RFC 5987
/// `filename*` parameter when the real name needs it.
fn content_disposition_value(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect();
    let fallback = if ascii.is_empty() { "download".to_owned() } else { ascii };

    if file_name.is_ascii() {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        let encoded: String = file_name
            .bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                    (b as char).to_string()
                }
                _ => format!("%{b:02X}"),
            })
            .collect();
        format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
    }
}
