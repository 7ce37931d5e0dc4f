//! File content, deletion and upload endpoints.
//!
//! Handlers touch the filesystem only. The cache picks up their effects on the
//! next sync cycle, which they request early. File bodies are streamed in both
//! directions and never held in memory whole.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Request, State};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::Response;
use axum::Json;
use fileindex::path::{clean_filename, resource_url, split_path_segments};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::server::error::ApiError;
use crate::server::{request_key, ServerState};

const FILE_FIELD: &str = "uploadfile";
const DIRS_FIELD: &str = "dirs[]";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const STAGING_PREFIX: &str = ".silo-upload-";

static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// Response payload for a stored upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub content_url: String,
    pub directories: Vec<String>,
}

/// GET /content/*key
///
/// Streams the file with the sniffed content type. `Range` and conditional
/// requests are honoured.
pub(crate) async fn content(
    State(state): State<Arc<ServerState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let key = request_key(request.uri(), "/content");
    let entry = state.store.get(&key)?;
    if entry.is_directory {
        return Err(ApiError::bad_request(format!("not a file: {key}")));
    }

    let path = entry.absolute_path();
    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if response.status() == StatusCode::NOT_FOUND {
        tracing::warn!(key = %key, path = %path.display(), "content file missing");
        return Err(ApiError::not_found(format!("file not found: {key}")));
    }

    let mut response = response.map(Body::new);
    if response.status().is_success() {
        let content_type = if entry.content_type.is_empty() {
            FALLBACK_CONTENT_TYPE
        } else {
            entry.content_type.as_str()
        };
        if let Ok(value) = HeaderValue::from_str(content_type) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    Ok(response)
}

/// DELETE /content/*key
pub(crate) async fn delete_content(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
) -> Result<StatusCode, ApiError> {
    let key = request_key(&uri, "/content");
    remove_entry(&state, &key).await
}

/// DELETE /delete/*key
pub(crate) async fn delete(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
) -> Result<StatusCode, ApiError> {
    let key = request_key(&uri, "/delete");
    remove_entry(&state, &key).await
}

async fn remove_entry(state: &ServerState, key: &str) -> Result<StatusCode, ApiError> {
    let entry = state.store.get(key)?;
    if let Err(error) = tokio::fs::remove_file(entry.absolute_path()).await {
        tracing::warn!(key, %error, "delete failed");
        return Err(ApiError::not_found(format!("file not found: {key}")));
    }
    tracing::info!(key, "deleted file");
    state.request_sync();
    Ok(StatusCode::NO_CONTENT)
}

/// Upload body written to a hidden file in the base directory and renamed
/// into place once the whole form has been read. The target directory comes
/// from `dirs[]`, which may follow the file part. Removed on drop unless
/// persisted.
struct StagedUpload {
    path: PathBuf,
    persisted: bool,
}

impl StagedUpload {
    fn new(base_dir: &Path) -> Self {
        let id = NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("{STAGING_PREFIX}{}-{id}.part", std::process::id());
        Self {
            path: base_dir.join(name),
            persisted: false,
        }
    }

    /// Copies `field` chunk by chunk into the staging file.
    async fn write_field(&self, field: &mut Field<'_>) -> Result<u64, ApiError> {
        let mut file = tokio::fs::File::create(&self.path).await.map_err(|error| {
            tracing::warn!(path = %self.path.display(), %error, "upload staging failed");
            ApiError::bad_request("unable to store file")
        })?;
        let mut written = 0u64;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|error| ApiError::bad_request(format!("unable to read upload: {error}")))?
        {
            file.write_all(&chunk).await.map_err(|error| {
                tracing::warn!(path = %self.path.display(), %error, "upload write failed");
                ApiError::bad_request("unable to store file")
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|error| {
            tracing::warn!(path = %self.path.display(), %error, "upload flush failed");
            ApiError::bad_request("unable to store file")
        })?;
        Ok(written)
    }

    async fn persist(mut self, target: &Path) -> Result<(), ApiError> {
        tokio::fs::rename(&self.path, target).await.map_err(|error| {
            tracing::warn!(path = %target.display(), %error, "upload move failed");
            ApiError::bad_request("unable to store file")
        })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// POST /upload
///
/// Multipart form with an `uploadfile` file field and optional `dirs[]` text
/// fields naming the target directory below the base directory.
pub(crate) async fn upload(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<(String, StagedUpload, u64)> = None;
    let mut raw_dirs = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(|error| {
        ApiError::bad_request(format!("unable to handle multipart form: {error}"))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let staged = StagedUpload::new(&state.base_dir);
                let bytes = staged.write_field(&mut field).await?;
                upload = Some((file_name, staged, bytes));
            }
            DIRS_FIELD | "dirs" => {
                let value = field.text().await.map_err(|error| {
                    ApiError::bad_request(format!("unable to read dirs: {error}"))
                })?;
                raw_dirs.push(value);
            }
            _ => {}
        }
    }

    let (raw_name, staged, bytes) =
        upload.ok_or_else(|| ApiError::bad_request(format!("missing {FILE_FIELD} field")))?;
    let filename = clean_filename(&raw_name);
    if filename.is_empty() || filename == "." {
        return Err(ApiError::bad_request(format!(
            "unusable file name: {raw_name:?}"
        )));
    }
    let directories = upload_directories(&raw_dirs)?;

    let target = upload_target(&state.base_dir, &directories, &filename);
    staged.persist(&target).await?;

    let mut key = String::new();
    for segment in directories.iter().chain(std::iter::once(&filename)) {
        key.push('/');
        key.push_str(segment);
    }
    tracing::info!(key = %key, bytes, "stored upload");
    state.request_sync();

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Upload succeeded".to_string(),
            filename,
            content_url: resource_url("content", &key),
            directories,
        }),
    ))
}

/// Flattens `dirs[]` values into path segments, rejecting any that would
/// leave the base directory.
fn upload_directories(raw_dirs: &[String]) -> Result<Vec<String>, ApiError> {
    let mut directories = Vec::new();
    for raw in raw_dirs {
        for segment in split_path_segments(raw) {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(ApiError::bad_request(format!(
                    "invalid directory segment: {segment:?}"
                )));
            }
            directories.push(segment);
        }
    }
    Ok(directories)
}

fn upload_target(base_dir: &Path, directories: &[String], filename: &str) -> PathBuf {
    let mut target = base_dir.to_path_buf();
    target.extend(directories);
    target.push(filename);
    target
}
