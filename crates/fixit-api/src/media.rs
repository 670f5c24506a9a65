use std::path::PathBuf;

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use fixit_types::api::UploadResponse;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Principal;
use crate::services::MediaStore;

/// 20 MB upload limit for report photos and videos
pub const MAX_MEDIA_SIZE: usize = 20 * 1024 * 1024;

const EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
];

fn extension_for(content_type: Option<&str>) -> &'static str {
    content_type
        .and_then(|ct| EXTENSIONS.iter().find(|(mime, _)| *mime == ct))
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

fn content_type_for(extension: &str) -> &'static str {
    EXTENSIONS
        .iter()
        .find(|(_, ext)| *ext == extension)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Split a media key `<uuid>.<ext>`; rejects anything else so keys can never
/// escape the media directory.
fn parse_key(key: &str) -> Option<(Uuid, &str)> {
    let (id, ext) = key.split_once('.')?;
    let id = id.parse::<Uuid>().ok()?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((id, ext))
}

/// Media kept on local disk and served back by this service.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalMediaStore {
    pub async fn new(dir: PathBuf, public_url: String) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, bytes: Bytes, content_type: Option<&str>) -> Result<String, ApiError> {
        let key = format!("{}.{}", Uuid::new_v4(), extension_for(content_type));
        let path = self.dir.join(&key);

        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create media file {}: {}", path.display(), e);
            ApiError::DependencyFailure("media store unavailable".into())
        })?;
        file.write_all(&bytes).await.map_err(|e| {
            error!("Failed to write media file {}: {}", path.display(), e);
            ApiError::DependencyFailure("media store unavailable".into())
        })?;

        info!("Stored media {} ({} bytes)", key, bytes.len());
        Ok(format!("{}/media/{}", self.public_url, key))
    }

    async fn fetch(&self, key: &str) -> Result<Option<(Vec<u8>, String)>, ApiError> {
        let Some((_, ext)) = parse_key(key) else {
            return Ok(None);
        };
        match tokio::fs::read(self.dir.join(key)).await {
            Ok(bytes) => Ok(Some((bytes, content_type_for(ext).to_string()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ApiError::DependencyFailure(format!("media read failed: {}", e))),
        }
    }
}

/// POST /media: raw body upload. Returns the URL to reference from reports.
pub async fn upload_media(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("empty upload".into()));
    }
    if bytes.len() > MAX_MEDIA_SIZE {
        return Err(ApiError::Validation(format!(
            "upload exceeds {} bytes",
            MAX_MEDIA_SIZE
        )));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let size = bytes.len() as u64;
    let url = state.services.media.upload(bytes, content_type).await?;
    info!("User {} uploaded {}", principal.id, url);

    Ok((StatusCode::CREATED, Json(UploadResponse { url, size })))
}

/// GET /media/{key}
pub async fn download_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (bytes, content_type) = state
        .services
        .media
        .fetch(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("Media"))?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
