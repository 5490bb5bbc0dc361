use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::resources::Resource;
use crate::api::auth::Caller;
use crate::api::response::{ApiError, JSend};
use crate::object_store::ObjectStoreError;
use crate::storage::models::{
    DerivativeStatus, ExifData, FileRecord, FileState, FileType, ImageRecord, VideoRecord,
};
use crate::storage::Viewer;
use crate::upload::{self, imaging, NewUpload};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub created_at: String,
    pub file_type: FileType,
    pub hash: String,
    pub id: String,
    pub is_public: bool,
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub address: Option<String>,
    pub category: String,
    pub compressed_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub derivative_status: DerivativeStatus,
    pub exif: Option<ExifData>,
    pub height: u32,
    pub id: String,
    pub is_public: bool,
    pub original_url: String,
    pub owner_id: String,
    pub thumbnail_10x: String,
    pub thumbnail_320x_url: String,
    pub thumbnail_768x_url: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub width: u32,
}

#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub fps: Option<f64>,
    pub height: Option<u32>,
    pub id: String,
    pub is_public: bool,
    pub owner_id: String,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub width: Option<u32>,
}

pub fn content_url(file_id: &str) -> String {
    format!("/api/assets/files/{file_id}/content")
}

pub fn image_response(image: ImageRecord) -> ImageResponse {
    ImageResponse {
        address: image.address,
        category: image.category,
        compressed_url: image.compressed_file_id.as_deref().map(content_url),
        created_at: image.created_at,
        derivative_status: image.derivative_status,
        exif: image.exif,
        height: image.height,
        id: image.id,
        is_public: image.is_public,
        original_url: content_url(&image.original_file_id),
        owner_id: image.owner_id,
        thumbnail_10x: imaging::placeholder_data_uri(&image.thumbnail_10x),
        thumbnail_320x_url: content_url(&image.thumbnail_320x_file_id),
        thumbnail_768x_url: image.thumbnail_768x_file_id.as_deref().map(content_url),
        updated_at: image.updated_at,
        width: image.width,
    }
}

pub fn video_response(video: VideoRecord) -> VideoResponse {
    VideoResponse {
        category: video.category,
        created_at: video.created_at,
        duration_secs: video.duration_secs,
        fps: video.fps,
        height: video.height,
        id: video.id,
        is_public: video.is_public,
        owner_id: video.owner_id,
        updated_at: video.updated_at,
        url: content_url(&video.file_id),
        width: video.width,
    }
}

fn file_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        created_at: file.created_at.to_rfc3339(),
        file_type: file.file_type,
        hash: file.hash.clone(),
        id: file.id.clone(),
        is_public: file.is_public,
        mime_type: file.mime_type.clone(),
        url: content_url(&file.id),
    }
}

impl Resource for ImageRecord {
    type View = ImageResponse;

    fn view(_state: &AppState, _viewer: &Viewer, record: Self) -> Result<Self::View, ApiError> {
        Ok(image_response(record))
    }
}

impl Resource for VideoRecord {
    type View = VideoResponse;

    fn view(_state: &AppState, _viewer: &Viewer, record: Self) -> Result<Self::View, ApiError> {
        Ok(video_response(record))
    }
}

// ============================================================================
// Multipart intake
// ============================================================================

struct UploadForm {
    data: Bytes,
    file_name: Option<String>,
    content_type: Option<String>,
    is_public: bool,
    category: String,
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        _ => Err(ApiError::bad_request(format!("{field} must be a boolean"))),
    }
}

fn too_large(max_upload_size: u64) -> ApiError {
    ApiError::payload_too_large(format!(
        "File exceeds maximum upload size of {max_upload_size} bytes"
    ))
}

/// Body-limit overflows surface from the multipart reader; keep them 413.
fn multipart_error(max_upload_size: u64, context: &str, e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_upload_size)
    } else {
        ApiError::bad_request(format!("{context}: {e}"))
    }
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let max = state.config.max_upload_size;
    let mut data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut is_public = false;
    let mut category = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(max, "Invalid multipart data", e))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                content_type = field.content_type().map(|s| s.to_string());

                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(max, "Failed to read file", e))?;

                if bytes.len() as u64 > max {
                    return Err(too_large(max));
                }
                data = Some(bytes);
            }
            "isPublic" | "is_public" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(max, "Invalid isPublic", e))?;
                is_public = parse_bool("isPublic", &text)?;
            }
            "category" => {
                category = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(max, "Invalid category", e))?
                    .trim()
                    .to_string();
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("file must not be empty"));
    }

    Ok(UploadForm {
        data,
        file_name,
        content_type,
        is_public,
        category,
    })
}

impl UploadForm {
    /// Multipart Content-Type, else a guess from the filename, else binary.
    fn mime_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|ct| ct != "application/octet-stream")
            .or_else(|| {
                self.file_name
                    .as_deref()
                    .and_then(|n| mime_guess::from_path(n).first())
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    fn into_upload(self, owner_id: &str) -> NewUpload {
        NewUpload {
            mime_type: self.mime_type(),
            data: self.data,
            owner_id: owner_id.to_string(),
            is_public: self.is_public,
            category: self.category,
        }
    }
}

// ============================================================================
// Files
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let owner = caller.require_user()?;
    let form = read_form(&state, multipart).await?;
    let file = upload::upload_file(&state, form.into_upload(owner)).await?;

    tracing::debug!(file_id = %file.id, path = %file.path, "Uploaded file");
    Ok(JSend::success(file_response(&file)))
}

/// Committed file visible to `viewer`, directly or through its media row.
fn readable_file(state: &AppState, id: &str, viewer: &Viewer) -> Result<FileRecord, ApiError> {
    let file = state
        .db
        .fetch::<FileRecord>(id)?
        .filter(|f| f.state == FileState::Committed)
        .ok_or_else(|| ApiError::not_found("Record not found"))?;

    if state.db.file_visible(&file, viewer)? {
        Ok(file)
    } else {
        Err(ApiError::not_found("Record not found"))
    }
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = readable_file(&state, &id, &caller.viewer)?;
    Ok(JSend::success(file_response(&file)))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let owner = caller.require_user()?;
    upload::delete_file(&state, &id, owner).await?;

    tracing::debug!(file_id = %id, "Deleted file");
    Ok(JSend::success(()))
}

/// Serve stored bytes with the recorded mime type.
pub async fn file_content(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = readable_file(&state, &id, &caller.viewer)?;

    let data = state
        .object_store
        .get(&file.path)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File content not found"),
            _ => ApiError::internal(format!("Failed to retrieve file: {e}")),
        })?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(file.byte_size),
    );
    if let Ok(value) = format!("\"{}\"", file.hash).parse() {
        headers.insert(header::ETAG, value);
    }

    // Content-addressed, so the bytes behind an id never change
    let cache = if file.is_public {
        "public, max-age=31536000, immutable"
    } else {
        "private, max-age=31536000, immutable"
    };
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static(cache));

    Ok(response)
}

// ============================================================================
// Images and videos
// ============================================================================

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<JSend<ImageResponse>>, ApiError> {
    let owner = caller.require_user()?;
    let form = read_form(&state, multipart).await?;
    let image = upload::upload_image(&state, form.into_upload(owner)).await?;
    Ok(JSend::success(image_response(image)))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let owner = caller.require_user()?;
    upload::delete_image(&state, &id, owner).await?;

    tracing::debug!(image_id = %id, "Deleted image");
    Ok(JSend::success(()))
}

pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<JSend<VideoResponse>>, ApiError> {
    let owner = caller.require_user()?;
    let form = read_form(&state, multipart).await?;
    let video = upload::upload_video(&state, form.into_upload(owner)).await?;
    Ok(JSend::success(video_response(video)))
}

pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let owner = caller.require_user()?;
    upload::delete_video(&state, &id, owner).await?;

    tracing::debug!(video_id = %id, "Deleted video");
    Ok(JSend::success(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepts_form_values() {
        assert!(parse_bool("isPublic", "true").unwrap());
        assert!(parse_bool("isPublic", "ON").unwrap());
        assert!(!parse_bool("isPublic", "0").unwrap());
        assert!(!parse_bool("isPublic", "").unwrap());
        assert!(parse_bool("isPublic", "maybe").is_err());
    }

    #[test]
    fn test_mime_type_falls_back_to_filename() {
        let form = UploadForm {
            data: Bytes::from_static(b"x"),
            file_name: Some("notes.pdf".to_string()),
            content_type: Some("application/octet-stream".to_string()),
            is_public: false,
            category: String::new(),
        };
        assert_eq!(form.mime_type(), "application/pdf");

        let unknown = UploadForm {
            file_name: None,
            content_type: None,
            ..form
        };
        assert_eq!(unknown.mime_type(), "application/octet-stream");
    }
}
