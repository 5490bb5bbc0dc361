use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assets::{image_response, video_response, ImageResponse, VideoResponse};
use super::resources::Resource;
use crate::api::auth::Caller;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::models::{ImageRecord, MediaKind, MomentMedia, MomentRecord, VideoRecord};
use crate::storage::{DatabaseError, Viewer};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MomentResponse {
    pub category: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub id: String,
    pub images: Vec<ImageResponse>,
    pub is_public: bool,
    pub owner_id: String,
    pub updated_at: DateTime<Utc>,
    pub videos: Vec<VideoResponse>,
    pub view_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateMomentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "isPublic")]
    pub is_public: bool,
    #[serde(default, alias = "imageIds")]
    pub image_ids: Vec<String>,
    #[serde(default, alias = "videoIds")]
    pub video_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMomentRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "isPublic")]
    pub is_public: Option<bool>,
    #[serde(default, alias = "imageIds")]
    pub image_ids: Option<Vec<String>>,
    #[serde(default, alias = "videoIds")]
    pub video_ids: Option<Vec<String>>,
}

impl Resource for MomentRecord {
    type View = MomentResponse;
    const COUNTS_VIEWS: bool = true;

    /// Attachments the viewer cannot see are left out.
    fn view(state: &AppState, viewer: &Viewer, record: Self) -> Result<Self::View, ApiError> {
        let mut images = Vec::new();
        let mut videos = Vec::new();
        for media in state.db.moment_media(&record.id)? {
            match media.kind {
                MediaKind::Image => {
                    if let Some(image) = visible::<ImageRecord>(state, &media.media_id, viewer)? {
                        images.push(image_response(image));
                    }
                }
                MediaKind::Video => {
                    if let Some(video) = visible::<VideoRecord>(state, &media.media_id, viewer)? {
                        videos.push(video_response(video));
                    }
                }
            }
        }

        Ok(MomentResponse {
            category: record.category,
            content: record.content,
            created_at: record.created_at,
            id: record.id,
            images,
            is_public: record.is_public,
            owner_id: record.owner_id,
            updated_at: record.updated_at,
            videos,
            view_count: record.view_count,
        })
    }
}

fn visible<E: crate::storage::Entity>(
    state: &AppState,
    id: &str,
    viewer: &Viewer,
) -> Result<Option<E>, ApiError> {
    match state.db.fetch_visible::<E>(id, viewer) {
        Ok(record) => Ok(Some(record)),
        Err(DatabaseError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Join rows for the given attachments, rejecting any the caller cannot see.
fn attachments(
    state: &AppState,
    viewer: &Viewer,
    image_ids: &[String],
    video_ids: &[String],
) -> Result<Vec<MomentMedia>, ApiError> {
    let mut media = Vec::with_capacity(image_ids.len() + video_ids.len());
    for (sort, id) in image_ids.iter().enumerate() {
        if visible::<ImageRecord>(state, id, viewer)?.is_none() {
            return Err(ApiError::bad_request(format!("image_ids: unknown image {id}")));
        }
        media.push(MomentMedia {
            kind: MediaKind::Image,
            media_id: id.clone(),
            sort: sort as u32,
        });
    }
    for (sort, id) in video_ids.iter().enumerate() {
        if visible::<VideoRecord>(state, id, viewer)?.is_none() {
            return Err(ApiError::bad_request(format!("video_ids: unknown video {id}")));
        }
        media.push(MomentMedia {
            kind: MediaKind::Video,
            media_id: id.clone(),
            sort: sort as u32,
        });
    }
    Ok(media)
}

pub async fn create_moment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppJson(req): AppJson<CreateMomentRequest>,
) -> Result<Json<JSend<MomentResponse>>, ApiError> {
    let owner = caller.require_user()?;
    let content = req.content.trim().to_string();
    if content.is_empty() && req.image_ids.is_empty() && req.video_ids.is_empty() {
        return Err(ApiError::bad_request(
            "content must not be empty when no media is attached",
        ));
    }
    let media = attachments(&state, &caller.viewer, &req.image_ids, &req.video_ids)?;

    let now = Utc::now();
    let moment = MomentRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner.to_string(),
        content,
        category: req.category.trim().to_string(),
        is_public: req.is_public,
        view_count: 0,
        created_at: now,
        updated_at: now,
    };
    state.db.create_moment(&moment, &media)?;

    tracing::debug!(moment_id = %moment.id, attachments = media.len(), "Created moment");
    let view = MomentRecord::view(&state, &caller.viewer, moment)?;
    Ok(JSend::success(view))
}

/// Partial update. Passing either id list replaces that kind of attachment.
pub async fn update_moment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateMomentRequest>,
) -> Result<Json<JSend<MomentResponse>>, ApiError> {
    let owner = caller.require_user()?;
    if req.content.is_none()
        && req.category.is_none()
        && req.is_public.is_none()
        && req.image_ids.is_none()
        && req.video_ids.is_none()
    {
        return Err(ApiError::bad_request(
            "at least one field (content, category, is_public, image_ids, video_ids) must be provided",
        ));
    }

    let media = if req.image_ids.is_some() || req.video_ids.is_some() {
        let current = state.db.moment_media(&id)?;
        let kept = |kind: MediaKind| -> Vec<String> {
            current
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.media_id.clone())
                .collect()
        };
        let image_ids = req.image_ids.unwrap_or_else(|| kept(MediaKind::Image));
        let video_ids = req.video_ids.unwrap_or_else(|| kept(MediaKind::Video));
        Some(attachments(&state, &caller.viewer, &image_ids, &video_ids)?)
    } else {
        None
    };

    let moment = state.db.update_moment(
        &id,
        owner,
        |moment| {
            if let Some(content) = req.content {
                moment.content = content.trim().to_string();
            }
            if let Some(category) = req.category {
                moment.category = category.trim().to_string();
            }
            if let Some(is_public) = req.is_public {
                moment.is_public = is_public;
            }
        },
        media.as_deref(),
    )?;

    tracing::debug!(moment_id = %id, "Updated moment");
    let view = MomentRecord::view(&state, &caller.viewer, moment)?;
    Ok(JSend::success(view))
}
