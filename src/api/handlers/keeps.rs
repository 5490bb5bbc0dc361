use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::resources::{required_text, Resource};
use crate::api::auth::Caller;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::models::KeepRecord;
use crate::storage::Viewer;
use crate::AppState;

impl Resource for KeepRecord {
    type View = KeepRecord;
    const COUNTS_VIEWS: bool = true;

    fn view(_state: &AppState, _viewer: &Viewer, record: Self) -> Result<Self::View, ApiError> {
        Ok(record)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateKeepRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "isPublic")]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeepRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "isPublic")]
    pub is_public: Option<bool>,
}

pub async fn create_keep(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppJson(req): AppJson<CreateKeepRequest>,
) -> Result<Json<JSend<KeepRecord>>, ApiError> {
    let owner = caller.require_user()?;
    let now = Utc::now();
    let keep = KeepRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner.to_string(),
        title: required_text("title", &req.title)?,
        content: req.content,
        category: req.category.trim().to_string(),
        is_public: req.is_public,
        view_count: 0,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(&keep)?;

    tracing::debug!(keep_id = %keep.id, "Created keep");
    Ok(JSend::success(keep))
}

pub async fn update_keep(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateKeepRequest>,
) -> Result<Json<JSend<KeepRecord>>, ApiError> {
    let owner = caller.require_user()?;
    if req.title.is_none() && req.content.is_none() && req.category.is_none() && req.is_public.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (title, content, category, is_public) must be provided",
        ));
    }
    let title = req.title.as_deref().map(|t| required_text("title", t)).transpose()?;

    let keep = state.db.update_owned::<KeepRecord, _>(&id, owner, |keep| {
        if let Some(title) = title {
            keep.title = title;
        }
        if let Some(content) = req.content {
            keep.content = content;
        }
        if let Some(category) = req.category {
            keep.category = category.trim().to_string();
        }
        if let Some(is_public) = req.is_public {
            keep.is_public = is_public;
        }
    })?;

    tracing::debug!(keep_id = %id, "Updated keep");
    Ok(JSend::success(keep))
}
