use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::resources::{required_text, Resource};
use crate::api::auth::Caller;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::models::MindMapRecord;
use crate::storage::Viewer;
use crate::AppState;

impl Resource for MindMapRecord {
    type View = MindMapRecord;

    fn view(_state: &AppState, _viewer: &Viewer, record: Self) -> Result<Self::View, ApiError> {
        Ok(record)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMindMapRequest {
    pub title: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "isPublic")]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMindMapRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "isPublic")]
    pub is_public: Option<bool>,
}

/// Mind map documents are JSON objects or arrays; `null` means empty.
fn document(content: serde_json::Value) -> Result<serde_json::Value, ApiError> {
    match content {
        serde_json::Value::Null => Ok(serde_json::json!({})),
        v @ (serde_json::Value::Object(_) | serde_json::Value::Array(_)) => Ok(v),
        _ => Err(ApiError::bad_request("content must be a JSON object or array")),
    }
}

pub async fn create_mindmap(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppJson(req): AppJson<CreateMindMapRequest>,
) -> Result<Json<JSend<MindMapRecord>>, ApiError> {
    let owner = caller.require_user()?;
    let now = Utc::now();
    let mindmap = MindMapRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner.to_string(),
        title: required_text("title", &req.title)?,
        content: document(req.content)?,
        category: req.category.trim().to_string(),
        is_public: req.is_public,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(&mindmap)?;

    tracing::debug!(mindmap_id = %mindmap.id, "Created mind map");
    Ok(JSend::success(mindmap))
}

pub async fn update_mindmap(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateMindMapRequest>,
) -> Result<Json<JSend<MindMapRecord>>, ApiError> {
    let owner = caller.require_user()?;
    if req.title.is_none() && req.content.is_none() && req.category.is_none() && req.is_public.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (title, content, category, is_public) must be provided",
        ));
    }
    let title = req.title.as_deref().map(|t| required_text("title", t)).transpose()?;
    let content = req.content.map(document).transpose()?;

    let mindmap = state.db.update_owned::<MindMapRecord, _>(&id, owner, |mindmap| {
        if let Some(title) = title {
            mindmap.title = title;
        }
        if let Some(content) = content {
            mindmap.content = content;
        }
        if let Some(category) = req.category {
            mindmap.category = category.trim().to_string();
        }
        if let Some(is_public) = req.is_public {
            mindmap.is_public = is_public;
        }
    })?;

    tracing::debug!(mindmap_id = %id, "Updated mind map");
    Ok(JSend::success(mindmap))
}
