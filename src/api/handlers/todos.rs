use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::resources::{nullable, required_text, Resource};
use crate::api::auth::Caller;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::models::{Patch, TodoRecord};
use crate::storage::Viewer;
use crate::AppState;

impl Resource for TodoRecord {
    type View = TodoRecord;

    fn view(_state: &AppState, _viewer: &Viewer, record: Self) -> Result<Self::View, ApiError> {
        Ok(record)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "isPublic")]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "isPublic")]
    pub is_public: Option<bool>,
}

pub async fn create_todo(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppJson(req): AppJson<CreateTodoRequest>,
) -> Result<Json<JSend<TodoRecord>>, ApiError> {
    let owner = caller.require_user()?;
    let now = Utc::now();
    let todo = TodoRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner.to_string(),
        title: required_text("title", &req.title)?,
        description: req.description.filter(|d| !d.trim().is_empty()),
        status: req.status,
        pinned: req.pinned,
        category: req.category.trim().to_string(),
        is_public: req.is_public,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(&todo)?;

    tracing::debug!(todo_id = %todo.id, "Created todo");
    Ok(JSend::success(todo))
}

/// Partial update; also serves the done and pinned toggles.
pub async fn update_todo(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateTodoRequest>,
) -> Result<Json<JSend<TodoRecord>>, ApiError> {
    let owner = caller.require_user()?;
    let description = Patch::from(req.description);
    if req.title.is_none()
        && description.is_absent()
        && req.status.is_none()
        && req.pinned.is_none()
        && req.category.is_none()
        && req.is_public.is_none()
    {
        return Err(ApiError::bad_request(
            "at least one field (title, description, status, pinned, category, is_public) must be provided",
        ));
    }
    let title = req.title.as_deref().map(|t| required_text("title", t)).transpose()?;

    let todo = state.db.update_owned::<TodoRecord, _>(&id, owner, |todo| {
        if let Some(title) = title {
            todo.title = title;
        }
        description.apply_to(&mut todo.description);
        if let Some(status) = req.status {
            todo.status = status;
        }
        if let Some(pinned) = req.pinned {
            todo.pinned = pinned;
        }
        if let Some(category) = req.category {
            todo.category = category.trim().to_string();
        }
        if let Some(is_public) = req.is_public {
            todo.is_public = is_public;
        }
    })?;

    tracing::debug!(todo_id = %id, status = todo.status, pinned = todo.pinned, "Updated todo");
    Ok(JSend::success(todo))
}
