//! Handlers shared by every listable entity: cursor-paginated listing,
//! access-filtered detail, owner-scoped delete and category facets.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use redb::TableHandle;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::auth::Caller;
use crate::api::response::{ApiError, AppQuery, JSend, JSendPage};
use crate::storage::page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::storage::{CategoryCount, CursorPage, Entity, ListFilter, Viewer};
use crate::AppState;

/// An entity exposed over HTTP.
pub trait Resource: Entity + Sync {
    type View: Serialize + Send;

    /// Increment the view counter after a detail read.
    const COUNTS_VIEWS: bool = false;

    fn view(state: &AppState, viewer: &Viewer, record: Self) -> Result<Self::View, ApiError>;
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl ListParams {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(ApiError::bad_request(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    pub fn filter(&self) -> ListFilter {
        ListFilter {
            category: self.category.clone().filter(|c| !c.is_empty()),
            query: self.q.clone(),
        }
    }
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Trimmed, non-empty text or a field-named 400.
pub fn required_text(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list<R: Resource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppQuery(params): AppQuery<ListParams>,
) -> Result<Json<JSendPage<R::View>>, ApiError> {
    params.validate()?;

    let page = state.db.list_page::<R>(
        &caller.viewer,
        &params.filter(),
        params.cursor.as_deref(),
        params.limit,
    )?;

    let mut items = Vec::with_capacity(page.items.len());
    for record in page.items {
        items.push(R::view(&state, &caller.viewer, record)?);
    }

    Ok(JSendPage::success(CursorPage {
        items,
        next_cursor: page.next_cursor,
    }))
}

pub async fn detail<R: Resource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<R::View>>, ApiError> {
    let record = state.db.fetch_visible::<R>(&id, &caller.viewer)?;
    let view = R::view(&state, &caller.viewer, record)?;

    if R::COUNTS_VIEWS {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = state.db.record_view::<R>(&id) {
                tracing::warn!(id = %id, error = %e, "Failed to record view");
            }
        });
    }

    Ok(JSend::success(view))
}

pub async fn remove<R: Resource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let owner = caller.require_user()?;
    state.db.delete_owned::<R>(&id, owner)?;

    tracing::debug!(id = %id, table = R::TABLE.name(), "Deleted record");
    Ok(JSend::success(()))
}

pub async fn categories<R: Resource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<JSend<Vec<CategoryCount>>>, ApiError> {
    Ok(JSend::success(state.db.category_counts::<R>(&caller.viewer)?))
}
