use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::auth::Caller;
use crate::api::response::{ApiError, AppQuery, JSend};
use crate::search::{self, SearchHit};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Forward the query to the search service and keep hits the caller may read.
pub async fn search(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppQuery(params): AppQuery<SearchParams>,
) -> Result<Json<JSend<Vec<SearchHit>>>, ApiError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("q must not be empty"));
    }

    let Some(url) = state.config.services.search_url.as_deref() else {
        tracing::warn!("Search requested but SEARCH_URL is not configured");
        return Ok(JSend::success(Vec::new()));
    };

    let hits = search::query_service(&state.http, url, query).await;
    let received = hits.len();
    let resolved = search::resolve_hits(&state.db, &caller.viewer, hits)?;

    tracing::debug!(received, visible = resolved.len(), "Resolved search hits");
    Ok(JSend::success(resolved))
}
