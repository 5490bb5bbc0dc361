use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub memory_rss_bytes: Option<u64>,
    pub status: String,
    pub store: String,
    pub uptime_seconds: u64,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub files_deleted: u64,
    pub rows_deleted: u64,
}

/// Resident set size from `/proc/self/status`; `None` off Linux.
fn memory_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<JSend<HealthResponse>>) {
    let (code, status, store) = match state.db.ping() {
        Ok(()) => (StatusCode::OK, "ok", "ok".to_string()),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", e.to_string())
        }
    };

    (
        code,
        JSend::success(HealthResponse {
            memory_rss_bytes: memory_rss_bytes(),
            status: status.to_string(),
            store,
            uptime_seconds: state.started_at.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Drop every row and stored object. Only routed in test mode.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let mut paths: Vec<String> = state
        .db
        .scan::<crate::storage::models::FileRecord>()?
        .into_iter()
        .map(|f| f.path)
        .collect();
    paths.sort();
    paths.dedup();

    let stats = state.db.purge_all()?;

    for path in &paths {
        if let Err(e) = state.object_store.delete(path).await {
            tracing::warn!(path = %path, error = %e, "Failed to delete object during purge");
        }
    }

    tracing::warn!(rows = stats.rows, files = stats.files, "Purged all data");

    Ok(JSend::success(PurgeResponse {
        files_deleted: stats.files,
        rows_deleted: stats.rows,
    }))
}
