//! Full-text search is delegated to an external service; this module only
//! forwards the query and drops hits the caller may not see.

use serde::{Deserialize, Serialize};

use crate::storage::models::{
    ImageRecord, KeepRecord, MindMapRecord, MomentRecord, TodoRecord, VideoRecord,
};
use crate::storage::{Database, DatabaseError, Entity, Viewer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Keep,
    Todo,
    Moment,
    MindMap,
    Image,
    Video,
}

/// A hit as returned by the search service.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHit {
    pub kind: SearchKind,
    pub id: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub kind: SearchKind,
    pub id: String,
    pub title: String,
    pub score: Option<f64>,
}

const PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Forward `query` to the search service. Errors are logged and yield no hits.
pub async fn query_service(client: &reqwest::Client, url: &str, query: &str) -> Vec<RawHit> {
    let resp = match client.get(url).query(&[("q", query)]).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "Search service request failed");
            return Vec::new();
        }
    };

    if !resp.status().is_success() {
        tracing::warn!(status = %resp.status(), "Search service returned an error");
        return Vec::new();
    }

    match resp.json::<SearchResponse>().await {
        Ok(body) => body.hits,
        Err(e) => {
            tracing::warn!(error = %e, "Search service response was not understood");
            Vec::new()
        }
    }
}

fn visible<E: Entity>(
    db: &Database,
    id: &str,
    viewer: &Viewer,
) -> Result<Option<E>, DatabaseError> {
    match db.fetch_visible::<E>(id, viewer) {
        Ok(record) => Ok(Some(record)),
        Err(DatabaseError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Re-resolve each hit locally and keep only rows `viewer` may read.
pub fn resolve_hits(
    db: &Database,
    viewer: &Viewer,
    hits: Vec<RawHit>,
) -> Result<Vec<SearchHit>, DatabaseError> {
    let mut resolved = Vec::new();
    for hit in hits {
        let title = match hit.kind {
            SearchKind::Keep => visible::<KeepRecord>(db, &hit.id, viewer)?.map(|r| r.title),
            SearchKind::Todo => visible::<TodoRecord>(db, &hit.id, viewer)?.map(|r| r.title),
            SearchKind::Moment => {
                visible::<MomentRecord>(db, &hit.id, viewer)?.map(|r| preview(&r.content))
            }
            SearchKind::MindMap => {
                visible::<MindMapRecord>(db, &hit.id, viewer)?.map(|r| r.title)
            }
            SearchKind::Image => visible::<ImageRecord>(db, &hit.id, viewer)?
                .map(|r| r.address.unwrap_or_else(|| r.id.clone())),
            SearchKind::Video => visible::<VideoRecord>(db, &hit.id, viewer)?.map(|r| r.id),
        };
        if let Some(title) = title {
            resolved.push(SearchHit {
                kind: hit.kind,
                id: hit.id,
                title,
                score: hit.score,
            });
        }
    }
    Ok(resolved)
}
