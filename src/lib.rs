//! resource-hub - Backend for a personal knowledge and media hub
//!
//! This crate provides notes, todos, moments, mind maps and media assets with:
//! - Swappable object storage backends (local filesystem, GCS)
//! - Content-addressed, deduplicated uploads with background image derivatives
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)
//! - Cursor-paginated REST API filtered by owner, group and visibility

pub mod api;
pub mod auth;
pub mod config;
pub mod geocode;
pub mod hash;
pub mod object_store;
pub mod search;
pub mod storage;
pub mod upload;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;
use std::time::Instant;

use config::Config;
use storage::Database;
use tokio::sync::Notify;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub http: reqwest::Client,
    /// Wakes the derivative worker when an image is queued.
    pub derivatives: Arc<Notify>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        object_store: Arc<dyn object_store::ObjectStore>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            db,
            object_store,
            http,
            derivatives: Arc::new(Notify::new()),
            started_at: Instant::now(),
        }
    }
}
