use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::storage::models::{
    ImageRecord, KeepRecord, MindMapRecord, MomentRecord, TodoRecord, VideoRecord,
};
use crate::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        // Keeps
        .route(
            "/api/keeps",
            get(handlers::list::<KeepRecord>).post(handlers::create_keep),
        )
        .route("/api/keeps/categories", get(handlers::categories::<KeepRecord>))
        .route(
            "/api/keeps/:id",
            get(handlers::detail::<KeepRecord>)
                .put(handlers::update_keep)
                .delete(handlers::remove::<KeepRecord>),
        )
        // Todos
        .route(
            "/api/todos",
            get(handlers::list::<TodoRecord>).post(handlers::create_todo),
        )
        .route("/api/todos/categories", get(handlers::categories::<TodoRecord>))
        .route(
            "/api/todos/:id",
            get(handlers::detail::<TodoRecord>)
                .put(handlers::update_todo)
                .delete(handlers::remove::<TodoRecord>),
        )
        // Moments
        .route(
            "/api/moments",
            get(handlers::list::<MomentRecord>).post(handlers::create_moment),
        )
        .route(
            "/api/moments/categories",
            get(handlers::categories::<MomentRecord>),
        )
        .route(
            "/api/moments/:id",
            get(handlers::detail::<MomentRecord>)
                .put(handlers::update_moment)
                .delete(handlers::remove::<MomentRecord>),
        )
        // Mind maps
        .route(
            "/api/mindmaps",
            get(handlers::list::<MindMapRecord>).post(handlers::create_mindmap),
        )
        .route(
            "/api/mindmaps/categories",
            get(handlers::categories::<MindMapRecord>),
        )
        .route(
            "/api/mindmaps/:id",
            get(handlers::detail::<MindMapRecord>)
                .put(handlers::update_mindmap)
                .delete(handlers::remove::<MindMapRecord>),
        )
        // Assets
        .route(
            "/api/assets/files",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/assets/files/:id",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/api/assets/files/:id/content", get(handlers::file_content))
        .route(
            "/api/assets/images",
            get(handlers::list::<ImageRecord>)
                .post(handlers::upload_image)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/assets/images/categories",
            get(handlers::categories::<ImageRecord>),
        )
        .route(
            "/api/assets/images/:id",
            get(handlers::detail::<ImageRecord>).delete(handlers::delete_image),
        )
        .route(
            "/api/assets/videos",
            get(handlers::list::<VideoRecord>)
                .post(handlers::upload_video)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/assets/videos/categories",
            get(handlers::categories::<VideoRecord>),
        )
        .route(
            "/api/assets/videos/:id",
            get(handlers::detail::<VideoRecord>).delete(handlers::delete_video),
        )
        // Search and users
        .route("/api/search", get(handlers::search))
        .route("/api/users/me", get(handlers::me))
        .route("/api/users/sync", post(handlers::sync_user))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled; purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
