mod cache;
mod file;
mod health;
mod index;

use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health::health))
        .route("/index/", get(index::list_root))
        .route("/index/{project}/", get(index::list_project))
        .route("/index/{project}/{filename}", get(file::download))
        .route("/cache/list", delete(cache::invalidate_all))
        .route("/cache/{project}", delete(cache::invalidate_project))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Out of scope per spec.md §1 ("the static home page and its client-side
/// invalidation buttons"); kept as a one-line stub so `/` resolves to
/// something instead of 404ing.
async fn home() -> &'static str {
    "proxpi"
}
