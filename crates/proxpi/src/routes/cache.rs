//! Cache invalidation handlers (spec.md §4.5/§6): fan out to both the
//! index caches and the on-disk file cache. Idempotent, return immediately.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use proxpi_types::normalize;

use crate::state::AppState;

pub async fn invalidate_all(State(state): State<Arc<AppState>>) -> StatusCode {
    state.aggregator.invalidate_all();
    state.file_cache.invalidate_all();
    StatusCode::NO_CONTENT
}

pub async fn invalidate_project(State(state): State<Arc<AppState>>, Path(project): Path<String>) -> StatusCode {
    let normalized = normalize(&project);
    state.aggregator.invalidate_project(&normalized);
    state.file_cache.invalidate_project(&normalized);
    StatusCode::NO_CONTENT
}
