//! Project and file listing handlers (spec.md §6): content negotiation
//! between the JSON and HTML simple-repository forms, and the 308 redirect
//! to the normalized project name.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use proxpi_types::normalize;

use crate::error::AppError;
use crate::render::{self, JSON_MEDIA_TYPE};
use crate::state::AppState;

pub async fn list_root(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    let names = state.aggregator.list_projects().await?;
    Ok(respond(&headers, || render::projects_json(&names), || render::projects_html(&names)))
}

pub async fn list_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let normalized = normalize(&project);
    if normalized != project {
        return Ok(Redirect::permanent(&format!("/index/{normalized}/")).into_response());
    }

    let files = state.aggregator.list_files(&normalized).await?;
    Ok(respond(&headers, || render::files_json(&normalized, &files), || {
        render::files_html(&normalized, &files)
    }))
}

/// Picks JSON or HTML per the `Accept` header and attaches `Vary` (spec.md
/// §6: "honor `Accept` for the JSON simple-repository media type; default
/// to HTML").
fn respond(headers: &HeaderMap, json: impl FnOnce() -> String, html: impl FnOnce() -> String) -> Response {
    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains(JSON_MEDIA_TYPE));

    let mut response = if wants_json {
        (StatusCode::OK, [(header::CONTENT_TYPE, JSON_MEDIA_TYPE)], json()).into_response()
    } else {
        (StatusCode::OK, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], html()).into_response()
    };

    response
        .headers_mut()
        .insert(header::VARY, HeaderValue::from_static("Accept, Accept-Encoding"));
    response
}
