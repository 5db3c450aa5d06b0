//! Artifact download handler (spec.md §6): serves the cached file, or
//! falls back to a 302 redirect to the upstream URL when the download is
//! still in flight after `download-timeout`.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use fs_err::tokio as fs;
use proxpi_cache::{FetchOutcome, FileCacheKey};
use proxpi_types::normalize;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::state::AppState;

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((project, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let normalized = normalize(&project);
    let (index_id, file) = state.aggregator.resolve_file(&normalized, &filename).await?;

    let key = FileCacheKey::new(index_id, normalized, filename.clone());
    match state.file_cache.get_or_fetch(key, file.url.clone()).await? {
        FetchOutcome::Ready(ready) => {
            let handle = fs::File::open(&ready.path)
                .await
                .map_err(|e| proxpi_types::ProxpiError::IoError(e.to_string()))?;
            let body = Body::from_stream(ReaderStream::new(handle));

            // Derived from the requested filename, not the on-disk path:
            // the zero-budget path serves from a random temp-file name with
            // no extension, so the path alone can't tell a `.tar.gz` from
            // anything else (spec.md §6: "content type derived from the
            // filename").
            let content_type = if state.binary_file_mime_type {
                "application/octet-stream".to_string()
            } else {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            };

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_LENGTH, ready.size.to_string()),
                ],
                body,
            )
                .into_response())
        }
        FetchOutcome::Redirect(url) => Ok(Redirect::found(url.as_str()).into_response()),
    }
}
