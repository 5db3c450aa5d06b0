//! A single upstream simple-repository index: fetches, parses, and
//! TTL-caches its root listing and per-project listings.

use std::time::Duration;

use proxpi_types::{detect_kind, normalize, parse_files, parse_projects, File, ProxpiError};
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

use crate::cache::{IndexCache, ProjectEntry};

const ACCEPT_HEADER: &str =
    "application/vnd.pypi.simple.v1+json, text/html;q=0.9, application/vnd.pypi.simple.v1+html;q=0.9, */*;q=0.01";

/// One configured upstream. `index_id` is the position this source occupies
/// in the aggregator (root is 0, extras are 1..N) and doubles as the
/// subdirectory name the File Cache stores its downloads under.
pub struct IndexSource {
    index_id: usize,
    base_url: Url,
    client: ClientWithMiddleware,
    cache: IndexCache,
}

impl IndexSource {
    pub fn new(index_id: usize, base_url: Url, ttl: Duration, client: ClientWithMiddleware) -> Self {
        Self {
            index_id,
            base_url,
            client,
            cache: IndexCache::new(ttl),
        }
    }

    pub fn index_id(&self) -> usize {
        self.index_id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the cached root listing (sorted by display name) if fresh,
    /// otherwise fetches, parses, and replaces the cache.
    pub async fn list_projects(&self) -> Result<Vec<String>, ProxpiError> {
        let names = self.project_map().await?;
        let mut out: Vec<String> = names.into_values().collect();
        out.sort();
        Ok(out)
    }

    /// The normalized-name -> display-name map backing `list_projects`.
    /// Exposed to the aggregator, which needs the normalized keys to apply
    /// its own precedence and ordering rules across sources.
    pub(crate) async fn project_map(
        &self,
    ) -> Result<std::collections::HashMap<String, String>, ProxpiError> {
        if let Some(names) = self.cache.fresh_root() {
            return Ok(names);
        }

        match self.fetch_inner(self.base_url.clone()).await {
            Ok((body, effective_url, content_type)) => {
                let kind = detect_kind(content_type.as_deref());
                let display_names = parse_projects(&body, kind, &effective_url)
                    .map_err(|e| ProxpiError::UpstreamUnavailable(e.to_string()))?;

                let mut names = std::collections::HashMap::with_capacity(display_names.len());
                for name in &display_names {
                    names.insert(normalize(name), name.clone());
                }
                self.cache.install_root(names.clone());
                Ok(names)
            }
            // On any fetch failure, fall back to a stale copy if one
            // exists (availability over freshness), mirroring `list_files`.
            Err(FetchError::NotFound) => {
                self.cache.stale_root().ok_or(ProxpiError::NotFound)
            }
            Err(FetchError::Other(message)) => self
                .cache
                .stale_root()
                .ok_or(ProxpiError::UpstreamUnavailable(message)),
        }
    }

    /// Normalizes `project_name`, returns its cached file list if fresh,
    /// otherwise fetches `<base>/<normalized>/`. A 404 is cached as
    /// "not found" with the source's TTL; other fetch failures fall back to
    /// a stale cached copy if one exists (availability over freshness).
    pub async fn list_files(&self, project_name: &str) -> Result<(Vec<File>, bool), ProxpiError> {
        let normalized = normalize(project_name);

        if let Some(entry) = self.cache.fresh_project(&normalized) {
            return Ok((entry.files, entry.found));
        }

        let project_url = self
            .base_url
            .join(&format!("{normalized}/"))
            .map_err(|e| ProxpiError::InvalidName(e.to_string()))?;

        match self.fetch_inner(project_url).await {
            Ok((body, effective_url, content_type)) => {
                let kind = detect_kind(content_type.as_deref());
                let files = parse_files(&body, kind, &effective_url)
                    .map_err(|e| ProxpiError::UpstreamUnavailable(e.to_string()))?;
                self.cache
                    .install_project(normalized, ProjectEntry::found(files.clone()));
                Ok((files, true))
            }
            Err(FetchError::NotFound) => {
                self.cache
                    .install_project(normalized, ProjectEntry::not_found());
                Ok((Vec::new(), false))
            }
            Err(FetchError::Other(message)) => {
                if let Some(stale) = self.cache.stale_project(&normalized) {
                    return Ok((stale.files, stale.found));
                }
                Err(ProxpiError::UpstreamUnavailable(message))
            }
        }
    }

    pub fn invalidate_list(&self) {
        self.cache.invalidate_root();
    }

    pub fn invalidate_project(&self, project_name: &str) {
        self.cache.invalidate_project(&normalize(project_name));
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Issues the GET, resolving 404 and other statuses into `FetchError`
    /// variants the callers above branch on, and returning the body, the
    /// effective (post-redirect) URL, and the response `Content-Type`.
    async fn fetch_inner(&self, url: Url) -> Result<(String, Url, Option<String>), FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        let response = response
            .error_for_status()
            .map_err(|e| FetchError::Other(e.to_string()))?;

        let effective_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;
        Ok((body, effective_url, content_type))
    }
}

enum FetchError {
    NotFound,
    Other(String),
}
