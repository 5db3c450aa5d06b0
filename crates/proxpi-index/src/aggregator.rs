//! Composes a root Index Source with zero or more "extra" sources into a
//! single merged view. The root always wins precedence; extras are tried in
//! configuration order.

use std::collections::HashMap;

use proxpi_types::{normalize, File, ProxpiError};

use crate::source::IndexSource;

pub struct CacheAggregator {
    root: IndexSource,
    extras: Vec<IndexSource>,
}

impl CacheAggregator {
    pub fn new(root: IndexSource, extras: Vec<IndexSource>) -> Self {
        Self { root, extras }
    }

    fn sources(&self) -> impl Iterator<Item = &IndexSource> {
        std::iter::once(&self.root).chain(self.extras.iter())
    }

    /// Union of every source's project list. The root's display name wins
    /// for any name it lists; otherwise the first extra that lists it.
    /// Output is sorted by normalized name.
    pub async fn list_projects(&self) -> Result<Vec<String>, ProxpiError> {
        let mut merged: HashMap<String, String> = HashMap::new();
        let mut any_ok = false;
        let mut last_err = None;

        for source in self.sources() {
            match source.project_map().await {
                Ok(names) => {
                    any_ok = true;
                    for (normalized, display) in names {
                        merged.entry(normalized).or_insert(display);
                    }
                }
                Err(e) => last_err = Some(e),
            }
        }

        if !any_ok {
            if let Some(e) = last_err {
                return Err(e);
            }
        }

        let mut keys: Vec<&String> = merged.keys().collect();
        keys.sort();
        Ok(keys.into_iter().map(|k| merged[k].clone()).collect())
    }

    /// Queries sources in precedence order; the first source that reports a
    /// non-empty file list wins. "Not found" everywhere surfaces `NotFound`;
    /// a transient failure everywhere surfaces `UpstreamUnavailable`.
    pub async fn list_files(&self, project: &str) -> Result<Vec<File>, ProxpiError> {
        let mut last_err = None;

        for source in self.sources() {
            match source.list_files(project).await {
                // Listed with at least one file: this source wins outright.
                Ok((files, true)) if !files.is_empty() => return Ok(files),
                // Either explicitly not-found, or listed with zero files:
                // both fall through to the next source.
                Ok(_) => {}
                Err(e) => last_err = Some(e),
            }
        }

        // A transient failure anywhere takes priority over "not found",
        // since "not found" requires every source to have actually answered.
        Err(last_err.unwrap_or(ProxpiError::NotFound))
    }

    /// Locates the file record needed to serve a download, returning the
    /// owning source's `index_id` so the File Cache can key its on-disk
    /// layout on it.
    pub async fn resolve_file(&self, project: &str, filename: &str) -> Result<(usize, File), ProxpiError> {
        let mut last_err = None;
        let mut saw_project = false;

        for source in self.sources() {
            match source.list_files(project).await {
                Ok((files, found)) => {
                    saw_project |= found;
                    if let Some(file) = files.into_iter().find(|f| f.name == filename) {
                        return Ok((source.index_id(), file));
                    }
                }
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) if !saw_project => Err(e),
            _ => Err(ProxpiError::NotFound),
        }
    }

    pub fn invalidate_list(&self) {
        for source in self.sources() {
            source.invalidate_list();
        }
    }

    pub fn invalidate_project(&self, project: &str) {
        let _ = normalize(project);
        for source in self.sources() {
            source.invalidate_project(project);
        }
    }

    pub fn invalidate_all(&self) {
        for source in self.sources() {
            source.invalidate_all();
        }
    }
}
