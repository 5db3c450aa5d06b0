//! The per-source TTL cache: a root project-name listing plus a map of
//! per-project file listings. One `parking_lot::Mutex` guards both, taken
//! only to read a timestamp or install a freshly parsed result (never held
//! across the upstream fetch itself) — see spec §5.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use proxpi_types::File;

#[derive(Clone)]
pub struct RootEntry {
    /// normalized name -> display name, as seen from upstream.
    pub names: HashMap<String, String>,
    populated_at: Instant,
}

#[derive(Clone)]
pub struct ProjectEntry {
    pub files: Vec<File>,
    pub found: bool,
    populated_at: Instant,
}

impl ProjectEntry {
    pub fn not_found() -> Self {
        Self {
            files: Vec::new(),
            found: false,
            populated_at: Instant::now(),
        }
    }

    pub fn found(files: Vec<File>) -> Self {
        Self {
            files,
            found: true,
            populated_at: Instant::now(),
        }
    }
}

struct State {
    root: Option<RootEntry>,
    projects: HashMap<String, ProjectEntry>,
}

/// TTL cache for a single Index Source. A TTL of zero disables both caches:
/// nothing is ever considered fresh, and nothing is stored.
pub struct IndexCache {
    ttl: Duration,
    state: Mutex<State>,
}

impl IndexCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(State {
                root: None,
                projects: HashMap::new(),
            }),
        }
    }

    fn is_fresh(&self, populated_at: Instant) -> bool {
        !self.ttl.is_zero() && populated_at.elapsed() < self.ttl
    }

    pub fn fresh_root(&self) -> Option<HashMap<String, String>> {
        let guard = self.state.lock();
        let entry = guard.root.as_ref()?;
        self.is_fresh(entry.populated_at).then(|| entry.names.clone())
    }

    pub fn install_root(&self, names: HashMap<String, String>) {
        if self.ttl.is_zero() {
            return;
        }
        self.state.lock().root = Some(RootEntry {
            names,
            populated_at: Instant::now(),
        });
    }

    pub fn invalidate_root(&self) {
        self.state.lock().root = None;
    }

    /// Returns the cached root listing regardless of freshness, used to
    /// serve a stale copy when a refresh fetch fails (availability over
    /// freshness), mirroring `stale_project`.
    pub fn stale_root(&self) -> Option<HashMap<String, String>> {
        self.state.lock().root.as_ref().map(|entry| entry.names.clone())
    }

    pub fn fresh_project(&self, normalized: &str) -> Option<ProjectEntry> {
        let guard = self.state.lock();
        let entry = guard.projects.get(normalized)?;
        self.is_fresh(entry.populated_at).then(|| entry.clone())
    }

    /// Returns the cached entry regardless of freshness, used to serve a
    /// stale copy when a refresh fetch fails (availability over freshness).
    pub fn stale_project(&self, normalized: &str) -> Option<ProjectEntry> {
        self.state.lock().projects.get(normalized).cloned()
    }

    pub fn install_project(&self, normalized: String, entry: ProjectEntry) {
        if self.ttl.is_zero() {
            return;
        }
        self.state.lock().projects.insert(normalized, entry);
    }

    pub fn invalidate_project(&self, normalized: &str) {
        self.state.lock().projects.remove(normalized);
    }

    pub fn invalidate_all(&self) {
        let mut guard = self.state.lock();
        guard.root = None;
        guard.projects.clear();
    }
}
