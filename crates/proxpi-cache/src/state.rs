//! The File Cache's in-memory bookkeeping: the map of READY entries and the
//! running byte total used for eviction. One `parking_lot::Mutex` guards
//! both, matching `IndexCache`'s discipline in `proxpi-index` — held only
//! for map mutations, never across a download or a filesystem removal (see
//! spec.md §5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;

use crate::key::FileCacheKey;

#[derive(Clone)]
pub(crate) struct ReadyEntry {
    pub path: PathBuf,
    pub size: u64,
    pub last_access: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<FileCacheKey, ReadyEntry>,
    total_bytes: u64,
}

/// Bookkeeping for READY entries, independent of how they got there
/// (download completion or startup adoption) or how they leave (eviction or
/// invalidation). Never touches the filesystem itself — callers remove the
/// files a mutating method reports back to them, outside the lock.
pub(crate) struct CacheState {
    budget: u64,
    inner: Mutex<Inner>,
}

impl CacheState {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn get_fresh(&self, key: &FileCacheKey) -> Option<ReadyEntry> {
        let mut guard = self.inner.lock();
        let entry = guard.entries.get_mut(key)?;
        entry.last_access = Instant::now();
        Some(entry.clone())
    }

    /// Inserts a freshly downloaded (or adopted) entry and runs an eviction
    /// pass. Returns the paths of any entries evicted to make room, for the
    /// caller to remove from disk outside the lock.
    ///
    /// The just-inserted entry is never itself chosen as a victim of this
    /// pass, even if it alone exceeds the budget: the caller still has to
    /// hand its path back to whoever asked for it. An artifact larger than
    /// the budget is instead evicted by the *next* call that runs this
    /// eviction pass (the next publish, or an explicit invalidation) --
    /// "immediately" in the sense of "as soon as cache bookkeeping runs
    /// again," not "before the current caller can read it" (spec.md §4.3).
    pub fn publish(&self, key: FileCacheKey, path: PathBuf, size: u64) -> Vec<PathBuf> {
        let mut guard = self.inner.lock();
        guard.total_bytes += size;
        guard.entries.insert(
            key.clone(),
            ReadyEntry {
                path,
                size,
                last_access: Instant::now(),
            },
        );
        evict_locked(&mut guard, self.budget, Some(&key))
    }

    /// Removes every entry whose key matches `project`, across all indexes.
    /// Returns the removed paths for the caller to delete.
    pub fn invalidate_project(&self, project: &str) -> Vec<PathBuf> {
        let mut guard = self.inner.lock();
        let matching: Vec<FileCacheKey> = guard
            .entries
            .keys()
            .filter(|k| k.project == project)
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(matching.len());
        for key in matching {
            if let Some(entry) = guard.entries.remove(&key) {
                guard.total_bytes -= entry.size;
                removed.push(entry.path);
            }
        }
        removed
    }

    /// Removes every entry. Returns the removed paths for the caller to
    /// delete.
    pub fn invalidate_all(&self) -> Vec<PathBuf> {
        let mut guard = self.inner.lock();
        guard.total_bytes = 0;
        guard.entries.drain().map(|(_, e)| e.path).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }
}

/// While the total exceeds budget, evicts the entry with the smallest size,
/// ties broken by oldest `last_access`. A zero budget is handled by callers
/// never calling `publish` in the first place (caching disabled entirely),
/// so this never has to reconcile a zero budget against an in-flight
/// single-artifact overage -- the one oversized-artifact case in spec.md
/// §4.3 plays out as: publish (now over budget), serve, then this pass
/// evicts it immediately since it is the only (and therefore smallest)
/// entry.
fn evict_locked(guard: &mut Inner, budget: u64, protect: Option<&FileCacheKey>) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    while guard.total_bytes > budget {
        let victim = guard
            .entries
            .iter()
            .filter(|(k, _)| Some(*k) != protect)
            .min_by(|(_, a), (_, b)| a.size.cmp(&b.size).then(a.last_access.cmp(&b.last_access)))
            .map(|(k, _)| k.clone());
        let Some(key) = victim else { break };
        if let Some(entry) = guard.entries.remove(&key) {
            guard.total_bytes -= entry.size;
            removed.push(entry.path);
        }
    }
    removed
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(n: &str) -> FileCacheKey {
        FileCacheKey::new(0, "proj", n)
    }

    #[test]
    fn evicts_smallest_first_when_over_budget() {
        let state = CacheState::new(10);
        assert!(state.publish(key("a"), PathBuf::from("a"), 4).is_empty());
        assert!(state.publish(key("b"), PathBuf::from("b"), 4).is_empty());
        let evicted = state.publish(key("c"), PathBuf::from("c"), 4);
        assert_eq!(evicted, vec![PathBuf::from("a")]);
        assert_eq!(state.total_bytes(), 8);
    }

    #[test]
    fn ties_broken_by_oldest_last_access() {
        let state = CacheState::new(10);
        state.publish(key("old"), PathBuf::from("old"), 5);
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.publish(key("new"), PathBuf::from("new"), 5);
        // touch "new" so "old" is the least-recently-used of the equal-size pair
        state.get_fresh(&key("new"));
        let evicted = state.publish(key("bump"), PathBuf::from("bump"), 1);
        assert_eq!(evicted, vec![PathBuf::from("old")]);
    }

    #[test]
    fn oversized_single_artifact_survives_its_own_publish_but_is_evicted_on_the_next() {
        let state = CacheState::new(5);
        let evicted = state.publish(key("huge"), PathBuf::from("huge"), 100);
        assert!(evicted.is_empty(), "the entry just published is never its own victim");
        assert_eq!(state.total_bytes(), 100);

        let evicted = state.publish(key("small"), PathBuf::from("small"), 1);
        assert_eq!(evicted, vec![PathBuf::from("huge")]);
        assert_eq!(state.total_bytes(), 1);
    }

    #[test]
    fn invalidate_project_only_removes_matching_project() {
        let state = CacheState::new(100);
        state.publish(FileCacheKey::new(0, "a", "x"), PathBuf::from("ax"), 1);
        state.publish(FileCacheKey::new(1, "a", "y"), PathBuf::from("ay"), 1);
        state.publish(FileCacheKey::new(0, "b", "z"), PathBuf::from("bz"), 1);
        let removed = state.invalidate_project("a");
        assert_eq!(removed.len(), 2);
        assert_eq!(state.total_bytes(), 1);
    }
}
