//! A keyed single-flight coordinator: for any key, the first caller becomes
//! the producer and runs the supplied future to completion; concurrent
//! callers for the same key attach as waiters and receive the producer's
//! result instead of starting their own.
//!
//! Unlike a memoizing cache, a finished key is immediately forgotten — the
//! next caller for that key always starts a fresh race. Long-term storage of
//! the produced value is the caller's responsibility (see `proxpi-cache`'s
//! file cache, which promotes a successful download to a READY entry under
//! its own lock and only uses this crate to coordinate the DOWNLOADING
//! window).
//!
//! The producer is spawned onto a detached `tokio` task rather than driven
//! inline by the calling future: a waiter that abandons its wait (on timeout,
//! or because its own request was canceled) must not stop the download for
//! everyone else.
//!
//! Grounded on `coalesced_map::CoalescedMap`'s technique of storing only a
//! `Weak` broadcast sender per key: once the producer's task finishes, its
//! one strong `Arc` is dropped and the map's `Weak` silently goes dangling,
//! which the next caller reads as "nobody is producing" and acts on without
//! any explicit cleanup step.

use std::{
    future::Future,
    hash::Hash,
    sync::{Arc, Weak},
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;

/// Error surfaced to a waiter (including the producer itself, which is just
/// the first waiter on its own broadcast).
#[derive(Debug, Clone)]
pub enum FlightError<E> {
    /// The producer's future resolved to `Err`.
    Producer(E),
    /// The producer's task was dropped/panicked before it could send a
    /// result. Practically unreachable unless the producer future panics.
    Lost,
}

impl<E: std::fmt::Display> std::fmt::Display for FlightError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightError::Producer(e) => write!(f, "{e}"),
            FlightError::Lost => write!(f, "producer task ended without a result"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for FlightError<E> {}

/// The outcome of waiting on a single-flight key with a bound on how long to
/// wait.
#[derive(Debug, Clone)]
pub enum Wait<V, E> {
    /// The producer finished (successfully or not) within the deadline.
    Ready(Result<V, FlightError<E>>),
    /// The deadline elapsed while the producer was still running. The
    /// producer is unaffected and keeps running in the background.
    TimedOut,
}

pub struct SingleFlight<K, V, E> {
    inflight: DashMap<K, Weak<broadcast::Sender<Result<V, E>>>>,
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Returns `true` if a producer is currently running for `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight
            .get(key)
            .is_some_and(|w| w.upgrade().is_some())
    }

    fn subscribe_or_become_producer<F, Fut>(&self, key: K, init: F) -> broadcast::Receiver<Result<V, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let tx = match self.inflight.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(tx) = entry.get().upgrade() {
                    return tx.subscribe();
                }
                let (tx, _) = broadcast::channel(1);
                let tx = Arc::new(tx);
                entry.insert(Arc::downgrade(&tx));
                tx
            }
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                let tx = Arc::new(tx);
                entry.insert(Arc::downgrade(&tx));
                tx
            }
        };

        let rx = tx.subscribe();
        tokio::spawn(async move {
            let result = init().await;
            let _ = tx.send(result);
            // `tx` drops here, the map's `Weak` goes dangling.
        });
        rx
    }

    /// Runs `init` for `key` if nobody else is already, otherwise waits for
    /// the in-flight producer. Waits unboundedly.
    pub async fn get_or_spawn<F, Fut>(&self, key: K, init: F) -> Result<V, FlightError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut rx = self.subscribe_or_become_producer(key, init);
        rx.recv()
            .await
            .map_err(|_| FlightError::Lost)
            .and_then(|r| r.map_err(FlightError::Producer))
    }

    /// Like [`Self::get_or_spawn`], but gives up waiting after `timeout` and
    /// returns `Wait::TimedOut` instead. The producer is never affected by a
    /// waiter timing out; it keeps running and may still complete for the
    /// benefit of the next caller.
    pub async fn get_or_spawn_with_timeout<F, Fut>(
        &self,
        key: K,
        timeout: Duration,
        init: F,
    ) -> Wait<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut rx = self.subscribe_or_become_producer(key, init);
        tokio::select! {
            recv = rx.recv() => Wait::Ready(
                recv.map_err(|_| FlightError::Lost)
                    .and_then(|r| r.map_err(FlightError::Producer)),
            ),
            _ = tokio::time::sleep(timeout) => Wait::TimedOut,
        }
    }
}
