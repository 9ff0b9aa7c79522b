//! Single-flight resolution cache.
//!
//! Keyed by `name@requested`. The map lock is held only to look up a key
//! and, on a miss, to install an in-flight placeholder; the resolution
//! itself runs with the lock released. Callers that find a placeholder
//! wait on that key's completion signal instead of fetching again, so
//! each distinct key triggers at most one resolution per run.

use super::error::PkgError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Final outcome of resolving one key, shared by every requester.
pub type Outcome<T> = Result<Arc<T>, PkgError>;

enum Entry<T> {
    /// Resolution in progress; receivers observe `Some` once it completes.
    InFlight(watch::Receiver<Option<Outcome<T>>>),
    Ready(Outcome<T>),
}

/// Concurrency-safe single-flight cache.
pub struct ResolutionCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    resolved: Arc<AtomicUsize>,
}

impl<T> Default for ResolutionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResolutionCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            resolved: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of keys that completed successfully so far.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }

    /// Shared handle to the success counter, readable while a run is in flight.
    #[must_use]
    pub fn resolved_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.resolved)
    }

    /// Number of keys present, in flight or completed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Return the outcome for `key`, running `resolve` only if no other
    /// caller has claimed the key.
    ///
    /// # Errors
    /// Returns the (possibly cached) failure of the resolution for `key`.
    pub async fn get_or_resolve<F, Fut>(&self, key: &str, resolve: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PkgError>>,
    {
        let claim = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(Entry::Ready(outcome)) => {
                    trace!(key, "cache hit");
                    return outcome.clone();
                }
                Some(Entry::InFlight(rx)) => Claim::Wait(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    entries.insert(key.to_string(), Entry::InFlight(rx));
                    Claim::Lead(tx)
                }
            }
        };

        match claim {
            Claim::Wait(mut rx) => {
                debug!(key, "waiting on in-flight resolution");
                let outcome = match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => outcome.clone(),
                    // Leader dropped without completing
                    Err(_) => None,
                };
                outcome.unwrap_or_else(|| Err(PkgError::cancelled(key)))
            }
            Claim::Lead(tx) => {
                debug!(key, "cache miss");
                let mut guard = InFlightGuard {
                    cache: self,
                    key,
                    tx: Some(tx),
                };

                let outcome = resolve().await.map(Arc::new);
                guard.complete(outcome.clone());
                outcome
            }
        }
    }
}

enum Claim<T> {
    Lead(watch::Sender<Option<Outcome<T>>>),
    Wait(watch::Receiver<Option<Outcome<T>>>),
}

/// Owns the in-flight placeholder for one key.
///
/// If the leading future is dropped before completing, the placeholder is
/// removed so waiters are released and a later caller can claim the key.
struct InFlightGuard<'a, T> {
    cache: &'a ResolutionCache<T>,
    key: &'a str,
    tx: Option<watch::Sender<Option<Outcome<T>>>>,
}

impl<T> InFlightGuard<'_, T> {
    fn complete(&mut self, outcome: Outcome<T>) {
        let Some(tx) = self.tx.take() else {
            return;
        };

        if outcome.is_ok() {
            self.cache.resolved.fetch_add(1, Ordering::Relaxed);
        }

        self.cache
            .entries
            .lock()
            .insert(self.key.to_string(), Entry::Ready(outcome.clone()));

        tx.send_replace(Some(outcome));
    }
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            self.cache.entries.lock().remove(self.key);
        }
    }
}
