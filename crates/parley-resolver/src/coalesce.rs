use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error)]
pub enum CoalesceError {
    /// The leader did not settle before the ceiling; its entry was dropped.
    #[error("in-flight call for {key} auto-released after {}ms", .after.as_millis())]
    AutoReleased { key: String, after: Duration },

    /// The leader task went away without publishing an outcome.
    #[error("in-flight call for {key} ended without an outcome")]
    Abandoned { key: String },
}

type Outcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct InFlight<T, E> {
    /// Identifies this registration so a late release cannot evict a newer one.
    id: u64,
    outcome: Outcome<T, E>,
}

/// Collapses concurrent calls for the same key into one execution whose
/// outcome every caller shares.
///
/// The first call for a key spawns the work and registers its outcome; calls
/// arriving while it is pending await that outcome instead of running their
/// own. Once it settles (or hits the ceiling) the key is released and the next
/// call starts fresh.
pub struct Coalescer<K, T, E> {
    inner: Arc<CoalescerInner<K, T, E>>,
}

struct CoalescerInner<K, T, E> {
    ceiling: Duration,
    next_id: AtomicU64,
    in_flight: Mutex<HashMap<K, InFlight<T, E>>>,
}

impl<K, T, E> Clone for Coalescer<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T, E> Coalescer<K, T, E>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<CoalesceError> + 'static,
{
    pub fn new(ceiling: Duration) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                ceiling,
                next_id: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `f` under `key`, or join the call already in flight for it.
    /// `f` is only invoked when this call becomes the leader.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let outcome = self.start(key, f);
        outcome.await
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().len()
    }

    fn start<F, Fut>(&self, key: K, f: F) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut in_flight = self.inner.lock();

        let entry = match in_flight.entry(key) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight call for {}", entry.key());
                return entry.get().outcome.clone();
            }
            Entry::Vacant(entry) => entry,
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let key = entry.key().clone();
        let (tx, rx) = oneshot::channel();

        let abandoned_key = key.to_string();
        let outcome: Outcome<T, E> = rx
            .map(move |received| {
                received.unwrap_or_else(|_| Err(CoalesceError::Abandoned { key: abandoned_key }.into()))
            })
            .boxed()
            .shared();
        entry.insert(InFlight {
            id,
            outcome: outcome.clone(),
        });

        // Spawned so the work keeps going even if every waiter is dropped.
        let inner = Arc::clone(&self.inner);
        let work = f();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(inner.ceiling, work).await {
                Ok(result) => {
                    debug!("In-flight call for {} settled", key);
                    result
                }
                Err(_) => {
                    warn!(
                        "Auto-released in-flight call for {} after {}ms without a result",
                        key,
                        inner.ceiling.as_millis()
                    );
                    Err(CoalesceError::AutoReleased {
                        key: key.to_string(),
                        after: inner.ceiling,
                    }
                    .into())
                }
            };

            // Release before publishing so a waiter that retries immediately
            // starts a fresh call instead of joining this one.
            inner.finish(&key, id);
            let _ = tx.send(result);
        });

        outcome
    }
}

impl<K: Eq + Hash, T, E> CoalescerInner<K, T, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, InFlight<T, E>>> {
        // The map is only touched by single insert/remove calls, so a panic
        // elsewhere cannot leave it half-updated.
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the entry for `key`, but only if it is still registration `id`.
    fn finish(&self, key: &K, id: u64) {
        let mut in_flight = self.lock();
        if let Some(entry) = in_flight.get(key) {
            if entry.id == id {
                in_flight.remove(key);
            }
        }
    }
}
