//! Idempotency registry for checkout requests.
//!
//! Deduplicates concurrent and retried requests sharing a client-supplied
//! key: the first caller proceeds with the real work, concurrent duplicates
//! await that same outcome, and late retries within the freshness window
//! replay the cached result instead of creating a second order.
//!
//! This registry is process-local and non-durable, a deliberate stop-gap.
//! A multi-instance deployment needs a shared keyed store (a table with a
//! unique constraint on the key) so the guarantee survives restarts and
//! load-balanced retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::{Duration, Instant};

type Outcome<R> = std::result::Result<R, AttemptFailed>;

/// Marker for an attempt that failed and evicted its entry.
#[derive(Debug, Clone, Copy)]
struct AttemptFailed;

enum Entry<R> {
    /// An attempt is in flight; duplicates subscribe to its outcome.
    Pending(watch::Receiver<Option<Outcome<R>>>),
    /// A completed result cached until `stored_at + ttl`.
    Done { result: R, stored_at: Instant },
}

struct Inner<R> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<R>>>,
}

/// Result of consulting the registry for a key.
pub enum Acquisition<R> {
    /// First use of the key; do the work, then `complete` or `release`.
    New(Permit<R>),
    /// A fresh cached (or concurrently produced) result; skip the work.
    Replayed(R),
    /// The concurrent attempt holding this key failed; the entry is gone and
    /// a retry will start fresh.
    Failed,
}

/// Registry of in-flight and recently completed keyed requests.
pub struct IdempotencyRegistry<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for IdempotencyRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Clone + Send + Sync> IdempotencyRegistry<R> {
    /// Creates a registry whose completed results stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Consults the registry for `key`.
    ///
    /// Exactly one caller per key observes [`Acquisition::New`] at a time. A
    /// key whose cached result has expired behaves like a brand-new key.
    pub async fn acquire(&self, key: &str) -> Acquisition<R> {
        let mut rx = {
            let mut entries = self.inner.entries.lock().unwrap();
            match entries.get(key) {
                Some(Entry::Done { result, stored_at })
                    if stored_at.elapsed() < self.inner.ttl =>
                {
                    return Acquisition::Replayed(result.clone());
                }
                Some(Entry::Pending(rx)) => rx.clone(),
                _ => {
                    // Unseen key, or a stale cached result being replaced.
                    let (tx, rx) = watch::channel(None);
                    entries.insert(key.to_string(), Entry::Pending(rx));
                    return Acquisition::New(Permit {
                        key: key.to_string(),
                        inner: Arc::clone(&self.inner),
                        tx: Some(tx),
                    });
                }
            }
        };

        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return match outcome {
                    Ok(result) => Acquisition::Replayed(result),
                    Err(AttemptFailed) => Acquisition::Failed,
                };
            }
            if rx.changed().await.is_err() {
                // Sender dropped without publishing; treat as a failed attempt.
                return Acquisition::Failed;
            }
        }
    }

    /// Number of live entries (pending or cached). Test helper.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    /// Returns true if the registry holds no entries. Test helper.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive right to execute the work behind a key.
///
/// The holder must call [`complete`](Permit::complete) on success or
/// [`release`](Permit::release) on failure. Dropping the permit without
/// either (a panic path) evicts the entry so a retry can attempt again.
pub struct Permit<R> {
    key: String,
    inner: Arc<Inner<R>>,
    tx: Option<watch::Sender<Option<Outcome<R>>>>,
}

impl<R: Clone + Send + Sync> Permit<R> {
    /// The key this permit holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publishes the successful result to waiters and caches it for the TTL.
    pub fn complete(mut self, result: R) {
        if let Some(tx) = self.tx.take() {
            {
                let mut entries = self.inner.entries.lock().unwrap();
                entries.insert(
                    self.key.clone(),
                    Entry::Done {
                        result: result.clone(),
                        stored_at: Instant::now(),
                    },
                );
            }
            let _ = tx.send(Some(Ok(result)));
        }
    }

    /// Evicts the entry after a failed attempt so retries start fresh.
    pub fn release(mut self) {
        self.evict();
    }

    fn evict(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.inner.entries.lock().unwrap().remove(&self.key);
            let _ = tx.send(Some(Err(AttemptFailed)));
        }
    }
}

impl<R> Drop for Permit<R> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.inner.entries.lock().unwrap().remove(&self.key);
            let _ = tx.send(Some(Err(AttemptFailed)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IdempotencyRegistry<u64> {
        IdempotencyRegistry::new(Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_first_acquire_is_new() {
        let registry = registry();
        match registry.acquire("key-1").await {
            Acquisition::New(permit) => {
                assert_eq!(permit.key(), "key-1");
                permit.complete(42);
            }
            _ => panic!("expected New"),
        }
    }

    #[tokio::test]
    async fn test_completed_key_replays_cached_result() {
        let registry = registry();
        let Acquisition::New(permit) = registry.acquire("key-1").await else {
            panic!("expected New");
        };
        permit.complete(42);

        match registry.acquire("key-1").await {
            Acquisition::Replayed(result) => assert_eq!(result, 42),
            _ => panic!("expected Replayed"),
        }
    }

    #[tokio::test]
    async fn test_released_key_allows_fresh_attempt() {
        let registry = registry();
        let Acquisition::New(permit) = registry.acquire("key-1").await else {
            panic!("expected New");
        };
        permit.release();

        assert!(matches!(
            registry.acquire("key-1").await,
            Acquisition::New(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_awaits_outcome() {
        let registry = registry();
        let Acquisition::New(permit) = registry.acquire("key-1").await else {
            panic!("expected New");
        };

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("key-1").await })
        };
        // Let the duplicate subscribe before the result lands.
        tokio::task::yield_now().await;

        permit.complete(7);

        match waiter.await.unwrap() {
            Acquisition::Replayed(result) => assert_eq!(result, 7),
            _ => panic!("expected Replayed"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_observes_failure() {
        let registry = registry();
        let Acquisition::New(permit) = registry.acquire("key-1").await else {
            panic!("expected New");
        };

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("key-1").await })
        };
        tokio::task::yield_now().await;

        permit.release();

        assert!(matches!(waiter.await.unwrap(), Acquisition::Failed));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_permit_evicts_entry() {
        let registry = registry();
        {
            let Acquisition::New(_permit) = registry.acquire("key-1").await else {
                panic!("expected New");
            };
            // dropped without complete/release
        }
        assert!(registry.is_empty());
        assert!(matches!(
            registry.acquire("key-1").await,
            Acquisition::New(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_result_starts_fresh_attempt() {
        let registry = IdempotencyRegistry::new(Duration::from_secs(60));
        let Acquisition::New(permit) = registry.acquire("key-1").await else {
            panic!("expected New");
        };
        permit.complete(1);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(matches!(
            registry.acquire("key-1").await,
            Acquisition::New(_)
        ));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_interfere() {
        let registry = registry();
        let Acquisition::New(a) = registry.acquire("key-a").await else {
            panic!("expected New");
        };
        let Acquisition::New(b) = registry.acquire("key-b").await else {
            panic!("expected New");
        };
        a.complete(1);
        b.complete(2);

        match registry.acquire("key-b").await {
            Acquisition::Replayed(result) => assert_eq!(result, 2),
            _ => panic!("expected Replayed"),
        }
    }
}
