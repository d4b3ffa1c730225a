//! Sliding window attempt limiting.
//!
//! Each `(client, action)` key maps to the timestamps of its admitted
//! attempts. On every check, entries at least one window old are dropped,
//! and the attempt is admitted only while fewer than `max_attempts` remain.
//!
//! The read-filter-append sequence goes through [`AttemptStore`] as a
//! versioned get plus compare-and-put, retried on conflict. Two concurrent
//! attempts on one key can therefore never both see the pre-increment count.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::observability::metrics;
use crate::SharedClock;

/// Upper bound on compare-and-put retries before failing closed.
const MAX_CAS_RETRIES: usize = 64;

/// Rate limit key: who is attempting what.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub client: String,
    pub action: String,
}

impl RateKey {
    pub fn new(client: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.action)
    }
}

/// Attempt timestamps for one key plus a version for optimistic updates.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    /// 0 means the key has never been written.
    pub version: u64,
    pub attempts: Vec<DateTime<Utc>>,
}

/// Storage for attempt logs.
///
/// The in-memory store serves a single instance; a shared counter service
/// can implement the same two operations for multi-instance deployments.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Current log for `key`, or an empty version-0 log.
    async fn get(&self, key: &RateKey) -> AttemptLog;

    /// Store `attempts` only if the key is still at `expected_version`.
    async fn compare_and_put(
        &self,
        key: &RateKey,
        expected_version: u64,
        attempts: Vec<DateTime<Utc>>,
    ) -> bool;

    /// Number of keys ever written. Idle keys are never evicted.
    fn tracked_keys(&self) -> usize;
}

/// Process-local attempt store.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    entries: DashMap<RateKey, AttemptLog>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn get(&self, key: &RateKey) -> AttemptLog {
        self.entries
            .get(key)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    async fn compare_and_put(
        &self,
        key: &RateKey,
        expected_version: u64,
        attempts: Vec<DateTime<Utc>>,
    ) -> bool {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().version != expected_version {
                    return false;
                }
                slot.insert(AttemptLog {
                    version: expected_version + 1,
                    attempts,
                });
                true
            }
            Entry::Vacant(slot) => {
                if expected_version != 0 {
                    return false;
                }
                slot.insert(AttemptLog {
                    version: 1,
                    attempts,
                });
                true
            }
        }
    }

    fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

/// Sliding window limiter with fixed window and threshold.
pub struct RateLimiter {
    store: Arc<dyn AttemptStore>,
    window: Duration,
    max_attempts: usize,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        window: Duration,
        max_attempts: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            window,
            max_attempts,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Retry hint handed to rejected callers, in whole minutes (rounded up).
    pub fn retry_after_minutes(&self) -> u64 {
        self.window.as_secs().div_ceil(60)
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.tracked_keys()
    }

    /// Admit or deny one attempt of `action` by `client`.
    ///
    /// An admitted attempt is recorded before this returns.
    pub async fn admit(&self, client: &str, action: &str) -> bool {
        self.acquire(client, action).await.is_some()
    }

    /// Like [`admit`](Self::admit), but hands back the recorded timestamp so
    /// the slot can later be returned with [`refund`](Self::refund).
    pub async fn acquire(&self, client: &str, action: &str) -> Option<DateTime<Utc>> {
        let key = RateKey::new(client, action);

        for _ in 0..MAX_CAS_RETRIES {
            let now = self.clock.utc();
            let log = self.store.get(&key).await;

            let mut live: Vec<DateTime<Utc>> = log
                .attempts
                .into_iter()
                .filter(|at| match now.signed_duration_since(*at).to_std() {
                    Ok(age) => age < self.window,
                    // Recorded in the future (clock stepped back): still live.
                    Err(_) => true,
                })
                .collect();

            if live.len() >= self.max_attempts {
                tracing::warn!(key = %key, attempts = live.len(), "Rate limit exceeded");
                metrics::record_rate_limited(action);
                return None;
            }

            live.push(now);
            if self.store.compare_and_put(&key, log.version, live).await {
                return Some(now);
            }
            tracing::trace!(key = %key, "Attempt log changed concurrently, retrying");
        }

        tracing::error!(key = %key, "Attempt log contention exhausted retries, denying");
        None
    }

    /// Remove one attempt recorded at `at` for `(client, action)`.
    ///
    /// Returns false when no such attempt is held, either because it already
    /// aged out or because the store stayed contended.
    pub async fn refund(&self, client: &str, action: &str, at: DateTime<Utc>) -> bool {
        let key = RateKey::new(client, action);

        for _ in 0..MAX_CAS_RETRIES {
            let log = self.store.get(&key).await;
            let Some(pos) = log.attempts.iter().position(|t| *t == at) else {
                return false;
            };

            let mut attempts = log.attempts;
            attempts.remove(pos);
            if self.store.compare_and_put(&key, log.version, attempts).await {
                tracing::debug!(key = %key, "Attempt refunded");
                return true;
            }
        }

        tracing::error!(key = %key, "Attempt log contention exhausted retries, refund dropped");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ManualClock;

    const WINDOW: Duration = Duration::from_secs(15 * 60);

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryAttemptStore::new()), WINDOW, 5, clock)
    }

    #[tokio::test]
    async fn test_sixth_attempt_denied() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock.clone());

        for i in 0..5 {
            assert!(limiter.admit("10.0.0.1", "login").await, "attempt {i}");
            clock.advance(Duration::from_secs(10));
        }
        assert!(!limiter.admit("10.0.0.1", "login").await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock);

        for _ in 0..5 {
            assert!(limiter.admit("10.0.0.1", "login").await);
        }
        assert!(!limiter.admit("10.0.0.1", "login").await);
        assert!(limiter.admit("10.0.0.1", "register").await);
        assert!(limiter.admit("10.0.0.2", "login").await);
        assert_eq!(limiter.tracked_keys(), 3);
    }

    #[tokio::test]
    async fn test_admitted_after_window_elapses() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock.clone());

        for _ in 0..5 {
            assert!(limiter.admit("client", "login").await);
        }
        assert!(!limiter.admit("client", "login").await);

        clock.advance(WINDOW - Duration::from_secs(1));
        assert!(!limiter.admit("client", "login").await);

        clock.advance(Duration::from_secs(1));
        assert!(limiter.admit("client", "login").await);
    }

    #[tokio::test]
    async fn test_window_slides_per_attempt() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock.clone());

        // One early attempt, four late ones.
        assert!(limiter.admit("c", "a").await);
        clock.advance(Duration::from_secs(10 * 60));
        for _ in 0..4 {
            assert!(limiter.admit("c", "a").await);
        }
        assert!(!limiter.admit("c", "a").await);

        // Only the early attempt has aged out.
        clock.advance(Duration::from_secs(5 * 60));
        assert!(limiter.admit("c", "a").await);
        assert!(!limiter.admit("c", "a").await);
    }

    #[tokio::test]
    async fn test_denied_attempts_are_not_recorded() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock.clone());

        for _ in 0..5 {
            assert!(limiter.admit("c", "a").await);
        }
        for _ in 0..20 {
            clock.advance(Duration::from_secs(1));
            assert!(!limiter.admit("c", "a").await);
        }

        // Denials did not extend the window.
        clock.advance(WINDOW - Duration::from_secs(20));
        assert!(limiter.admit("c", "a").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_attempts_never_over_admit() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = Arc::new(limiter(clock));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit("fresh", "login").await })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn test_idle_keys_are_retained() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock.clone());

        for i in 0..1000 {
            assert!(limiter.admit(&format!("client-{i}"), "login").await);
        }
        clock.advance(WINDOW * 4);
        assert!(limiter.admit("client-0", "login").await);

        // No eviction: every key ever seen is still held.
        assert_eq!(limiter.tracked_keys(), 1000);
    }

    #[tokio::test]
    async fn test_refund_frees_one_slot() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = limiter(clock.clone());

        let mut slots = Vec::new();
        for _ in 0..5 {
            slots.push(limiter.acquire("c", "a").await.unwrap());
            clock.advance(Duration::from_secs(1));
        }
        assert!(limiter.acquire("c", "a").await.is_none());

        assert!(limiter.refund("c", "a", slots[2]).await);
        assert!(!limiter.refund("c", "a", slots[2]).await);
        assert!(limiter.admit("c", "a").await);
        assert!(!limiter.admit("c", "a").await);
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let store = InMemoryAttemptStore::new();
        let key = RateKey::new("c", "a");
        let now = Utc::now();

        assert!(store.compare_and_put(&key, 0, vec![now]).await);
        assert!(!store.compare_and_put(&key, 0, vec![now]).await);
        assert!(store.compare_and_put(&key, 1, vec![now, now]).await);
        assert_eq!(store.get(&key).await.attempts.len(), 2);
    }

    #[test]
    fn test_retry_hint_rounds_up() {
        let clock = Arc::new(ManualClock::epoch());
        let limiter = RateLimiter::new(
            Arc::new(InMemoryAttemptStore::new()),
            Duration::from_secs(90),
            1,
            clock,
        );
        assert_eq!(limiter.retry_after_minutes(), 2);
    }
}
