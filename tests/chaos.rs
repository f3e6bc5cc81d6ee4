//! Chaos Testing for Coord Cache
//!
//! This module tests failure scenarios using:
//! 1. **FailingBackend wrapper** - precise error injection at specific call counts
//! 2. **Data corruption** - garbage members and values written below the typed layer
//! 3. **Contention** - many tasks racing for one lock
//!
//! Everything here runs in-process against `MemoryBackend`.
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use coord_cache::store::options::{GetOptions, SetOptions};
use coord_cache::{
    Backend, Cache, CacheConfig, CacheError, CacheKey, Command, Decoded, LockError, LockRequest,
    MemoryBackend, Reply,
};

// =============================================================================
// Failing Backend Wrapper - Precise Error Injection
// =============================================================================

/// A wrapper that injects failures at specific call counts.
/// Useful for testing error handling paths with precision.
pub struct FailingBackend<B: Backend> {
    inner: B,
    call_count: AtomicU64,
    /// Fail on these call numbers (1-indexed)
    fail_on_calls: Vec<u64>,
    /// Error to return
    error: CacheError,
    /// Whether to fail all calls from the first listed one onwards
    fail_permanently: AtomicBool,
}

impl<B: Backend> FailingBackend<B> {
    pub fn new(inner: B, fail_on_calls: Vec<u64>, error: CacheError) -> Self {
        Self {
            inner,
            call_count: AtomicU64::new(0),
            fail_on_calls,
            error,
            fail_permanently: AtomicBool::new(false),
        }
    }

    /// Create a backend that fails permanently after N calls
    pub fn fail_after(inner: B, n: u64, error: CacheError) -> Self {
        let backend = Self::new(inner, vec![n + 1], error);
        backend.fail_permanently.store(true, Ordering::SeqCst);
        backend
    }

    pub fn calls(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_permanently.load(Ordering::SeqCst) && !self.fail_on_calls.is_empty() {
            count >= self.fail_on_calls[0]
        } else {
            self.fail_on_calls.contains(&count)
        }
    }

    fn maybe_fail(&self) -> Result<(), CacheError> {
        if self.should_fail() {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for FailingBackend<B> {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn run(&self, command: Command) -> Result<Reply, CacheError> {
        self.maybe_fail()?;
        self.inner.run(command).await
    }

    async fn run_atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>, CacheError> {
        self.maybe_fail()?;
        self.inner.run_atomic(commands).await
    }
}

fn unavailable() -> CacheError {
    CacheError::Unavailable("connection refused".into())
}

fn failing_cache(backend: FailingBackend<MemoryBackend>) -> (Cache, Arc<FailingBackend<MemoryBackend>>) {
    let backend = Arc::new(backend);
    (Cache::with_backend(backend.clone()), backend)
}

// =============================================================================
// Error Propagation
// =============================================================================

#[tokio::test]
async fn chaos_command_error_is_not_retried() {
    let (cache, backend) = failing_cache(FailingBackend::new(MemoryBackend::new(), vec![1], unavailable()));

    let err = cache.get(&CacheKey::new("k"), &GetOptions::scalar()).await.unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(backend.calls(), 1, "failed command must not be retried");

    // The next call goes through
    assert!(cache.get(&CacheKey::new("k"), &GetOptions::scalar()).await.unwrap().is_missing());
}

#[tokio::test]
async fn chaos_scan_fails_mid_cursor() {
    // Call 1 seeds, call 2 reads the first scan page, call 3 fails
    let (cache, backend) = failing_cache(FailingBackend::new(MemoryBackend::new(), vec![3], unavailable()));
    let rows: Vec<_> = (0..30).map(|n| json!({"n": n, "tag": "x"})).collect();
    cache.set(&CacheKey::new("z"), &json!(rows), &SetOptions::sorted().key_attr("n"), None).await.unwrap();

    let err = cache
        .get(&CacheKey::new("z"), &GetOptions::sorted().filter(json!({"tag": "x"})))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(backend.calls(), 3);

    // A fresh scan completes
    let found = cache.scan(&CacheKey::new("z"), &json!({"tag": "x"})).await.unwrap();
    assert_eq!(found.len(), 30);
}

#[tokio::test]
async fn chaos_failed_execute_applies_nothing() {
    let (cache, _) = failing_cache(FailingBackend::new(MemoryBackend::new(), vec![1], unavailable()));

    let mut tx = cache.start();
    cache.set(&CacheKey::new("a"), &json!(1), &SetOptions::scalar(), Some(&mut tx)).await.unwrap();
    cache.set(&CacheKey::new("b"), &json!(2), &SetOptions::scalar(), Some(&mut tx)).await.unwrap();

    let err = cache.execute(tx).await.unwrap_err();
    assert!(err.is_unavailable());

    assert!(cache.get(&CacheKey::new("a"), &GetOptions::scalar()).await.unwrap().is_missing());
    assert!(cache.get(&CacheKey::new("b"), &GetOptions::scalar()).await.unwrap().is_missing());
}

#[tokio::test]
async fn chaos_lock_acquire_surfaces_store_failure() {
    let (cache, backend) = failing_cache(FailingBackend::fail_after(MemoryBackend::new(), 0, unavailable()));
    let locks = cache.locks(&CacheConfig::default());

    let err = locks.acquire(&LockRequest::new("job", "A")).await.unwrap_err();
    assert!(matches!(err, LockError::Cache(CacheError::Unavailable(_))));
    assert_eq!(backend.calls(), 1, "store failure must end the acquire loop");
}

#[tokio::test]
async fn chaos_delta_script_failure_propagates() {
    let (cache, _) = failing_cache(FailingBackend::new(
        MemoryBackend::new(),
        vec![1],
        CacheError::Command("ERR Error running script".into()),
    ));
    let err = cache.apply_deltas(&CacheKey::new("z"), &json!({"m": 1})).await.unwrap_err();
    assert!(matches!(err, CacheError::Command(_)));
}

// =============================================================================
// Data Corruption
// =============================================================================

#[tokio::test]
async fn chaos_garbage_values_come_back_raw() {
    let cache = Cache::in_memory();
    cache
        .backend()
        .run(Command::Set { key: "k".into(), value: "{not json".into() })
        .await
        .unwrap();

    let fetched = cache.get(&CacheKey::new("k"), &GetOptions::scalar()).await.unwrap();
    assert_eq!(fetched.first(), Some(Decoded::Raw("{not json".into())));
}

#[tokio::test]
async fn chaos_walk_over_members_without_quantities() {
    let cache = Cache::in_memory();
    cache
        .backend()
        .run(Command::ZAddNx {
            key: "z".into(),
            entries: vec![(1.0, "alpha".into()), (2.0, "beta,7".into()), (3.0, "gamma".into())],
        })
        .await
        .unwrap();

    // No leading numbers anywhere: the walk visits everything and stops
    let entries = cache.walk_until_sum(&CacheKey::new("z"), 5.0, false).await.unwrap();
    assert_eq!(entries.len(), 3);
}

// =============================================================================
// Contention
// =============================================================================

#[tokio::test(start_paused = true)]
async fn chaos_lock_stampede_has_one_holder_at_a_time() {
    let cache = Cache::in_memory();
    let locks = cache.locks(&CacheConfig::default());
    let holders = Arc::new(AtomicU64::new(0));
    let max_seen = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for n in 0..8 {
        let locks = locks.clone();
        let holders = holders.clone();
        let max_seen = max_seen.clone();
        handles.push(tokio::spawn(async move {
            let request = LockRequest::new("stampede", format!("w{}", n)).timeout(Duration::from_secs(10));
            assert!(locks.acquire(&request).await.unwrap());
            let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            holders.fetch_sub(1, Ordering::SeqCst);
            locks.release(&request).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}
