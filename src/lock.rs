// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named distributed locks.
//!
//! A lock is a scalar key `lock.<key>[.<h_key>]` holding the owner's
//! identifier, written with SET NX PX so the store enforces both mutual
//! exclusion and expiry. A holder that dies never blocks others for longer
//! than the lock TTL.
//!
//! Each acquire attempt goes `ATTEMPT -> ACQUIRED | RETRY -> ATTEMPT | TIMED_OUT`.
//! Contention is not an error: a timed-out acquire returns `false`.
//!
//! ```
//! use coord_cache::{Cache, CacheConfig, LockManager, LockRequest, ReleaseOutcome};
//!
//! # async fn demo() -> Result<(), coord_cache::LockError> {
//! let locks = LockManager::new(Cache::in_memory(), &CacheConfig::default());
//! let request = LockRequest::with_generated_identifier("orders").h_key("BTC");
//!
//! if locks.acquire(&request).await? {
//!     // ... critical section ...
//!     assert_eq!(locks.release(&request).await?, ReleaseOutcome::Released);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::{CacheError, Command};
use crate::config::CacheConfig;
use crate::metrics;
use crate::store::Cache;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    /// Caller bug: every lock operation needs an owner identifier.
    #[error("lock identifier is required for {0}")]
    MissingIdentifier(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What to lock and on whose behalf.
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub key: String,
    pub h_key: Option<String>,
    pub identifier: String,
    /// Overrides the configured acquire timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured lock TTL.
    pub expire_in: Option<Duration>,
}

impl LockRequest {
    pub fn new(key: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            h_key: None,
            identifier: identifier.into(),
            timeout: None,
            expire_in: None,
        }
    }

    /// A request owned by a fresh random identifier.
    pub fn with_generated_identifier(key: impl Into<String>) -> Self {
        Self::new(key, Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn h_key(mut self, h_key: impl Into<String>) -> Self {
        self.h_key = Some(h_key.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn expire_in(mut self, ttl: Duration) -> Self {
        self.expire_in = Some(ttl);
        self
    }

    /// The store key guarding this lock.
    pub fn lock_key(&self) -> String {
        match self.h_key.as_deref().filter(|h| !h.is_empty()) {
            Some(h_key) => format!("lock.{}.{}", self.key, h_key),
            None => format!("lock.{}", self.key),
        }
    }

    fn check_identifier(&self, operation: &str) -> Result<(), LockError> {
        if self.identifier.is_empty() {
            return Err(LockError::MissingIdentifier(operation.to_string()));
        }
        Ok(())
    }
}

/// Result of [`LockManager::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The lock was absent or held by another identifier; nothing was deleted.
    NotOwner,
}

/// Acquires and releases locks through a shared [`Cache`].
#[derive(Debug, Clone)]
pub struct LockManager {
    cache: Cache,
    timeout: Duration,
    expire_in: Duration,
    retry_interval: Duration,
}

impl LockManager {
    pub fn new(cache: Cache, config: &CacheConfig) -> Self {
        Self {
            cache,
            timeout: config.lock_timeout(),
            expire_in: config.lock_expire(),
            retry_interval: config.lock_retry(),
        }
    }

    /// Try to take the lock, retrying at a fixed interval until the timeout
    /// passes. Returns `false` on timeout.
    #[instrument(skip(self, request), fields(lock = %request.lock_key()))]
    pub async fn acquire(&self, request: &LockRequest) -> Result<bool, LockError> {
        request.check_identifier("acquire")?;

        let lock_key = request.lock_key();
        let timeout = request.timeout.unwrap_or(self.timeout);
        let ttl = request.expire_in.unwrap_or(self.expire_in);
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let reply = self
                .cache
                .run(Command::SetNxPx {
                    key: lock_key.clone(),
                    value: request.identifier.clone(),
                    millis,
                })
                .await;

            match reply {
                Ok(reply) if reply.as_bool() => {
                    metrics::record_lock_attempt("acquired");
                    metrics::record_lock_wait(started.elapsed());
                    debug!(attempts, "Lock acquired");
                    return Ok(true);
                }
                Ok(_) => {}
                Err(err) => {
                    metrics::record_lock_attempt("error");
                    return Err(err.into());
                }
            }

            if started.elapsed() > timeout {
                metrics::record_lock_attempt("timeout");
                metrics::record_lock_wait(started.elapsed());
                debug!(attempts, ?timeout, "Lock acquire timed out");
                return Ok(false);
            }
            sleep(self.retry_interval).await;
        }
    }

    /// Delete the lock if, and only if, it is still held by this request's
    /// identifier.
    #[instrument(skip(self, request), fields(lock = %request.lock_key()))]
    pub async fn release(&self, request: &LockRequest) -> Result<ReleaseOutcome, LockError> {
        request.check_identifier("release")?;

        let reply = self
            .cache
            .run(Command::DeleteIfEquals {
                key: request.lock_key(),
                value: request.identifier.clone(),
            })
            .await?;

        if reply.as_bool() {
            debug!("Lock released");
            Ok(ReleaseOutcome::Released)
        } else {
            warn!(identifier = %request.identifier, "Lock not held by this identifier; left in place");
            metrics::record_lock_mismatch();
            Ok(ReleaseOutcome::NotOwner)
        }
    }
}

impl Cache {
    /// A lock manager sharing this handle, with lock defaults from `config`.
    pub fn locks(&self, config: &CacheConfig) -> LockManager {
        LockManager::new(self.clone(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Reply;

    fn manager() -> LockManager {
        Cache::in_memory().locks(&CacheConfig::default())
    }

    #[test]
    fn test_lock_key_format() {
        assert_eq!(LockRequest::new("orders", "id").lock_key(), "lock.orders");
        assert_eq!(LockRequest::new("orders", "id").h_key("BTC").lock_key(), "lock.orders.BTC");
    }

    #[test]
    fn test_generated_identifiers_differ() {
        let a = LockRequest::with_generated_identifier("k");
        let b = LockRequest::with_generated_identifier("k");
        assert_eq!(a.identifier.len(), 36);
        assert_ne!(a.identifier, b.identifier);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_a_caller_error() {
        let locks = manager();
        let err = locks.acquire(&LockRequest::new("k", "")).await.unwrap_err();
        assert_eq!(err, LockError::MissingIdentifier("acquire".into()));
        let err = locks.release(&LockRequest::new("k", "")).await.unwrap_err();
        assert_eq!(err, LockError::MissingIdentifier("release".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutual_exclusion() {
        let locks = manager();
        let a = LockRequest::new("k", "A");
        let b = LockRequest::new("k", "B").timeout(Duration::from_millis(50));

        assert!(locks.acquire(&a).await.unwrap());
        assert!(!locks.acquire(&b).await.unwrap());

        assert_eq!(locks.release(&a).await.unwrap(), ReleaseOutcome::Released);
        assert!(locks.acquire(&b).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_by_non_owner_keeps_lock() {
        let cache = Cache::in_memory();
        let locks = cache.locks(&CacheConfig::default());
        let owner = LockRequest::new("k", "B");
        let intruder = LockRequest::new("k", "A");

        assert!(locks.acquire(&owner).await.unwrap());
        assert_eq!(locks.release(&intruder).await.unwrap(), ReleaseOutcome::NotOwner);

        let held = cache.run(Command::Get { key: "lock.k".into() }).await.unwrap();
        assert_eq!(held, Reply::Text("B".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_by_ttl() {
        let locks = manager();
        let a = LockRequest::new("k", "A").expire_in(Duration::from_millis(100));
        let b = LockRequest::new("k", "B").timeout(Duration::from_millis(500));

        assert!(locks.acquire(&a).await.unwrap());
        // B keeps retrying and gets in once A's TTL lapses
        assert!(locks.acquire(&b).await.unwrap());
        assert_eq!(locks.release(&a).await.unwrap(), ReleaseOutcome::NotOwner);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_single_winner() {
        let locks = manager();
        let mut handles = Vec::new();
        for n in 0..5 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let request = LockRequest::new("shared", format!("worker-{}", n))
                    .timeout(Duration::from_millis(30));
                locks.acquire(&request).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
