// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The cache handle and everything built on it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Cache (cloneable handle, one shared Arc<dyn Backend>)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  typed.rs        get / set / update / delete / increment     │
//! │  └─ range.rs     default list / score windows                │
//! │  └─ scan.rs      cursor-driven pattern scan with dedup       │
//! │  └─ walk.rs      consume a sorted set until a sum is reached │
//! │  delta.rs        atomic multi-member score deltas            │
//! │  transaction.rs  queue writes, execute as MULTI/EXEC         │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                      Command / Reply
//!                              ▼
//!                 Backend (redis or memory)
//! ```
//!
//! There is no global connection. Build one [`Cache`] at startup, clone it
//! into whatever needs it, and call [`Cache::shutdown`] when done.

pub mod delta;
pub mod options;
pub mod range;
pub mod scan;
pub mod transaction;
pub mod typed;
pub mod walk;

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{Backend, CacheError, Command, MemoryBackend, RedisBackend, Reply};
use crate::config::CacheConfig;
use crate::metrics;
use transaction::Transaction;

/// Process-wide handle to the backing store.
///
/// Cloning is cheap and every clone shares the same backend, so the handle
/// can be passed to every component that needs it.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn Backend>,
}

impl Cache {
    /// Use an already-built backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// A cache over a fresh in-process keyspace.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Connect to the store described by `config`.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let backend = RedisBackend::connect(config).await?;
        Ok(Self::with_backend(Arc::new(backend)))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Release this handle's reference to the backend. The connection closes
    /// once the last clone is gone.
    pub fn shutdown(self) {
        info!(backend = self.backend.name(), "Cache handle shut down");
    }

    /// Send one command now.
    pub(crate) async fn run(&self, command: Command) -> Result<Reply, CacheError> {
        let backend = self.backend.name();
        let operation = command.name();
        let _timer = metrics::LatencyTimer::new(backend, operation);

        let result = self.backend.run(command).await;

        match &result {
            Ok(_) => metrics::record_operation(backend, operation, "success"),
            Err(err) => {
                debug!(operation, error = %err, "Cache command failed");
                metrics::record_operation(backend, operation, "error");
            }
        }
        result
    }

    /// Send a command now, or queue it when a transaction is given.
    pub(crate) async fn dispatch(
        &self,
        command: Command,
        tx: Option<&mut Transaction>,
    ) -> Result<Reply, CacheError> {
        match tx {
            Some(tx) => {
                metrics::record_operation(self.backend.name(), command.name(), "queued");
                tx.queue(command);
                Ok(Reply::Queued)
            }
            None => self.run(command).await,
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .finish()
    }
}
