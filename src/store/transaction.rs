// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write batching with all-or-nothing execution.
//!
//! A [`Transaction`] is a local queue. Writes given one are queued instead
//! of sent; [`Cache::execute`] ships the queue as a single MULTI/EXEC and
//! [`Cache::discard`] throws it away without touching the store. Reads are
//! never queued.
//!
//! ```
//! use coord_cache::{Cache, CacheKey};
//! use coord_cache::store::options::SetOptions;
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), coord_cache::CacheError> {
//! let cache = Cache::in_memory();
//! let mut tx = cache.start();
//! cache.set(&CacheKey::new("a"), &json!(1), &SetOptions::scalar(), Some(&mut tx)).await?;
//! cache.set(&CacheKey::new("b"), &json!(2), &SetOptions::scalar(), Some(&mut tx)).await?;
//! let replies = cache.execute(tx).await?;
//! assert_eq!(replies.len(), 2);
//! # Ok(())
//! # }
//! ```

use tracing::{debug, instrument, warn};

use super::Cache;
use crate::backend::{CacheError, Command, Reply};
use crate::metrics;

/// Commands waiting for [`Cache::execute`].
#[derive(Debug, Default)]
pub struct Transaction {
    commands: Vec<Command>,
}

impl Transaction {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn queue(&mut self, command: Command) {
        self.commands.push(command);
    }
}

impl Cache {
    /// Begin a batch.
    pub fn start(&self) -> Transaction {
        Transaction::default()
    }

    /// Run every queued command atomically and return their replies in
    /// queue order.
    #[instrument(skip(self, tx), fields(commands = tx.len()))]
    pub async fn execute(&self, tx: Transaction) -> Result<Vec<Reply>, CacheError> {
        let backend = self.backend().name();
        let count = tx.len();
        if count == 0 {
            return Ok(Vec::new());
        }

        match self.backend().run_atomic(tx.commands).await {
            Ok(replies) => {
                metrics::record_transaction(backend, count, "success");
                debug!(count, "Transaction executed");
                Ok(replies)
            }
            Err(err) => {
                metrics::record_transaction(backend, count, "error");
                warn!(count, error = %err, "Transaction failed");
                Err(err)
            }
        }
    }

    /// Drop a batch without sending anything.
    pub fn discard(&self, tx: Transaction) {
        debug!(commands = tx.len(), "Transaction discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use crate::store::options::{DeleteOptions, GetOptions, SetOptions};
    use serde_json::json;

    #[tokio::test]
    async fn test_execute_applies_queued_writes() {
        let cache = Cache::in_memory();
        let mut tx = cache.start();

        cache.set(&CacheKey::new("a"), &json!(1), &SetOptions::scalar(), Some(&mut tx)).await.unwrap();
        cache
            .set(&CacheKey::new("l"), &json!("x"), &SetOptions::list().max_len(5), Some(&mut tx))
            .await
            .unwrap();
        assert_eq!(tx.len(), 3);

        // Reads bypass the queue
        let before = cache.get(&CacheKey::new("a"), &GetOptions::scalar()).await.unwrap();
        assert!(before.is_missing());

        let replies = cache.execute(tx).await.unwrap();
        assert_eq!(replies, vec![Reply::Okay, Reply::Int(1), Reply::Okay]);

        let after = cache.get(&CacheKey::new("a"), &GetOptions::scalar()).await.unwrap();
        assert_eq!(after.first().and_then(|d| d.as_f64()), Some(1.0));
    }

    #[tokio::test]
    async fn test_discard_sends_nothing() {
        let cache = Cache::in_memory();
        let mut tx = cache.start();
        cache.set(&CacheKey::new("a"), &json!(1), &SetOptions::scalar(), Some(&mut tx)).await.unwrap();
        cache.delete(&CacheKey::new("b"), &DeleteOptions::scalar(), Some(&mut tx)).await.unwrap();
        cache.discard(tx);

        let value = cache.get(&CacheKey::new("a"), &GetOptions::scalar()).await.unwrap();
        assert!(value.is_missing());
    }

    #[tokio::test]
    async fn test_failed_command_fails_the_batch() {
        let cache = Cache::in_memory();
        cache.set(&CacheKey::new("s"), &json!("text"), &SetOptions::scalar(), None).await.unwrap();

        let mut tx = cache.start();
        cache.set(&CacheKey::new("s"), &json!(1), &SetOptions::list(), Some(&mut tx)).await.unwrap();
        let err = cache.execute(tx).await.unwrap_err();
        assert!(matches!(err, CacheError::WrongType(_)));
    }

    #[tokio::test]
    async fn test_empty_execute() {
        let cache = Cache::in_memory();
        assert!(cache.execute(cache.start()).await.unwrap().is_empty());
    }
}
