// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection retry with exponential backoff.
//!
//! Only connection establishment is retried. Commands that fail once a
//! connection exists surface their [`CacheError`](crate::CacheError) to the
//! caller, who decides what to do.
//!
//! # Example
//!
//! ```
//! use coord_cache::RetryConfig;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, 5);
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff policy for establishing the store connection.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Fast-fail policy for process startup: 5 attempts, doubling from
    /// 200ms up to 2s, so a bad host/port is reported within seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before the attempt following one that waited `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or `config.max_retries` attempts fail.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_retries {
                    return Err(err);
                }

                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempts, config.max_retries, err, delay
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
