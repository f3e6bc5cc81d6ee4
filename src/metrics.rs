// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for coord-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `coord_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: redis, memory
//! - `operation`: store command name (get, zadd_nx, apply_deltas, ...)
//! - `status`: success, error, queued

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record one store round trip (or queued command)
pub fn record_operation(backend: &str, operation: &str, status: &str) {
    counter!(
        "coord_cache_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record round trip latency
pub fn record_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "coord_cache_operation_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the size of an executed transaction
pub fn record_transaction(backend: &str, commands: usize, status: &str) {
    counter!(
        "coord_cache_transactions_total",
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("coord_cache_transaction_commands").record(commands as f64);
}

/// Record a lock acquisition outcome (acquired, timeout, error)
pub fn record_lock_attempt(outcome: &str) {
    counter!(
        "coord_cache_lock_acquisitions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record how long an acquire call waited in total
pub fn record_lock_wait(duration: Duration) {
    histogram!("coord_cache_lock_wait_seconds").record(duration.as_secs_f64());
}

/// Record a release that found another holder's identifier
pub fn record_lock_mismatch() {
    counter!("coord_cache_lock_mismatches_total").increment(1);
}

/// Record how many pages a pattern scan needed
pub fn record_scan_pages(pages: usize) {
    histogram!("coord_cache_scan_pages").record(pages as f64);
}

/// Record members removed by a delta application
pub fn record_delta_removals(count: usize) {
    counter!("coord_cache_delta_removed_members_total").increment(count as u64);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.backend, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only check the calls don't panic without a recorder installed.

    #[test]
    fn test_record_operation() {
        record_operation("memory", "get", "success");
        record_operation("redis", "zadd_nx", "error");
        record_operation("redis", "hset", "queued");
    }

    #[test]
    fn test_record_latency() {
        record_latency("memory", "get", Duration::from_micros(100));
        record_latency("redis", "walk_until_sum", Duration::from_millis(5));
    }

    #[test]
    fn test_lock_metrics() {
        record_lock_attempt("acquired");
        record_lock_attempt("timeout");
        record_lock_wait(Duration::from_millis(30));
        record_lock_mismatch();
    }

    #[test]
    fn test_scan_and_delta_metrics() {
        record_scan_pages(3);
        record_delta_removals(2);
        record_transaction("memory", 4, "success");
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("memory", "get");
            std::thread::sleep(Duration::from_micros(10));
        }
        // Timer recorded on drop
    }
}
