// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic coord-cache usage example.
//!
//! Demonstrates:
//! 1. Connecting (Redis when `CACHE_HOST` is set, in-process otherwise)
//! 2. Writing and reading a sorted-set order book
//! 3. Filtered scans and sum-bounded walks
//! 4. Atomic score deltas inside a lock
//! 5. A transaction and a processed marker
//! 6. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! # in-process
//! cargo run --example basic_usage
//!
//! # against a local Redis
//! docker run --rm -p 6379:6379 redis:7-alpine
//! CACHE_HOST=127.0.0.1 cargo run --example basic_usage
//! ```

use serde_json::json;
use coord_cache::store::options::{GetOptions, SetOptions};
use coord_cache::{Cache, CacheConfig, CacheKey, Fetched, LockRequest};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           coord-cache: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Connect
    // ─────────────────────────────────────────────────────────────────────────
    let config = CacheConfig::from_env();
    let cache = if std::env::var("CACHE_HOST").is_ok() {
        println!("📦 Connecting to {}:{} (db {})", config.host, config.port, config.db);
        Cache::connect(&config).await?
    } else {
        println!("📦 No CACHE_HOST set, using the in-process backend");
        Cache::in_memory()
    };
    println!("   └─ {:?}", cache);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Order book in a sorted set, scored by price
    // ─────────────────────────────────────────────────────────────────────────
    let book = CacheKey::from_segments(["demo", "book", "asks"]);
    cache.delete(&book, &Default::default(), None).await?;

    let asks = json!([
        [3, "ask-1", 101],
        [5, "ask-2", 102],
        [2, "ask-3", 103],
        [8, "ask-4", 104]
    ]);
    for ask in asks.as_array().into_iter().flatten() {
        let price = ask[2].to_string();
        cache.set(&book, ask, &SetOptions::sorted().explicit_key(price), None).await?;
    }

    println!("\n📖 Cheapest two asks:");
    if let Fetched::Scored(entries) = cache
        .get(&book, &GetOptions::sorted().limit(2).with_scores())
        .await?
    {
        for entry in entries {
            println!("   └─ {} @ {}", entry.member.to_text(), entry.score);
        }
    }

    println!("\n🔍 Asks mentioning ask-3:");
    for member in cache.scan(&book, &json!("ask-3")).await? {
        println!("   └─ {}", member.to_text());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Fill 7 units from the cheapest end
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⚖️  Walking the book for 7 units:");
    for entry in cache.walk_until_sum(&book, 7.0, false).await? {
        println!("   └─ {} @ {}", entry.member.to_text(), entry.score);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Depth counters under a lock
    // ─────────────────────────────────────────────────────────────────────────
    let depth = CacheKey::from_segments(["demo", "depth"]);
    let locks = cache.locks(&config);
    let request = LockRequest::with_generated_identifier("demo").h_key("depth");

    if locks.acquire(&request).await? {
        cache.apply_deltas(&depth, &json!({"101": 3, "102": 5})).await?;
        let after = cache.apply_deltas(&depth, &json!({"101": -3, "102": -1})).await?;
        println!("\n🔐 Depth after fills (<= 0 removed): {:?}", after);
        println!("   └─ release: {:?}", locks.release(&request).await?);
    } else {
        println!("\n🔐 Lock busy, skipping depth update");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Transaction and processed marker
    // ─────────────────────────────────────────────────────────────────────────
    let recent = CacheKey::from_segments(["demo", "recent"]);
    let mut tx = cache.start();
    for n in 0..5 {
        cache.set(&recent, &json!({"n": n}), &SetOptions::list().max_len(3), Some(&mut tx)).await?;
    }
    let replies = cache.execute(tx).await?;
    println!("\n📝 Transaction executed {} commands", replies.len());
    let kept = cache.get(&recent, &GetOptions::list()).await?.into_values();
    println!("   └─ newest three kept: {:?}", kept.iter().map(|d| d.to_text()).collect::<Vec<_>>());

    let marker = cache.marker("demo");
    marker.set_last_date("20240105").await?;
    println!("\n📍 last_date:demo = {:?}", marker.last_date().await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    cache.shutdown();
    println!("\n✅ Done\n");
    Ok(())
}

/// Print captured counters and histogram summaries
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{}", v),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4}", samples.len(), sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
