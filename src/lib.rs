//! # Coord Cache
//!
//! A caching and coordination client for a Redis-compatible key-value store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Typed Store (Cache)                     │
//! │  • get / set / update / delete / increment / exists        │
//! │  • scalar, list, hash and sorted-set containers            │
//! │  • canonical JSON so equal records store identically       │
//! └─────────────────────────────────────────────────────────────┘
//!        │              │               │              │
//!        ▼              ▼               ▼              ▼
//!   Range Resolver  Scan Cursor  Subtract Walker  Atomic Delta
//!        │              │               │              │
//!        └──────────────┴───────┬───────┴──────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Backend (Command → Reply)                  │
//! │  • RedisBackend: ConnectionManager, Lua, MULTI/EXEC        │
//! │  • MemoryBackend: in-process keyspace, same semantics      │
//! └─────────────────────────────────────────────────────────────┘
//!                               ▲
//!                               │
//!                    Lock Manager (SET NX PX)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coord_cache::{Cache, CacheConfig, CacheKey, LockRequest};
//! use coord_cache::store::options::{GetOptions, SetOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig::from_env();
//!     let cache = Cache::connect(&config).await?;
//!
//!     let book = CacheKey::from_segments(["book", "BTC"]);
//!     let orders = json!([
//!         {"price": 101, "qty": 2},
//!         {"price": 99, "qty": 5}
//!     ]);
//!     cache.set(&book, &orders, &SetOptions::sorted().key_attr("price"), None).await?;
//!
//!     let best = cache.get(&book, &GetOptions::sorted().desc().limit(1)).await?;
//!     println!("best: {:?}", best.first());
//!
//!     let locks = cache.locks(&config);
//!     let request = LockRequest::with_generated_identifier("book").h_key("BTC");
//!     if locks.acquire(&request).await? {
//!         cache.apply_deltas(&CacheKey::new("depth:BTC"), &json!({"101": -2})).await?;
//!         locks.release(&request).await?;
//!     }
//!
//!     cache.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`store`]: the [`Cache`] handle and the typed operations
//! - [`backend`]: command model and the Redis / in-memory backends
//! - [`codec`]: canonical encoding and decoding of stored values
//! - [`lock`]: distributed locks with ownership-checked release
//! - [`markers`]: per-category last-processed markers
//! - [`resilience`]: startup connection retry

pub mod backend;
pub mod codec;
pub mod config;
pub mod key;
pub mod lock;
pub mod markers;
pub mod metrics;
pub mod resilience;
pub mod store;

pub use backend::{Backend, CacheError, Command, MemoryBackend, RangeBound, RedisBackend, Reply};
pub use codec::Decoded;
pub use config::CacheConfig;
pub use key::{CacheKey, ContainerType};
pub use lock::{LockError, LockManager, LockRequest, ReleaseOutcome};
pub use markers::ProcessedMarker;
pub use metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use store::transaction::Transaction;
pub use store::typed::{Fetched, ScoreEntry};
pub use store::Cache;
