// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backing store adapters.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  command.rs  - Command / Reply / RangeBound vocabulary       │
//! │  traits.rs   - Backend trait, CacheError                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  redis.rs    - ConnectionManager, MULTI/EXEC, Lua scripts    │
//! │  memory.rs   - in-process keyspace behind one mutex          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The typed layer only ever builds [`Command`] values, so both backends
//! share one set of semantics and the memory backend can stand in for Redis
//! in tests.

pub mod command;
pub mod memory;
pub mod redis;
pub mod traits;

pub use command::{Command, RangeBound, Reply, ScoreLimit};
pub use memory::MemoryBackend;
pub use self::redis::RedisBackend;
pub use traits::{Backend, CacheError};
