// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection and lock configuration.
//!
//! Read once when the cache connects; later changes are not picked up.
//!
//! # Example
//!
//! ```
//! use coord_cache::CacheConfig;
//!
//! let config = CacheConfig::default();
//! assert_eq!(config.port, 6379);
//! assert_eq!(config.redis_url(), "redis://127.0.0.1:6379/0");
//!
//! let config = CacheConfig {
//!     host: "cache.internal".into(),
//!     password: Some("s3cret".into()),
//!     db: 2,
//!     ..Default::default()
//! };
//! assert_eq!(config.redis_url(), "redis://:s3cret@cache.internal:6379/2");
//!
//! // Reserved characters in the password are escaped
//! let config = CacheConfig { password: Some("p@ss/w".into()), ..Default::default() };
//! assert_eq!(config.redis_url(), "redis://:p%40ss%2Fw@127.0.0.1:6379/0");
//! ```

use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::Deserialize;

/// Configuration for the cache connection and lock defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Store host (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Store port (default: 6379)
    #[serde(default = "default_port")]
    pub port: u16,

    /// AUTH password
    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    /// How long `acquire` keeps retrying before giving up
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Lock TTL enforced by the store
    #[serde(default = "default_lock_expire_ms")]
    pub lock_expire_ms: u64,

    /// Fixed pause between acquire attempts
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 6379 }
fn default_lock_timeout_ms() -> u64 { 3000 }
fn default_lock_expire_ms() -> u64 { 30_000 }
fn default_lock_retry_ms() -> u64 { 10 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            db: 0,
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_expire_ms: default_lock_expire_ms(),
            lock_retry_ms: default_lock_retry_ms(),
        }
    }
}

impl CacheConfig {
    /// Build from `CACHE_HOST`, `CACHE_PORT`, `CACHE_PASSWORD` and `CACHE_DB`,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("CACHE_HOST").unwrap_or(defaults.host),
            port: std::env::var("CACHE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            password: std::env::var("CACHE_PASSWORD").ok().filter(|p| !p.is_empty()),
            db: std::env::var("CACHE_DB")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(defaults.db),
            ..defaults
        }
    }

    /// Connection URL in `redis://[:password@]host:port/db` form, with the
    /// password percent-encoded.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Structured connection settings. The password is passed through
    /// verbatim, no URL parsing involved.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_expire(&self) -> Duration {
        Duration::from_millis(self.lock_expire_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }
}
