// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use super::command::{Command, Reply};

/// The single error kind raised by cache operations.
///
/// Every variant carries a human-readable message. Variants only sharpen
/// logs and tests; callers are expected to treat any `CacheError` the same
/// way. Nothing inside this crate retries on a `CacheError`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// A parameter the operation cannot work without was not supplied.
    #[error("Cache: `{0}` parameter is mandatory")]
    MissingParameter(String),
    /// The store could not be reached.
    #[error("Cache not available: {0}")]
    Unavailable(String),
    /// The store rejected or failed a command (including script errors).
    #[error("Cache command failed: {0}")]
    Command(String),
    /// The caller passed input of the wrong shape.
    #[error("Invalid cache input: {0}")]
    InvalidInput(String),
    /// The key holds a different container type than the operation expects.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value: {0}")]
    WrongType(String),
}

impl CacheError {
    pub fn missing(parameter: &str) -> Self {
        Self::MissingParameter(parameter.to_string())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether the failure was about reaching the store rather than the
    /// command itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Unavailable(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError
            || err.code() == Some("WRONGTYPE")
        {
            Self::WrongType(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

/// A backing store that understands the store-native [`Command`] set.
///
/// Implementations must execute `run_atomic` so that no other caller can
/// observe a partial batch, and must run the script commands
/// ([`Command::ApplyDeltas`], [`Command::WalkUntilSum`],
/// [`Command::DeleteIfEquals`]) as one atomic step.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used for metric labels ("redis", "memory").
    fn name(&self) -> &'static str;

    /// Send one command and wait for its reply.
    async fn run(&self, command: Command) -> Result<Reply, CacheError>;

    /// Execute a batch as one MULTI/EXEC transaction.
    async fn run_atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>, CacheError>;
}
