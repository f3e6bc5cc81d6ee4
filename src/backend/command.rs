// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store-native commands and their replies.
//!
//! The typed layer never talks to a connection directly. It builds
//! [`Command`] values, which a [`Backend`](super::Backend) either sends
//! immediately or which a transaction queues for MULTI/EXEC.

use std::fmt;

use super::traits::CacheError;

/// One endpoint of a list index range or sorted-set score range.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    /// List position (negative counts from the tail).
    Index(i64),
    /// Inclusive score.
    Score(f64),
    /// Exclusive score, rendered as `(score`.
    Exclusive(f64),
    NegInf,
    PosInf,
    /// A caller-supplied member key (the textual score of one entry).
    Member(String),
}

impl RangeBound {
    /// The exclusive form of this bound. Infinities stay as they are.
    #[must_use]
    pub fn exclusive(self) -> Self {
        match self {
            Self::Score(score) => Self::Exclusive(score),
            Self::Index(index) => Self::Exclusive(index as f64),
            Self::Member(text) if !text.starts_with('(') && !is_infinite_text(&text) => {
                Self::Member(format!("({}", text))
            }
            other => other,
        }
    }

    /// List index value. Score-like bounds are truncated.
    pub fn as_index(&self) -> Result<i64, CacheError> {
        match self {
            Self::Index(index) => Ok(*index),
            Self::Score(score) | Self::Exclusive(score) => Ok(*score as i64),
            Self::NegInf => Ok(0),
            Self::PosInf => Ok(-1),
            Self::Member(text) => text
                .parse()
                .map_err(|_| CacheError::Command(format!("value is not an integer or out of range: {}", text))),
        }
    }

    /// Parse into a numeric score limit the way the store does.
    pub fn score_limit(&self) -> Result<ScoreLimit, CacheError> {
        match self {
            Self::Index(index) => Ok(ScoreLimit::inclusive(*index as f64)),
            Self::Score(score) => Ok(ScoreLimit::inclusive(*score)),
            Self::Exclusive(score) => Ok(ScoreLimit::exclusive(*score)),
            Self::NegInf => Ok(ScoreLimit::inclusive(f64::NEG_INFINITY)),
            Self::PosInf => Ok(ScoreLimit::inclusive(f64::INFINITY)),
            Self::Member(text) => ScoreLimit::parse(text),
        }
    }
}

fn is_infinite_text(text: &str) -> bool {
    matches!(text, "-inf" | "+inf" | "inf")
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Score(score) => write!(f, "{}", score),
            Self::Exclusive(score) => write!(f, "({}", score),
            Self::NegInf => f.write_str("-inf"),
            Self::PosInf => f.write_str("+inf"),
            Self::Member(text) => f.write_str(text),
        }
    }
}

/// A parsed score range endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreLimit {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreLimit {
    pub fn inclusive(value: f64) -> Self {
        Self { value, exclusive: false }
    }

    pub fn exclusive(value: f64) -> Self {
        Self { value, exclusive: true }
    }

    /// Parse `5`, `(5`, `-inf`, `+inf`.
    pub fn parse(text: &str) -> Result<Self, CacheError> {
        let (exclusive, body) = match text.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let value = match body {
            "-inf" => f64::NEG_INFINITY,
            "+inf" | "inf" => f64::INFINITY,
            other => other
                .trim()
                .parse::<f64>()
                .map_err(|_| CacheError::Command("min or max is not a float".into()))?,
        };
        Ok(Self { value, exclusive })
    }

    /// Whether `score` lies on the allowed side of this limit used as a minimum.
    pub fn admits_from_below(&self, score: f64) -> bool {
        if self.exclusive { score > self.value } else { score >= self.value }
    }

    /// Whether `score` lies on the allowed side of this limit used as a maximum.
    pub fn admits_from_above(&self, score: f64) -> bool {
        if self.exclusive { score < self.value } else { score <= self.value }
    }
}

/// Store-native primitives the typed layer is built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // scalar
    Get { key: String },
    Set { key: String, value: String },
    SetEx { key: String, value: String, seconds: u64 },
    /// `SET key value PX millis NX`
    SetNxPx { key: String, value: String, millis: u64 },
    Del { key: String },
    Exists { key: String },
    IncrByFloat { key: String, delta: f64 },

    // list
    RPush { key: String, value: String },
    LRange { key: String, start: i64, stop: i64 },
    LLen { key: String },
    LTrim { key: String, start: i64, stop: i64 },

    // hash
    HSet { key: String, entries: Vec<(String, String)> },
    HGet { key: String, field: String },
    HGetAll { key: String },
    HDel { key: String, fields: Vec<String> },
    HExists { key: String, field: String },
    HIncrByFloat { key: String, field: String, delta: f64 },

    // sorted set
    /// `ZADD key NX score member ...`
    ZAddNx { key: String, entries: Vec<(f64, String)> },
    /// `ZRANGEBYSCORE key min max` or, when `rev`, `ZREVRANGEBYSCORE key max min`.
    ZRangeByScore {
        key: String,
        min: RangeBound,
        max: RangeBound,
        rev: bool,
        with_scores: bool,
        limit: Option<(usize, usize)>,
    },
    ZRem { key: String, members: Vec<String> },
    ZRemRangeByScore { key: String, min: RangeBound, max: RangeBound },
    ZScan { key: String, cursor: String, pattern: Option<String>, count: Option<usize> },

    // scripts
    /// Apply every `(member, delta)` with ZINCRBY, removing members whose
    /// result is `<= 0`. Replies with the new scores in input order.
    ApplyDeltas { key: String, deltas: Vec<(String, f64)> },
    /// Walk a sorted set from one end accumulating each member's leading
    /// number until the sum reaches `amount`. Replies with the flat
    /// `member, score, ...` list of visited entries.
    WalkUntilSum { key: String, amount: f64, desc: bool },
    /// Delete `key` only if it currently holds `value`. Replies 1 or 0.
    DeleteIfEquals { key: String, value: String },
}

impl Command {
    /// The key this command addresses.
    pub fn key(&self) -> &str {
        match self {
            Self::Get { key }
            | Self::Set { key, .. }
            | Self::SetEx { key, .. }
            | Self::SetNxPx { key, .. }
            | Self::Del { key }
            | Self::Exists { key }
            | Self::IncrByFloat { key, .. }
            | Self::RPush { key, .. }
            | Self::LRange { key, .. }
            | Self::LLen { key }
            | Self::LTrim { key, .. }
            | Self::HSet { key, .. }
            | Self::HGet { key, .. }
            | Self::HGetAll { key }
            | Self::HDel { key, .. }
            | Self::HExists { key, .. }
            | Self::HIncrByFloat { key, .. }
            | Self::ZAddNx { key, .. }
            | Self::ZRangeByScore { key, .. }
            | Self::ZRem { key, .. }
            | Self::ZRemRangeByScore { key, .. }
            | Self::ZScan { key, .. }
            | Self::ApplyDeltas { key, .. }
            | Self::WalkUntilSum { key, .. }
            | Self::DeleteIfEquals { key, .. } => key,
        }
    }

    /// Command name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::SetEx { .. } => "setex",
            Self::SetNxPx { .. } => "set_nx_px",
            Self::Del { .. } => "del",
            Self::Exists { .. } => "exists",
            Self::IncrByFloat { .. } => "incrbyfloat",
            Self::RPush { .. } => "rpush",
            Self::LRange { .. } => "lrange",
            Self::LLen { .. } => "llen",
            Self::LTrim { .. } => "ltrim",
            Self::HSet { .. } => "hset",
            Self::HGet { .. } => "hget",
            Self::HGetAll { .. } => "hgetall",
            Self::HDel { .. } => "hdel",
            Self::HExists { .. } => "hexists",
            Self::HIncrByFloat { .. } => "hincrbyfloat",
            Self::ZAddNx { .. } => "zadd_nx",
            Self::ZRangeByScore { rev: false, .. } => "zrangebyscore",
            Self::ZRangeByScore { rev: true, .. } => "zrevrangebyscore",
            Self::ZRem { .. } => "zrem",
            Self::ZRemRangeByScore { .. } => "zremrangebyscore",
            Self::ZScan { .. } => "zscan",
            Self::ApplyDeltas { .. } => "apply_deltas",
            Self::WalkUntilSum { .. } => "walk_until_sum",
            Self::DeleteIfEquals { .. } => "delete_if_equals",
        }
    }
}

/// A reply from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Okay,
    Int(i64),
    Float(f64),
    Text(String),
    Items(Vec<String>),
    Floats(Vec<f64>),
    Scan { cursor: String, items: Vec<String> },
    /// The command was queued in a transaction and has not run yet.
    Queued,
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Truthiness the way the store reports it: `OK`, non-zero integers
    /// and any text are true.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Okay | Self::Text(_) | Self::Queued => true,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Items(items) => !items.is_empty(),
            Self::Floats(items) => !items.is_empty(),
            Self::Scan { .. } => true,
            Self::Nil => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            Self::Text(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_items(self) -> Vec<String> {
        match self {
            Self::Items(items) => items,
            Self::Scan { items, .. } => items,
            Self::Text(text) => vec![text],
            _ => Vec::new(),
        }
    }
}
