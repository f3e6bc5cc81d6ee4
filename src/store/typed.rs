// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed get/set/update/delete/increment over the four container types.
//!
//! Values are JSON. Structured values are stored in canonical form so equal
//! records always produce the same stored text, which is what makes sorted
//! set members removable by value.
//!
//! Hash fields and sorted-set member keys can come from three places:
//!
//! - an explicit key (single record)
//! - an attribute of a record (`key_attr`)
//! - the keys of a pre-indexed mapping `{ key: record, ... }`
//!
//! Sorted-set member keys are the member's score and must be numeric.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::options::{
    DeleteOptions, ExistsOptions, GetOptions, IncrementOptions, SetOptions, UpdateOptions,
};
use super::range;
use super::transaction::Transaction;
use super::Cache;
use crate::backend::{CacheError, Command, RangeBound, Reply};
use crate::codec::{decode, encode, Decoded};
use crate::key::{CacheKey, ContainerType};

/// One sorted-set entry read back with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub member: Decoded,
    pub score: f64,
}

/// The result of [`Cache::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// No scalar or hash field stored under the key.
    Missing,
    /// A scalar, or one hash field.
    One(Decoded),
    /// List elements, hash values or sorted-set members, in store order.
    Many(Vec<Decoded>),
    /// Sorted-set members with their scores.
    Scored(Vec<ScoreEntry>),
    /// Records re-keyed by an attribute.
    Indexed(BTreeMap<String, Decoded>),
    /// Result of an existence check.
    Exists(bool),
}

impl Fetched {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// The single value, or the first of many.
    pub fn first(self) -> Option<Decoded> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(values) => values.into_iter().next(),
            Self::Scored(entries) => entries.into_iter().next().map(|e| e.member),
            Self::Indexed(map) => map.into_values().next(),
            Self::Missing | Self::Exists(_) => None,
        }
    }

    /// Every value, dropping scores and index keys.
    pub fn into_values(self) -> Vec<Decoded> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
            Self::Scored(entries) => entries.into_iter().map(|e| e.member).collect(),
            Self::Indexed(map) => map.into_values().collect(),
            Self::Missing | Self::Exists(_) => Vec::new(),
        }
    }

    pub fn exists(&self) -> Option<bool> {
        match self {
            Self::Exists(flag) => Some(*flag),
            _ => None,
        }
    }
}

fn require_key(key: &CacheKey) -> Result<String, CacheError> {
    if key.is_empty() {
        Err(CacheError::missing("key"))
    } else {
        Ok(key.as_str().to_string())
    }
}

/// Text form of a field / member key value. Objects, arrays, null and
/// empty strings cannot key anything.
pub(crate) fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn attribute_key(record: &Value, attr: &str) -> Option<String> {
    record.get(attr).and_then(key_text)
}

/// Split a value into `(field or member key, record)` pairs.
///
/// A sequence is all-or-nothing: one record without a usable key rejects
/// the whole write.
pub(crate) fn keyed_entries(
    value: &Value,
    attr: Option<&str>,
    explicit: Option<&str>,
) -> Result<Vec<(String, Value)>, CacheError> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Ok(vec![(key.to_string(), value.clone())]);
    }

    let entries = match value {
        Value::Array(items) => match attr {
            Some(attr) => items
                .iter()
                .enumerate()
                .map(|(position, item)| match attribute_key(item, attr) {
                    Some(k) => Ok((k, item.clone())),
                    None => Err(CacheError::invalid(format!(
                        "record at position {} has no usable {:?} attribute",
                        position, attr
                    ))),
                })
                .collect::<Result<Vec<_>, CacheError>>()?,
            None => Vec::new(),
        },
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(map) => match attr.and_then(|a| attribute_key(value, a)) {
            Some(key) => vec![(key, value.clone())],
            None if map.values().all(Value::is_object) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            None => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(entries)
}

fn parse_score(text: &str) -> Result<f64, CacheError> {
    match text.trim().parse::<f64>() {
        Ok(score) if !score.is_nan() => Ok(score),
        _ => Err(CacheError::invalid(format!(
            "sorted-set member key must be numeric, got {:?}",
            text
        ))),
    }
}

fn expire_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// `member, score, member, score, ...` into entries.
pub(crate) fn pair_scores(items: Vec<String>) -> Result<Vec<ScoreEntry>, CacheError> {
    if items.len() % 2 != 0 {
        return Err(CacheError::Command("odd-length member/score reply".into()));
    }
    let mut entries = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        let score = score
            .parse::<f64>()
            .map_err(|_| CacheError::Command(format!("score is not a float: {}", score)))?;
        entries.push(ScoreEntry { member: decode(&member), score });
    }
    Ok(entries)
}

/// Re-key records by `attr`. Left as-is when any record lacks it.
fn index_by(fetched: Fetched, attr: &str) -> Fetched {
    let values = match fetched {
        Fetched::Many(values) => values,
        Fetched::Scored(entries) => entries.into_iter().map(|e| e.member).collect(),
        other => return other,
    };
    let keys: Option<Vec<String>> = values
        .iter()
        .map(|value| value.attribute(attr).and_then(key_text))
        .collect();
    match keys {
        Some(keys) => Fetched::Indexed(keys.into_iter().zip(values).collect()),
        None => Fetched::Many(values),
    }
}

fn merge(previous: Option<Decoded>, update: &Value) -> Value {
    match (previous.map(Decoded::into_value), update) {
        (Some(Value::Object(mut base)), Value::Object(changes)) => {
            for (k, v) in changes {
                base.insert(k.clone(), v.clone());
            }
            Value::Object(base)
        }
        _ => update.clone(),
    }
}

impl Cache {
    /// Read from a key according to its container type.
    #[instrument(skip(self, opts), fields(key = %key, container = %opts.container))]
    pub async fn get(&self, key: &CacheKey, opts: &GetOptions) -> Result<Fetched, CacheError> {
        let k = require_key(key)?;
        opts.validate()?;

        let derived = match (&opts.key_attr, &opts.record) {
            (Some(attr), Some(record)) => attribute_key(record, attr),
            _ => None,
        };

        if opts.check_exists {
            let field = match opts.container {
                ContainerType::Hash => opts.field.clone().or(derived),
                _ => None,
            };
            let exists = self
                .exists(key, &ExistsOptions { container: opts.container, field })
                .await?;
            return Ok(Fetched::Exists(exists));
        }

        let fetched = match opts.container {
            ContainerType::Scalar => match self.run(Command::Get { key: k }).await? {
                Reply::Text(text) => Fetched::One(decode(&text)),
                _ => Fetched::Missing,
            },
            ContainerType::List => {
                let (start, end) =
                    range::resolve(ContainerType::List, opts.start.clone(), opts.end.clone(), None);
                let reply = self
                    .run(Command::LRange { key: k, start: start.as_index()?, stop: end.as_index()? })
                    .await?;
                Fetched::Many(reply.into_items().iter().map(|s| decode(s)).collect())
            }
            ContainerType::Hash => match opts.field.clone().or(derived) {
                Some(field) => match self.run(Command::HGet { key: k, field }).await? {
                    Reply::Text(text) => Fetched::One(decode(&text)),
                    _ => Fetched::Missing,
                },
                None => {
                    let items = self.run(Command::HGetAll { key: k }).await?.into_items();
                    Fetched::Many(items.chunks(2).filter_map(|pair| pair.get(1)).map(|v| decode(v)).collect())
                }
            },
            ContainerType::Sorted => self.get_sorted(key, opts, derived).await?,
        };

        Ok(match &opts.index_by {
            Some(attr) => index_by(fetched, attr),
            None => fetched,
        })
    }

    async fn get_sorted(
        &self,
        key: &CacheKey,
        opts: &GetOptions,
        derived: Option<String>,
    ) -> Result<Fetched, CacheError> {
        if let Some(filter) = &opts.filter {
            return Ok(Fetched::Many(self.scan(key, filter).await?));
        }

        if let Some(amount) = opts.until_sum {
            let entries = self.walk_until_sum(key, amount, opts.desc).await?;
            return Ok(if opts.with_scores {
                Fetched::Scored(entries)
            } else {
                Fetched::Many(entries.into_iter().map(|e| e.member).collect())
            });
        }

        let pinned = opts.member.clone().or(derived);
        let (min, max) = range::resolve(
            ContainerType::Sorted,
            opts.start.clone(),
            opts.end.clone(),
            pinned.as_deref(),
        );
        let reply = self
            .run(Command::ZRangeByScore {
                key: key.as_str().to_string(),
                min,
                max,
                rev: opts.desc,
                with_scores: opts.with_scores,
                limit: opts.window(),
            })
            .await?;

        let items = reply.into_items();
        if opts.with_scores {
            Ok(Fetched::Scored(pair_scores(items)?))
        } else {
            Ok(Fetched::Many(items.iter().map(|s| decode(s)).collect()))
        }
    }

    /// Write a value according to the container type.
    ///
    /// With a transaction the commands are queued and [`Reply::Queued`] is
    /// returned.
    #[instrument(skip(self, value, opts, tx), fields(key = %key, container = %opts.container))]
    pub async fn set(
        &self,
        key: &CacheKey,
        value: &Value,
        opts: &SetOptions,
        mut tx: Option<&mut Transaction>,
    ) -> Result<Reply, CacheError> {
        let k = require_key(key)?;

        match opts.container {
            ContainerType::Scalar => {
                let value = encode(value);
                let command = match opts.expire_in {
                    Some(ttl) => Command::SetEx { key: k, value, seconds: expire_seconds(ttl) },
                    None => Command::Set { key: k, value },
                };
                self.dispatch(command, tx).await
            }
            ContainerType::List => {
                let pushed = self
                    .dispatch(Command::RPush { key: k.clone(), value: encode(value) }, tx.as_deref_mut())
                    .await?;
                if let Some(cap) = opts.max_len {
                    // Keep the newest `cap` elements
                    let (start, stop) = if cap == 0 { (1, 0) } else { (-(cap as i64), -1) };
                    self.dispatch(Command::LTrim { key: k, start, stop }, tx).await?;
                }
                Ok(pushed)
            }
            ContainerType::Hash => {
                let entries = keyed_entries(value, opts.key_attr.as_deref(), opts.explicit_key.as_deref())?;
                if entries.is_empty() {
                    return Err(CacheError::missing("h_key"));
                }
                let entries = entries.into_iter().map(|(field, record)| (field, encode(&record))).collect();
                self.dispatch(Command::HSet { key: k, entries }, tx).await
            }
            ContainerType::Sorted => {
                let entries = keyed_entries(value, opts.key_attr.as_deref(), opts.explicit_key.as_deref())?;
                if entries.is_empty() {
                    return Err(CacheError::missing("s_key"));
                }
                let entries = entries
                    .into_iter()
                    .map(|(member_key, record)| Ok((parse_score(&member_key)?, encode(&record))))
                    .collect::<Result<Vec<_>, CacheError>>()?;
                self.dispatch(Command::ZAddNx { key: k, entries }, tx).await
            }
        }
    }

    /// Merge `value` into the stored record and write it back.
    ///
    /// The previous record is taken from `opts.previous` or read from the
    /// store. For sorted sets the old member is removed first, so a change
    /// to the scoring attribute moves the record to its new score.
    #[instrument(skip(self, value, opts, tx), fields(key = %key, container = %opts.container))]
    pub async fn update(
        &self,
        key: &CacheKey,
        value: &Value,
        opts: &UpdateOptions,
        mut tx: Option<&mut Transaction>,
    ) -> Result<Reply, CacheError> {
        let k = require_key(key)?;

        let lookup_key = match opts.container {
            ContainerType::List => {
                return Err(CacheError::invalid("lists cannot be updated in place"));
            }
            ContainerType::Hash | ContainerType::Sorted => {
                let param = if opts.container == ContainerType::Hash { "h_key" } else { "s_key" };
                let Some(attr) = opts.key_attr.as_deref() else {
                    return Err(CacheError::missing(param));
                };
                let found = opts
                    .explicit_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .or_else(|| attribute_key(value, attr));
                match found {
                    Some(found) => Some(found),
                    None => return Err(CacheError::missing(param)),
                }
            }
            ContainerType::Scalar => None,
        };

        let previous = match &opts.previous {
            Some(previous) => Some(Decoded::Structured(previous.clone())),
            None => self.read_current(&k, opts.container, lookup_key.as_deref()).await?,
        };

        if opts.container == ContainerType::Sorted {
            if let Some(old) = &previous {
                let member = encode(&old.clone().into_value());
                self.dispatch(Command::ZRem { key: k.clone(), members: vec![member] }, tx.as_deref_mut())
                    .await?;
            }
        }

        let merged = merge(previous, value);
        let write_key = opts
            .key_attr
            .as_deref()
            .and_then(|attr| attribute_key(&merged, attr))
            .or(lookup_key);
        debug!(write_key = ?write_key, "Writing merged record");

        let set_opts = SetOptions {
            container: opts.container,
            key_attr: opts.key_attr.clone(),
            explicit_key: write_key,
            max_len: None,
            expire_in: opts.expire_in,
        };
        self.set(key, &merged, &set_opts, tx).await
    }

    async fn read_current(
        &self,
        key: &str,
        container: ContainerType,
        lookup_key: Option<&str>,
    ) -> Result<Option<Decoded>, CacheError> {
        let command = match (container, lookup_key) {
            (ContainerType::Hash, Some(field)) => Command::HGet { key: key.to_string(), field: field.to_string() },
            (ContainerType::Sorted, Some(member)) => Command::ZRangeByScore {
                key: key.to_string(),
                min: RangeBound::Member(member.to_string()),
                max: RangeBound::Member(member.to_string()),
                rev: false,
                with_scores: false,
                limit: Some((0, 1)),
            },
            _ => Command::Get { key: key.to_string() },
        };
        let current = match self.run(command).await? {
            Reply::Text(text) => Some(decode(&text)),
            Reply::Items(items) => items.first().map(|s| decode(s)),
            _ => None,
        };
        Ok(current)
    }

    /// Remove a key, a hash field, or sorted-set members.
    ///
    /// Sorted sets are trimmed either by member value or by score range.
    /// Explicit range bounds are exclusive; with no members and no bounds the
    /// whole score range is cleared.
    #[instrument(skip(self, opts, tx), fields(key = %key, container = %opts.container))]
    pub async fn delete(
        &self,
        key: &CacheKey,
        opts: &DeleteOptions,
        tx: Option<&mut Transaction>,
    ) -> Result<Reply, CacheError> {
        let k = require_key(key)?;
        opts.validate()?;

        let command = match opts.container {
            ContainerType::Hash => match &opts.field {
                Some(field) => Command::HDel { key: k, fields: vec![field.clone()] },
                None => Command::Del { key: k },
            },
            ContainerType::Sorted if !opts.members.is_empty() => Command::ZRem {
                key: k,
                members: opts.members.iter().map(encode).collect(),
            },
            ContainerType::Sorted => {
                let (min, max) = range::resolve(
                    ContainerType::Sorted,
                    opts.start.clone().map(RangeBound::exclusive),
                    opts.end.clone().map(RangeBound::exclusive),
                    None,
                );
                Command::ZRemRangeByScore { key: k, min, max }
            }
            ContainerType::Scalar | ContainerType::List => Command::Del { key: k },
        };
        self.dispatch(command, tx).await
    }

    /// Add `delta` to a numeric scalar or hash field.
    #[instrument(skip(self, opts, tx), fields(key = %key, container = %opts.container))]
    pub async fn increment(
        &self,
        key: &CacheKey,
        delta: f64,
        opts: &IncrementOptions,
        tx: Option<&mut Transaction>,
    ) -> Result<Reply, CacheError> {
        let k = require_key(key)?;

        let command = match opts.container {
            ContainerType::Scalar => Command::IncrByFloat { key: k, delta },
            ContainerType::Hash => match &opts.field {
                Some(field) => Command::HIncrByFloat { key: k, field: field.clone(), delta },
                None => return Err(CacheError::missing("h_key_value")),
            },
            other => {
                warn!(container = %other, "Increment on unsupported container");
                return Err(CacheError::invalid(format!("cannot increment a {}", other)));
            }
        };
        self.dispatch(command, tx).await
    }

    /// Field-level existence for hashes, key-level otherwise.
    pub async fn exists(&self, key: &CacheKey, opts: &ExistsOptions) -> Result<bool, CacheError> {
        let k = require_key(key)?;
        let command = match (opts.container, &opts.field) {
            (ContainerType::Hash, Some(field)) => Command::HExists { key: k, field: field.clone() },
            _ => Command::Exists { key: k },
        };
        Ok(self.run(command).await?.as_bool())
    }

    /// Lowest score in a sorted set.
    pub async fn min_score(&self, key: &CacheKey) -> Result<Option<f64>, CacheError> {
        self.edge_score(key, false).await
    }

    /// Highest score in a sorted set.
    pub async fn max_score(&self, key: &CacheKey) -> Result<Option<f64>, CacheError> {
        self.edge_score(key, true).await
    }

    async fn edge_score(&self, key: &CacheKey, rev: bool) -> Result<Option<f64>, CacheError> {
        let k = require_key(key)?;
        let reply = self
            .run(Command::ZRangeByScore {
                key: k,
                min: RangeBound::NegInf,
                max: RangeBound::PosInf,
                rev,
                with_scores: true,
                limit: Some((0, 1)),
            })
            .await?;
        Ok(pair_scores(reply.into_items())?.first().map(|e| e.score))
    }
}
