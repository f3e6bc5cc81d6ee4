// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache keys and container types.
//!
//! Keys follow the `class:method:namespace:id` convention. The same logical
//! resource must always render to the same key string, so keys are built from
//! segments rather than ad-hoc `format!` calls at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Segment separator inside a [`CacheKey`].
pub const KEY_SEPARATOR: char = ':';

/// A colon-separated key identifying one logical resource.
///
/// # Example
///
/// ```
/// use coord_cache::CacheKey;
///
/// let key = CacheKey::from_segments(["orders", "depth", "btc", "bids"]);
/// assert_eq!(key.as_str(), "orders:depth:btc:bids");
/// assert_eq!(key.segments().count(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-composed key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Join segments with `:`. Empty segments are skipped.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::new();
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                continue;
            }
            if !key.is_empty() {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(segment);
        }
        Self(key)
    }

    /// Append one more segment.
    #[must_use]
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self::from_segments([self.0.as_str(), segment.as_ref()])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The store-native structure backing a key.
///
/// A key must be used with one container type for its whole lifetime; the
/// store rejects mixed use with a wrong-type error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    #[default]
    Scalar,
    List,
    Hash,
    Sorted,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::Hash => "hash",
            Self::Sorted => "sorted",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_segments_joins_with_colon() {
        let key = CacheKey::from_segments(["class", "method", "ns", "42"]);
        assert_eq!(key.as_str(), "class:method:ns:42");
    }

    #[test]
    fn test_from_segments_skips_empty() {
        let key = CacheKey::from_segments(["class", "", "ns"]);
        assert_eq!(key.as_str(), "class:ns");
    }

    #[test]
    fn test_same_resource_same_key() {
        let a = CacheKey::from_segments(["a", "b"]).child("c");
        let b = CacheKey::new("a:b:c");
        assert_eq!(a, b);
    }

    #[test]
    fn test_container_type_serde_names() {
        let json = serde_json::to_string(&ContainerType::Sorted).unwrap();
        assert_eq!(json, "\"sorted\"");
        let parsed: ContainerType = serde_json::from_str("\"hash\"").unwrap();
        assert_eq!(parsed, ContainerType::Hash);
        assert_eq!(ContainerType::default(), ContainerType::Scalar);
    }
}
