// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-call options for the typed operations.
//!
//! Every option struct starts from a container constructor and is refined
//! with chained setters:
//!
//! ```
//! use coord_cache::store::options::GetOptions;
//! use coord_cache::RangeBound;
//!
//! let opts = GetOptions::sorted()
//!     .range(RangeBound::Score(100.0), RangeBound::PosInf)
//!     .desc()
//!     .limit(10)
//!     .with_scores();
//! assert!(opts.validate().is_ok());
//! ```

use std::time::Duration;

use serde_json::Value;

use crate::backend::{CacheError, RangeBound};
use crate::key::ContainerType;

macro_rules! container_constructors {
    ($ty:ident) => {
        impl $ty {
            pub fn new(container: ContainerType) -> Self {
                Self { container, ..Default::default() }
            }

            pub fn scalar() -> Self {
                Self::new(ContainerType::Scalar)
            }

            pub fn list() -> Self {
                Self::new(ContainerType::List)
            }

            pub fn hash() -> Self {
                Self::new(ContainerType::Hash)
            }

            pub fn sorted() -> Self {
                Self::new(ContainerType::Sorted)
            }
        }
    };
}

/// Options for [`Cache::get`](crate::Cache::get).
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub container: ContainerType,
    /// Hash field to read. Without it the whole hash is returned.
    pub field: Option<String>,
    /// Sorted-set member key (textual score) pinning the read to one entry.
    pub member: Option<String>,
    /// Attribute naming the field / member key inside `record`.
    pub key_attr: Option<String>,
    /// A record the field or member key is derived from.
    pub record: Option<Value>,
    pub start: Option<RangeBound>,
    pub end: Option<RangeBound>,
    pub desc: bool,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub with_scores: bool,
    /// Only return sorted-set members containing this fragment.
    pub filter: Option<Value>,
    /// Walk the sorted set until the leading quantities reach this sum.
    pub until_sum: Option<f64>,
    /// Report existence instead of content.
    pub check_exists: bool,
    /// Re-key a list of records by this attribute.
    pub index_by: Option<String>,
}

container_constructors!(GetOptions);

impl GetOptions {
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Derive the field (hash) or member key (sorted) from `record[attr]`.
    #[must_use]
    pub fn from_record(mut self, attr: impl Into<String>, record: Value) -> Self {
        self.key_attr = Some(attr.into());
        self.record = Some(record);
        self
    }

    #[must_use]
    pub fn range(mut self, start: RangeBound, end: RangeBound) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn start(mut self, start: RangeBound) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn end(mut self, end: RangeBound) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn desc(mut self) -> Self {
        self.desc = true;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_scores(mut self) -> Self {
        self.with_scores = true;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn until_sum(mut self, amount: f64) -> Self {
        self.until_sum = Some(amount);
        self
    }

    #[must_use]
    pub fn check_exists(mut self) -> Self {
        self.check_exists = true;
        self
    }

    #[must_use]
    pub fn index_by(mut self, attr: impl Into<String>) -> Self {
        self.index_by = Some(attr.into());
        self
    }

    /// Reject option combinations that have no single meaning.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.filter.is_some() && self.until_sum.is_some() {
            return Err(CacheError::invalid("filter and until_sum cannot be combined"));
        }
        if self.container != ContainerType::Sorted
            && (self.filter.is_some() || self.until_sum.is_some())
        {
            return Err(CacheError::invalid(format!(
                "filter and until_sum only apply to sorted sets, not {}",
                self.container.as_str()
            )));
        }
        Ok(())
    }

    /// `(offset, count)` for a limited range read.
    pub(crate) fn window(&self) -> Option<(usize, usize)> {
        match (self.offset, self.limit) {
            (None, None) => None,
            (offset, Some(limit)) => Some((offset.unwrap_or(0), limit)),
            (Some(offset), None) => Some((offset, i64::MAX as usize)),
        }
    }
}

/// Options for [`Cache::set`](crate::Cache::set).
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub container: ContainerType,
    /// Attribute whose value keys each record (hash field or member score).
    pub key_attr: Option<String>,
    /// Explicit field / member key for a single record.
    pub explicit_key: Option<String>,
    /// Keep only the newest `max_len` list elements.
    pub max_len: Option<usize>,
    /// Scalar TTL.
    pub expire_in: Option<Duration>,
}

container_constructors!(SetOptions);

impl SetOptions {
    #[must_use]
    pub fn key_attr(mut self, attr: impl Into<String>) -> Self {
        self.key_attr = Some(attr.into());
        self
    }

    #[must_use]
    pub fn explicit_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    #[must_use]
    pub fn expire_in(mut self, ttl: Duration) -> Self {
        self.expire_in = Some(ttl);
        self
    }
}

/// Options for [`Cache::update`](crate::Cache::update).
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub container: ContainerType,
    pub key_attr: Option<String>,
    pub explicit_key: Option<String>,
    /// The current stored value, if the caller already has it.
    pub previous: Option<Value>,
    pub expire_in: Option<Duration>,
}

container_constructors!(UpdateOptions);

impl UpdateOptions {
    #[must_use]
    pub fn key_attr(mut self, attr: impl Into<String>) -> Self {
        self.key_attr = Some(attr.into());
        self
    }

    #[must_use]
    pub fn explicit_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn previous(mut self, previous: Value) -> Self {
        self.previous = Some(previous);
        self
    }

    #[must_use]
    pub fn expire_in(mut self, ttl: Duration) -> Self {
        self.expire_in = Some(ttl);
        self
    }
}

/// Options for [`Cache::delete`](crate::Cache::delete).
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub container: ContainerType,
    /// Hash field to remove. Without it the whole key goes.
    pub field: Option<String>,
    /// Sorted-set members to remove.
    pub members: Vec<Value>,
    pub start: Option<RangeBound>,
    pub end: Option<RangeBound>,
}

container_constructors!(DeleteOptions);

impl DeleteOptions {
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn members(mut self, members: impl IntoIterator<Item = Value>) -> Self {
        self.members.extend(members);
        self
    }

    #[must_use]
    pub fn range(mut self, start: RangeBound, end: RangeBound) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if !self.members.is_empty() && (self.start.is_some() || self.end.is_some()) {
            return Err(CacheError::invalid("remove by members or by range, not both"));
        }
        Ok(())
    }
}

/// Options for [`Cache::increment`](crate::Cache::increment).
#[derive(Debug, Clone, Default)]
pub struct IncrementOptions {
    pub container: ContainerType,
    pub field: Option<String>,
}

container_constructors!(IncrementOptions);

impl IncrementOptions {
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Options for [`Cache::exists`](crate::Cache::exists).
#[derive(Debug, Clone, Default)]
pub struct ExistsOptions {
    pub container: ContainerType,
    /// Hash field to test. Without it the key itself is tested.
    pub field: Option<String>,
}

container_constructors!(ExistsOptions);

impl ExistsOptions {
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_set_container() {
        assert_eq!(GetOptions::list().container, ContainerType::List);
        assert_eq!(SetOptions::hash().container, ContainerType::Hash);
        assert_eq!(DeleteOptions::sorted().container, ContainerType::Sorted);
        assert_eq!(ExistsOptions::default().container, ContainerType::Scalar);
    }

    #[test]
    fn test_filter_and_until_sum_conflict() {
        let opts = GetOptions::sorted().filter(json!({"side": "buy"})).until_sum(5.0);
        assert!(matches!(opts.validate(), Err(CacheError::InvalidInput(_))));
    }

    #[test]
    fn test_filter_needs_sorted_set() {
        let opts = GetOptions::hash().filter(json!({"a": 1}));
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_window() {
        assert_eq!(GetOptions::sorted().window(), None);
        assert_eq!(GetOptions::sorted().limit(5).window(), Some((0, 5)));
        assert_eq!(GetOptions::sorted().offset(2).limit(5).window(), Some((2, 5)));
        assert_eq!(GetOptions::sorted().offset(3).window(), Some((3, i64::MAX as usize)));
    }

    #[test]
    fn test_delete_members_and_range_conflict() {
        let opts = DeleteOptions::sorted()
            .members(vec![json!({"a": 1})])
            .range(RangeBound::Score(1.0), RangeBound::Score(2.0));
        assert!(opts.validate().is_err());
        assert!(DeleteOptions::sorted().validate().is_ok());
    }
}
