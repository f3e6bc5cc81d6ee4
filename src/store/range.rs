// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Effective read/delete windows.
//!
//! "Everything unless told otherwise": lists default to `0..-1`, sorted sets
//! to `-inf..+inf`. A pinned member collapses the window to that single
//! member key. Read and delete paths both go through [`resolve`].

use crate::backend::RangeBound;
use crate::key::ContainerType;

/// Compute the `(start, end)` window for a container.
///
/// A `pinned` member wins over explicit bounds; explicit bounds win over the
/// container defaults.
///
/// ```
/// use coord_cache::store::range::resolve;
/// use coord_cache::{ContainerType, RangeBound};
///
/// assert_eq!(
///     resolve(ContainerType::List, None, None, None),
///     (RangeBound::Index(0), RangeBound::Index(-1))
/// );
/// assert_eq!(
///     resolve(ContainerType::Sorted, None, None, Some("m1")),
///     (RangeBound::Member("m1".into()), RangeBound::Member("m1".into()))
/// );
/// ```
pub fn resolve(
    container: ContainerType,
    start: Option<RangeBound>,
    end: Option<RangeBound>,
    pinned: Option<&str>,
) -> (RangeBound, RangeBound) {
    if let Some(member) = pinned {
        return (
            RangeBound::Member(member.to_string()),
            RangeBound::Member(member.to_string()),
        );
    }

    let (default_start, default_end) = match container {
        ContainerType::Sorted => (RangeBound::NegInf, RangeBound::PosInf),
        ContainerType::List | ContainerType::Scalar | ContainerType::Hash => {
            (RangeBound::Index(0), RangeBound::Index(-1))
        }
    };

    (start.unwrap_or(default_start), end.unwrap_or(default_end))
}
