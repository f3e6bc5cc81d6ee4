// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sum-bounded walk over a sorted set.
//!
//! Members are read from one end and each member's leading quantity (the
//! last number in the first comma-separated field of its stored text) is
//! added to a running sum. The walk stops on the first member that brings
//! the sum to `amount` or beyond, and that member is included. The whole
//! walk runs server-side in one script call.

use tracing::{debug, instrument};

use super::typed::{pair_scores, ScoreEntry};
use super::Cache;
use crate::backend::{CacheError, Command};
use crate::key::CacheKey;

impl Cache {
    /// Visit members in score order (`desc` from the top) until their
    /// leading quantities sum to at least `amount`.
    ///
    /// Returns every visited entry. A non-positive `amount` visits nothing;
    /// a set whose total falls short returns all of it.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn walk_until_sum(
        &self,
        key: &CacheKey,
        amount: f64,
        desc: bool,
    ) -> Result<Vec<ScoreEntry>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::missing("key"));
        }
        if amount <= 0.0 {
            return Ok(Vec::new());
        }

        let reply = self
            .run(Command::WalkUntilSum { key: key.as_str().to_string(), amount, desc })
            .await?;
        let entries = pair_scores(reply.into_items())?;
        debug!(visited = entries.len(), "Walk complete");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::options::SetOptions;
    use serde_json::json;

    // Members are `[quantity, id]`; the walk sums the quantities
    async fn seeded() -> Cache {
        let cache = Cache::in_memory();
        for (score, id) in [(1, "a"), (2, "b"), (3, "c")] {
            let opts = SetOptions::sorted().explicit_key(score.to_string());
            cache.set(&CacheKey::new("book"), &json!([10, id]), &opts, None).await.unwrap();
        }
        cache
    }

    fn ids(entries: &[ScoreEntry]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| e.member.as_value().and_then(|v| v.get(1)).and_then(|v| v.as_str()).map(String::from))
            .collect()
    }

    #[tokio::test]
    async fn test_stops_on_member_that_crosses_amount() {
        let cache = seeded().await;
        let entries = cache.walk_until_sum(&CacheKey::new("book"), 15.0, false).await.unwrap();
        assert_eq!(ids(&entries), vec!["a", "b"]);
        assert_eq!(entries[1].score, 2.0);
    }

    #[tokio::test]
    async fn test_desc_walks_from_the_top() {
        let cache = seeded().await;
        let entries = cache.walk_until_sum(&CacheKey::new("book"), 10.0, true).await.unwrap();
        assert_eq!(ids(&entries), vec!["c"]);
    }

    #[tokio::test]
    async fn test_short_set_returns_everything() {
        let cache = seeded().await;
        let entries = cache.walk_until_sum(&CacheKey::new("book"), 1000.0, false).await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_non_positive_amount_visits_nothing() {
        let cache = seeded().await;
        assert!(cache.walk_until_sum(&CacheKey::new("book"), 0.0, false).await.unwrap().is_empty());
        assert!(cache.walk_until_sum(&CacheKey::new("book"), -3.0, true).await.unwrap().is_empty());
    }
}
