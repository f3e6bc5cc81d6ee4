// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pattern scan over sorted-set members.
//!
//! ZSCAN may return a member more than once across pages, so results are
//! de-duplicated by stored text. Canonical encoding makes that the same as
//! de-duplicating by value.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, instrument};

use super::Cache;
use crate::backend::{CacheError, Command, Reply};
use crate::codec::{decode, filter_pattern, Decoded};
use crate::key::CacheKey;
use crate::metrics;

impl Cache {
    /// Every member of the sorted set whose stored text contains the
    /// canonical fragment of `filter`.
    ///
    /// Runs the cursor to completion; there is no other bound.
    #[instrument(skip(self, filter), fields(key = %key))]
    pub async fn scan(&self, key: &CacheKey, filter: &Value) -> Result<Vec<Decoded>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::missing("key"));
        }
        let pattern = filter_pattern(filter);

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut cursor = "0".to_string();
        let mut pages = 0;

        loop {
            let reply = self
                .run(Command::ZScan {
                    key: key.as_str().to_string(),
                    cursor,
                    pattern: Some(pattern.clone()),
                    count: None,
                })
                .await?;
            let Reply::Scan { cursor: next, items } = reply else {
                return Err(CacheError::Command(format!("unexpected ZSCAN reply: {:?}", reply)));
            };
            pages += 1;

            // Items alternate member, score
            for member in items.into_iter().step_by(2) {
                if seen.insert(member.clone()) {
                    found.push(decode(&member));
                }
            }

            if next == "0" {
                break;
            }
            cursor = next;
        }

        metrics::record_scan_pages(pages);
        debug!(pages, matches = found.len(), "Scan complete");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::store::options::SetOptions;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Replays canned ZSCAN pages.
    struct ScriptedScan {
        pages: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl Backend for ScriptedScan {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run(&self, _command: Command) -> Result<Reply, CacheError> {
            let mut pages = self.pages.lock();
            if pages.is_empty() {
                return Ok(Reply::Scan { cursor: "0".into(), items: Vec::new() });
            }
            let (cursor, items) = pages.remove(0);
            Ok(Reply::Scan { cursor, items })
        }

        async fn run_atomic(&self, _commands: Vec<Command>) -> Result<Vec<Reply>, CacheError> {
            Ok(Vec::new())
        }
    }

    fn page(cursor: &str, members: &[&str]) -> (String, Vec<String>) {
        let items = members.iter().flat_map(|m| [m.to_string(), "1".to_string()]).collect();
        (cursor.to_string(), items)
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_dropped() {
        let backend = ScriptedScan {
            pages: Mutex::new(vec![
                page("17", &[r#"{"a":1}"#, r#"{"a":2}"#]),
                page("0", &[r#"{"a":2}"#, r#"{"a":3}"#]),
            ]),
        };
        let cache = Cache::with_backend(Arc::new(backend));

        let found = cache.scan(&CacheKey::new("z"), &json!({"a": 1})).await.unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[1].attribute("a"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_scan_matches_fragment() {
        let cache = Cache::in_memory();
        let rows: Vec<_> = (0..25)
            .map(|n| json!({"n": n, "side": if n % 5 == 0 { "sell" } else { "buy" }}))
            .collect();
        cache
            .set(&CacheKey::new("z"), &json!(rows), &SetOptions::sorted().key_attr("n"), None)
            .await
            .unwrap();

        let sells = cache.scan(&CacheKey::new("z"), &json!({"side": "sell"})).await.unwrap();
        assert_eq!(sells.len(), 5);
        assert!(sells.iter().all(|d| d.attribute("side") == Some(&json!("sell"))));
    }

    #[tokio::test]
    async fn test_scan_missing_key_is_empty() {
        let cache = Cache::in_memory();
        let found = cache.scan(&CacheKey::new("none"), &json!({"a": 1})).await.unwrap();
        assert!(found.is_empty());
    }
}
