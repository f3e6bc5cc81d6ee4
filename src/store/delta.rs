// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Atomic multi-member score deltas.
//!
//! All deltas are applied in one server-side script call, so concurrent
//! callers never observe a half-applied batch. Any member whose resulting
//! score is zero or below is removed from the set.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{instrument, warn};

use super::Cache;
use crate::backend::{CacheError, Command, Reply};
use crate::key::CacheKey;
use crate::metrics;

fn delta_value(member: &str, value: &Value) -> Result<f64, CacheError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|d| d.is_finite()).ok_or_else(|| {
        CacheError::invalid(format!("delta for member {:?} is not a number: {}", member, value))
    })
}

impl Cache {
    /// Apply a `{ member: delta, ... }` mapping to a sorted set.
    ///
    /// Returns each member's new score. Members reported at `<= 0` are no
    /// longer in the set.
    pub async fn apply_deltas(
        &self,
        key: &CacheKey,
        deltas: &Value,
    ) -> Result<BTreeMap<String, f64>, CacheError> {
        let Value::Object(map) = deltas else {
            warn!(key = %key, "Delta input is not a mapping");
            return Err(CacheError::invalid("deltas must be a mapping of member to delta"));
        };
        let pairs = map
            .iter()
            .map(|(member, value)| Ok((member.clone(), delta_value(member, value)?)))
            .collect::<Result<Vec<_>, CacheError>>()?;
        self.apply_delta_pairs(key, pairs).await
    }

    /// Typed form of [`Cache::apply_deltas`].
    #[instrument(skip(self, deltas), fields(key = %key, members = deltas.len()))]
    pub async fn apply_delta_pairs(
        &self,
        key: &CacheKey,
        deltas: Vec<(String, f64)>,
    ) -> Result<BTreeMap<String, f64>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::missing("key"));
        }
        if deltas.is_empty() {
            return Ok(BTreeMap::new());
        }
        if let Some((member, delta)) = deltas.iter().find(|(_, d)| !d.is_finite()) {
            warn!(key = %key, member = %member, "Rejected non-finite delta");
            return Err(CacheError::invalid(format!(
                "delta for member {:?} is not finite: {}",
                member, delta
            )));
        }

        let members: Vec<String> = deltas.iter().map(|(m, _)| m.clone()).collect();
        let reply = self
            .run(Command::ApplyDeltas { key: key.as_str().to_string(), deltas })
            .await?;
        let Reply::Floats(scores) = reply else {
            return Err(CacheError::Command(format!("unexpected delta reply: {:?}", reply)));
        };
        if scores.len() != members.len() {
            return Err(CacheError::Command(format!(
                "delta reply has {} scores for {} members",
                scores.len(),
                members.len()
            )));
        }

        let removed = scores.iter().filter(|s| **s <= 0.0).count();
        if removed > 0 {
            metrics::record_delta_removals(removed);
        }
        Ok(members.into_iter().zip(scores).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::options::GetOptions;
    use crate::backend::RangeBound;
    use serde_json::json;

    async fn with_scores(cache: &Cache, entries: &[(&str, f64)]) {
        let pairs = entries.iter().map(|(m, s)| (m.to_string(), *s)).collect();
        cache.apply_delta_pairs(&CacheKey::new("z"), pairs).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_positive_result_removes_member() {
        let cache = Cache::in_memory();
        with_scores(&cache, &[("m1", 3.0), ("m2", 4.0)]).await;

        let result = cache
            .apply_deltas(&CacheKey::new("z"), &json!({"m1": -5, "m2": "1.5"}))
            .await
            .unwrap();
        assert_eq!(result.get("m1"), Some(&-2.0));
        assert_eq!(result.get("m2"), Some(&5.5));

        let left = cache
            .get(&CacheKey::new("z"), &GetOptions::sorted().with_scores())
            .await
            .unwrap()
            .into_values();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].to_text(), "m2");
    }

    #[tokio::test]
    async fn test_exact_zero_is_removed() {
        let cache = Cache::in_memory();
        with_scores(&cache, &[("m1", 2.0)]).await;
        cache.apply_deltas(&CacheKey::new("z"), &json!({"m1": -2})).await.unwrap();

        let left = cache
            .get(&CacheKey::new("z"), &GetOptions::sorted().range(RangeBound::NegInf, RangeBound::PosInf))
            .await
            .unwrap()
            .into_values();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_mapping_and_non_numbers() {
        let cache = Cache::in_memory();
        let err = cache.apply_deltas(&CacheKey::new("z"), &json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidInput(_)));

        let err = cache.apply_deltas(&CacheKey::new("z"), &json!({"m": "lots"})).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_typed_pairs_reject_non_finite_deltas() {
        let cache = Cache::in_memory();
        let key = CacheKey::new("z");
        cache.apply_delta_pairs(&key, vec![("m".into(), 2.0)]).await.unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = cache
                .apply_delta_pairs(&key, vec![("m".into(), 1.0), ("n".into(), bad)])
                .await
                .unwrap_err();
            assert!(matches!(err, CacheError::InvalidInput(_)));
        }

        // Nothing from the rejected batches was applied
        let after = cache.apply_delta_pairs(&key, vec![("m".into(), 0.0)]).await.unwrap();
        assert_eq!(after["m"], 2.0);
    }

    #[tokio::test]
    async fn test_empty_mapping_is_a_no_op() {
        let cache = Cache::in_memory();
        assert!(cache.apply_deltas(&CacheKey::new("z"), &json!({})).await.unwrap().is_empty());
    }
}
