// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Last-processed markers.
//!
//! Ingestion records, per category, the date of the newest batch it has
//! handled so a restart resumes where it left off. Markers are plain scalar
//! keys `last_date:<category>` holding a `YYYYMMDD` string.

use serde_json::Value;

use crate::backend::CacheError;
use crate::key::CacheKey;
use crate::store::options::{GetOptions, SetOptions};
use crate::store::Cache;

const MARKER_PREFIX: &str = "last_date";

/// Reads and writes the processed-date marker of one category.
#[derive(Debug, Clone)]
pub struct ProcessedMarker {
    cache: Cache,
    key: CacheKey,
}

impl ProcessedMarker {
    pub fn new(cache: Cache, category: &str) -> Self {
        Self {
            cache,
            key: CacheKey::new(format!("{}:{}", MARKER_PREFIX, category)),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The stored date, if one has been recorded.
    pub async fn last_date(&self) -> Result<Option<String>, CacheError> {
        let fetched = self.cache.get(&self.key, &GetOptions::scalar()).await?;
        Ok(fetched.first().map(|value| value.to_text()))
    }

    /// Record `date` (`YYYYMMDD`) as the newest processed date.
    pub async fn set_last_date(&self, date: &str) -> Result<(), CacheError> {
        validate_date(date)?;
        self.cache
            .set(&self.key, &Value::String(date.to_string()), &SetOptions::scalar(), None)
            .await?;
        Ok(())
    }
}

fn validate_date(date: &str) -> Result<(), CacheError> {
    let well_formed = date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit());
    let in_range = well_formed && {
        let month: u32 = date[4..6].parse().unwrap_or(0);
        let day: u32 = date[6..8].parse().unwrap_or(0);
        (1..=12).contains(&month) && (1..=31).contains(&day)
    };
    if in_range {
        Ok(())
    } else {
        Err(CacheError::invalid(format!("marker date must be YYYYMMDD, got {:?}", date)))
    }
}

impl Cache {
    pub fn marker(&self, category: &str) -> ProcessedMarker {
        ProcessedMarker::new(self.clone(), category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date() {
        assert!(validate_date("20240105").is_ok());
        assert!(validate_date("2024015").is_err());
        assert!(validate_date("2024-01-05").is_err());
        assert!(validate_date("20241305").is_err());
        assert!(validate_date("20240100").is_err());
    }

    #[tokio::test]
    async fn test_marker_round_trip() {
        let cache = Cache::in_memory();
        let marker = cache.marker("residential");
        assert_eq!(marker.key().as_str(), "last_date:residential");
        assert_eq!(marker.last_date().await.unwrap(), None);

        marker.set_last_date("20240105").await.unwrap();
        assert_eq!(marker.last_date().await.unwrap(), Some("20240105".to_string()));

        let err = marker.set_last_date("yesterday").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidInput(_)));
        assert_eq!(marker.last_date().await.unwrap(), Some("20240105".to_string()));
    }

    #[tokio::test]
    async fn test_markers_are_per_category() {
        let cache = Cache::in_memory();
        cache.marker("a").set_last_date("20240101").await.unwrap();
        assert_eq!(cache.marker("b").last_date().await.unwrap(), None);
    }
}
