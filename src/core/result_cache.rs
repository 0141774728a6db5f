use crate::error::SearchError;
use crate::models::{CacheEntry, DemographicPolicy, MatchVerdict, SearchRequest, SearchResult, Zipcode};
use crate::services::CacheBackend;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// `zipcode:policy:radius_path`, e.g. `30301:strict_majority=black:10+5..25`
    ///
    /// The last segment is the whole radius path ending in the ceiling, so
    /// a request starting from a different radius never shares an entry.
    pub fn search(request: &SearchRequest) -> String {
        format!(
            "{}:{}:{}+{}..{}",
            request.zipcode,
            Self::policy_segment(request.policy, request.category.as_deref()),
            request.radius_miles,
            request.radius_step_miles,
            request.max_radius_miles
        )
    }

    /// Sub-key for the geocoder's resolution of a zipcode
    pub fn geocode(zipcode: &Zipcode) -> String {
        format!("geocode:{}", zipcode)
    }

    fn policy_segment(policy: DemographicPolicy, category: Option<&str>) -> String {
        match category {
            Some(category) => format!("{}={}", policy, category.to_ascii_lowercase()),
            None => policy.to_string(),
        }
    }
}

/// Typed layer over a byte cache backend
///
/// Values are JSON-encoded. Entries are written whole; nothing is merged.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Last stored result for `key`, if any
    pub async fn get(&self, key: &str) -> Result<Option<SearchResult>, SearchError> {
        Ok(self.get_entry(key).await?.map(|entry| entry.result))
    }

    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, SearchError> {
        self.get_json(key).await
    }

    /// Replace the entry for `key` with a freshly computed result
    pub async fn put(
        &self,
        key: &str,
        result: &SearchResult,
        tract_verdicts: BTreeMap<String, MatchVerdict>,
    ) -> Result<(), SearchError> {
        let mut stored = result.clone();
        stored.cache_hit = false;

        let entry = CacheEntry {
            key: key.to_string(),
            result: stored,
            tract_verdicts,
            created_at: chrono::Utc::now(),
        };
        self.put_json(key, &entry).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SearchError> {
        let bytes = self
            .backend
            .get(key)
            .await
            .map_err(|e| SearchError::CacheUnavailable(e.to_string()))?;

        match bytes {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // An undecodable entry is treated as absent and will be overwritten
                    tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SearchError> {
        let bytes = serde_json::to_vec(value).map_err(|e| SearchError::CacheUnavailable(e.to_string()))?;
        self.backend
            .put(key, bytes)
            .await
            .map_err(|e| SearchError::CacheUnavailable(e.to_string()))
    }
}
