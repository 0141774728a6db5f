use crate::config::SearchSettings;
use crate::core::classifier::Classifier;
use crate::core::geocoder::Geocoder;
use crate::core::result_cache::{CacheKey, ResultCache};
use crate::core::retry::RetryPolicy;
use crate::core::search::{SearchParams, SpatialSearchEngine};
use crate::error::SearchError;
use crate::models::{MatchVerdict, SearchRequest, SearchResult};
use crate::services::{CensusProvider, GeocodingProvider, GolfCourseProvider, HolcProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External data sources a search draws on
#[derive(Clone)]
pub struct Providers {
    pub geocoding: Arc<dyn GeocodingProvider>,
    pub courses: Arc<dyn GolfCourseProvider>,
    pub census: Arc<dyn CensusProvider>,
    pub holc: Arc<dyn HolcProvider>,
}

/// Entry point for a search: cache, geocode, spatial search, cache again
///
/// Cache failures never fail a search. A failed or timed-out search leaves
/// the cache untouched, including the zipcode's `geocode:` entry.
pub struct QueryOrchestrator {
    geocoder: Geocoder,
    engine: SpatialSearchEngine,
    cache: ResultCache,
    timeout: Duration,
}

impl QueryOrchestrator {
    pub fn new(providers: Providers, cache: ResultCache, settings: &SearchSettings) -> Self {
        let retry = RetryPolicy::new(settings.retry_count, settings.retry_base_delay());

        let geocoder = Geocoder::new(
            providers.geocoding,
            Arc::clone(&providers.census),
            retry,
            settings.tract_region_margin,
        )
        .with_cache(cache.clone());

        let engine = SpatialSearchEngine::new(
            providers.courses,
            providers.census,
            providers.holc,
            Classifier::new(settings.category_priority.clone()),
            retry,
            settings.worker_limit,
        );

        Self {
            geocoder,
            engine,
            cache,
            timeout: settings.request_timeout(),
        }
    }

    /// Override the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend_name()
    }

    pub async fn run(&self, request: SearchRequest) -> Result<SearchResult, SearchError> {
        request.validate()?;
        let key = CacheKey::search(&request);

        match self.cache.get(&key).await {
            Ok(Some(mut hit)) => {
                tracing::info!("Cache hit for {}", key);
                hit.cache_hit = true;
                return Ok(hit);
            }
            Ok(None) => tracing::debug!("Cache miss for {}", key),
            Err(e) => tracing::warn!("Cache read failed for {}, searching anyway: {}", key, e),
        }

        let started = Instant::now();
        let (result, tract_verdicts) = tokio::time::timeout(self.timeout, self.compute(&request))
            .await
            .map_err(|_| {
                tracing::warn!("Search for {} exceeded {:?}", key, self.timeout);
                SearchError::UpstreamTimeout(self.timeout)
            })??;

        tracing::info!(
            "Search {} finished in {:?}: {} matches at {}mi",
            key,
            started.elapsed(),
            result.matches.len(),
            result.effective_radius
        );

        if let Err(e) = self.cache.put(&key, &result, tract_verdicts).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
        self.geocoder.remember(&result.zipcode, result.centroid).await;

        Ok(result)
    }

    async fn compute(
        &self,
        request: &SearchRequest,
    ) -> Result<(SearchResult, BTreeMap<String, MatchVerdict>), SearchError> {
        let geocoded = self
            .geocoder
            .resolve(&request.zipcode, request.max_radius_miles)
            .await?;

        let params = SearchParams {
            policy: request.policy,
            category: request.category.as_deref(),
            radius_miles: request.radius_miles,
            radius_step_miles: request.radius_step_miles,
            max_radius_miles: request.max_radius_miles,
        };
        let outcome = self.engine.search(geocoded.centroid, &geocoded.tracts, params).await?;

        let result = SearchResult {
            zipcode: request.zipcode.clone(),
            centroid: geocoded.centroid,
            matches: outcome.matches,
            effective_radius: outcome.effective_radius,
            radii_tried: outcome.radii_tried,
            cache_hit: false,
        };
        Ok((result, outcome.tract_verdicts))
    }
}
