use crate::core::distance::calculate_bounding_box;
use crate::core::result_cache::{CacheKey, ResultCache};
use crate::core::retry::RetryPolicy;
use crate::core::tracts::TractIndex;
use crate::error::SearchError;
use crate::models::{Coordinates, Zipcode};
use crate::services::{CensusProvider, GeocodingProvider, ProviderError};
use std::sync::Arc;

/// A zipcode resolved to its centroid and the tract boundaries around it
#[derive(Debug)]
pub struct GeocodedZipcode {
    pub zipcode: Zipcode,
    pub centroid: Coordinates,
    /// Tracts intersecting a box of `region_radius_miles` around the centroid
    pub tracts: TractIndex,
    pub region_radius_miles: f64,
}

/// Resolves zipcodes to a centroid plus candidate tract boundaries
///
/// The candidate region is sized from the radius ceiling (times a margin)
/// so radius expansion never needs a second geocode. Boundaries come from a
/// single region query; no population data is fetched here.
pub struct Geocoder {
    geocoding: Arc<dyn GeocodingProvider>,
    census: Arc<dyn CensusProvider>,
    cache: Option<ResultCache>,
    retry: RetryPolicy,
    region_margin: f64,
}

impl Geocoder {
    pub fn new(
        geocoding: Arc<dyn GeocodingProvider>,
        census: Arc<dyn CensusProvider>,
        retry: RetryPolicy,
        region_margin: f64,
    ) -> Self {
        Self {
            geocoding,
            census,
            cache: None,
            retry,
            region_margin: region_margin.max(1.0),
        }
    }

    /// Read centroids from `geocode:<zipcode>` entries
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn resolve(&self, zipcode: &Zipcode, ceiling_miles: u32) -> Result<GeocodedZipcode, SearchError> {
        let region_radius_miles = ceiling_miles as f64 * self.region_margin;
        let centroid = self.centroid(zipcode).await?;

        let region = calculate_bounding_box(centroid.latitude, centroid.longitude, region_radius_miles);
        let boundaries = self
            .retry
            .run("tract region query", || self.census.tracts_in_region(region))
            .await
            .map_err(|e| SearchError::UpstreamUnavailable(format!("census tracts: {}", e)))?;
        let tracts = TractIndex::new(boundaries);

        tracing::info!(
            "Resolved {} to ({:.4}, {:.4}) with {} candidate tracts",
            zipcode,
            centroid.latitude,
            centroid.longitude,
            tracts.len()
        );

        Ok(GeocodedZipcode {
            zipcode: zipcode.clone(),
            centroid,
            tracts,
            region_radius_miles,
        })
    }

    /// Store the centroid under `geocode:<zipcode>`
    ///
    /// Called once the search built on this resolution has succeeded.
    pub async fn remember(&self, zipcode: &Zipcode, centroid: Coordinates) {
        let Some(cache) = &self.cache else { return };
        if let Err(e) = cache.put_json(&CacheKey::geocode(zipcode), &centroid).await {
            tracing::warn!("Geocode cache write failed for {}: {}", zipcode, e);
        }
    }

    async fn centroid(&self, zipcode: &Zipcode) -> Result<Coordinates, SearchError> {
        if let Some(cache) = &self.cache {
            match cache.get_json::<Coordinates>(&CacheKey::geocode(zipcode)).await {
                Ok(Some(hit)) => {
                    tracing::debug!("Geocode cache hit for {}", zipcode);
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Geocode cache read failed for {}: {}", zipcode, e),
            }
        }

        self.retry
            .run("geocode", || self.geocoding.locate(zipcode))
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => SearchError::InvalidZipcode(zipcode.to_string()),
                other => SearchError::UpstreamUnavailable(format!("geocoder: {}", other)),
            })
    }
}
