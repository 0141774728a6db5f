// Service exports
pub mod cache;
pub mod census;
pub mod google;
pub mod holc;

pub use cache::{CacheBackend, CacheError, CacheManager, MemoryCache};
pub use census::CensusClient;
pub use google::GoogleMapsClient;
pub use holc::HolcTable;

use crate::models::{BoundingBox, CensusTract, Coordinates, GolfCourse, HolcGrade, TractBoundary, Zipcode};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by the provider traits so they stay object-safe
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur when talking to an upstream data provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transport failures, throttling and server errors are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Request(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::NotFound(_) | ProviderError::InvalidResponse(_) => false,
        }
    }
}

/// Resolves a zipcode to a point inside it
pub trait GeocodingProvider: Send + Sync {
    fn locate<'a>(&'a self, zipcode: &'a Zipcode) -> BoxFuture<'a, Result<Coordinates, ProviderError>>;
}

/// Golf-course point data
pub trait GolfCourseProvider: Send + Sync {
    /// Courses whose coordinates lie within `radius_miles` of `centroid`
    fn find_points<'a>(
        &'a self,
        centroid: Coordinates,
        radius_miles: f64,
    ) -> BoxFuture<'a, Result<Vec<GolfCourse>, ProviderError>>;
}

/// Census/ACS tract data
pub trait CensusProvider: Send + Sync {
    /// Boundaries of every tract intersecting `region`, in one query
    fn tracts_in_region<'a>(&'a self, region: BoundingBox)
        -> BoxFuture<'a, Result<Vec<TractBoundary>, ProviderError>>;

    /// Population breakdown of one tract, attached to its boundary
    fn get_tract<'a>(&'a self, boundary: &'a TractBoundary) -> BoxFuture<'a, Result<CensusTract, ProviderError>>;
}

/// Historical HOLC map grades
pub trait HolcProvider: Send + Sync {
    fn get_grade<'a>(&'a self, tract_id: &'a str) -> BoxFuture<'a, Result<Option<HolcGrade>, ProviderError>>;
}
