//! Fairway Census - demographic-aware golf course search
//!
//! Resolves a zipcode to a centroid, finds golf courses around it and keeps
//! the ones whose census tract satisfies a demographic policy, widening the
//! search radius until something matches or the ceiling is reached.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{distance::{calculate_bounding_box, haversine_miles}, Providers, QueryOrchestrator};
pub use error::SearchError;
pub use models::{DemographicPolicy, SearchRequest, SearchResponse, SearchResult, Zipcode};
