// Core search exports
pub mod classifier;
pub mod distance;
pub mod geocoder;
pub mod orchestrator;
pub mod result_cache;
pub mod retry;
pub mod search;
pub mod tracts;

pub use classifier::Classifier;
pub use distance::{calculate_bounding_box, distance_between, haversine_miles, is_within_bounding_box};
pub use geocoder::{GeocodedZipcode, Geocoder};
pub use orchestrator::{Providers, QueryOrchestrator};
pub use result_cache::{CacheKey, ResultCache};
pub use retry::RetryPolicy;
pub use search::{radius_schedule, SearchOutcome, SearchParams, SpatialSearchEngine};
pub use tracts::TractIndex;
