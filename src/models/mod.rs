// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    BoundingBox, CacheEntry, CensusTract, Coordinates, CourseMatch, DemographicBand,
    DemographicPolicy, GolfCourse, HolcGrade, MatchVerdict, SearchRequest, SearchResult,
    TractBoundary, Zipcode, MAX_RADIUS_MILES, MIN_RADIUS_MILES,
};
pub use requests::SearchQuery;
pub use responses::{DemographicSummary, ErrorResponse, HealthResponse, SearchResponse};
