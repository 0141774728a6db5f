use serde::{Deserialize, Serialize};
use crate::models::domain::{Coordinates, CourseMatch, DemographicBand, SearchResult, Zipcode};

/// Response for the search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub request_id: String,
    pub zipcode: Zipcode,
    pub centroid: Coordinates,
    pub matches: Vec<CourseMatch>,
    pub effective_radius: u32,
    pub radii_tried: Vec<u32>,
    pub cache_hit: bool,
    pub summary: DemographicSummary,
}

impl SearchResponse {
    pub fn from_result(result: SearchResult) -> Self {
        let summary = DemographicSummary::from_matches(&result.matches);
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            zipcode: result.zipcode,
            centroid: result.centroid,
            matches: result.matches,
            effective_radius: result.effective_radius,
            radii_tried: result.radii_tried,
            cache_hit: result.cache_hit,
            summary,
        }
    }
}

/// Matched-course counts per demographic band
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemographicSummary {
    pub majority: usize,
    pub significant: usize,
    pub minimal: usize,
}

impl DemographicSummary {
    pub fn from_matches(matches: &[CourseMatch]) -> Self {
        let mut summary = Self::default();
        for m in matches {
            match DemographicBand::from_share(m.verdict.dominant_share_pct) {
                DemographicBand::Majority => summary.majority += 1,
                DemographicBand::Significant => summary.significant += 1,
                DemographicBand::Minimal => summary.minimal += 1,
            }
        }
        summary
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cache: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
