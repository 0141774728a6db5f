use crate::error::SearchError;
use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Smallest radius a caller may request, in miles
pub const MIN_RADIUS_MILES: u32 = 1;

/// Product-wide radius ceiling, in miles
pub const MAX_RADIUS_MILES: u32 = 25;

/// Normalized 5-digit US postal code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Zipcode(String);

impl Zipcode {
    /// Parse and normalize a zipcode.
    ///
    /// Accepts `NNNNN` and ZIP+4 (`NNNNN-NNNN`); the +4 suffix is dropped.
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let trimmed = raw.trim();
        let base = match trimmed.split_once('-') {
            Some((base, plus4)) if plus4.len() == 4 && plus4.bytes().all(|b| b.is_ascii_digit()) => base,
            Some(_) => return Err(SearchError::InvalidZipcode(raw.to_string())),
            None => trimmed,
        };

        if base.len() != 5 || !base.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SearchError::InvalidZipcode(raw.to_string()));
        }

        Ok(Self(base.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zipcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGS84 coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// geo uses x = longitude, y = latitude
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Historical HOLC mortgage-risk grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HolcGrade {
    A,
    B,
    C,
    D,
    #[serde(rename = "ungraded")]
    Ungraded,
}

impl FromStr for HolcGrade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(HolcGrade::A),
            "B" => Ok(HolcGrade::B),
            "C" => Ok(HolcGrade::C),
            "D" => Ok(HolcGrade::D),
            "" | "UNGRADED" => Ok(HolcGrade::Ungraded),
            other => Err(format!("unknown HOLC grade: {}", other)),
        }
    }
}

impl HolcGrade {
    /// A letter grade; `Ungraded` carries no historical signal
    pub fn is_graded(self) -> bool {
        self != HolcGrade::Ungraded
    }
}

/// Tract id and polygon, as returned by a region query
#[derive(Debug, Clone, PartialEq)]
pub struct TractBoundary {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
}

/// Census tract with its population breakdown by race category
///
/// Category keys are lower-case (`white`, `black`, `asian`, ...).
#[derive(Debug, Clone)]
pub struct CensusTract {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub population: BTreeMap<String, u64>,
    pub total_population: u64,
    pub holc_grade: Option<HolcGrade>,
}

impl CensusTract {
    /// Population counted under `category` (case-insensitive)
    pub fn count(&self, category: &str) -> u64 {
        let key = category.to_ascii_lowercase();
        self.population.get(&key).copied().unwrap_or(0)
    }

    /// Share of the total population in percent, 0 when the tract is empty
    pub fn share_pct(&self, category: &str) -> f64 {
        if self.total_population == 0 {
            return 0.0;
        }
        self.count(category) as f64 / self.total_population as f64 * 100.0
    }

    /// Category counts never exceed the total (the remainder is unreported)
    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.population.values().sum();
        sum <= self.total_population
    }
}

/// Golf course point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GolfCourse {
    pub id: String,
    pub name: String,
    pub location: Coordinates,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u32>,
    /// Containing tract, filled in once resolved
    #[serde(default)]
    pub tract_id: Option<String>,
    #[serde(default)]
    pub distance_miles: f64,
}

/// Classification policy applied to a tract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemographicPolicy {
    StrictMajority,
    Plurality,
    HistoricalSignificance,
}

impl DemographicPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemographicPolicy::StrictMajority => "strict_majority",
            DemographicPolicy::Plurality => "plurality",
            DemographicPolicy::HistoricalSignificance => "historical_significance",
        }
    }

    /// Whether the policy reasons over population counts
    pub fn requires_population(&self) -> bool {
        !matches!(self, DemographicPolicy::HistoricalSignificance)
    }
}

impl fmt::Display for DemographicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemographicPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "strictmajority" | "majority" => Ok(DemographicPolicy::StrictMajority),
            "plurality" => Ok(DemographicPolicy::Plurality),
            "historicalsignificance" | "historical" => Ok(DemographicPolicy::HistoricalSignificance),
            _ => Err(format!("unrecognized policy: {}", s)),
        }
    }
}

/// Outcome of classifying one tract under one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchVerdict {
    pub matched: bool,
    pub dominant_category: Option<String>,
    pub dominant_share_pct: f64,
    pub holc_grade: Option<HolcGrade>,
    pub buffer_zone: bool,
}

/// A course together with the verdict for its containing tract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseMatch {
    pub course: GolfCourse,
    pub verdict: MatchVerdict,
}

/// Validated search parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub zipcode: Zipcode,
    pub radius_miles: u32,
    pub policy: DemographicPolicy,
    /// Demographic criterion the dominant category must equal, if any
    pub category: Option<String>,
    pub radius_step_miles: u32,
    pub max_radius_miles: u32,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), SearchError> {
        if !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&self.radius_miles) {
            return Err(SearchError::InvalidRequest(format!(
                "radius must be between {} and {} miles, got {}",
                MIN_RADIUS_MILES, MAX_RADIUS_MILES, self.radius_miles
            )));
        }

        if self.max_radius_miles < self.radius_miles || self.max_radius_miles > MAX_RADIUS_MILES {
            return Err(SearchError::InvalidRequest(format!(
                "radius ceiling must be between {} and {} miles, got {}",
                self.radius_miles, MAX_RADIUS_MILES, self.max_radius_miles
            )));
        }

        if self.radius_step_miles == 0 {
            return Err(SearchError::InvalidRequest(
                "radius step must be at least 1 mile".to_string(),
            ));
        }

        if let Some(category) = &self.category {
            if category.trim().is_empty() {
                return Err(SearchError::InvalidRequest(
                    "category must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Outcome of a search, as returned to the caller and stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub zipcode: Zipcode,
    pub centroid: Coordinates,
    pub matches: Vec<CourseMatch>,
    pub effective_radius: u32,
    pub radii_tried: Vec<u32>,
    pub cache_hit: bool,
}

/// Stored result for one cache key; replaced wholesale, never patched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub result: SearchResult,
    pub tract_verdicts: BTreeMap<String, MatchVerdict>,
    pub created_at: DateTime<Utc>,
}

/// Coarse band of a matched course's dominant share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemographicBand {
    /// > 50%
    Majority,
    /// > 25% and <= 50%
    Significant,
    /// <= 25%
    Minimal,
}

impl DemographicBand {
    pub fn from_share(share_pct: f64) -> Self {
        if share_pct > 50.0 {
            DemographicBand::Majority
        } else if share_pct > 25.0 {
            DemographicBand::Significant
        } else {
            DemographicBand::Minimal
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}
