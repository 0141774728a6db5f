use crate::config::SearchSettings;
use crate::error::SearchError;
use crate::models::domain::{SearchRequest, Zipcode};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request body of the search endpoint
///
/// Omitted fields fall back to the configured search defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchQuery {
    /// Shape is checked by `Zipcode::parse`, not the validator
    #[serde(alias = "zip_code", alias = "zipCode")]
    pub zipcode: String,
    #[validate(range(min = 1, max = 25))]
    #[serde(default, alias = "radius", alias = "radiusMiles")]
    pub radius_miles: Option<u32>,
    #[serde(default)]
    pub policy: Option<String>,
    #[validate(length(min = 1, max = 64))]
    #[serde(default)]
    pub category: Option<String>,
    #[validate(range(min = 1, max = 25))]
    #[serde(default, alias = "radiusStepMiles")]
    pub radius_step_miles: Option<u32>,
    #[validate(range(min = 1, max = 25))]
    #[serde(default, alias = "maxRadiusMiles")]
    pub max_radius_miles: Option<u32>,
}

impl SearchQuery {
    /// Resolve defaults and parse into a domain request
    pub fn into_search_request(self, defaults: &SearchSettings) -> Result<SearchRequest, SearchError> {
        let zipcode = Zipcode::parse(&self.zipcode)?;

        let policy = match self.policy.as_deref() {
            Some(raw) => raw.parse().map_err(SearchError::InvalidRequest)?,
            None => defaults.default_policy,
        };

        let radius_miles = self.radius_miles.unwrap_or(defaults.default_radius_miles);
        let max_radius_miles = self
            .max_radius_miles
            .unwrap_or_else(|| defaults.max_radius_miles.max(radius_miles));

        Ok(SearchRequest {
            zipcode,
            radius_miles,
            policy,
            category: self.category.map(|c| c.trim().to_ascii_lowercase()),
            radius_step_miles: self.radius_step_miles.unwrap_or(defaults.radius_step_miles),
            max_radius_miles,
        })
    }
}
