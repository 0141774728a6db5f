use crate::core::distance::{distance_between, METERS_PER_MILE};
use crate::models::{Coordinates, GolfCourse, Zipcode};
use crate::services::{BoxFuture, GeocodingProvider, GolfCourseProvider, ProviderError};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Text query sent to the place search
const GOLF_QUERY: &str = "golf courses";

/// Place search returns at most three pages of results
const MAX_PAGES: usize = 3;

/// A fresh `next_page_token` is not valid until shortly after it is issued
const PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);

/// Google Maps Platform client
///
/// Handles:
/// - Zipcode geocoding (Geocoding API)
/// - Golf course lookup around a point (Places text search)
pub struct GoogleMapsClient {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<Place>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    place_id: String,
    name: String,
    geometry: Geometry,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    vicinity: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
}

impl From<Place> for GolfCourse {
    fn from(place: Place) -> Self {
        GolfCourse {
            id: place.place_id,
            name: place.name,
            location: Coordinates::new(place.geometry.location.lat, place.geometry.location.lng),
            address: place.formatted_address.or(place.vicinity),
            rating: place.rating,
            rating_count: place.user_ratings_total,
            tract_id: None,
            distance_miles: 0.0,
        }
    }
}

/// Map a Google API status field onto a provider error
fn check_status(status: &str, error_message: Option<String>, context: &str) -> Result<(), ProviderError> {
    let message = || error_message.clone().unwrap_or_else(|| status.to_string());
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "OVER_QUERY_LIMIT" => Err(ProviderError::Api { status: 429, message: message() }),
        "UNKNOWN_ERROR" => Err(ProviderError::Api { status: 503, message: message() }),
        "REQUEST_DENIED" => Err(ProviderError::Api { status: 403, message: message() }),
        "NOT_FOUND" => Err(ProviderError::NotFound(context.to_string())),
        _ => Err(ProviderError::Api { status: 400, message: message() }),
    }
}

impl GoogleMapsClient {
    /// Create a new Google Maps client
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("Google Maps request failed: {}", status),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Geocode a zipcode to the centre point Google reports for it
    pub async fn geocode_zipcode(&self, zipcode: &Zipcode) -> Result<Coordinates, ProviderError> {
        let components = urlencoding::encode(&format!("postal_code:{}|country:US", zipcode)).into_owned();
        let url = format!(
            "{}?components={}&key={}",
            self.endpoint("geocode/json"),
            components,
            urlencoding::encode(&self.api_key)
        );

        tracing::debug!("Geocoding zipcode {}", zipcode);

        let body: GeocodeResponse = self.get_json(&url).await?;
        check_status(&body.status, body.error_message, zipcode.as_str())?;

        let first = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("No geocode result for zipcode {}", zipcode)))?;

        Ok(Coordinates::new(first.geometry.location.lat, first.geometry.location.lng))
    }

    /// Search golf courses around `centroid`, keeping those within `radius_miles`
    pub async fn search_golf_courses(
        &self,
        centroid: Coordinates,
        radius_miles: f64,
    ) -> Result<Vec<GolfCourse>, ProviderError> {
        let radius_meters = (radius_miles * METERS_PER_MILE).round() as u64;
        let first_page = format!(
            "{}?query={}&location={},{}&radius={}&key={}",
            self.endpoint("place/textsearch/json"),
            urlencoding::encode(GOLF_QUERY),
            centroid.latitude,
            centroid.longitude,
            radius_meters,
            urlencoding::encode(&self.api_key)
        );

        // Keyed by place id; the same course can appear on several pages
        let mut courses: BTreeMap<String, GolfCourse> = BTreeMap::new();
        let mut url = first_page;

        for page in 0..MAX_PAGES {
            let body: PlacesResponse = self.get_json(&url).await?;
            check_status(&body.status, body.error_message, "place search")?;

            tracing::debug!("Place search page {} returned {} results", page + 1, body.results.len());

            for place in body.results {
                courses.entry(place.place_id.clone()).or_insert_with(|| place.into());
            }

            match body.next_page_token {
                Some(token) if page + 1 < MAX_PAGES => {
                    tokio::time::sleep(PAGE_TOKEN_DELAY).await;
                    url = format!(
                        "{}?pagetoken={}&key={}",
                        self.endpoint("place/textsearch/json"),
                        urlencoding::encode(&token),
                        urlencoding::encode(&self.api_key)
                    );
                }
                _ => break,
            }
        }

        // The location/radius pair only biases text search, so filter strictly here
        Ok(courses
            .into_values()
            .filter(|course| distance_between(centroid, course.location) <= radius_miles)
            .collect())
    }
}

impl GeocodingProvider for GoogleMapsClient {
    fn locate<'a>(&'a self, zipcode: &'a Zipcode) -> BoxFuture<'a, Result<Coordinates, ProviderError>> {
        Box::pin(self.geocode_zipcode(zipcode))
    }
}

impl GolfCourseProvider for GoogleMapsClient {
    fn find_points<'a>(
        &'a self,
        centroid: Coordinates,
        radius_miles: f64,
    ) -> BoxFuture<'a, Result<Vec<GolfCourse>, ProviderError>> {
        Box::pin(self.search_golf_courses(centroid, radius_miles))
    }
}
