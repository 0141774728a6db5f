use crate::models::{BoundingBox, Coordinates};

/// Earth's mean radius in miles
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Miles spanned by one degree of latitude
const MILES_PER_DEGREE: f64 = 69.0;

/// Meters per statute mile
pub const METERS_PER_MILE: f64 = 1609.344;

/// Calculate the Haversine distance between two points in miles
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
///
/// # Returns
/// Great-circle distance in miles
#[inline]
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Distance between two coordinates in miles
#[inline]
pub fn distance_between(a: Coordinates, b: Coordinates) -> f64 {
    haversine_miles(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Calculate a bounding box around a center point
///
/// Cheaper than Haversine for pre-filtering and for region queries.
/// 1° latitude ≈ 69 miles, 1° longitude ≈ 69 miles * cos(latitude)
pub fn calculate_bounding_box(lat: f64, lon: f64, radius_miles: f64) -> BoundingBox {
    let lat_delta = radius_miles / MILES_PER_DEGREE;

    // Clamp so the box stays finite near the poles
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    let lon_delta = radius_miles / (MILES_PER_DEGREE * cos_lat);

    BoundingBox {
        min_lat: lat - lat_delta,
        max_lat: lat + lat_delta,
        min_lon: lon - lon_delta,
        max_lon: lon + lon_delta,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(lat: f64, lon: f64, bbox: &BoundingBox) -> bool {
    lat >= bbox.min_lat
        && lat <= bbox.max_lat
        && lon >= bbox.min_lon
        && lon <= bbox.max_lon
}
