use crate::models::{BoundingBox, CensusTract, TractBoundary};
use crate::services::{BoxFuture, CensusProvider, ProviderError};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// ACS total population
const TOTAL_POPULATION: &str = "B01003_001E";

/// ACS B02001 race variables and the category each one reports
const RACE_VARIABLES: &[(&str, &str)] = &[
    ("B02001_002E", "white"),
    ("B02001_003E", "black"),
    ("B02001_004E", "american_indian"),
    ("B02001_005E", "asian"),
    ("B02001_006E", "pacific_islander"),
    ("B02001_007E", "other"),
    ("B02001_008E", "multiracial"),
];

/// Census Bureau client
///
/// Combines two public services:
/// - ACS 5-year estimates for population by race
/// - TIGERweb for tract boundaries and region queries
pub struct CensusClient {
    api_base_url: String,
    tigerweb_base_url: String,
    api_key: String,
    acs_year: u16,
    client: Client,
}

impl CensusClient {
    pub fn new(
        api_base_url: String,
        tigerweb_base_url: String,
        api_key: String,
        acs_year: u16,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_base_url,
            tigerweb_base_url,
            api_key,
            acs_year,
            client,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            // The ACS API answers 204 for a geography with no data
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("Census request failed: {}", status),
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        // ArcGIS reports failures in a 200 body
        if let Some(error) = json.get("error") {
            let code = error
                .get("code")
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(500);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown TIGERweb error")
                .to_string();
            return Err(ProviderError::Api { status: code, message });
        }

        Ok(json)
    }

    fn tigerweb_query(&self, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/query?{}", self.tigerweb_base_url.trim_end_matches('/'), query)
    }

    /// Boundaries of the tracts intersecting the bounding box, sorted by GEOID
    pub async fn query_tract_boundaries(&self, region: BoundingBox) -> Result<Vec<TractBoundary>, ProviderError> {
        let envelope = format!(
            "{},{},{},{}",
            region.min_lon, region.min_lat, region.max_lon, region.max_lat
        );
        let url = self.tigerweb_query(&[
            ("geometry", envelope.as_str()),
            ("geometryType", "esriGeometryEnvelope"),
            ("inSR", "4326"),
            ("spatialRel", "esriSpatialRelIntersects"),
            ("outFields", "GEOID"),
            ("returnGeometry", "true"),
            ("outSR", "4326"),
            ("f", "json"),
        ]);

        let json = self.get_json(&url).await?;
        if json.get("exceededTransferLimit").and_then(|v| v.as_bool()) == Some(true) {
            tracing::warn!("TIGERweb truncated the tract list for region {}", envelope);
        }

        let mut boundaries = BTreeMap::new();
        for feature in features(&json)? {
            let Some(geoid) = feature.pointer("/attributes/GEOID").and_then(|g| g.as_str()) else {
                continue;
            };
            let rings = feature
                .pointer("/geometry/rings")
                .and_then(|r| r.as_array())
                .ok_or_else(|| ProviderError::InvalidResponse(format!("Missing geometry for tract {}", geoid)))?;
            let geometry = esri_rings_to_multipolygon(rings)?;
            boundaries.insert(geoid.to_string(), geometry);
        }

        tracing::debug!("TIGERweb returned {} tracts for region {}", boundaries.len(), envelope);
        Ok(boundaries
            .into_iter()
            .map(|(id, geometry)| TractBoundary { id, geometry })
            .collect())
    }

    /// Population breakdown of one tract from the ACS 5-year estimates
    pub async fn fetch_population(&self, geoid: &str) -> Result<(BTreeMap<String, u64>, u64), ProviderError> {
        let (state, county, tract) = split_geoid(geoid)?;

        let variables = std::iter::once("NAME")
            .chain(std::iter::once(TOTAL_POPULATION))
            .chain(RACE_VARIABLES.iter().map(|(var, _)| *var))
            .collect::<Vec<_>>()
            .join(",");

        let mut url = format!(
            "{}/{}/acs/acs5?get={}&for={}&in={}",
            self.api_base_url.trim_end_matches('/'),
            self.acs_year,
            variables,
            urlencoding::encode(&format!("tract:{}", tract)),
            urlencoding::encode(&format!("state:{} county:{}", state, county)),
        );
        if !self.api_key.is_empty() {
            url.push_str(&format!("&key={}", urlencoding::encode(&self.api_key)));
        }

        let json = self.get_json(&url).await?;
        parse_acs_table(&json, geoid)
    }
}

impl CensusProvider for CensusClient {
    fn tracts_in_region<'a>(
        &'a self,
        region: BoundingBox,
    ) -> BoxFuture<'a, Result<Vec<TractBoundary>, ProviderError>> {
        Box::pin(self.query_tract_boundaries(region))
    }

    fn get_tract<'a>(&'a self, boundary: &'a TractBoundary) -> BoxFuture<'a, Result<CensusTract, ProviderError>> {
        Box::pin(async move {
            let (population, total_population) = self.fetch_population(&boundary.id).await?;

            Ok(CensusTract {
                id: boundary.id.clone(),
                geometry: boundary.geometry.clone(),
                population,
                total_population,
                holc_grade: None,
            })
        })
    }
}

fn features(json: &Value) -> Result<&Vec<Value>, ProviderError> {
    json.get("features")
        .and_then(|f| f.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("Missing features array".into()))
}

/// 11-digit tract GEOID -> (state, county, tract)
fn split_geoid(geoid: &str) -> Result<(&str, &str, &str), ProviderError> {
    if geoid.len() != 11 || !geoid.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProviderError::InvalidResponse(format!("Malformed tract GEOID: {}", geoid)));
    }
    Ok((&geoid[..2], &geoid[2..5], &geoid[5..]))
}

/// Parse the ACS array-of-arrays body: a header row then one data row
fn parse_acs_table(json: &Value, geoid: &str) -> Result<(BTreeMap<String, u64>, u64), ProviderError> {
    let rows = json
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("ACS body is not an array".into()))?;
    let header = rows
        .first()
        .and_then(|r| r.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("ACS body has no header row".into()))?;
    let data = rows
        .get(1)
        .and_then(|r| r.as_array())
        .ok_or_else(|| ProviderError::NotFound(format!("No ACS data for tract {}", geoid)))?;

    let value_of = |variable: &str| -> Result<u64, ProviderError> {
        let column = header
            .iter()
            .position(|h| h.as_str() == Some(variable))
            .ok_or_else(|| ProviderError::InvalidResponse(format!("ACS column {} missing", variable)))?;
        let raw = data.get(column).and_then(|v| v.as_str()).unwrap_or("0");
        // ACS uses large negative sentinels for suppressed estimates
        Ok(raw.parse::<i64>().map(|n| n.max(0) as u64).unwrap_or(0))
    };

    let mut population = BTreeMap::new();
    for (variable, category) in RACE_VARIABLES {
        population.insert(category.to_string(), value_of(variable)?);
    }

    let reported: u64 = population.values().sum();
    let total = value_of(TOTAL_POPULATION)?;
    if reported > total {
        tracing::debug!("Tract {} race counts ({}) exceed total ({}); using the sum", geoid, reported, total);
    }

    Ok((population, total.max(reported)))
}

/// Esri rings: clockwise rings are shells, counter-clockwise rings are holes
/// of the preceding shell.
fn esri_rings_to_multipolygon(rings: &[Value]) -> Result<MultiPolygon<f64>, ProviderError> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings {
        let coords = ring
            .as_array()
            .ok_or_else(|| ProviderError::InvalidResponse("Ring is not an array".into()))?
            .iter()
            .map(|pair| {
                let x = pair.get(0).and_then(|v| v.as_f64());
                let y = pair.get(1).and_then(|v| v.as_f64());
                match (x, y) {
                    (Some(x), Some(y)) => Ok(Coord { x, y }),
                    _ => Err(ProviderError::InvalidResponse("Bad ring coordinate".into())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if coords.len() < 4 {
            continue;
        }

        let line = LineString::from(coords);
        if signed_area(&line) <= 0.0 {
            polygons.push((line, Vec::new()));
        } else if let Some((_, holes)) = polygons.last_mut() {
            holes.push(line);
        } else {
            // Counter-clockwise ring with no shell before it: treat as a shell
            polygons.push((line, Vec::new()));
        }
    }

    if polygons.is_empty() {
        return Err(ProviderError::InvalidResponse("Tract geometry has no rings".into()));
    }

    Ok(MultiPolygon(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    ))
}

/// Shoelace area; negative for clockwise rings
fn signed_area(ring: &LineString<f64>) -> f64 {
    ring.0
        .windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>()
        / 2.0
}
