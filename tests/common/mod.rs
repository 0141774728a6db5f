// In-memory providers and fixtures shared by the integration tests
#![allow(dead_code)]

use fairway_census::config::SearchSettings;
use fairway_census::core::{Providers, QueryOrchestrator, ResultCache};
use fairway_census::haversine_miles;
use fairway_census::models::{BoundingBox, CensusTract, Coordinates, GolfCourse, HolcGrade, TractBoundary, Zipcode};
use fairway_census::services::{
    BoxFuture, CacheBackend, CacheError, CensusProvider, GeocodingProvider, GolfCourseProvider, HolcTable,
    MemoryCache, ProviderError,
};
use geo::{polygon, MultiPolygon};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Downtown Atlanta
pub const ATLANTA: Coordinates = Coordinates {
    latitude: 33.749,
    longitude: -84.388,
};

/// Degrees of latitude per mile, close enough for placing fixtures
pub const DEG_PER_MILE: f64 = 1.0 / 69.09;

/// Point `miles` due north of `origin`
pub fn north_of(origin: Coordinates, miles: f64) -> Coordinates {
    Coordinates::new(origin.latitude + miles * DEG_PER_MILE, origin.longitude)
}

/// Point `miles` due south of `origin`
pub fn south_of(origin: Coordinates, miles: f64) -> Coordinates {
    Coordinates::new(origin.latitude - miles * DEG_PER_MILE, origin.longitude)
}

/// Square tract of `size` degrees centred on `center`
pub fn tract_around(id: &str, center: Coordinates, size: f64, population: &[(&str, u64)]) -> CensusTract {
    let half = size / 2.0;
    tract_from_corner(id, center.longitude - half, center.latitude - half, size, population)
}

/// Square tract of `size` degrees with its south-west corner at (lon, lat)
pub fn tract_from_corner(id: &str, lon: f64, lat: f64, size: f64, population: &[(&str, u64)]) -> CensusTract {
    let square = polygon![
        (x: lon, y: lat),
        (x: lon + size, y: lat),
        (x: lon + size, y: lat + size),
        (x: lon, y: lat + size),
        (x: lon, y: lat),
    ];
    let population: BTreeMap<String, u64> = population
        .iter()
        .map(|(category, count)| (category.to_string(), *count))
        .collect();
    let total_population = population.values().sum();

    CensusTract {
        id: id.to_string(),
        geometry: MultiPolygon(vec![square]),
        population,
        total_population,
        holc_grade: None,
    }
}

pub fn course(id: &str, location: Coordinates) -> GolfCourse {
    GolfCourse {
        id: id.to_string(),
        name: format!("{} Golf Club", id),
        location,
        address: None,
        rating: Some(4.0),
        rating_count: Some(100),
        tract_id: None,
        distance_miles: 0.0,
    }
}

/// Geocoder backed by a fixed zipcode table
#[derive(Default)]
pub struct FakeGeocoder {
    pub centroids: HashMap<String, Coordinates>,
    pub calls: AtomicU32,
}

impl FakeGeocoder {
    pub fn with(zipcode: &str, centroid: Coordinates) -> Self {
        let mut centroids = HashMap::new();
        centroids.insert(zipcode.to_string(), centroid);
        Self {
            centroids,
            calls: AtomicU32::new(0),
        }
    }
}

impl GeocodingProvider for FakeGeocoder {
    fn locate<'a>(&'a self, zipcode: &'a Zipcode) -> BoxFuture<'a, Result<Coordinates, ProviderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.centroids
                .get(zipcode.as_str())
                .copied()
                .ok_or_else(|| ProviderError::NotFound(zipcode.to_string()))
        })
    }
}

/// Course provider over a fixed list, optionally slow or failing
#[derive(Default)]
pub struct FakeCourses {
    pub courses: Vec<GolfCourse>,
    pub calls: AtomicU32,
    pub radii: std::sync::Mutex<Vec<f64>>,
    pub delay: Option<Duration>,
    pub fail_status: Option<u16>,
}

impl FakeCourses {
    pub fn new(courses: Vec<GolfCourse>) -> Self {
        Self {
            courses,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GolfCourseProvider for FakeCourses {
    fn find_points<'a>(
        &'a self,
        centroid: Coordinates,
        radius_miles: f64,
    ) -> BoxFuture<'a, Result<Vec<GolfCourse>, ProviderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.radii.lock().unwrap().push(radius_miles);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(status) = self.fail_status {
                return Err(ProviderError::Api {
                    status,
                    message: "course search failed".to_string(),
                });
            }

            Ok(self
                .courses
                .iter()
                .filter(|c| {
                    haversine_miles(centroid.latitude, centroid.longitude, c.location.latitude, c.location.longitude)
                        <= radius_miles
                })
                .cloned()
                .collect())
        })
    }
}

/// Census provider over a fixed set of tracts
#[derive(Default)]
pub struct FakeCensus {
    pub tracts: BTreeMap<String, CensusTract>,
    /// Boundaries reported by the region query but unknown to `get_tract`
    pub phantom: Vec<TractBoundary>,
    pub region_calls: AtomicU32,
    pub tract_calls: AtomicU32,
    pub requested: std::sync::Mutex<Vec<String>>,
}

impl FakeCensus {
    pub fn new(tracts: Vec<CensusTract>) -> Self {
        Self {
            tracts: tracts.into_iter().map(|t| (t.id.clone(), t)).collect(),
            ..Default::default()
        }
    }

    pub fn tract_calls(&self) -> u32 {
        self.tract_calls.load(Ordering::SeqCst)
    }

    /// Tract ids passed to `get_tract`, sorted
    pub fn requested(&self) -> Vec<String> {
        let mut ids = self.requested.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

impl CensusProvider for FakeCensus {
    fn tracts_in_region<'a>(
        &'a self,
        _region: BoundingBox,
    ) -> BoxFuture<'a, Result<Vec<TractBoundary>, ProviderError>> {
        Box::pin(async move {
            self.region_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .tracts
                .values()
                .map(boundary_of)
                .chain(self.phantom.iter().cloned())
                .collect())
        })
    }

    fn get_tract<'a>(&'a self, boundary: &'a TractBoundary) -> BoxFuture<'a, Result<CensusTract, ProviderError>> {
        Box::pin(async move {
            self.tract_calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(boundary.id.clone());
            self.tracts
                .get(&boundary.id)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(boundary.id.clone()))
        })
    }
}

pub fn boundary_of(tract: &CensusTract) -> TractBoundary {
    TractBoundary {
        id: tract.id.clone(),
        geometry: tract.geometry.clone(),
    }
}

/// Cache backend that is always down
pub struct BrokenCache;

impl CacheBackend for BrokenCache {
    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, CacheError>> {
        Box::pin(async { Err(CacheError::Unavailable("connection refused".to_string())) })
    }

    fn put<'a>(&'a self, _key: &'a str, _value: Vec<u8>) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async { Err(CacheError::Unavailable("connection refused".to_string())) })
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Search settings with fast retries for tests
pub fn test_settings() -> SearchSettings {
    SearchSettings {
        retry_count: 2,
        retry_base_delay_ms: 1,
        ..SearchSettings::default()
    }
}

/// Everything a test needs to drive and inspect one orchestrator
pub struct Harness {
    pub geocoder: Arc<FakeGeocoder>,
    pub courses: Arc<FakeCourses>,
    pub census: Arc<FakeCensus>,
    pub backend: Arc<MemoryCache>,
    pub orchestrator: QueryOrchestrator,
}

impl Harness {
    pub fn new(courses: FakeCourses, census: FakeCensus, holc: HolcTable) -> Self {
        Self::with_settings(courses, census, holc, test_settings())
    }

    pub fn with_settings(courses: FakeCourses, census: FakeCensus, holc: HolcTable, settings: SearchSettings) -> Self {
        let geocoder = Arc::new(FakeGeocoder::with("30301", ATLANTA));
        let courses = Arc::new(courses);
        let census = Arc::new(census);
        let backend = Arc::new(MemoryCache::default());

        let providers = Providers {
            geocoding: geocoder.clone(),
            courses: courses.clone(),
            census: census.clone(),
            holc: Arc::new(holc),
        };
        let orchestrator = QueryOrchestrator::new(providers, ResultCache::new(backend.clone()), &settings);

        Self {
            geocoder,
            courses,
            census,
            backend,
            orchestrator,
        }
    }

    pub fn cache(&self) -> ResultCache {
        ResultCache::new(self.backend.clone())
    }
}

pub fn graded(grades: &[(&str, HolcGrade)]) -> HolcTable {
    HolcTable::from_grades(grades.iter().map(|(id, grade)| (id.to_string(), *grade)))
}
