// End-to-end search tests against in-memory providers

mod common;

use common::*;
use fairway_census::core::{CacheKey, Providers, QueryOrchestrator, ResultCache};
use fairway_census::models::{Coordinates, DemographicPolicy, HolcGrade, SearchRequest, Zipcode};
use fairway_census::services::HolcTable;
use fairway_census::SearchError;
use std::sync::Arc;
use std::time::Duration;

const TRACT_SIZE: f64 = 0.02;

fn request(policy: DemographicPolicy, radius_miles: u32, category: Option<&str>) -> SearchRequest {
    SearchRequest {
        zipcode: Zipcode::parse("30301").unwrap(),
        radius_miles,
        policy,
        category: category.map(str::to_string),
        radius_step_miles: 5,
        max_radius_miles: 25,
    }
}

fn ids(result: &fairway_census::SearchResult) -> Vec<&str> {
    result.matches.iter().map(|m| m.course.id.as_str()).collect()
}

/// Three courses in tracts that are 70%, 40% and 55% Black
fn atlanta_fixture() -> (FakeCourses, FakeCensus) {
    let near = north_of(ATLANTA, 2.0);
    let middle = south_of(ATLANTA, 4.0);
    let far = north_of(ATLANTA, 6.0);

    let courses = FakeCourses::new(vec![
        course("far", far),
        course("near", near),
        course("middle", middle),
    ]);
    let census = FakeCensus::new(vec![
        tract_around("13121000100", near, TRACT_SIZE, &[("black", 700), ("white", 300)]),
        tract_around("13121000200", middle, TRACT_SIZE, &[("black", 400), ("white", 350), ("asian", 250)]),
        tract_around("13121000300", far, TRACT_SIZE, &[("black", 550), ("white", 450)]),
    ]);
    (courses, census)
}

#[tokio::test]
async fn test_strict_majority_keeps_majority_tracts_nearest_first() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::StrictMajority, 10, Some("black")))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["near", "far"]);
    assert_eq!(result.effective_radius, 10);
    assert_eq!(result.radii_tried, vec![10]);
    assert!(!result.cache_hit);

    let near = &result.matches[0];
    assert_eq!(near.course.tract_id.as_deref(), Some("13121000100"));
    assert_eq!(near.verdict.dominant_category.as_deref(), Some("black"));
    assert!((near.verdict.dominant_share_pct - 70.0).abs() < 1e-9);
    assert!((near.course.distance_miles - 2.0).abs() < 0.05);
    assert!(result.matches.iter().all(|m| m.verdict.dominant_share_pct > 50.0));
}

#[tokio::test]
async fn test_plurality_matches_every_populated_tract() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 10, None))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["near", "middle", "far"]);
    let middle = &result.matches[1];
    assert_eq!(middle.verdict.dominant_category.as_deref(), Some("black"));
    assert!((middle.verdict.dominant_share_pct - 40.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_category_criterion_filters_dominant_group() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::StrictMajority, 10, Some("white")))
        .await
        .unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(result.effective_radius, 25);
}

#[tokio::test]
async fn test_radius_expands_until_first_match() {
    let twelve = north_of(ATLANTA, 12.0);
    let eighteen = north_of(ATLANTA, 18.0);

    let courses = FakeCourses::new(vec![course("twelve", twelve), course("eighteen", eighteen)]);
    let census = FakeCensus::new(vec![
        tract_around("13121001200", twelve, TRACT_SIZE, &[("black", 300), ("white", 700)]),
        tract_around("13121001800", eighteen, TRACT_SIZE, &[("black", 800), ("white", 200)]),
    ]);
    let harness = Harness::new(courses, census, HolcTable::empty());

    let req = request(DemographicPolicy::StrictMajority, 10, Some("black"));
    let result = harness.orchestrator.run(req.clone()).await.unwrap();

    assert_eq!(result.effective_radius, 20);
    assert_eq!(result.radii_tried, vec![10, 15, 20]);
    assert_eq!(ids(&result), vec!["eighteen"]);
    assert_eq!(harness.courses.calls(), 3);
    assert_eq!(*harness.courses.radii.lock().unwrap(), vec![10.0, 15.0, 20.0]);
    // Each tract is fetched once, when its course first comes into range
    assert_eq!(harness.census.requested(), vec!["13121001200", "13121001800"]);

    // Tracts evaluated on the way out are kept with the entry
    let entry = harness
        .cache()
        .get_entry(&CacheKey::search(&req))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.tract_verdicts.len(), 2);
    assert!(!entry.tract_verdicts["13121001200"].matched);
    assert!(entry.tract_verdicts["13121001800"].matched);
}

#[tokio::test]
async fn test_empty_result_at_ceiling_is_success() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::HistoricalSignificance, 10, None))
        .await
        .unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(result.radii_tried, vec![10, 15, 20, 25]);
    assert_eq!(result.effective_radius, 25);
}

#[tokio::test]
async fn test_radii_tried_are_strictly_increasing_and_bounded() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let mut req = request(DemographicPolicy::StrictMajority, 3, Some("asian"));
    req.radius_step_miles = 4;
    req.max_radius_miles = 17;
    let result = harness.orchestrator.run(req).await.unwrap();

    assert_eq!(result.radii_tried, vec![3, 7, 11, 15, 17]);
    assert!(result.radii_tried.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_larger_radius_never_loses_matches() {
    let mut previous: Vec<String> = Vec::new();

    for radius in [3, 5, 10] {
        let (courses, census) = atlanta_fixture();
        let harness = Harness::new(courses, census, HolcTable::empty());

        let mut req = request(DemographicPolicy::Plurality, radius, None);
        req.max_radius_miles = radius;
        let result = harness.orchestrator.run(req).await.unwrap();

        let current: Vec<String> = result.matches.iter().map(|m| m.course.id.clone()).collect();
        assert!(previous.iter().all(|id| current.contains(id)));
        assert!(result
            .matches
            .iter()
            .all(|m| m.course.distance_miles <= result.effective_radius as f64));
        previous = current;
    }

    assert_eq!(previous.len(), 3);
}

#[tokio::test]
async fn test_redlined_empty_tract_next_to_other_majority_is_buffer() {
    let site = north_of(ATLANTA, 2.0);
    let (lon, lat) = (site.longitude - TRACT_SIZE / 2.0, site.latitude - TRACT_SIZE / 2.0);

    // Two squares sharing their north-south edge, a third far off
    let courses = FakeCourses::new(vec![course("rail-yard", site)]);
    let census = FakeCensus::new(vec![
        tract_from_corner("13121002100", lon, lat, TRACT_SIZE, &[]),
        tract_from_corner("13121002200", lon + TRACT_SIZE, lat, TRACT_SIZE, &[("white", 900), ("black", 100)]),
        tract_around("13121002300", south_of(ATLANTA, 5.0), TRACT_SIZE, &[("black", 900)]),
    ]);
    let holc = graded(&[("13121002100", HolcGrade::D), ("13121002200", HolcGrade::B)]);
    let harness = Harness::new(courses, census, holc);

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::HistoricalSignificance, 10, None))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["rail-yard"]);
    let verdict = &result.matches[0].verdict;
    assert!(verdict.matched);
    assert!(verdict.buffer_zone);
    assert_eq!(verdict.holc_grade, Some(HolcGrade::D));
    // The neighbour is fetched for the buffer check, the distant tract is not
    assert_eq!(harness.census.requested(), vec!["13121002100", "13121002200"]);
}

#[tokio::test]
async fn test_suppressed_race_counts_still_match_plurality() {
    let site = north_of(ATLANTA, 2.0);
    let mut suppressed = tract_around("13121000100", site, TRACT_SIZE, &[("black", 0), ("white", 0)]);
    suppressed.total_population = 1200;

    let courses = FakeCourses::new(vec![course("near", site)]);
    let harness = Harness::new(courses, FakeCensus::new(vec![suppressed]), HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 10, None))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["near"]);
    assert_eq!(result.effective_radius, 10);
    assert_eq!(result.matches[0].verdict.dominant_category.as_deref(), Some("black"));
}

#[tokio::test]
async fn test_tract_data_fetched_only_where_courses_are() {
    let site = north_of(ATLANTA, 2.0);
    let mut tracts = vec![tract_around(
        "13121000100",
        site,
        TRACT_SIZE,
        &[("black", 700), ("white", 300)],
    )];
    // 200 more candidate tracts south of downtown with no course in them
    for i in 0..200 {
        let center = Coordinates::new(
            ATLANTA.latitude - 0.1 - (i / 20) as f64 * 0.03,
            ATLANTA.longitude - 0.3 + (i % 20) as f64 * 0.03,
        );
        tracts.push(tract_around(&format!("13121{:06}", 200_000 + i), center, TRACT_SIZE, &[("white", 500)]));
    }

    let courses = FakeCourses::new(vec![course("clubhouse", site), course("range", north_of(site, 0.1))]);
    let harness = Harness::new(courses, FakeCensus::new(tracts), HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 10, None))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["clubhouse", "range"]);
    assert_eq!(harness.census.region_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(harness.census.tract_calls(), 1);
    assert_eq!(harness.census.requested(), vec!["13121000100"]);
}

#[tokio::test]
async fn test_empty_tract_is_dropped_under_population_policies() {
    let site = north_of(ATLANTA, 2.0);
    let courses = FakeCourses::new(vec![course("vacant", site)]);
    let census = FakeCensus::new(vec![tract_around("13121002100", site, TRACT_SIZE, &[])]);
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::StrictMajority, 10, None))
        .await
        .unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(result.effective_radius, 25);
}

#[tokio::test]
async fn test_course_outside_every_tract_is_dropped() {
    let (mut courses, census) = atlanta_fixture();
    courses.courses.push(course("nowhere", south_of(ATLANTA, 1.0)));
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 10, None))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["near", "middle", "far"]);
}

#[tokio::test]
async fn test_tract_without_census_data_is_skipped() {
    let (mut courses, mut census) = atlanta_fixture();
    let ghost = south_of(ATLANTA, 8.0);
    courses.courses.push(course("ghost", ghost));
    census
        .phantom
        .push(boundary_of(&tract_around("13121999999", ghost, TRACT_SIZE, &[])));
    let harness = Harness::new(courses, census, HolcTable::empty());

    let result = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 10, None))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec!["near", "middle", "far"]);
    assert!(harness.census.requested().contains(&"13121999999".to_string()));
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());
    let req = request(DemographicPolicy::StrictMajority, 10, Some("black"));

    let first = harness.orchestrator.run(req.clone()).await.unwrap();
    let course_calls = harness.courses.calls();
    let second = harness.orchestrator.run(req).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.matches, second.matches);
    assert_eq!(first.effective_radius, second.effective_radius);
    assert_eq!(first.radii_tried, second.radii_tried);
    assert_eq!(first.centroid, second.centroid);
    assert_eq!(harness.courses.calls(), course_calls);
}

#[tokio::test]
async fn test_different_radius_path_is_a_separate_entry() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let first = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 10, None))
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .run(request(DemographicPolicy::Plurality, 3, None))
        .await
        .unwrap();

    assert!(!second.cache_hit);
    assert_eq!(ids(&first), vec!["near", "middle", "far"]);
    assert_eq!(ids(&second), vec!["near"]);
    // The zipcode resolution itself is reused
    assert_eq!(harness.geocoder.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    let centroid = harness
        .cache()
        .get_json::<Coordinates>(&CacheKey::geocode(&Zipcode::parse("30301").unwrap()))
        .await
        .unwrap();
    assert_eq!(centroid, Some(ATLANTA));
}

#[tokio::test]
async fn test_unavailable_cache_does_not_fail_search() {
    let (courses, census) = atlanta_fixture();
    let courses = Arc::new(courses);
    let providers = Providers {
        geocoding: Arc::new(FakeGeocoder::with("30301", ATLANTA)),
        courses: courses.clone(),
        census: Arc::new(census),
        holc: Arc::new(HolcTable::empty()),
    };
    let orchestrator = QueryOrchestrator::new(providers, ResultCache::new(Arc::new(BrokenCache)), &test_settings());
    let req = request(DemographicPolicy::StrictMajority, 10, Some("black"));

    let first = orchestrator.run(req.clone()).await.unwrap();
    let second = orchestrator.run(req).await.unwrap();

    assert_eq!(ids(&first), vec!["near", "far"]);
    assert!(!second.cache_hit);
    assert_eq!(first.matches, second.matches);
    assert_eq!(courses.calls(), 2);
}

#[tokio::test]
async fn test_timeout_returns_error_and_caches_nothing() {
    let (mut courses, census) = atlanta_fixture();
    courses.delay = Some(Duration::from_secs(5));
    let harness = Harness::new(courses, census, HolcTable::empty());
    let cache = harness.cache();
    let orchestrator = harness.orchestrator.with_timeout(Duration::from_millis(50));
    let req = request(DemographicPolicy::StrictMajority, 10, Some("black"));

    let err = orchestrator.run(req.clone()).await.unwrap_err();

    assert!(matches!(err, SearchError::UpstreamTimeout(d) if d == Duration::from_millis(50)));
    assert!(cache.get(&CacheKey::search(&req)).await.unwrap().is_none());
    // The zipcode was geocoded before the deadline but is not kept either
    assert!(cache
        .get_json::<Coordinates>(&CacheKey::geocode(&req.zipcode))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_retryable_upstream_failure_is_retried_then_surfaced() {
    let (mut courses, census) = atlanta_fixture();
    courses.fail_status = Some(503);
    let harness = Harness::new(courses, census, HolcTable::empty());
    let req = request(DemographicPolicy::StrictMajority, 10, None);

    let err = harness.orchestrator.run(req.clone()).await.unwrap_err();

    assert!(matches!(err, SearchError::UpstreamUnavailable(_)));
    // First attempt plus two retries
    assert_eq!(harness.courses.calls(), 3);
    assert!(harness.cache().get(&CacheKey::search(&req)).await.unwrap().is_none());
    assert!(harness
        .cache()
        .get_json::<Coordinates>(&CacheKey::geocode(&req.zipcode))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (mut courses, census) = atlanta_fixture();
    courses.fail_status = Some(400);
    let harness = Harness::new(courses, census, HolcTable::empty());

    let err = harness
        .orchestrator
        .run(request(DemographicPolicy::StrictMajority, 10, None))
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::UpstreamUnavailable(_)));
    assert_eq!(harness.courses.calls(), 1);
}

#[tokio::test]
async fn test_unknown_zipcode_is_invalid() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());
    let mut req = request(DemographicPolicy::StrictMajority, 10, None);
    req.zipcode = Zipcode::parse("99999").unwrap();

    let err = harness.orchestrator.run(req).await.unwrap_err();

    assert!(matches!(err, SearchError::InvalidZipcode(ref zip) if zip == "99999"));
    assert_eq!(harness.courses.calls(), 0);
}

#[tokio::test]
async fn test_invalid_requests_fail_before_any_upstream_call() {
    let (courses, census) = atlanta_fixture();
    let harness = Harness::new(courses, census, HolcTable::empty());

    let zero_radius = request(DemographicPolicy::StrictMajority, 0, None);
    let mut low_ceiling = request(DemographicPolicy::StrictMajority, 10, None);
    low_ceiling.max_radius_miles = 5;
    let mut high_ceiling = request(DemographicPolicy::StrictMajority, 10, None);
    high_ceiling.max_radius_miles = 30;

    for req in [zero_radius, low_ceiling, high_ceiling] {
        let err = harness.orchestrator.run(req).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    assert_eq!(harness.geocoder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(harness.courses.calls(), 0);
}
