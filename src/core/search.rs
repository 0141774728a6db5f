use crate::core::classifier::Classifier;
use crate::core::distance::{calculate_bounding_box, distance_between, is_within_bounding_box};
use crate::core::retry::RetryPolicy;
use crate::core::tracts::TractIndex;
use crate::error::SearchError;
use crate::models::{CensusTract, Coordinates, CourseMatch, DemographicPolicy, GolfCourse, MatchVerdict, TractBoundary};
use crate::services::{CensusProvider, GolfCourseProvider, HolcProvider, ProviderError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Radii to try, in order: `start`, then `start + step`, ... capped at `ceiling`
///
/// Strictly increasing and finite for any step; a zero step is treated as 1.
pub fn radius_schedule(start: u32, step: u32, ceiling: u32) -> Vec<u32> {
    let step = step.max(1);
    let mut radii = vec![start];
    let mut radius = start;
    while radius < ceiling {
        radius = radius.saturating_add(step).min(ceiling);
        radii.push(radius);
    }
    radii
}

/// Per-search parameters for the engine
#[derive(Debug, Clone, Copy)]
pub struct SearchParams<'a> {
    pub policy: DemographicPolicy,
    pub category: Option<&'a str>,
    pub radius_miles: u32,
    pub radius_step_miles: u32,
    pub max_radius_miles: u32,
}

/// Outcome of a spatial search
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Matches ordered nearest-first, ties by course id
    pub matches: Vec<CourseMatch>,
    pub effective_radius: u32,
    pub radii_tried: Vec<u32>,
    /// Verdict of every tract classified along the way
    pub tract_verdicts: BTreeMap<String, MatchVerdict>,
}

/// Tracts fetched so far in one search; `None` marks a tract skipped as unusable
type LoadedTracts = BTreeMap<String, Option<CensusTract>>;

/// Expanding-radius search for courses in matching tracts
///
/// # Pipeline Stages
/// 1. Course points within the current radius
/// 2. Point-in-polygon against the candidate boundaries
/// 3. Population and HOLC data for the tracts holding a course
/// 4. Tract classification, keeping matches only
/// 5. On an empty result, the next radius of the schedule
///
/// Tract data is fetched only for tracts that contain a course (plus their
/// neighbours for `HistoricalSignificance`), at most once per search.
pub struct SpatialSearchEngine {
    courses: Arc<dyn GolfCourseProvider>,
    census: Arc<dyn CensusProvider>,
    holc: Arc<dyn HolcProvider>,
    classifier: Classifier,
    retry: RetryPolicy,
    worker_limit: usize,
}

impl SpatialSearchEngine {
    pub fn new(
        courses: Arc<dyn GolfCourseProvider>,
        census: Arc<dyn CensusProvider>,
        holc: Arc<dyn HolcProvider>,
        classifier: Classifier,
        retry: RetryPolicy,
        worker_limit: usize,
    ) -> Self {
        Self {
            courses,
            census,
            holc,
            classifier,
            retry,
            worker_limit: worker_limit.max(1),
        }
    }

    /// Run the expanding-radius search around `centroid`
    ///
    /// Expansion only happens when a radius yields no match; an empty
    /// result at the ceiling is a successful outcome.
    pub async fn search(
        &self,
        centroid: Coordinates,
        index: &TractIndex,
        params: SearchParams<'_>,
    ) -> Result<SearchOutcome, SearchError> {
        let radii = radius_schedule(params.radius_miles, params.radius_step_miles, params.max_radius_miles);
        if index.is_empty() {
            tracing::warn!("No census tracts around ({:.4}, {:.4})", centroid.latitude, centroid.longitude);
        }

        // Courses already evaluated, by id: Some when matched
        let mut evaluated: BTreeMap<String, Option<CourseMatch>> = BTreeMap::new();
        let mut loaded = LoadedTracts::new();
        let mut outcome = SearchOutcome::default();

        for radius in radii {
            outcome.radii_tried.push(radius);
            outcome.effective_radius = radius;

            let points = self
                .retry
                .run("golf course search", || self.courses.find_points(centroid, radius as f64))
                .await
                .map_err(|e| SearchError::UpstreamUnavailable(format!("golf courses: {}", e)))?;

            let bbox = calculate_bounding_box(centroid.latitude, centroid.longitude, radius as f64);
            let mut fresh: Vec<(GolfCourse, f64)> = Vec::new();
            for course in points {
                if evaluated.contains_key(&course.id)
                    || fresh.iter().any(|(seen, _)| seen.id == course.id)
                    || !is_within_bounding_box(course.location.latitude, course.location.longitude, &bbox)
                {
                    continue;
                }
                let distance = distance_between(centroid, course.location);
                if distance <= radius as f64 {
                    fresh.push((course, distance));
                }
            }

            let holding: Vec<&TractBoundary> = fresh
                .iter()
                .filter_map(|(course, _)| index.containing(course.location))
                .collect();
            self.load_tracts(&holding, &mut loaded).await?;

            if params.policy == DemographicPolicy::HistoricalSignificance {
                // Buffer detection needs the neighbours of graded tracts
                let around: Vec<&TractBoundary> = holding
                    .iter()
                    .filter(|b| is_graded(&loaded, &b.id))
                    .flat_map(|b| index.neighbors(&b.id))
                    .collect();
                self.load_tracts(&around, &mut loaded).await?;
            }

            let new_courses = fresh.len();
            for (course, distance) in fresh {
                let id = course.id.clone();
                let evaluation =
                    self.evaluate(course, distance, index, &loaded, params, &mut outcome.tract_verdicts);
                evaluated.insert(id, evaluation);
            }

            let mut matches: Vec<CourseMatch> = evaluated.values().flatten().cloned().collect();
            tracing::debug!(
                "Radius {}mi: {} new courses, {} tracts loaded, {} matches so far",
                radius,
                new_courses,
                loaded.len(),
                matches.len()
            );

            if !matches.is_empty() {
                sort_matches(&mut matches);
                outcome.matches = matches;
                return Ok(outcome);
            }
        }

        tracing::info!(
            "No {} matches within the {}mi ceiling",
            params.policy,
            params.max_radius_miles
        );
        Ok(outcome)
    }

    /// Fetch the tracts not loaded yet, with their HOLC grades
    ///
    /// Fetches run on a pool bounded by the worker limit and the number of
    /// tracts needed. Tracts the census does not know are recorded as
    /// skipped; any other upstream failure aborts the search.
    async fn load_tracts(&self, boundaries: &[&TractBoundary], loaded: &mut LoadedTracts) -> Result<(), SearchError> {
        let needed: BTreeMap<&str, &TractBoundary> = boundaries
            .iter()
            .copied()
            .filter(|b| !loaded.contains_key(&b.id))
            .map(|b| (b.id.as_str(), b))
            .collect();
        if needed.is_empty() {
            return Ok(());
        }

        let limit = self.worker_limit.min(needed.len());
        let mut pending = needed.into_values().cloned();
        let mut workers: JoinSet<Result<(String, Option<CensusTract>), SearchError>> = JoinSet::new();

        loop {
            while workers.len() < limit {
                let Some(boundary) = pending.next() else { break };
                let census = Arc::clone(&self.census);
                let holc = Arc::clone(&self.holc);
                let retry = self.retry;
                workers.spawn(async move {
                    let tract = fetch_tract(census, holc, retry, &boundary).await?;
                    Ok((boundary.id, tract))
                });
            }

            let Some(joined) = workers.join_next().await else { break };
            let (tract_id, tract) =
                joined.map_err(|e| SearchError::UpstreamUnavailable(format!("tract worker: {}", e)))??;
            loaded.insert(tract_id, tract);
        }

        tracing::debug!("{} tracts loaded for this search", loaded.len());
        Ok(())
    }

    /// Resolve and classify one course; `None` when it is dropped or does not match
    fn evaluate(
        &self,
        mut course: GolfCourse,
        distance_miles: f64,
        index: &TractIndex,
        loaded: &LoadedTracts,
        params: SearchParams<'_>,
        verdicts: &mut BTreeMap<String, MatchVerdict>,
    ) -> Option<CourseMatch> {
        course.distance_miles = distance_miles;

        let Some(boundary) = index.containing(course.location) else {
            let err = SearchError::UnresolvedTract(course.id.clone());
            tracing::warn!("Dropping course {:?}: {}", course.name, err);
            return None;
        };
        course.tract_id = Some(boundary.id.clone());

        let Some(tract) = loaded.get(&boundary.id).and_then(Option::as_ref) else {
            tracing::warn!("Dropping course {:?}: no census data for tract {}", course.name, boundary.id);
            return None;
        };

        let verdict = match verdicts.get(&tract.id) {
            Some(verdict) => verdict.clone(),
            None => {
                let neighbors: Vec<&CensusTract> = if params.policy == DemographicPolicy::HistoricalSignificance {
                    index
                        .neighbors(&tract.id)
                        .into_iter()
                        .filter_map(|b| loaded.get(&b.id).and_then(Option::as_ref))
                        .collect()
                } else {
                    Vec::new()
                };

                match self.classifier.classify(tract, params.policy, params.category, &neighbors) {
                    Ok(verdict) => {
                        verdicts.insert(tract.id.clone(), verdict.clone());
                        verdict
                    }
                    Err(e) => {
                        tracing::warn!("Dropping course {:?}: {}", course.name, e);
                        return None;
                    }
                }
            }
        };

        verdict.matched.then_some(CourseMatch { course, verdict })
    }
}

fn is_graded(loaded: &LoadedTracts, tract_id: &str) -> bool {
    loaded
        .get(tract_id)
        .and_then(Option::as_ref)
        .and_then(|t| t.holc_grade)
        .is_some_and(|grade| grade.is_graded())
}

async fn fetch_tract(
    census: Arc<dyn CensusProvider>,
    holc: Arc<dyn HolcProvider>,
    retry: RetryPolicy,
    boundary: &TractBoundary,
) -> Result<Option<CensusTract>, SearchError> {
    let tract_id = boundary.id.as_str();
    let mut tract = match retry.run("census tract", || census.get_tract(boundary)).await {
        Ok(tract) => tract,
        Err(ProviderError::NotFound(_)) => {
            tracing::warn!("Census has no data for tract {}, skipping", tract_id);
            return Ok(None);
        }
        Err(e) => return Err(SearchError::UpstreamUnavailable(format!("census tract {}: {}", tract_id, e))),
    };

    if !tract.is_consistent() {
        tracing::warn!("Tract {} reports more residents by race than in total, skipping", tract_id);
        return Ok(None);
    }

    tract.holc_grade = retry
        .run("HOLC grade", || holc.get_grade(tract_id))
        .await
        .map_err(|e| SearchError::UpstreamUnavailable(format!("HOLC grade {}: {}", tract_id, e)))?;

    Ok(Some(tract))
}

/// Nearest first; equal distances ordered by course id
fn sort_matches(matches: &mut [CourseMatch]) {
    matches.sort_by(|a, b| {
        a.course
            .distance_miles
            .total_cmp(&b.course.distance_miles)
            .then_with(|| a.course.id.cmp(&b.course.id))
    });
}
