use crate::models::{Coordinates, TractBoundary};
use geo::{BoundingRect, Intersects, LineString, MultiPolygon, Rect};
use std::collections::BTreeMap;

/// Candidate tract boundaries for one search, keyed by tract id
///
/// Holds geometry only; population data is fetched per tract once a course
/// lands in it. Lookups iterate in id order, so a point on a shared
/// boundary always resolves to the lowest tract id.
#[derive(Debug, Default)]
pub struct TractIndex {
    tracts: BTreeMap<String, IndexedTract>,
}

#[derive(Debug)]
struct IndexedTract {
    tract: TractBoundary,
    bounds: Option<Rect<f64>>,
}

impl TractIndex {
    pub fn new(tracts: impl IntoIterator<Item = TractBoundary>) -> Self {
        let tracts = tracts
            .into_iter()
            .map(|tract| {
                let bounds = tract.geometry.bounding_rect();
                (tract.id.clone(), IndexedTract { tract, bounds })
            })
            .collect();
        Self { tracts }
    }

    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    pub fn get(&self, tract_id: &str) -> Option<&TractBoundary> {
        self.tracts.get(tract_id).map(|t| &t.tract)
    }

    /// Tract whose polygon contains (or touches) the point
    pub fn containing(&self, location: Coordinates) -> Option<&TractBoundary> {
        let point = location.to_point();
        self.tracts
            .values()
            .find(|t| t.tract.geometry.intersects(&point))
            .map(|t| &t.tract)
    }

    /// Tracts sharing at least one boundary point with `tract_id`
    pub fn neighbors(&self, tract_id: &str) -> Vec<&TractBoundary> {
        let Some(subject) = self.tracts.get(tract_id) else {
            return Vec::new();
        };

        self.tracts
            .values()
            .filter(|other| other.tract.id != tract_id)
            .filter(|other| match (subject.bounds, other.bounds) {
                (Some(a), Some(b)) => a.intersects(&b),
                _ => false,
            })
            .filter(|other| boundaries_touch(&subject.tract.geometry, &other.tract.geometry))
            .map(|other| &other.tract)
            .collect()
    }
}

fn rings(geometry: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    geometry
        .0
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
}

fn boundaries_touch(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    rings(a).any(|ring_a| rings(b).any(|ring_b| ring_a.intersects(ring_b)))
}
