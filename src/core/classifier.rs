use crate::error::SearchError;
use crate::models::{CensusTract, DemographicPolicy, HolcGrade, MatchVerdict};
use std::cmp::Ordering;

/// Evaluates tracts against a demographic policy
///
/// Classification is a pure function of (tract, neighbors, policy,
/// category): the same inputs always produce the same verdict.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    /// Plurality tie-break order; unlisted categories follow alphabetically
    priority: Vec<String>,
}

impl Classifier {
    pub fn new(priority: Vec<String>) -> Self {
        Self {
            priority: priority.into_iter().map(|c| c.to_ascii_lowercase()).collect(),
        }
    }

    /// Classify `tract` under `policy`.
    ///
    /// `neighbors` are the loaded tracts adjacent to `tract`, needed by
    /// `HistoricalSignificance` only; `category`, when given, is the
    /// demographic criterion the dominant category must equal.
    pub fn classify(
        &self,
        tract: &CensusTract,
        policy: DemographicPolicy,
        category: Option<&str>,
        neighbors: &[&CensusTract],
    ) -> Result<MatchVerdict, SearchError> {
        if policy.requires_population() && tract.total_population == 0 {
            return Err(SearchError::MissingPopulationData(tract.id.clone()));
        }

        let dominant = self.plurality(tract);
        let (dominant_category, dominant_share_pct) = match &dominant {
            Some(name) => (Some(name.clone()), tract.share_pct(name)),
            None => (None, 0.0),
        };
        let is_criterion = |name: &str| category.map_or(true, |wanted| name.eq_ignore_ascii_case(wanted));

        let verdict = match policy {
            DemographicPolicy::StrictMajority => MatchVerdict {
                matched: dominant_share_pct > 50.0
                    && dominant_category.as_deref().is_some_and(is_criterion),
                dominant_category,
                dominant_share_pct,
                holc_grade: tract.holc_grade,
                buffer_zone: false,
            },
            DemographicPolicy::Plurality => MatchVerdict {
                matched: dominant_category.as_deref().is_some_and(is_criterion),
                dominant_category,
                dominant_share_pct,
                holc_grade: tract.holc_grade,
                buffer_zone: false,
            },
            DemographicPolicy::HistoricalSignificance => {
                // Coverage of the 1930s maps is partial: no grade means no match
                let graded = tract.holc_grade.is_some_and(HolcGrade::is_graded);
                let buffer_zone = graded && self.is_buffer(dominant.as_deref(), neighbors);
                MatchVerdict {
                    matched: tract.holc_grade == Some(HolcGrade::D) && buffer_zone,
                    dominant_category,
                    dominant_share_pct,
                    holc_grade: tract.holc_grade,
                    buffer_zone,
                }
            }
        };

        Ok(verdict)
    }

    /// Category with the highest count, `None` for an empty tract
    ///
    /// A populated tract always has one: when every category reports zero
    /// (suppressed estimates) the tie-break order decides.
    pub fn plurality(&self, tract: &CensusTract) -> Option<String> {
        if tract.total_population == 0 {
            return None;
        }

        tract
            .population
            .iter()
            .max_by(|(a_name, a_count), (b_name, b_count)| {
                // Higher count wins; on ties the higher-priority name wins
                a_count
                    .cmp(b_count)
                    .then_with(|| self.priority_cmp(b_name, a_name))
            })
            .map(|(name, _)| name.clone())
    }

    /// Ordering where `Less` means `a` takes precedence over `b`
    fn priority_cmp(&self, a: &str, b: &str) -> Ordering {
        let rank = |name: &str| {
            self.priority
                .iter()
                .position(|p| p.eq_ignore_ascii_case(name))
                .unwrap_or(usize::MAX)
        };
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    }

    /// Adjacent to a tract whose plurality category differs from this one's
    fn is_buffer(&self, dominant: Option<&str>, neighbors: &[&CensusTract]) -> bool {
        neighbors.iter().any(|neighbor| match self.plurality(neighbor) {
            Some(other) => dominant != Some(other.as_str()),
            None => false,
        })
    }
}
