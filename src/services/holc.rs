use crate::models::HolcGrade;
use crate::services::{BoxFuture, HolcProvider, ProviderError};
use std::collections::HashMap;
use std::path::Path;

/// HOLC grades per census tract, loaded from a tract crosswalk
///
/// The file is a JSON object mapping 11-digit tract GEOIDs to a grade
/// letter, e.g. `{"13121001100": "D"}`. Tracts outside the 1930s map
/// coverage are simply absent.
#[derive(Debug, Clone, Default)]
pub struct HolcTable {
    grades: HashMap<String, HolcGrade>,
}

impl HolcTable {
    /// Table with no graded tracts
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_grades(grades: impl IntoIterator<Item = (String, HolcGrade)>) -> Self {
        Self {
            grades: grades.into_iter().collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        let parsed: HashMap<String, String> = serde_json::from_str(raw)
            .map_err(|e| ProviderError::InvalidResponse(format!("Invalid HOLC table: {}", e)))?;

        let grades = parsed
            .into_iter()
            .map(|(geoid, grade)| {
                grade
                    .parse::<HolcGrade>()
                    .map(|g| (geoid, g))
                    .map_err(ProviderError::InvalidResponse)
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self { grades })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ProviderError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ProviderError::NotFound(format!("HOLC table {}: {}", path.as_ref().display(), e))
        })?;
        let table = Self::from_json(&raw)?;
        tracing::info!("Loaded HOLC grades for {} tracts", table.len());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.grades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grades.is_empty()
    }

    pub fn grade(&self, tract_id: &str) -> Option<HolcGrade> {
        self.grades.get(tract_id).copied()
    }
}

impl HolcProvider for HolcTable {
    fn get_grade<'a>(&'a self, tract_id: &'a str) -> BoxFuture<'a, Result<Option<HolcGrade>, ProviderError>> {
        let grade = self.grade(tract_id);
        Box::pin(async move { Ok(grade) })
    }
}
