use serde::{Deserialize, Serialize};

use crate::workout::{ExerciseCatalog, ExerciseDefinition};

/// Catalog plus the duration shown on the workout card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogOverview {
    pub exercises: Vec<ExerciseDefinition>,
    pub estimated_minutes: u32,
}

impl CatalogOverview {
    pub fn new(catalog: &ExerciseCatalog, rest_seconds: u32) -> Self {
        Self {
            exercises: catalog.exercises().to_vec(),
            estimated_minutes: catalog.estimated_duration_minutes(rest_seconds),
        }
    }
}
