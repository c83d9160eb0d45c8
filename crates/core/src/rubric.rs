use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{AssignmentId, ClassId, RubricId};

/// A named, weighted grading category of a class. Weights are relative to
/// each other and need not sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: RubricId,
    pub name: String,
    pub weight: f64,
}

impl Rubric {
    pub fn new(name: impl Into<String>, weight: f64) -> Result<Self, CoreError> {
        let name = name.into();
        validate_rubric(&name, weight)?;
        Ok(Self {
            id: RubricId::new(),
            name,
            weight,
        })
    }

    /// The same rubric under a new weight.
    pub fn with_weight(&self, weight: f64) -> Result<Self, CoreError> {
        validate_rubric(&self.name, weight)?;
        Ok(Self {
            weight,
            ..self.clone()
        })
    }
}

pub(crate) fn validate_rubric(name: &str, weight: f64) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::InvalidData("rubric name is empty".into()));
    }
    if !weight.is_finite() || weight < 0.0 {
        return Err(CoreError::InvalidData(format!(
            "rubric weight must be a finite non-negative number, got {weight}"
        )));
    }
    Ok(())
}

/// A scored piece of work. `rubric_id` and `class_id` are lookups into the
/// owning class, never ownership edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub class_id: ClassId,
    pub rubric_id: Option<RubricId>,
    pub name: String,
    pub date: DateTime<Utc>,
    pub score: f64,
}

impl Assignment {
    pub fn new(
        class_id: ClassId,
        rubric_id: RubricId,
        name: impl Into<String>,
        date: DateTime<Utc>,
        score: f64,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::InvalidData("assignment name is empty".into()));
        }
        if !score.is_finite() {
            return Err(CoreError::InvalidData(format!("assignment score is not finite: {score}")));
        }
        Ok(Self {
            id: AssignmentId::new(),
            class_id,
            rubric_id: Some(rubric_id),
            name,
            date,
            score,
        })
    }
}
