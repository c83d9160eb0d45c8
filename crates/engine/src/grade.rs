use std::collections::BTreeMap;

use gradepoint_core::{
    grade::Percentage,
    ids::{ClassId, RubricId},
    rubric::{Assignment, Rubric},
    scale::GradeScale,
};
use gradepoint_storage::Store;

use crate::error::{EngineError, GradeError};

/// Weighted average over rubrics that have at least one assignment.
///
/// Each such rubric contributes the mean of its scores times its weight.
/// Rubrics without assignments are skipped and their weight does not count
/// toward the denominator.
pub fn compute_score(
    rubrics: &[Rubric],
    by_rubric: &BTreeMap<RubricId, Vec<&Assignment>>,
) -> Result<Percentage, GradeError> {
    let mut weighted_sum = 0.0;
    let mut used_weight = 0.0;

    for rubric in rubrics {
        let Some(assignments) = by_rubric.get(&rubric.id) else {
            continue;
        };
        if assignments.is_empty() {
            continue;
        }
        let mean = assignments.iter().map(|a| a.score).sum::<f64>() / assignments.len() as f64;
        weighted_sum += mean * rubric.weight;
        used_weight += rubric.weight;
    }

    if used_weight == 0.0 {
        return Err(GradeError::DivisionByZero);
    }
    Ok(Percentage::from_raw(weighted_sum / used_weight))
}

/// Outcome of recomputing one class's grade.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeUpdate {
    pub score: Percentage,
    pub letter: String,
    /// Whether the stored grade was rewritten.
    pub written: bool,
}

/// Computes grades against an explicitly held grading scale.
pub struct GradeEngine {
    scale: GradeScale,
}

impl GradeEngine {
    pub fn new(scale: GradeScale) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> &GradeScale {
        &self.scale
    }

    pub fn set_scale(&mut self, scale: GradeScale) {
        self.scale = scale;
    }

    /// Strict letter lookup: the highest range whose lower bound is at most
    /// `score`.
    pub fn try_letter_for(&self, score: f64) -> Result<&str, GradeError> {
        self.scale
            .range_for(score)
            .map(|p| p.letter.as_str())
            .ok_or(GradeError::NoMatchingRange { score })
    }

    /// Letter for `score`, clamping scores below every range to the lowest
    /// letter.
    pub fn letter_for(&self, score: f64) -> String {
        match self.try_letter_for(score) {
            Ok(letter) => letter.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "clamping to lowest letter");
                self.scale
                    .lowest()
                    .map(|p| p.letter.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Recompute a class's grade and write it back only when the score
    /// changed. Previous classes report their stored grade untouched.
    pub fn compute_and_persist<S: Store>(
        &self,
        store: &mut S,
        class_id: ClassId,
    ) -> Result<GradeUpdate, EngineError> {
        let class = store
            .get_class(class_id)?
            .ok_or_else(|| EngineError::ClassNotFound(class_id.to_string()))?;

        if !class.is_in_progress() {
            return Ok(GradeUpdate {
                score: Percentage::from_raw(class.grade.score),
                letter: class.grade.letter,
                written: false,
            });
        }

        let score = compute_score(&class.rubrics, &class.assignments_by_rubric())?;
        let letter = self.letter_for(score.value());

        if score.value() == class.grade.score && letter == class.grade.letter {
            tracing::trace!(class = %class_id, score = %score, "grade unchanged, skipping write");
            return Ok(GradeUpdate {
                score,
                letter,
                written: false,
            });
        }

        store.write(|tx| tx.update_grade(class_id, score.value(), &letter))?;
        tracing::debug!(class = %class_id, score = %score, letter = %letter, "grade written");
        Ok(GradeUpdate {
            score,
            letter,
            written: true,
        })
    }
}
