use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    PlusScale,
    NonPlusScale,
}

impl ScaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlusScale => "plus_scale",
            Self::NonPlusScale => "non_plus_scale",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "plus_scale" => Ok(Self::PlusScale),
            "non_plus_scale" => Ok(Self::NonPlusScale),
            _ => Err(CoreError::UnknownVariant {
                kind: "scale type",
                value: s.to_string(),
            }),
        }
    }
}

/// Rows of the 13-row letter table that only exist on the plus scale.
pub const PLUS_ONLY_ROWS: [usize; 8] = [0, 2, 3, 5, 6, 8, 9, 11];

/// Number of rows in the full letter table.
pub const LETTER_TABLE_ROWS: usize = 13;

const PLUS_SCALE: [(&str, f64, f64); 13] = [
    ("A+", 97.0, 100.0),
    ("A", 93.0, 96.99),
    ("A-", 90.0, 92.99),
    ("B+", 87.0, 89.99),
    ("B", 83.0, 86.99),
    ("B-", 80.0, 82.99),
    ("C+", 77.0, 79.99),
    ("C", 73.0, 76.99),
    ("C-", 70.0, 72.99),
    ("D+", 67.0, 69.99),
    ("D", 63.0, 66.99),
    ("D-", 60.0, 62.99),
    ("F", 0.0, 59.99),
];

const NON_PLUS_SCALE: [(&str, f64, f64); 5] = [
    ("A", 90.0, 100.0),
    ("B", 80.0, 89.99),
    ("C", 70.0, 79.99),
    ("D", 60.0, 69.99),
    ("F", 0.0, 59.99),
];

/// Whether a row of the 13-row letter table is shown for the given scale.
pub fn is_row_visible(scale_type: ScaleType, row: usize) -> bool {
    match scale_type {
        ScaleType::PlusScale => row < LETTER_TABLE_ROWS,
        ScaleType::NonPlusScale => row < LETTER_TABLE_ROWS && !PLUS_ONLY_ROWS.contains(&row),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradePercentage {
    pub letter: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl GradePercentage {
    pub fn new(letter: impl Into<String>, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            letter: letter.into(),
            lower_bound,
            upper_bound,
        }
    }
}

/// The grading scale: letter ranges ordered by descending lower bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeScale {
    scale_type: ScaleType,
    percentages: Vec<GradePercentage>,
}

impl GradeScale {
    pub fn default_for(scale_type: ScaleType) -> Self {
        let table: &[(&str, f64, f64)] = match scale_type {
            ScaleType::PlusScale => &PLUS_SCALE,
            ScaleType::NonPlusScale => &NON_PLUS_SCALE,
        };
        Self {
            scale_type,
            percentages: table
                .iter()
                .map(|(letter, lower, upper)| GradePercentage::new(*letter, *lower, *upper))
                .collect(),
        }
    }

    /// Build a scale from stored ranges, re-sorting them by lower bound.
    pub fn from_ranges(
        scale_type: ScaleType,
        mut percentages: Vec<GradePercentage>,
    ) -> Result<Self, CoreError> {
        if percentages.is_empty() {
            return Err(CoreError::InvalidData("grade scale has no ranges".into()));
        }
        percentages.sort_by(|a, b| b.lower_bound.total_cmp(&a.lower_bound));
        let scale = Self {
            scale_type,
            percentages,
        };
        scale.validate()?;
        Ok(scale)
    }

    pub fn scale_type(&self) -> ScaleType {
        self.scale_type
    }

    pub fn percentages(&self) -> &[GradePercentage] {
        &self.percentages
    }

    /// The highest range whose lower bound does not exceed `score`.
    pub fn range_for(&self, score: f64) -> Option<&GradePercentage> {
        self.percentages.iter().find(|p| p.lower_bound <= score)
    }

    pub fn lowest(&self) -> Option<&GradePercentage> {
        self.percentages.last()
    }

    /// Replace the bounds of one range, keeping the table ordered and
    /// non-overlapping.
    pub fn set_range(&mut self, index: usize, lower_bound: f64, upper_bound: f64) -> Result<(), CoreError> {
        let count = self.percentages.len();
        let Some(range) = self.percentages.get_mut(index) else {
            return Err(CoreError::InvalidData(format!(
                "range index {index} out of bounds ({count} ranges)"
            )));
        };
        let previous = (range.lower_bound, range.upper_bound);
        range.lower_bound = lower_bound;
        range.upper_bound = upper_bound;
        if let Err(e) = self.validate() {
            let range = &mut self.percentages[index];
            range.lower_bound = previous.0;
            range.upper_bound = previous.1;
            return Err(e);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), CoreError> {
        for p in &self.percentages {
            if !p.lower_bound.is_finite() || !p.upper_bound.is_finite() || p.lower_bound > p.upper_bound {
                return Err(CoreError::InvalidData(format!(
                    "invalid range for {}: {}..{}",
                    p.letter, p.lower_bound, p.upper_bound
                )));
            }
        }
        for pair in self.percentages.windows(2) {
            let (above, below) = (&pair[0], &pair[1]);
            if below.upper_bound >= above.lower_bound {
                return Err(CoreError::InvalidData(format!(
                    "range {} overlaps range {}",
                    below.letter, above.letter
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_scale_has_thirteen_ranges() {
        let scale = GradeScale::default_for(ScaleType::PlusScale);
        assert_eq!(scale.percentages().len(), LETTER_TABLE_ROWS);
        assert_eq!(scale.percentages()[0].letter, "A+");
        assert_eq!(scale.lowest().map(|p| p.letter.as_str()), Some("F"));
    }

    #[test]
    fn non_plus_scale_matches_visible_rows() {
        let scale = GradeScale::default_for(ScaleType::NonPlusScale);
        let visible = (0..LETTER_TABLE_ROWS)
            .filter(|row| is_row_visible(ScaleType::NonPlusScale, *row))
            .count();
        assert_eq!(scale.percentages().len(), visible);
    }

    #[test]
    fn range_lookup_picks_highest_matching_bound() {
        let scale = GradeScale::default_for(ScaleType::PlusScale);
        assert_eq!(scale.range_for(100.0).map(|p| p.letter.as_str()), Some("A+"));
        assert_eq!(scale.range_for(92.99).map(|p| p.letter.as_str()), Some("A-"));
        assert_eq!(scale.range_for(90.0).map(|p| p.letter.as_str()), Some("A-"));
        assert_eq!(scale.range_for(59.0).map(|p| p.letter.as_str()), Some("F"));
        assert!(scale.range_for(-1.0).is_none());
    }

    #[test]
    fn from_ranges_sorts_descending() -> Result<(), CoreError> {
        let scale = GradeScale::from_ranges(
            ScaleType::NonPlusScale,
            vec![
                GradePercentage::new("F", 0.0, 49.99),
                GradePercentage::new("P", 50.0, 100.0),
            ],
        )?;
        assert_eq!(scale.percentages()[0].letter, "P");
        Ok(())
    }

    #[test]
    fn set_range_rejects_overlap_and_keeps_old_bounds() {
        let mut scale = GradeScale::default_for(ScaleType::NonPlusScale);
        assert!(scale.set_range(1, 85.0, 95.0).is_err());
        assert_eq!(scale.percentages()[1].lower_bound, 80.0);
        assert!(scale.set_range(1, 81.0, 89.99).is_ok());
        assert!(scale.set_range(42, 0.0, 1.0).is_err());
    }
}
