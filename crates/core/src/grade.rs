use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::GradeId;

/// Round to two decimal places, halves rounding up. Decimal halves such as
/// 1.005 scale to a few ulps under the half and are lifted by a relative
/// epsilon before flooring.
pub fn round_half_up_2(x: f64) -> f64 {
    let scaled = 100.0 * x;
    (scaled + 0.5 + scaled.abs() * f64::EPSILON * 4.0).floor() / 100.0
}

/// A score on the 0-100 scale, already rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percentage(f64);

impl Percentage {
    pub fn from_raw(raw: f64) -> Self {
        Self(round_half_up_2(raw))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

/// The stored grade of one class. An empty letter means the class has not
/// been graded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub score: f64,
    pub letter: String,
}

impl Grade {
    pub fn ungraded() -> Self {
        Self {
            id: GradeId::new(),
            score: 0.0,
            letter: String::new(),
        }
    }

    pub fn new(score: f64, letter: impl Into<String>) -> Self {
        Self {
            id: GradeId::new(),
            score,
            letter: letter.into(),
        }
    }

    pub fn is_graded(&self) -> bool {
        !self.letter.is_empty()
    }
}
