use serde::{Deserialize, Serialize};
use std::fmt;

/// A term/year pair. Classes hold their own copy; two classes in the same
/// term compare equal by value, not by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Semester {
    pub term: String,
    pub year: i32,
}

impl Semester {
    pub fn new(term: impl Into<String>, year: i32) -> Self {
        Self {
            term: term.into(),
            year,
        }
    }

    /// Every term/year combination, grouped by year in the order given and
    /// by term within a year.
    pub fn combinations(terms: &[String], years: &[i32]) -> Vec<Semester> {
        let mut result = Vec::with_capacity(terms.len() * years.len());
        for &year in years {
            for term in terms {
                result.push(Semester::new(term.clone(), year));
            }
        }
        result
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.term, self.year)
    }
}
