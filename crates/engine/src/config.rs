use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use gradepoint_core::{scale::ScaleType, semester::Semester};

use crate::error::EngineError;

fn default_terms() -> Vec<String> {
    ["Spring", "Summer", "Fall", "Winter"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_current_year() -> i32 {
    chrono::Local::now().year()
}

fn default_years_back() -> u32 {
    30
}

fn default_years_ahead() -> u32 {
    1
}

fn default_undo_window_ms() -> u64 {
    3000
}

fn default_scale() -> ScaleType {
    ScaleType::PlusScale
}

/// Settings for a grade book. Every field has a default, so an empty TOML
/// document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBookConfig {
    /// Term names in display order within a year.
    #[serde(default = "default_terms")]
    pub terms: Vec<String>,
    #[serde(default = "default_current_year")]
    pub current_year: i32,
    #[serde(default = "default_years_back")]
    pub years_back: u32,
    #[serde(default = "default_years_ahead")]
    pub years_ahead: u32,
    #[serde(default = "default_undo_window_ms")]
    pub undo_window_ms: u64,
    /// Scale created when the store has none yet.
    #[serde(default = "default_scale")]
    pub scale: ScaleType,
}

impl Default for GradeBookConfig {
    fn default() -> Self {
        Self {
            terms: default_terms(),
            current_year: default_current_year(),
            years_back: default_years_back(),
            years_ahead: default_years_ahead(),
            undo_window_ms: default_undo_window_ms(),
            scale: default_scale(),
        }
    }
}

impl GradeBookConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| EngineError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.terms.is_empty() {
            return Err(EngineError::Config("at least one term is required".into()));
        }
        let mut seen = BTreeSet::new();
        for term in &self.terms {
            if term.trim().is_empty() {
                return Err(EngineError::Config("term names must not be empty".into()));
            }
            if !seen.insert(term.as_str()) {
                return Err(EngineError::Config(format!("duplicate term `{term}`")));
            }
        }
        Ok(())
    }

    pub fn undo_window(&self) -> Duration {
        Duration::from_millis(self.undo_window_ms)
    }

    /// Every section's semester, newest year first, terms in configured
    /// order within a year.
    pub fn semesters(&self) -> Vec<Semester> {
        let newest = self.current_year + self.years_ahead as i32;
        let oldest = self.current_year - self.years_back as i32;
        let years: Vec<i32> = (oldest..=newest).rev().collect();
        Semester::combinations(&self.terms, &years)
    }
}
