use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::grade::Grade;
use crate::ids::{ClassId, RubricId, SemesterId};
use crate::rubric::{Assignment, Rubric};
use crate::semester::Semester;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassType {
    College,
    HighSchool,
}

impl ClassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::College => "college",
            Self::HighSchool => "high_school",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "college" => Ok(Self::College),
            "high_school" => Ok(Self::HighSchool),
            _ => Err(CoreError::UnknownVariant {
                kind: "class type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// A random color mixed halfway toward white.
    pub fn random_pastel() -> Self {
        let mut rng = rand::thread_rng();
        let mut channel = || ((u16::from(rng.gen_range(0..=255u8)) + 255) / 2) as u8;
        Self::new(channel(), channel(), channel())
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

pub fn validate_class_details(name: &str, credit_hours: u32) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::InvalidData("class name is empty".into()));
    }
    if credit_hours == 0 {
        return Err(CoreError::InvalidData("credit hours must be positive".into()));
    }
    Ok(())
}

/// A class together with the rubrics and assignments it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub class_type: ClassType,
    pub credit_hours: u32,
    pub semester_id: SemesterId,
    pub semester: Semester,
    pub grade: Grade,
    pub is_favorite: bool,
    pub color: Color,
    pub rubrics: Vec<Rubric>,
    pub assignments: Vec<Assignment>,
    /// Position among all classes, assigned by the store on first insert.
    pub sort_key: Option<i64>,
}

impl Class {
    /// A class still being taken. Requires at least one rubric.
    pub fn in_progress(
        name: impl Into<String>,
        class_type: ClassType,
        credit_hours: u32,
        semester: Semester,
        rubrics: Vec<Rubric>,
    ) -> Result<Self, CoreError> {
        if rubrics.is_empty() {
            return Err(CoreError::InvalidData(
                "an in-progress class needs at least one rubric".into(),
            ));
        }
        for rubric in &rubrics {
            crate::rubric::validate_rubric(&rubric.name, rubric.weight)?;
        }
        Self::build(name, class_type, credit_hours, semester, Grade::ungraded(), rubrics)
    }

    /// A completed class carrying its final grade and no rubrics.
    pub fn previous(
        name: impl Into<String>,
        class_type: ClassType,
        credit_hours: u32,
        semester: Semester,
        grade: Grade,
    ) -> Result<Self, CoreError> {
        Self::build(name, class_type, credit_hours, semester, grade, Vec::new())
    }

    fn build(
        name: impl Into<String>,
        class_type: ClassType,
        credit_hours: u32,
        semester: Semester,
        grade: Grade,
        rubrics: Vec<Rubric>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        validate_class_details(&name, credit_hours)?;
        Ok(Self {
            id: ClassId::new(),
            name,
            class_type,
            credit_hours,
            semester_id: SemesterId::new(),
            semester,
            grade,
            is_favorite: false,
            color: Color::random_pastel(),
            rubrics,
            assignments: Vec::new(),
            sort_key: None,
        })
    }

    /// Previous classes never hold rubrics.
    pub fn is_in_progress(&self) -> bool {
        !self.rubrics.is_empty()
    }

    pub fn rubric(&self, rubric_id: RubricId) -> Option<&Rubric> {
        self.rubrics.iter().find(|r| r.id == rubric_id)
    }

    /// Assignments grouped under the rubric they reference. Every rubric gets
    /// an entry, possibly empty; assignments without a rubric are left out.
    pub fn assignments_by_rubric(&self) -> BTreeMap<RubricId, Vec<&Assignment>> {
        let mut grouped: BTreeMap<RubricId, Vec<&Assignment>> =
            self.rubrics.iter().map(|r| (r.id, Vec::new())).collect();
        for assignment in &self.assignments {
            if let Some(rubric_id) = assignment.rubric_id
                && let Some(group) = grouped.get_mut(&rubric_id)
            {
                group.push(assignment);
            }
        }
        grouped
    }
}
