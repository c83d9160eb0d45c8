use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use gradepoint_core::{
    class::{Class, ClassType},
    grade::{Grade, Percentage},
    ids::*,
    rubric::{Assignment, Rubric},
    semester::Semester,
};
use gradepoint_engine::{DeletionId, EngineError, GradeBook, GradeBookConfig, RestoreResult};
use gradepoint_storage::SqliteStore;

use crate::presenter::RecordingPresenter;

/// An in-memory grade book with a recording presenter and a manual clock.
pub struct TestBook {
    pub book: GradeBook<SqliteStore>,
    pub presenter: RecordingPresenter,
    pub now: Instant,
    dated: DateTime<Utc>,
}

impl TestBook {
    /// Sections Spring and Fall for 2018 down to 2016.
    pub fn config() -> GradeBookConfig {
        GradeBookConfig {
            terms: vec!["Spring".into(), "Fall".into()],
            current_year: 2018,
            years_back: 2,
            years_ahead: 0,
            ..GradeBookConfig::default()
        }
    }

    pub fn new() -> Result<Self, EngineError> {
        Self::with_book(GradeBook::open_in_memory(Self::config())?)
    }

    pub fn open(path: &str) -> Result<Self, EngineError> {
        Self::with_book(GradeBook::open(path, Self::config())?)
    }

    fn with_book(book: GradeBook<SqliteStore>) -> Result<Self, EngineError> {
        let mut test = Self {
            book,
            presenter: RecordingPresenter::new(),
            now: Instant::now(),
            dated: Utc::now(),
        };
        test.sync()?;
        Ok(test)
    }

    /// Add an in-progress class with the given `(name, weight)` rubrics.
    pub fn in_progress_class(
        &mut self,
        name: &str,
        semester: Semester,
        rubrics: &[(&str, f64)],
    ) -> Result<Class, EngineError> {
        let rubrics = rubrics
            .iter()
            .map(|(name, weight)| Rubric::new(*name, *weight))
            .collect::<Result<Vec<_>, _>>()?;
        let class = Class::in_progress(name, ClassType::College, 3, semester, rubrics)?;
        self.book.add_class(class.clone())?;
        Ok(class)
    }

    pub fn previous_class(
        &mut self,
        name: &str,
        semester: Semester,
        score: f64,
        letter: &str,
    ) -> Result<Class, EngineError> {
        let class = Class::previous(name, ClassType::HighSchool, 1, semester, Grade::new(score, letter))?;
        self.book.add_class(class.clone())?;
        Ok(class)
    }

    /// Record one assignment per score under `rubric_id`, regrading after
    /// each. Returns the last grade.
    pub fn add_scores(
        &mut self,
        class_id: ClassId,
        rubric_id: RubricId,
        scores: &[f64],
    ) -> Result<Option<Percentage>, EngineError> {
        let mut grade = None;
        for score in scores {
            let assignment = self.assignment(class_id, rubric_id, *score)?;
            grade = self.book.add_assignment(&assignment)?;
        }
        Ok(grade)
    }

    /// A new assignment dated after every earlier one.
    pub fn assignment(&mut self, class_id: ClassId, rubric_id: RubricId, score: f64) -> Result<Assignment, EngineError> {
        self.dated += TimeDelta::seconds(1);
        Ok(Assignment::new(class_id, rubric_id, format!("Work {score}"), self.dated, score)?)
    }

    pub fn stored(&self, class_id: ClassId) -> Result<Class, EngineError> {
        self.book
            .get_class(class_id)?
            .ok_or_else(|| EngineError::ClassNotFound(class_id.to_string()))
    }

    pub fn sync(&mut self) -> Result<usize, EngineError> {
        self.book.sync(&mut self.presenter)
    }

    /// Move the clock forward and run a tick.
    pub fn advance(&mut self, by: Duration) -> Result<usize, EngineError> {
        self.now += by;
        self.book.tick(self.now, &mut self.presenter)
    }

    pub fn delete(&mut self, class_id: ClassId) -> Result<DeletionId, EngineError> {
        self.book.delete_class(class_id, &mut self.presenter, self.now)
    }

    pub fn undo(&mut self, id: DeletionId) -> Result<RestoreResult, EngineError> {
        self.book.undo_deletion(id, self.now)
    }

    pub fn section_index(&self, semester: &Semester) -> Option<usize> {
        self.book.reconciler().section_of(semester)
    }

    /// Rows the presenter currently shows for `semester`.
    pub fn section_rows(&self, semester: &Semester) -> Vec<ClassId> {
        self.section_index(semester)
            .and_then(|index| self.book.reconciler().section(index))
            .map(|section| section.rows().to_vec())
            .unwrap_or_default()
    }
}
