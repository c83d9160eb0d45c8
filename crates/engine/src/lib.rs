pub mod config;
pub mod deletion;
pub mod error;
pub mod grade;
pub mod logging;
pub mod presenter;
pub mod reconciler;
pub mod timer;

pub use config::GradeBookConfig;
pub use deletion::{DeletionId, DeletionProtocol, DeletionState, RestoreResult};
pub use error::{EngineError, GradeError};
pub use grade::{GradeEngine, GradeUpdate, compute_score};
pub use presenter::{Presenter, ViewOp};
pub use reconciler::{Reconciler, Section};
pub use timer::{DeferredTask, TaskState};

use std::time::Instant;

use gradepoint_core::{
    CoreError,
    class::{Class, ClassType, validate_class_details},
    grade::Percentage,
    ids::*,
    rubric::{Assignment, Rubric},
    scale::{GradeScale, ScaleType},
    semester::Semester,
};
use gradepoint_storage::{EntityRef, Predicate, SqliteStore, Store};

/// A store together with the components that keep grades and the sectioned
/// class list current.
///
/// Every edit to rubrics or assignments recomputes the owning class's grade.
/// Store notifications reach the presenter on `tick` or `sync`.
pub struct GradeBook<S: Store> {
    store: S,
    config: GradeBookConfig,
    grades: GradeEngine,
    reconciler: Reconciler,
    deletions: DeletionProtocol,
}

impl GradeBook<SqliteStore> {
    pub fn open(path: &str, config: GradeBookConfig) -> Result<Self, EngineError> {
        Self::new(SqliteStore::open(path)?, config)
    }

    pub fn open_in_memory(config: GradeBookConfig) -> Result<Self, EngineError> {
        Self::new(SqliteStore::open_in_memory()?, config)
    }
}

impl<S: Store> GradeBook<S> {
    /// Load sections for every configured semester and subscribe to them.
    /// A store without a grading scale gets the configured default.
    pub fn new(mut store: S, config: GradeBookConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let scale = match store.get_grade_scale()? {
            Some(scale) => scale,
            None => {
                let scale = GradeScale::default_for(config.scale);
                store.write(|tx| tx.replace_grade_scale(&scale))?;
                tracing::info!(scale = config.scale.as_str(), "created default grade scale");
                scale
            }
        };

        let mut reconciler = Reconciler::load(&mut store, &config.semesters())?;
        reconciler.subscribe_all(&mut store)?;
        let deletions = DeletionProtocol::new(config.undo_window());

        Ok(Self {
            store,
            config,
            grades: GradeEngine::new(scale),
            reconciler,
            deletions,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &GradeBookConfig {
        &self.config
    }

    pub fn grade_engine(&self) -> &GradeEngine {
        &self.grades
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn deletions(&self) -> &DeletionProtocol {
        &self.deletions
    }

    pub fn get_class(&self, class_id: ClassId) -> Result<Option<Class>, EngineError> {
        Ok(self.store.get_class(class_id)?)
    }

    fn require_class(&self, class_id: ClassId) -> Result<Class, EngineError> {
        self.store
            .get_class(class_id)?
            .ok_or_else(|| EngineError::ClassNotFound(class_id.to_string()))
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Store a new class and compute its grade if it already has work.
    pub fn add_class(&mut self, class: Class) -> Result<ClassId, EngineError> {
        self.store.insert(&class)?;
        if class.is_in_progress() && !class.assignments.is_empty() {
            self.refresh_grade(class.id)?;
        }
        tracing::debug!(class = %class.id, name = %class.name, "class added");
        Ok(class.id)
    }

    /// Rename a class or change its type or credit hours.
    pub fn update_class(
        &mut self,
        class_id: ClassId,
        name: &str,
        class_type: ClassType,
        credit_hours: u32,
    ) -> Result<(), EngineError> {
        validate_class_details(name, credit_hours)?;
        self.store
            .write(|tx| tx.update_class_details(class_id, name, class_type, credit_hours))?;
        tracing::debug!(class = %class_id, name, "class details updated");
        Ok(())
    }

    pub fn set_favorite(&mut self, class_id: ClassId, is_favorite: bool) -> Result<(), EngineError> {
        Ok(self.store.write(|tx| tx.set_favorite(class_id, is_favorite))?)
    }

    /// Move a class to another semester's section.
    pub fn move_class(&mut self, class_id: ClassId, semester: &Semester) -> Result<(), EngineError> {
        Ok(self.store.write(|tx| tx.set_semester(class_id, semester))?)
    }

    pub fn favorites(&self) -> Result<Vec<ClassId>, EngineError> {
        Ok(self.store.find_classes(&Predicate::eq(
            gradepoint_storage::ClassField::IsFavorite,
            true,
        ))?)
    }

    // ========================================================================
    // Grades
    // ========================================================================

    /// Recompute a class's grade. `None` means the class has no graded work
    /// yet; a previously stored grade is then reset to ungraded.
    pub fn refresh_grade(&mut self, class_id: ClassId) -> Result<Option<Percentage>, EngineError> {
        match self.grades.compute_and_persist(&mut self.store, class_id) {
            Ok(update) => Ok(Some(update.score)),
            Err(EngineError::Grade(GradeError::DivisionByZero)) => {
                let class = self.require_class(class_id)?;
                if class.grade.is_graded() {
                    self.store.write(|tx| tx.update_grade(class_id, 0.0, ""))?;
                    tracing::debug!(class = %class_id, "grade reset, no graded work left");
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn refresh_all_grades(&mut self) -> Result<(), EngineError> {
        for class_id in self.store.find_classes(&Predicate::All)? {
            self.refresh_grade(class_id)?;
        }
        Ok(())
    }

    /// Replace the stored scale with a built-in table and regrade every
    /// class against it.
    pub fn reset_grade_scale(&mut self, scale_type: ScaleType) -> Result<(), EngineError> {
        self.install_scale(GradeScale::default_for(scale_type))
    }

    /// Change the bounds of one letter range.
    pub fn set_grade_range(&mut self, index: usize, lower_bound: f64, upper_bound: f64) -> Result<(), EngineError> {
        let mut scale = self.grades.scale().clone();
        scale.set_range(index, lower_bound, upper_bound)?;
        self.install_scale(scale)
    }

    fn install_scale(&mut self, scale: GradeScale) -> Result<(), EngineError> {
        self.store.write(|tx| tx.replace_grade_scale(&scale))?;
        tracing::info!(scale = scale.scale_type().as_str(), ranges = scale.percentages().len(), "grade scale replaced");
        self.grades.set_scale(scale);
        self.refresh_all_grades()
    }

    // ========================================================================
    // Rubrics and assignments
    // ========================================================================

    pub fn add_assignment(&mut self, assignment: &Assignment) -> Result<Option<Percentage>, EngineError> {
        self.store.write(|tx| tx.insert_assignment(assignment))?;
        self.refresh_grade(assignment.class_id)
    }

    pub fn update_assignment(&mut self, assignment: &Assignment) -> Result<Option<Percentage>, EngineError> {
        self.store.write(|tx| tx.update_assignment(assignment))?;
        self.refresh_grade(assignment.class_id)
    }

    pub fn remove_assignment(
        &mut self,
        class_id: ClassId,
        assignment_id: AssignmentId,
    ) -> Result<Option<Percentage>, EngineError> {
        let class = self.require_class(class_id)?;
        if !class.assignments.iter().any(|a| a.id == assignment_id) {
            return Err(EngineError::ReferenceIntegrity(format!(
                "assignment {assignment_id} is not part of class {class_id}"
            )));
        }
        self.store.delete(&[EntityRef::Assignment(assignment_id)])?;
        self.refresh_grade(class_id)
    }

    pub fn add_rubric(&mut self, class_id: ClassId, rubric: &Rubric) -> Result<Option<Percentage>, EngineError> {
        let class = self.require_class(class_id)?;
        if !class.is_in_progress() {
            return Err(CoreError::InvalidData(format!("class {class_id} is already completed")).into());
        }
        self.store.write(|tx| tx.insert_rubric(class_id, rubric))?;
        self.refresh_grade(class_id)
    }

    pub fn update_rubric_weight(
        &mut self,
        class_id: ClassId,
        rubric_id: RubricId,
        weight: f64,
    ) -> Result<Option<Percentage>, EngineError> {
        let class = self.require_class(class_id)?;
        let rubric = class.rubric(rubric_id).ok_or_else(|| {
            EngineError::ReferenceIntegrity(format!("rubric {rubric_id} is not part of class {class_id}"))
        })?;
        let updated = rubric.with_weight(weight)?;
        self.store.write(|tx| tx.update_rubric(&updated))?;
        self.refresh_grade(class_id)
    }

    /// Remove a rubric. Its assignments stay but no longer count toward the
    /// grade. The last rubric of a class cannot be removed.
    pub fn remove_rubric(&mut self, class_id: ClassId, rubric_id: RubricId) -> Result<Option<Percentage>, EngineError> {
        let class = self.require_class(class_id)?;
        if class.rubric(rubric_id).is_none() {
            return Err(EngineError::ReferenceIntegrity(format!(
                "rubric {rubric_id} is not part of class {class_id}"
            )));
        }
        if class.rubrics.len() == 1 {
            return Err(CoreError::InvalidData("an in-progress class needs at least one rubric".into()).into());
        }
        self.store.delete(&[EntityRef::Rubric(rubric_id)])?;
        self.refresh_grade(class_id)
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    pub fn delete_class(
        &mut self,
        class_id: ClassId,
        presenter: &mut dyn Presenter,
        now: Instant,
    ) -> Result<DeletionId, EngineError> {
        self.deletions.delete(&mut self.store, class_id, presenter, now)
    }

    pub fn undo_deletion(&mut self, id: DeletionId, now: Instant) -> Result<RestoreResult, EngineError> {
        self.deletions.undo(&mut self.store, id, now)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Deliver pending store notifications and apply them to the presenter.
    pub fn sync(&mut self, presenter: &mut dyn Presenter) -> Result<usize, EngineError> {
        self.store.deliver_notifications();
        self.reconciler.process(presenter)
    }

    /// Close expired undo windows, then `sync`.
    pub fn tick(&mut self, now: Instant, presenter: &mut dyn Presenter) -> Result<usize, EngineError> {
        self.deletions.expire(now);
        self.sync(presenter)
    }
}

impl<S: Store> Drop for GradeBook<S> {
    fn drop(&mut self) {
        self.reconciler.teardown(&mut self.store);
    }
}
