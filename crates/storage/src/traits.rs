use std::fmt;

use gradepoint_core::{
    class::{Class, ClassType},
    field_value::FieldValue,
    ids::*,
    rubric::{Assignment, Rubric},
    scale::GradeScale,
    semester::Semester,
};

use crate::error::StorageError;

/// A class field a query filter can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassField {
    SemesterTerm,
    SemesterYear,
    IsFavorite,
    Name,
    ClassType,
    CreditHours,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: ClassField,
    pub op: CompareOp,
    pub value: FieldValue,
}

/// Structured filter over classes, combined by conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    Filter(Filter),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: ClassField, value: impl Into<FieldValue>) -> Self {
        Predicate::Filter(Filter {
            field,
            op: CompareOp::Eq,
            value: value.into(),
        })
    }

    pub fn compare(field: ClassField, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Predicate::Filter(Filter {
            field,
            op,
            value: value.into(),
        })
    }

    /// Classes whose semester is exactly `term` / `year`.
    pub fn in_semester(term: &str, year: i32) -> Self {
        Predicate::And(vec![
            Predicate::eq(ClassField::SemesterTerm, term),
            Predicate::eq(ClassField::SemesterYear, year),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionToken(pub u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Handle to a registered live query. Rows are read back through the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveResults {
    pub query_id: QueryId,
    pub predicate: Predicate,
}

/// Index sets describing one batch of changes to a live query.
///
/// `deletions` and `modifications` index the rows as they were before the
/// batch; `insertions` index `rows`, the rows after it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    pub rows: Vec<ClassId>,
    pub insertions: Vec<usize>,
    pub deletions: Vec<usize>,
    pub modifications: Vec<usize>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEvent {
    Initial { rows: Vec<ClassId> },
    Updated(ChangeSet),
    Failed(String),
}

pub type DiffCallback = Box<dyn FnMut(&DiffEvent)>;

/// A persisted record that can be removed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Class(ClassId),
    Rubric(RubricId),
    Assignment(AssignmentId),
    Semester(SemesterId),
    Grade(GradeId),
}

/// Mutations available inside a write block. Everything in one block
/// commits together or not at all.
pub trait Transaction {
    /// Insert a class with its semester, grade, rubrics and assignments.
    /// Returns the sort key the class was stored under.
    fn insert_class(&mut self, class: &Class) -> Result<i64, StorageError>;

    fn delete(&mut self, entity: EntityRef) -> Result<(), StorageError>;

    fn update_grade(&mut self, class_id: ClassId, score: f64, letter: &str) -> Result<(), StorageError>;

    fn set_favorite(&mut self, class_id: ClassId, is_favorite: bool) -> Result<(), StorageError>;

    fn update_class_details(
        &mut self,
        class_id: ClassId,
        name: &str,
        class_type: ClassType,
        credit_hours: u32,
    ) -> Result<(), StorageError>;

    /// Move a class to another term and year.
    fn set_semester(&mut self, class_id: ClassId, semester: &Semester) -> Result<(), StorageError>;

    fn insert_rubric(&mut self, class_id: ClassId, rubric: &Rubric) -> Result<(), StorageError>;

    fn update_rubric(&mut self, rubric: &Rubric) -> Result<(), StorageError>;

    fn insert_assignment(&mut self, assignment: &Assignment) -> Result<(), StorageError>;

    fn update_assignment(&mut self, assignment: &Assignment) -> Result<(), StorageError>;

    /// Wipe every stored range and write `scale` under the singleton key.
    fn replace_grade_scale(&mut self, scale: &GradeScale) -> Result<(), StorageError>;
}

/// The persisted object store: reads, exclusive write blocks, and live
/// queries that report diffs to subscribers.
pub trait Store {
    /// Run `f` as one exclusive transaction. An error from `f` rolls back
    /// every mutation it made.
    fn write<T, F>(&mut self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, StorageError>;

    fn insert(&mut self, class: &Class) -> Result<i64, StorageError> {
        self.write(|tx| tx.insert_class(class))
    }

    fn delete(&mut self, entities: &[EntityRef]) -> Result<(), StorageError> {
        self.write(|tx| {
            for entity in entities {
                tx.delete(*entity)?;
            }
            Ok(())
        })
    }

    fn get_class(&self, class_id: ClassId) -> Result<Option<Class>, StorageError>;

    fn find_classes(&self, predicate: &Predicate) -> Result<Vec<ClassId>, StorageError>;

    fn class_count(&self) -> Result<u64, StorageError>;

    fn get_grade_scale(&self) -> Result<Option<GradeScale>, StorageError>;

    /// Register a live query and evaluate it once.
    fn query(&mut self, predicate: Predicate) -> Result<LiveResults, StorageError>;

    /// Rows of a live query as of its last evaluation.
    fn results(&self, handle: &LiveResults) -> Result<Vec<ClassId>, StorageError>;

    /// Drop a live query and every subscription still attached to it.
    fn release(&mut self, handle: &LiveResults);

    /// Attach a callback to a live query. An `Initial` event is queued for
    /// it right away; later writes queue `Updated` events.
    fn subscribe(
        &mut self,
        handle: &LiveResults,
        callback: DiffCallback,
    ) -> Result<SubscriptionToken, StorageError>;

    /// Returns false if the token was already released.
    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool;

    /// Re-evaluate queries touched since the last call and run callbacks for
    /// every queued event, in FIFO order. Returns the number delivered.
    fn deliver_notifications(&mut self) -> usize;
}
