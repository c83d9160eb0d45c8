use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use gradepoint_core::{
    class::Class,
    grade::Grade,
    ids::*,
    rubric::{Assignment, Rubric},
};
use gradepoint_storage::{EntityRef, Store};

use crate::error::EngineError;
use crate::presenter::Presenter;
use crate::timer::DeferredTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Selected,
    Snapshotted,
    Deleted,
    UndoWindowOpen,
    Restored,
    Expired,
}

impl DeletionState {
    fn can_advance_to(self, next: DeletionState) -> bool {
        use DeletionState::*;
        matches!(
            (self, next),
            (Selected, Snapshotted)
                | (Snapshotted, Deleted)
                | (Deleted, UndoWindowOpen)
                | (UndoWindowOpen, Restored)
                | (UndoWindowOpen, Expired)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeletionId(u64);

impl fmt::Display for DeletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deletion#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreResult {
    /// The snapshot was written back under the original class id.
    Restored(ClassId),
    /// The undo window had already closed; the snapshot is gone.
    Expired,
}

struct PendingDeletion {
    class_id: ClassId,
    state: DeletionState,
    snapshot: Class,
    timer: DeferredTask,
}

impl PendingDeletion {
    fn advance(&mut self, next: DeletionState) -> Result<(), EngineError> {
        if !self.state.can_advance_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Deep copy of a class for restoring after deletion.
///
/// The class keeps its id and sort key. Rubrics, assignments and the owned
/// semester and grade records get fresh ids, and every assignment is pointed
/// at the copy of its rubric. An assignment whose rubric is not part of the
/// class loses its rubric reference.
pub fn snapshot_class(class: &Class) -> Class {
    let mut relinked: BTreeMap<RubricId, RubricId> = BTreeMap::new();
    let rubrics: Vec<Rubric> = class
        .rubrics
        .iter()
        .map(|rubric| {
            let id = RubricId::new();
            relinked.insert(rubric.id, id);
            Rubric { id, ..rubric.clone() }
        })
        .collect();

    let assignments: Vec<Assignment> = class
        .assignments
        .iter()
        .map(|assignment| {
            let rubric_id = assignment.rubric_id.and_then(|old| {
                let new = relinked.get(&old).copied();
                if new.is_none() {
                    let err = EngineError::ReferenceIntegrity(format!(
                        "assignment {} references rubric {old} outside class {}",
                        assignment.id, class.id
                    ));
                    tracing::warn!(error = %err, "clearing rubric reference in snapshot");
                }
                new
            });
            Assignment {
                id: AssignmentId::new(),
                rubric_id,
                ..assignment.clone()
            }
        })
        .collect();

    Class {
        semester_id: SemesterId::new(),
        grade: Grade {
            id: GradeId::new(),
            ..class.grade.clone()
        },
        rubrics,
        assignments,
        ..class.clone()
    }
}

/// Every stored record a class owns, children first.
pub fn owned_entities(class: &Class) -> Vec<EntityRef> {
    let mut entities: Vec<EntityRef> = class.rubrics.iter().map(|r| EntityRef::Rubric(r.id)).collect();
    entities.extend(class.assignments.iter().map(|a| EntityRef::Assignment(a.id)));
    entities.push(EntityRef::Semester(class.semester_id));
    entities.push(EntityRef::Grade(class.grade.id));
    entities.push(EntityRef::Class(class.id));
    entities
}

/// Deletions still inside their undo window.
pub struct DeletionProtocol {
    window: Duration,
    next_id: u64,
    pending: BTreeMap<DeletionId, PendingDeletion>,
}

impl DeletionProtocol {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            next_id: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn state(&self, id: DeletionId) -> Option<DeletionState> {
        self.pending.get(&id).map(|p| p.state)
    }

    pub fn class_of(&self, id: DeletionId) -> Option<ClassId> {
        self.pending.get(&id).map(|p| p.class_id)
    }

    /// Snapshot and delete a class, then open its undo window. A detail view
    /// showing the class is cleared before anything is removed.
    pub fn delete<S: Store>(
        &mut self,
        store: &mut S,
        class_id: ClassId,
        presenter: &mut dyn Presenter,
        now: Instant,
    ) -> Result<DeletionId, EngineError> {
        let class = store
            .get_class(class_id)?
            .ok_or_else(|| EngineError::ClassNotFound(class_id.to_string()))?;

        let mut pending = PendingDeletion {
            class_id,
            state: DeletionState::Selected,
            snapshot: snapshot_class(&class),
            timer: DeferredTask::new(now, self.window),
        };
        pending.advance(DeletionState::Snapshotted)?;

        if presenter.selected_class() == Some(class_id) {
            presenter.selection_cleared();
        }

        store.delete(&owned_entities(&class))?;
        pending.advance(DeletionState::Deleted)?;
        pending.advance(DeletionState::UndoWindowOpen)?;

        self.next_id += 1;
        let id = DeletionId(self.next_id);
        tracing::info!(%id, class = %class_id, name = %class.name, "class deleted, undo window open");
        self.pending.insert(id, pending);
        Ok(id)
    }

    /// Restore a deleted class if its window is still open at `now`.
    pub fn undo<S: Store>(
        &mut self,
        store: &mut S,
        id: DeletionId,
        now: Instant,
    ) -> Result<RestoreResult, EngineError> {
        let Some(pending) = self.pending.get_mut(&id) else {
            return Err(EngineError::DeletionNotFound(id.to_string()));
        };

        if pending.timer.poll(now) {
            pending.advance(DeletionState::Expired)?;
            self.pending.remove(&id);
            tracing::info!(%id, "undo requested after window closed");
            return Ok(RestoreResult::Expired);
        }

        store.insert(&pending.snapshot)?;
        pending.timer.cancel();
        pending.advance(DeletionState::Restored)?;
        let class_id = pending.class_id;
        self.pending.remove(&id);
        tracing::info!(%id, class = %class_id, "class restored");
        Ok(RestoreResult::Restored(class_id))
    }

    /// Discard every snapshot whose window has closed by `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<DeletionId> {
        let mut expired = Vec::new();
        for (id, pending) in &mut self.pending {
            if pending.timer.poll(now) && pending.advance(DeletionState::Expired).is_ok() {
                expired.push(*id);
            }
        }
        for id in &expired {
            self.pending.remove(id);
            tracing::info!(%id, "undo window expired");
        }
        expired
    }
}
