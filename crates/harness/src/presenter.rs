use gradepoint_core::ids::ClassId;
use gradepoint_engine::{Presenter, ViewOp};

/// Everything a presenter was told, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Ops(Vec<ViewOp>),
    SelectionCleared,
    EmptyState(bool),
}

/// A presenter that records calls instead of drawing anything.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub events: Vec<PresenterEvent>,
    pub selected: Option<ClassId>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a detail view is showing `class_id`.
    pub fn select(&mut self, class_id: ClassId) {
        self.selected = Some(class_id);
    }

    /// Every view operation applied so far, flattened.
    pub fn ops(&self) -> Vec<ViewOp> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PresenterEvent::Ops(ops) => Some(ops.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn ops_for(&self, section: usize) -> Vec<ViewOp> {
        self.ops()
            .into_iter()
            .filter(|op| op_section(op) == section)
            .collect()
    }

    pub fn empty_states(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PresenterEvent::EmptyState(is_empty) => Some(*is_empty),
                _ => None,
            })
            .collect()
    }

    pub fn selection_clears(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PresenterEvent::SelectionCleared))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

fn op_section(op: &ViewOp) -> usize {
    match op {
        ViewOp::ReloadSection(section) => *section,
        ViewOp::DeleteRows { section, .. }
        | ViewOp::ReloadRows { section, .. }
        | ViewOp::InsertRows { section, .. } => *section,
    }
}

impl Presenter for RecordingPresenter {
    fn apply(&mut self, ops: &[ViewOp]) {
        if !ops.is_empty() {
            self.events.push(PresenterEvent::Ops(ops.to_vec()));
        }
    }

    fn selected_class(&self) -> Option<ClassId> {
        self.selected
    }

    fn selection_cleared(&mut self) {
        self.selected = None;
        self.events.push(PresenterEvent::SelectionCleared);
    }

    fn empty_state_changed(&mut self, is_empty: bool) {
        self.events.push(PresenterEvent::EmptyState(is_empty));
    }
}
