use gradepoint_core::ids::ClassId;

/// One operation against the sectioned presentation. Row indices are
/// positions within the section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOp {
    ReloadSection(usize),
    DeleteRows { section: usize, rows: Vec<usize> },
    ReloadRows { section: usize, rows: Vec<usize> },
    InsertRows { section: usize, rows: Vec<usize> },
}

/// The view layer driven by the reconciler and the deletion protocol.
pub trait Presenter {
    /// Apply a batch of operations in order.
    fn apply(&mut self, ops: &[ViewOp]);

    /// The class a detail view is currently showing, if any.
    fn selected_class(&self) -> Option<ClassId>;

    fn selection_cleared(&mut self);

    fn empty_state_changed(&mut self, is_empty: bool);
}
