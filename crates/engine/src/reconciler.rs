use crossbeam::channel::{Receiver, Sender, unbounded};

use gradepoint_core::{ids::ClassId, semester::Semester};
use gradepoint_storage::{ChangeSet, DiffEvent, LiveResults, Predicate, Store, SubscriptionToken};

use crate::error::EngineError;
use crate::presenter::{Presenter, ViewOp};

/// One semester's partition of the class list.
pub struct Section {
    semester: Semester,
    handle: LiveResults,
    rows: Vec<ClassId>,
    token: Option<SubscriptionToken>,
    halted: bool,
}

impl Section {
    pub fn semester(&self) -> &Semester {
        &self.semester
    }

    /// Rows as last applied to the presenter.
    pub fn rows(&self) -> &[ClassId] {
        &self.rows
    }

    pub fn is_subscribed(&self) -> bool {
        self.token.is_some()
    }

    /// A halted section ignores every later notification.
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

/// Keeps a sectioned presentation in step with one live query per semester.
///
/// Store callbacks only enqueue `(section, event)` pairs; `process` drains
/// the queue and turns each event into presenter operations.
pub struct Reconciler {
    sections: Vec<Section>,
    sender: Sender<(usize, DiffEvent)>,
    receiver: Receiver<(usize, DiffEvent)>,
    last_empty: Option<bool>,
}

impl Reconciler {
    /// Register a live query for every semester, in the order given. Empty
    /// semesters still get a section. Rows start out as the query's first
    /// evaluation.
    pub fn load<S: Store>(store: &mut S, semesters: &[Semester]) -> Result<Self, EngineError> {
        let (sender, receiver) = unbounded();
        let mut sections = Vec::with_capacity(semesters.len());
        for semester in semesters {
            let handle = store.query(Predicate::in_semester(&semester.term, semester.year))?;
            let rows = store.results(&handle)?;
            sections.push(Section {
                semester: semester.clone(),
                handle,
                rows,
                token: None,
                halted: false,
            });
        }
        tracing::debug!(sections = sections.len(), "sections loaded");
        Ok(Self {
            sections,
            sender,
            receiver,
            last_empty: None,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn section_of(&self, semester: &Semester) -> Option<usize> {
        self.sections.iter().position(|s| &s.semester == semester)
    }

    /// Section and row currently showing `class_id`.
    pub fn locate(&self, class_id: ClassId) -> Option<(usize, usize)> {
        self.sections.iter().enumerate().find_map(|(section, s)| {
            s.rows.iter().position(|id| *id == class_id).map(|row| (section, row))
        })
    }

    pub fn total_rows(&self) -> usize {
        self.sections.iter().map(|s| s.rows.len()).sum()
    }

    /// Attach a diff callback to one section. Subscribing twice is a no-op.
    pub fn subscribe<S: Store>(&mut self, store: &mut S, index: usize) -> Result<(), EngineError> {
        let Some(section) = self.sections.get_mut(index) else {
            return Err(EngineError::NotificationChannel {
                section: index,
                reason: "no such section".into(),
            });
        };
        if section.token.is_some() {
            return Ok(());
        }
        let sender = self.sender.clone();
        let token = store.subscribe(
            &section.handle,
            Box::new(move |event: &DiffEvent| {
                if sender.send((index, event.clone())).is_err() {
                    tracing::warn!(section = index, "reconciler gone, dropping notification");
                }
            }),
        )?;
        section.token = Some(token);
        Ok(())
    }

    pub fn subscribe_all<S: Store>(&mut self, store: &mut S) -> Result<(), EngineError> {
        for index in 0..self.sections.len() {
            self.subscribe(store, index)?;
        }
        Ok(())
    }

    /// Drain queued notifications into the presenter. Every queued event is
    /// handled; the first failure is returned after the queue is empty.
    pub fn process(&mut self, presenter: &mut dyn Presenter) -> Result<usize, EngineError> {
        let mut handled = 0;
        let mut first_error = None;
        while let Ok((section, event)) = self.receiver.try_recv() {
            match self.handle_event(section, &event, presenter) {
                Ok(()) => handled += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.report_empty_state(presenter);
        match first_error {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Apply one notification to a section.
    pub fn handle_event(
        &mut self,
        index: usize,
        event: &DiffEvent,
        presenter: &mut dyn Presenter,
    ) -> Result<(), EngineError> {
        let Some(section) = self.sections.get_mut(index) else {
            return Err(EngineError::NotificationChannel {
                section: index,
                reason: "notification for unknown section".into(),
            });
        };
        if section.halted {
            tracing::trace!(section = index, "ignoring notification for halted section");
            return Ok(());
        }

        match event {
            DiffEvent::Initial { rows } => {
                section.rows = rows.clone();
                presenter.apply(&[ViewOp::ReloadSection(index)]);
                Ok(())
            }
            DiffEvent::Updated(changes) => {
                if let Err(reason) = validate(section.rows.len(), changes) {
                    return Err(halt(section, index, reason));
                }
                let ops = view_ops(index, changes);
                section.rows = changes.rows.clone();
                presenter.apply(&ops);
                Ok(())
            }
            DiffEvent::Failed(reason) => Err(halt(section, index, reason.clone())),
        }
    }

    /// Release every subscription and live query held by the sections.
    pub fn teardown<S: Store>(&mut self, store: &mut S) {
        for section in &mut self.sections {
            if let Some(token) = section.token.take()
                && !store.unsubscribe(token)
            {
                tracing::warn!(%token, "subscription already released");
            }
            store.release(&section.handle);
        }
        while self.receiver.try_recv().is_ok() {}
        tracing::debug!(sections = self.sections.len(), "reconciler torn down");
    }

    fn report_empty_state(&mut self, presenter: &mut dyn Presenter) {
        let is_empty = self.total_rows() == 0;
        if self.last_empty != Some(is_empty) {
            self.last_empty = Some(is_empty);
            presenter.empty_state_changed(is_empty);
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        let leaked = self.sections.iter().filter(|s| s.token.is_some()).count();
        if leaked > 0 {
            tracing::warn!(leaked, "reconciler dropped without teardown");
        }
    }
}

fn halt(section: &mut Section, index: usize, reason: String) -> EngineError {
    section.halted = true;
    tracing::error!(section = index, semester = %section.semester, %reason, "notification channel failed");
    EngineError::NotificationChannel {
        section: index,
        reason,
    }
}

fn check_indices(label: &str, indices: &[usize], len: usize) -> Result<(), String> {
    for pair in indices.windows(2) {
        if pair[0] >= pair[1] {
            return Err(format!("{label} not strictly ascending: {indices:?}"));
        }
    }
    if let Some(last) = indices.last()
        && *last >= len
    {
        return Err(format!("{label} index {last} out of range for {len} rows"));
    }
    Ok(())
}

/// A diff is applicable only if its indices fit the section as it stands and
/// its counts reproduce the new row total.
fn validate(old_len: usize, changes: &ChangeSet) -> Result<(), String> {
    let new_len = changes.rows.len();
    check_indices("deletions", &changes.deletions, old_len)?;
    check_indices("modifications", &changes.modifications, old_len)?;
    check_indices("insertions", &changes.insertions, new_len)?;
    if let Some(index) = changes
        .modifications
        .iter()
        .find(|i| changes.deletions.binary_search(i).is_ok())
    {
        return Err(format!("row {index} both deleted and modified"));
    }
    if old_len - changes.deletions.len() + changes.insertions.len() != new_len {
        return Err(format!(
            "{old_len} rows - {} deletions + {} insertions != {new_len} rows",
            changes.deletions.len(),
            changes.insertions.len()
        ));
    }
    Ok(())
}

/// Deletions and reloads use pre-update indices, so they go before
/// insertions. A section whose rows are all new, or that just emptied, also
/// reloads its header and footer.
fn view_ops(section: usize, changes: &ChangeSet) -> Vec<ViewOp> {
    let mut ops = Vec::new();
    if !changes.deletions.is_empty() {
        ops.push(ViewOp::DeleteRows {
            section,
            rows: changes.deletions.clone(),
        });
    }
    if !changes.modifications.is_empty() {
        ops.push(ViewOp::ReloadRows {
            section,
            rows: changes.modifications.clone(),
        });
    }
    if !changes.insertions.is_empty() {
        ops.push(ViewOp::InsertRows {
            section,
            rows: changes.insertions.clone(),
        });
    }
    if changes.rows.len() == changes.insertions.len() {
        ops.push(ViewOp::ReloadSection(section));
    }
    ops
}
