use std::collections::BTreeSet;
use std::time::Duration;

use gradepoint_core::semester::Semester;
use gradepoint_engine::{DeletionState, EngineError, RestoreResult, ViewOp};
use gradepoint_harness::{PresenterEvent, TestBook};

fn spring() -> Semester {
    Semester::new("Spring", 2017)
}

// ============================================================================
// Undo
// ============================================================================

#[test]
fn undo_restores_an_equivalent_graph() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let class = t.in_progress_class("Anatomy", spring(), &[("Exams", 60.0), ("Labs", 40.0)])?;
    t.add_scores(class.id, class.rubrics[0].id, &[88.0, 92.0])?;
    t.add_scores(class.id, class.rubrics[1].id, &[75.0])?;
    t.book.set_favorite(class.id, true)?;
    let before = t.stored(class.id)?;

    let id = t.delete(class.id)?;
    assert!(t.book.get_class(class.id)?.is_none());
    assert_eq!(t.book.deletions().state(id), Some(DeletionState::UndoWindowOpen));

    assert_eq!(t.undo(id)?, RestoreResult::Restored(class.id));
    let after = t.stored(class.id)?;
    assert_eq!(after.name, before.name);
    assert_eq!(after.semester, before.semester);
    assert_eq!(after.grade.score, before.grade.score);
    assert_eq!(after.grade.letter, before.grade.letter);
    assert!(after.is_favorite);
    assert_eq!(after.color, before.color);
    assert_eq!(after.rubrics.len(), 2);
    assert_eq!(after.assignments.len(), 3);

    let original: BTreeSet<_> = before.rubrics.iter().map(|r| r.id).collect();
    let restored: BTreeSet<_> = after.rubrics.iter().map(|r| r.id).collect();
    assert!(original.is_disjoint(&restored));
    for assignment in &after.assignments {
        let rubric_id = assignment.rubric_id.expect("assignment keeps its rubric");
        assert!(restored.contains(&rubric_id));
        assert_eq!(assignment.class_id, class.id);
    }
    assert_eq!(t.book.deletions().pending_count(), 0);
    Ok(())
}

#[test]
fn restored_class_returns_to_its_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let section = t.section_index(&spring()).expect("section");
    let a = t.in_progress_class("Art", spring(), &[("Studio", 100.0)])?;
    let b = t.in_progress_class("Botany", spring(), &[("Field work", 100.0)])?;
    let c = t.in_progress_class("Ceramics", spring(), &[("Studio", 100.0)])?;
    t.sync()?;

    let id = t.delete(b.id)?;
    t.sync()?;
    assert_eq!(t.section_rows(&spring()), vec![a.id, c.id]);

    t.presenter.clear();
    t.undo(id)?;
    t.sync()?;
    assert_eq!(t.section_rows(&spring()), vec![a.id, b.id, c.id]);
    assert_eq!(
        t.presenter.ops_for(section),
        vec![ViewOp::InsertRows { section, rows: vec![1] }]
    );
    Ok(())
}

#[test]
fn classes_added_during_the_window_do_not_take_the_restored_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let a = t.in_progress_class("Algebra", spring(), &[("Tests", 100.0)])?;
    let b = t.in_progress_class("Biology", spring(), &[("Tests", 100.0)])?;
    let id = t.delete(b.id)?;
    let c = t.in_progress_class("Chorus", spring(), &[("Concerts", 100.0)])?;

    assert_eq!(t.undo(id)?, RestoreResult::Restored(b.id));
    t.sync()?;
    assert_eq!(t.section_rows(&spring()), vec![a.id, b.id, c.id]);
    Ok(())
}

#[test]
fn deleting_the_selected_class_clears_the_detail_view() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let shown = t.in_progress_class("Geology", spring(), &[("Labs", 100.0)])?;
    let other = t.in_progress_class("Zoology", spring(), &[("Labs", 100.0)])?;
    t.presenter.clear();

    t.presenter.select(shown.id);
    t.delete(other.id)?;
    assert_eq!(t.presenter.selection_clears(), 0);
    assert_eq!(t.presenter.selected, Some(shown.id));

    t.delete(shown.id)?;
    assert_eq!(t.presenter.selection_clears(), 1);
    assert_eq!(t.presenter.selected, None);
    assert_eq!(t.presenter.events, vec![PresenterEvent::SelectionCleared]);
    Ok(())
}

#[test]
fn deleting_a_missing_class_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let class = t.in_progress_class("Welding", spring(), &[("Shop", 100.0)])?;
    t.delete(class.id)?;

    let again = t.delete(class.id);
    assert!(matches!(again, Err(EngineError::ClassNotFound(_))));
    assert_eq!(t.book.deletions().pending_count(), 1);
    Ok(())
}

// ============================================================================
// Undo window
// ============================================================================

#[test]
fn undo_inside_the_window_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let class = t.in_progress_class("Logic", spring(), &[("Proofs", 100.0)])?;
    let id = t.delete(class.id)?;

    t.advance(Duration::from_millis(2999))?;
    assert_eq!(t.undo(id)?, RestoreResult::Restored(class.id));
    Ok(())
}

#[test]
fn undo_after_the_window_reports_expiry() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let class = t.in_progress_class("Sculpture", spring(), &[("Pieces", 100.0)])?;
    let id = t.delete(class.id)?;

    t.now += Duration::from_millis(3000);
    assert_eq!(t.undo(id)?, RestoreResult::Expired);
    assert!(t.book.get_class(class.id)?.is_none());
    assert_eq!(t.book.deletions().pending_count(), 0);
    Ok(())
}

#[test]
fn tick_discards_expired_snapshots() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let first = t.in_progress_class("Film", spring(), &[("Screenings", 100.0)])?;
    let first_id = t.delete(first.id)?;
    t.advance(Duration::from_millis(1500))?;
    let second = t.in_progress_class("Dance", spring(), &[("Recitals", 100.0)])?;
    let second_id = t.delete(second.id)?;

    t.advance(Duration::from_millis(1500))?;
    assert_eq!(t.book.deletions().state(first_id), None);
    assert_eq!(t.book.deletions().state(second_id), Some(DeletionState::UndoWindowOpen));
    assert!(matches!(t.undo(first_id), Err(EngineError::DeletionNotFound(_))));
    assert_eq!(t.undo(second_id)?, RestoreResult::Restored(second.id));
    Ok(())
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn book_on_disk_survives_reopening() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("grades.db");
    let path = path.to_str().expect("utf-8 temp path");

    let (kept, removed) = {
        let mut t = TestBook::open(path)?;
        let kept = t.in_progress_class("Astronomy", spring(), &[("Observations", 100.0)])?;
        t.add_scores(kept.id, kept.rubrics[0].id, &[94.0])?;
        let removed = t.previous_class("Typing", spring(), 99.0, "A+")?;
        t.delete(removed.id)?;
        (kept, removed)
    };

    let t = TestBook::open(path)?;
    assert_eq!(t.section_rows(&spring()), vec![kept.id]);
    assert!(t.book.get_class(removed.id)?.is_none());
    let stored = t.stored(kept.id)?;
    assert_eq!(stored.grade.score, 94.0);
    assert_eq!(stored.assignments.len(), 1);
    Ok(())
}
