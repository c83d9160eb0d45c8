use gradepoint_core::{
    class::{Class, ClassType},
    rubric::Rubric,
    semester::Semester,
};
use gradepoint_engine::{EngineError, Reconciler, ViewOp};
use gradepoint_harness::{RecordingPresenter, TestBook};
use gradepoint_storage::{DiffEvent, SqliteStore, Store};

fn fall_2017() -> Semester {
    Semester::new("Fall", 2017)
}

fn spring_2018() -> Semester {
    Semester::new("Spring", 2018)
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn every_configured_semester_gets_a_section() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestBook::new()?;
    let labels: Vec<String> = t
        .book
        .reconciler()
        .sections()
        .iter()
        .map(|s| s.semester().to_string())
        .collect();
    assert_eq!(
        labels,
        vec!["Spring 2018", "Fall 2018", "Spring 2017", "Fall 2017", "Spring 2016", "Fall 2016"]
    );

    let reloads = t
        .presenter
        .ops()
        .into_iter()
        .filter(|op| matches!(op, ViewOp::ReloadSection(_)))
        .count();
    assert_eq!(reloads, 6);
    assert_eq!(t.presenter.empty_states(), vec![true]);
    assert_eq!(t.book.store().subscription_count(), 6);
    Ok(())
}

// ============================================================================
// Diff application
// ============================================================================

#[test]
fn first_rows_in_a_section_refresh_its_chrome() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let section = t.section_index(&fall_2017()).expect("section");
    t.presenter.clear();

    let a = t.in_progress_class("Optics", fall_2017(), &[("Labs", 100.0)])?;
    let b = t.in_progress_class("Mechanics", fall_2017(), &[("Labs", 100.0)])?;
    t.sync()?;

    assert_eq!(t.section_rows(&fall_2017()), vec![a.id, b.id]);
    assert_eq!(
        t.presenter.ops_for(section),
        vec![
            ViewOp::InsertRows { section, rows: vec![0, 1] },
            ViewOp::ReloadSection(section),
        ]
    );
    assert_eq!(t.presenter.empty_states(), vec![false]);

    t.presenter.clear();
    t.delete(a.id)?;
    t.sync()?;
    assert_eq!(t.section_rows(&fall_2017()), vec![b.id]);
    assert_eq!(
        t.presenter.ops_for(section),
        vec![ViewOp::DeleteRows { section, rows: vec![0] }]
    );
    assert!(t.presenter.empty_states().is_empty());
    Ok(())
}

#[test]
fn grade_write_reloads_the_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let section = t.section_index(&fall_2017()).expect("section");
    let first = t.in_progress_class("Poetry", fall_2017(), &[("Essays", 100.0)])?;
    let second = t.in_progress_class("Drama", fall_2017(), &[("Essays", 100.0)])?;
    t.sync()?;
    t.presenter.clear();

    t.add_scores(second.id, second.rubrics[0].id, &[91.0])?;
    t.sync()?;
    assert_eq!(
        t.presenter.ops_for(section),
        vec![ViewOp::ReloadRows { section, rows: vec![1] }]
    );
    assert_eq!(t.section_rows(&fall_2017()), vec![first.id, second.id]);
    Ok(())
}

#[test]
fn moving_a_class_crosses_sections() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let from = t.section_index(&fall_2017()).expect("section");
    let to = t.section_index(&spring_2018()).expect("section");
    let class = t.in_progress_class("Ethics", fall_2017(), &[("Debates", 100.0)])?;
    t.sync()?;
    t.presenter.clear();

    t.book.move_class(class.id, &spring_2018())?;
    t.sync()?;

    assert!(t.section_rows(&fall_2017()).is_empty());
    assert_eq!(t.section_rows(&spring_2018()), vec![class.id]);
    assert_eq!(
        t.presenter.ops_for(from),
        vec![ViewOp::DeleteRows { section: from, rows: vec![0] }, ViewOp::ReloadSection(from)]
    );
    assert_eq!(
        t.presenter.ops_for(to),
        vec![ViewOp::InsertRows { section: to, rows: vec![0] }, ViewOp::ReloadSection(to)]
    );
    assert!(t.presenter.empty_states().is_empty());
    Ok(())
}

#[test]
fn favorite_toggle_is_a_modification() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let section = t.section_index(&Semester::new("Spring", 2016)).expect("section");
    let class = t.previous_class("Civics", Semester::new("Spring", 2016), 93.0, "A")?;
    t.sync()?;
    t.presenter.clear();

    t.book.set_favorite(class.id, true)?;
    t.sync()?;
    assert_eq!(t.book.favorites()?, vec![class.id]);
    assert_eq!(
        t.presenter.ops_for(section),
        vec![ViewOp::ReloadRows { section, rows: vec![0] }]
    );
    Ok(())
}

#[test]
fn editing_class_details_reloads_its_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let section = t.section_index(&fall_2017()).expect("section");
    let class = t.in_progress_class("Intro Bio", fall_2017(), &[("Labs", 100.0)])?;
    t.sync()?;
    t.presenter.clear();

    t.book.update_class(class.id, "Cell Biology", ClassType::HighSchool, 4)?;
    t.sync()?;
    let stored = t.stored(class.id)?;
    assert_eq!(stored.name, "Cell Biology");
    assert_eq!(stored.class_type, ClassType::HighSchool);
    assert_eq!(stored.credit_hours, 4);
    assert_eq!(
        t.presenter.ops_for(section),
        vec![ViewOp::ReloadRows { section, rows: vec![0] }]
    );

    assert!(matches!(
        t.book.update_class(class.id, "  ", ClassType::College, 3),
        Err(EngineError::Core(_))
    ));
    assert!(matches!(
        t.book.update_class(class.id, "Cell Biology", ClassType::College, 0),
        Err(EngineError::Core(_))
    ));
    let missing = t.book.update_class(gradepoint_core::ids::ClassId::new(), "Ghost", ClassType::College, 3);
    assert!(matches!(
        missing,
        Err(EngineError::Storage(gradepoint_storage::StorageError::NotFound(_)))
    ));
    assert_eq!(t.stored(class.id)?.name, "Cell Biology");
    Ok(())
}

#[test]
fn emptying_the_book_flips_empty_state_back() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestBook::new()?;
    let class = t.in_progress_class("Logic", spring_2018(), &[("Proofs", 100.0)])?;
    t.sync()?;
    t.delete(class.id)?;
    t.sync()?;
    assert_eq!(t.presenter.empty_states(), vec![true, false, true]);
    Ok(())
}

// ============================================================================
// Channel failures and teardown
// ============================================================================

fn class_in(semester: Semester) -> Result<Class, Box<dyn std::error::Error>> {
    Ok(Class::in_progress(
        "Rhetoric",
        ClassType::HighSchool,
        2,
        semester,
        vec![Rubric::new("Speeches", 100.0)?],
    )?)
}

#[test]
fn loaded_sections_start_from_stored_rows() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let existing = class_in(spring_2018())?;
    store.insert(&existing)?;

    let mut reconciler = Reconciler::load(&mut store, &[fall_2017(), spring_2018()])?;
    assert_eq!(reconciler.locate(existing.id), Some((1, 0)));
    assert_eq!(reconciler.total_rows(), 1);

    let mut presenter = RecordingPresenter::new();
    reconciler.subscribe_all(&mut store)?;
    store.deliver_notifications();
    reconciler.process(&mut presenter)?;
    assert_eq!(reconciler.section(1).map(|s| s.rows().to_vec()), Some(vec![existing.id]));
    assert_eq!(presenter.empty_states(), vec![false]);
    reconciler.teardown(&mut store);
    Ok(())
}

#[test]
fn failed_channel_halts_only_its_section() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let mut presenter = RecordingPresenter::new();
    let mut reconciler = Reconciler::load(&mut store, &[fall_2017(), spring_2018()])?;
    reconciler.subscribe_all(&mut store)?;
    store.deliver_notifications();
    reconciler.process(&mut presenter)?;

    let failure = reconciler.handle_event(0, &DiffEvent::Failed("store closed".into()), &mut presenter);
    assert!(matches!(failure, Err(EngineError::NotificationChannel { section: 0, .. })));

    let halted = class_in(fall_2017())?;
    let live = class_in(spring_2018())?;
    store.insert(&halted)?;
    store.insert(&live)?;
    store.deliver_notifications();
    reconciler.process(&mut presenter)?;

    assert!(reconciler.section(0).is_some_and(|s| s.is_halted() && s.rows().is_empty()));
    assert_eq!(reconciler.section(1).map(|s| s.rows().to_vec()), Some(vec![live.id]));
    reconciler.teardown(&mut store);
    Ok(())
}

#[test]
fn malformed_update_is_surfaced_not_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let mut presenter = RecordingPresenter::new();
    let mut reconciler = Reconciler::load(&mut store, &[fall_2017()])?;
    reconciler.handle_event(0, &DiffEvent::Initial { rows: Vec::new() }, &mut presenter)?;

    let bogus = DiffEvent::Updated(gradepoint_storage::ChangeSet {
        rows: Vec::new(),
        insertions: vec![0],
        deletions: Vec::new(),
        modifications: Vec::new(),
    });
    let result = reconciler.handle_event(0, &bogus, &mut presenter);
    assert!(matches!(result, Err(EngineError::NotificationChannel { .. })));
    assert_eq!(presenter.ops(), vec![ViewOp::ReloadSection(0)]);
    reconciler.teardown(&mut store);
    Ok(())
}

#[test]
fn teardown_releases_store_observers() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let mut reconciler = Reconciler::load(&mut store, &[fall_2017(), spring_2018()])?;
    reconciler.subscribe_all(&mut store)?;
    assert_eq!(store.subscription_count(), 2);

    reconciler.teardown(&mut store);
    assert_eq!(store.subscription_count(), 0);

    store.insert(&class_in(fall_2017())?)?;
    assert_eq!(store.deliver_notifications(), 0);
    Ok(())
}
