mod support;

use planr::batch::WriteBatch;
use planr::error::Error;
use planr::materialize::{materialize, DEFAULT_HORIZON_DAYS};
use planr::model::NewTask;
use planr::reconcile::delete_routine;

use support::{add_routine, day, monday, TestHome};

#[test]
fn deleting_routine_keeps_completed_history() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let store = home.store("u1");
    let gym = add_routine(&store, "Gym", &[1, 3], monday());
    let read = add_routine(&store, "Read", &[2], monday());
    let manual = store.create_task(NewTask::manual("Dentist", day(2024, 3, 6)))?;
    materialize(&store, monday(), DEFAULT_HORIZON_DAYS)?;

    let gym_tasks: Vec<_> = store
        .list_tasks()?
        .into_iter()
        .filter(|task| task.belongs_to(&gym))
        .collect();
    assert_eq!(gym_tasks.len(), 9);
    store.set_completed(&gym_tasks[0].id, true)?;
    store.set_completed(&gym_tasks[1].id, true)?;

    let report = delete_routine(&store, &gym)?;
    assert_eq!(report.title.as_deref(), Some("Gym"));
    assert!(!report.already_gone);
    assert_eq!(report.deleted_tasks.len(), 7);
    assert_eq!(report.preserved_tasks.len(), 2);

    let remaining = store.list_tasks()?;
    let leftover_gym: Vec<_> = remaining
        .iter()
        .filter(|task| task.belongs_to(&gym))
        .collect();
    assert_eq!(leftover_gym.len(), 2);
    assert!(leftover_gym.iter().all(|task| task.is_completed));
    // Completed history keeps its dangling back-reference.
    assert!(leftover_gym.iter().all(|task| task.is_routine));

    assert!(remaining.iter().any(|task| task.id == manual));
    assert_eq!(
        remaining.iter().filter(|task| task.belongs_to(&read)).count(),
        5
    );
    assert!(matches!(
        store.get_routine(&gym),
        Err(Error::NotFound { kind: "routine", .. })
    ));
    Ok(())
}

#[test]
fn deleted_routine_is_not_materialized_again() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let store = home.store("u1");
    let gym = add_routine(&store, "Gym", &[1], monday());
    materialize(&store, monday(), DEFAULT_HORIZON_DAYS)?;

    delete_routine(&store, &gym)?;
    let report = materialize(&store, monday(), DEFAULT_HORIZON_DAYS)?;
    assert_eq!(report.created_count(), 0);
    assert!(store.list_tasks()?.is_empty());
    Ok(())
}

#[test]
fn orphans_of_a_deleted_routine_are_cleaned_up() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let store = home.store("u1");
    let gym = add_routine(&store, "Gym", &[1], monday());
    materialize(&store, monday(), DEFAULT_HORIZON_DAYS)?;

    // Routine document removed on its own, instances left behind.
    assert!(store.delete_routine_record(&gym)?);
    assert_eq!(store.list_tasks()?.len(), 5);

    let report = delete_routine(&store, &gym)?;
    assert!(report.already_gone);
    assert_eq!(report.title, None);
    assert_eq!(report.deleted_tasks.len(), 5);
    assert!(store.list_tasks()?.is_empty());
    Ok(())
}

#[test]
fn unknown_routine_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let store = home.store("u1");

    let err = delete_routine(&store, "no-such-routine").unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "routine", .. }));
    Ok(())
}

#[test]
fn deletion_is_one_batch() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let store = home.store("u1");
    let gym = add_routine(&store, "Gym", &[1], monday());
    materialize(&store, monday(), DEFAULT_HORIZON_DAYS)?;
    let before = store.state()?;

    let report = delete_routine(&store, &gym)?;
    assert!(report.batch_id.is_some());

    let after = store.state()?;
    assert_eq!(after.tasks.revision, before.tasks.revision + 1);
    assert_eq!(after.routines.revision, before.routines.revision + 1);
    assert!(!home.storage("u1").journal_file().exists());
    Ok(())
}

#[test]
fn completed_only_routine_deletes_just_the_document() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let store = home.store("u1");
    let gym = add_routine(&store, "Gym", &[1], monday());
    materialize(&store, monday(), 1)?;

    let mut batch = WriteBatch::new();
    for task in store.list_tasks()? {
        batch.update_task(task.id, planr::model::TaskPatch::completed(true));
    }
    store.commit(batch)?;

    let report = delete_routine(&store, &gym)?;
    assert!(report.deleted_tasks.is_empty());
    assert_eq!(report.preserved_tasks.len(), 1);
    assert_eq!(store.list_tasks()?.len(), 1);
    assert!(store.list_routines()?.is_empty());
    Ok(())
}
