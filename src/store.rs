//! Task and routine stores over the file-backed namespace.
//!
//! Writes always go through [`crate::batch`]; a single-document operation is
//! a batch of one. Reads come straight from the collection files, which are
//! only ever replaced atomically.
//!
//! Each collection also has a live feed: a `tokio::sync::watch` channel that
//! carries the latest [`Snapshot`]. Commits made through this handle publish
//! right away; commits from other processes arrive through
//! [`crate::watch`], which calls [`Store::refresh`].

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::batch::{self, Committed, StoreState, WriteBatch};
use crate::error::{Error, Result};
use crate::events::{self, Event, EventSink};
use crate::model::{NewRoutine, NewTask, Routine, RoutinePatch, Task, TaskPatch};
use crate::storage::Storage;

/// One emission of a live feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    /// Collection revision the items were read at
    pub revision: u64,
    /// False until the first read completed
    pub loaded: bool,
    pub items: Vec<T>,
}

impl<T> Snapshot<T> {
    pub fn loading() -> Self {
        Self {
            revision: 0,
            loaded: false,
            items: Vec::new(),
        }
    }

    pub fn loaded(revision: u64, items: Vec<T>) -> Self {
        Self {
            revision,
            loaded: true,
            items,
        }
    }
}

/// Handle to one user's task and routine collections. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    lock_timeout_ms: u64,
    tasks: watch::Sender<Snapshot<Task>>,
    routines: watch::Sender<Snapshot<Routine>>,
    events: Mutex<Option<EventSink>>,
}

impl Store {
    /// Open the namespace, replaying any interrupted batch.
    ///
    /// Opening a namespace that is not ready succeeds; reads then see empty
    /// collections and writes fail with `StoreUnavailable`.
    pub fn open(storage: Storage, lock_timeout_ms: u64) -> Result<Self> {
        if let Some(batch_id) = batch::recover(&storage, lock_timeout_ms)? {
            warn!(batch = %batch_id, "recovered interrupted batch on open");
        }
        let (tasks, _) = watch::channel(Snapshot::loading());
        let (routines, _) = watch::channel(Snapshot::loading());
        Ok(Self {
            inner: Arc::new(Inner {
                storage,
                lock_timeout_ms,
                tasks,
                routines,
                events: Mutex::new(None),
            }),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn is_ready(&self) -> bool {
        self.inner.storage.is_ready()
    }

    pub fn ensure_ready(&self) -> Result<()> {
        self.inner.storage.ensure_ready()
    }

    /// Send a JSONL event for every committed change from now on.
    pub fn set_event_sink(&self, sink: EventSink) {
        if let Ok(mut guard) = self.inner.events.lock() {
            *guard = Some(sink);
        }
    }

    /// Emit an event if a sink is attached. Failures are logged, not returned:
    /// the change they describe is already durable.
    pub fn emit(&self, event: &Event) {
        let Ok(mut guard) = self.inner.events.lock() else {
            return;
        };
        if let Some(sink) = guard.as_mut() {
            if let Err(err) = sink.emit(event) {
                warn!(error = %err, "failed to emit event");
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Both collections as currently on disk.
    pub fn state(&self) -> Result<StoreState> {
        StoreState::load(&self.inner.storage)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.state()?.tasks.items)
    }

    pub fn list_routines(&self) -> Result<Vec<Routine>> {
        Ok(self.state()?.routines.items)
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        self.list_tasks()?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| Error::task_not_found(id))
    }

    pub fn get_routine(&self, id: &str) -> Result<Routine> {
        self.list_routines()?
            .into_iter()
            .find(|routine| routine.id == id)
            .ok_or_else(|| Error::routine_not_found(id))
    }

    /// Resolve a full id or unique prefix to a task id.
    pub fn resolve_task_id(&self, input: &str) -> Result<String> {
        let tasks = self.list_tasks()?;
        resolve_id(tasks.iter().map(|task| task.id.as_str()), input, "task")
    }

    /// Resolve a full id or unique prefix to a routine id.
    ///
    /// An unknown id is passed through unchanged so the deletion reconciler
    /// can still clean up instances of an already deleted routine.
    pub fn resolve_routine_id(&self, input: &str) -> Result<String> {
        let routines = self.list_routines()?;
        match resolve_id(routines.iter().map(|r| r.id.as_str()), input, "routine") {
            Err(Error::NotFound { .. }) => Ok(input.trim().to_lowercase()),
            other => other,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Commit a batch and publish the new snapshots.
    pub fn commit(&self, batch: WriteBatch) -> Result<Committed> {
        self.commit_with(|_| Ok((batch, ()))).map(|(committed, ())| committed)
    }

    /// Build a batch from the locked, current state and commit it.
    pub fn commit_with<R, F>(&self, build: F) -> Result<(Committed, R)>
    where
        F: FnOnce(&StoreState) -> Result<(WriteBatch, R)>,
    {
        let (committed, value) =
            batch::commit_with(&self.inner.storage, self.inner.lock_timeout_ms, build)?;
        if !committed.is_empty() {
            for event in events::for_ops(&committed.ops) {
                self.emit(&event);
            }
            if let Err(err) = self.refresh() {
                warn!(error = %err, "failed to publish snapshot after commit");
            }
        }
        Ok((committed, value))
    }

    pub fn create_task(&self, task: NewTask) -> Result<String> {
        let mut batch = WriteBatch::new();
        let id = batch.create_task(task);
        self.commit(batch)?;
        Ok(id)
    }

    /// Fails with `NotFound` for an unknown id.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update_task(id, patch);
        self.commit(batch).map(|_| ())
    }

    pub fn set_completed(&self, id: &str, done: bool) -> Result<()> {
        self.update_task(id, TaskPatch::completed(done))
    }

    /// Idempotent; returns whether the task existed.
    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let mut batch = WriteBatch::new();
        batch.delete_task(id);
        Ok(!self.commit(batch)?.is_empty())
    }

    pub fn create_routine(&self, routine: NewRoutine) -> Result<String> {
        let mut batch = WriteBatch::new();
        let id = batch.create_routine(routine);
        self.commit(batch)?;
        Ok(id)
    }

    pub fn update_routine(&self, id: &str, patch: RoutinePatch) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update_routine(id, patch);
        self.commit(batch).map(|_| ())
    }

    /// Remove only the routine document. Use
    /// [`crate::reconcile::delete_routine`] to also drop its open instances.
    pub fn delete_routine_record(&self, id: &str) -> Result<bool> {
        let mut batch = WriteBatch::new();
        batch.delete_routine(id);
        Ok(!self.commit(batch)?.is_empty())
    }

    // =========================================================================
    // Live feeds
    // =========================================================================

    pub fn subscribe_tasks(&self) -> watch::Receiver<Snapshot<Task>> {
        self.inner.tasks.subscribe()
    }

    pub fn subscribe_routines(&self) -> watch::Receiver<Snapshot<Routine>> {
        self.inner.routines.subscribe()
    }

    /// Re-read both collections and publish any whose revision moved (or
    /// that had not been loaded yet). Returns whether anything was published.
    pub fn refresh(&self) -> Result<bool> {
        let state = self.state()?;
        let tasks = publish(&self.inner.tasks, state.tasks.revision, state.tasks.items);
        let routines = publish(
            &self.inner.routines,
            state.routines.revision,
            state.routines.items,
        );
        if tasks || routines {
            debug!(
                task_revision = state.tasks.revision,
                routine_revision = state.routines.revision,
                "published snapshots"
            );
        }
        Ok(tasks || routines)
    }
}

/// Feeds only move forward: a snapshot read before a newer commit was
/// published is dropped.
fn publish<T>(sender: &watch::Sender<Snapshot<T>>, revision: u64, items: Vec<T>) -> bool {
    sender.send_if_modified(|current| {
        if current.loaded && current.revision >= revision {
            return false;
        }
        *current = Snapshot::loaded(revision, items);
        true
    })
}

fn resolve_id<'a>(
    ids: impl Iterator<Item = &'a str>,
    input: &str,
    kind: &'static str,
) -> Result<String> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return Err(Error::InvalidArgument(format!("{kind} id cannot be empty")));
    }

    let mut matches = Vec::new();
    for id in ids {
        if id == needle {
            return Ok(id.to_string());
        }
        if id.starts_with(&needle) {
            matches.push(id.to_string());
        }
    }

    matches.sort();
    matches.dedup();
    match matches.len() {
        0 => Err(Error::NotFound {
            kind,
            id: input.trim().to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::InvalidArgument(format!(
            "ambiguous {kind} id '{}': {}",
            input.trim(),
            matches.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeekdaySet;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn open(temp: &TempDir) -> Store {
        let storage = Storage::new(temp.path(), "default", "u1").unwrap();
        storage.init_namespace().unwrap();
        Store::open(storage, 1000).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn task_crud() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let id = store.create_task(NewTask::manual("Read", day())).unwrap();
        assert_eq!(store.get_task(&id).unwrap().title, "Read");

        store.set_completed(&id, true).unwrap();
        assert!(store.get_task(&id).unwrap().is_completed);

        assert!(store.delete_task(&id).unwrap());
        assert!(!store.delete_task(&id).unwrap());
        assert!(matches!(
            store.get_task(&id),
            Err(Error::NotFound { kind: "task", .. })
        ));
    }

    #[test]
    fn update_unknown_task_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        let err = store
            .update_task("missing", TaskPatch::completed(true))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn create_with_empty_title_is_validation_error() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        assert!(matches!(
            store.create_routine(NewRoutine::new("", WeekdaySet::ALL, day())),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn feeds_start_loading_and_publish_after_commit() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        let tasks = store.subscribe_tasks();
        assert!(!tasks.borrow().loaded);

        store.create_task(NewTask::manual("a", day())).unwrap();
        let snapshot = tasks.borrow().clone();
        assert!(snapshot.loaded);
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.items.len(), 1);

        // Nothing changed on disk, nothing new to publish.
        assert!(!store.refresh().unwrap());
    }

    #[test]
    fn publish_ignores_older_revisions() {
        let (tx, rx) = watch::channel(Snapshot::<u32>::loading());

        assert!(publish(&tx, 6, vec![1, 2]));
        assert!(!publish(&tx, 5, vec![1]));
        assert!(!publish(&tx, 6, vec![1]));
        assert_eq!(rx.borrow().revision, 6);
        assert_eq!(rx.borrow().items, vec![1, 2]);

        assert!(publish(&tx, 7, vec![3]));
        assert_eq!(rx.borrow().revision, 7);
    }

    #[test]
    fn prefix_resolution() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        let id = store.create_task(NewTask::manual("a", day())).unwrap();

        assert_eq!(store.resolve_task_id(&id[..12]).unwrap(), id);
        assert_eq!(store.resolve_task_id(&id.to_uppercase()).unwrap(), id);
        assert!(matches!(
            store.resolve_task_id("zzzz"),
            Err(Error::NotFound { .. })
        ));
        assert_eq!(store.resolve_routine_id("gone").unwrap(), "gone");
    }

    #[test]
    fn unready_namespace_reads_empty_and_refuses_writes() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path(), "default", "nobody").unwrap();
        let store = Store::open(storage, 1000).unwrap();

        assert!(store.list_tasks().unwrap().is_empty());
        assert!(matches!(
            store.create_task(NewTask::manual("a", day())),
            Err(Error::StoreUnavailable(_))
        ));
    }
}
