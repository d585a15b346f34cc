//! Atomic multi-document batches
//!
//! A [`WriteBatch`] collects create/update/delete intents. Committing one:
//!
//! 1. takes the namespace lock,
//! 2. rolls forward any journal left by an interrupted commit,
//! 3. resolves the intents against the freshly loaded collections into
//!    concrete [`Op`]s, failing the whole batch on the first bad intent,
//! 4. writes the ops to `journal.json`,
//! 5. atomically replaces each changed collection file,
//! 6. removes the journal.
//!
//! Ops are idempotent (puts carry complete documents, deletes of absent ids
//! do nothing), so replaying a journal after a crash at any point between
//! steps 4 and 6 converges on the committed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::lock::{self, FileLock};
use crate::model::{new_id, NewRoutine, NewTask, Routine, RoutinePatch, Task, TaskPatch};
use crate::storage::{Collection, Storage};

const JOURNAL_SCHEMA_VERSION: &str = "planr.journal.v1";

/// A single intent inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateTask { id: String, task: NewTask },
    UpdateTask { id: String, patch: TaskPatch },
    DeleteTask { id: String },
    CreateRoutine { id: String, routine: NewRoutine },
    UpdateRoutine { id: String, patch: RoutinePatch },
    DeleteRoutine { id: String },
}

/// Ordered set of writes committed as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a task; its id is assigned now so it can be journaled.
    pub fn create_task(&mut self, task: NewTask) -> String {
        let id = new_id();
        self.writes.push(Write::CreateTask {
            id: id.clone(),
            task,
        });
        id
    }

    pub fn update_task(&mut self, id: impl Into<String>, patch: TaskPatch) {
        self.writes.push(Write::UpdateTask {
            id: id.into(),
            patch,
        });
    }

    pub fn delete_task(&mut self, id: impl Into<String>) {
        self.writes.push(Write::DeleteTask { id: id.into() });
    }

    pub fn create_routine(&mut self, routine: NewRoutine) -> String {
        let id = new_id();
        self.writes.push(Write::CreateRoutine {
            id: id.clone(),
            routine,
        });
        id
    }

    pub fn update_routine(&mut self, id: impl Into<String>, patch: RoutinePatch) {
        self.writes.push(Write::UpdateRoutine {
            id: id.into(),
            patch,
        });
    }

    pub fn delete_routine(&mut self, id: impl Into<String>) {
        self.writes.push(Write::DeleteRoutine { id: id.into() });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Turn intents into ops against `state`, validating every one.
    ///
    /// Works on a scratch copy so later writes see earlier ones; `state`
    /// itself is untouched.
    pub fn resolve(&self, state: &StoreState, now: DateTime<Utc>) -> Result<Vec<Op>> {
        let mut tasks = state.tasks.items.clone();
        let mut routines = state.routines.items.clone();
        let mut ops = Vec::with_capacity(self.writes.len());

        for write in &self.writes {
            match write {
                Write::CreateTask { id, task } => {
                    if tasks.iter().any(|existing| &existing.id == id) {
                        return Err(Error::Validation(format!("task id {id} already exists")));
                    }
                    let task = task.clone().into_task(id.clone(), now)?;
                    tasks.push(task.clone());
                    ops.push(Op::PutTask {
                        task,
                        created: true,
                    });
                }
                Write::UpdateTask { id, patch } => {
                    let task = tasks
                        .iter_mut()
                        .find(|task| &task.id == id)
                        .ok_or_else(|| Error::task_not_found(id.clone()))?;
                    if patch.apply(task)? {
                        ops.push(Op::PutTask {
                            task: task.clone(),
                            created: false,
                        });
                    }
                }
                Write::DeleteTask { id } => {
                    let before = tasks.len();
                    tasks.retain(|task| &task.id != id);
                    if tasks.len() != before {
                        ops.push(Op::DeleteTask { id: id.clone() });
                    }
                }
                Write::CreateRoutine { id, routine } => {
                    if routines.iter().any(|existing| &existing.id == id) {
                        return Err(Error::Validation(format!(
                            "routine id {id} already exists"
                        )));
                    }
                    let routine = routine.clone().into_routine(id.clone(), now)?;
                    routines.push(routine.clone());
                    ops.push(Op::PutRoutine {
                        routine,
                        created: true,
                    });
                }
                Write::UpdateRoutine { id, patch } => {
                    let routine = routines
                        .iter_mut()
                        .find(|routine| &routine.id == id)
                        .ok_or_else(|| Error::routine_not_found(id.clone()))?;
                    if patch.apply(routine)? {
                        ops.push(Op::PutRoutine {
                            routine: routine.clone(),
                            created: false,
                        });
                    }
                }
                Write::DeleteRoutine { id } => {
                    let before = routines.len();
                    routines.retain(|routine| &routine.id != id);
                    if routines.len() != before {
                        ops.push(Op::DeleteRoutine { id: id.clone() });
                    }
                }
            }
        }

        Ok(ops)
    }
}

/// A resolved, idempotent document operation as stored in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    PutTask { task: Task, created: bool },
    DeleteTask { id: String },
    PutRoutine { routine: Routine, created: bool },
    DeleteRoutine { id: String },
}

/// Both collections of a namespace as loaded from disk
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub tasks: Collection<Task>,
    pub routines: Collection<Routine>,
}

impl StoreState {
    pub fn load(storage: &Storage) -> Result<Self> {
        Ok(Self {
            tasks: storage.load_collection(&storage.tasks_file())?,
            routines: storage.load_collection(&storage.routines_file())?,
        })
    }

    /// Apply ops, bumping the revision of each collection whose items
    /// actually changed. Returns `(tasks_changed, routines_changed)`.
    pub fn apply(&mut self, ops: &[Op], now: DateTime<Utc>) -> (bool, bool) {
        let tasks_before = self.tasks.items.clone();
        let routines_before = self.routines.items.clone();

        for op in ops {
            match op {
                Op::PutTask { task, .. } => upsert(&mut self.tasks.items, task, |t| &t.id),
                Op::DeleteTask { id } => self.tasks.items.retain(|task| &task.id != id),
                Op::PutRoutine { routine, .. } => {
                    upsert(&mut self.routines.items, routine, |r| &r.id)
                }
                Op::DeleteRoutine { id } => {
                    self.routines.items.retain(|routine| &routine.id != id)
                }
            }
        }

        let tasks_changed = self.tasks.items != tasks_before;
        let routines_changed = self.routines.items != routines_before;
        if tasks_changed {
            self.tasks.bump(now);
        }
        if routines_changed {
            self.routines.bump(now);
        }
        (tasks_changed, routines_changed)
    }

    fn persist(&self, storage: &Storage, tasks: bool, routines: bool) -> Result<()> {
        if tasks {
            storage.write_json(&storage.tasks_file(), &self.tasks)?;
        }
        if routines {
            storage.write_json(&storage.routines_file(), &self.routines)?;
        }
        Ok(())
    }
}

fn upsert<T: Clone>(items: &mut Vec<T>, doc: &T, id: impl Fn(&T) -> &String) {
    match items.iter_mut().find(|item| id(item) == id(doc)) {
        Some(slot) => *slot = doc.clone(),
        None => items.push(doc.clone()),
    }
}

/// Write-ahead record of a batch being committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub schema_version: String,
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub ops: Vec<Op>,
}

impl Journal {
    pub fn new(ops: Vec<Op>, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION.to_string(),
            batch_id: Uuid::new_v4(),
            created_at: now,
            ops,
        }
    }
}

/// Outcome of a commit
#[derive(Debug, Clone, Default)]
pub struct Committed {
    /// `None` when nothing needed writing
    pub batch_id: Option<Uuid>,
    pub ops: Vec<Op>,
    /// Collection revisions after the commit
    pub task_revision: u64,
    pub routine_revision: u64,
}

impl Committed {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ids of tasks this batch created, in staging order.
    pub fn created_task_ids(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::PutTask {
                    task,
                    created: true,
                } => Some(task.id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_task_ids(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::DeleteTask { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Commit a batch computed from the locked, up-to-date state.
///
/// `build` sees the collections as they are on disk after recovery and
/// returns the batch plus a value passed back to the caller. An empty batch
/// (or one whose writes change nothing) writes no file.
pub fn commit_with<R, F>(
    storage: &Storage,
    lock_timeout_ms: u64,
    build: F,
) -> Result<(Committed, R)>
where
    F: FnOnce(&StoreState) -> Result<(WriteBatch, R)>,
{
    storage.ensure_ready()?;
    let _lock = FileLock::acquire(storage.lock_file(), lock_timeout_ms)?;

    recover_locked(storage)?;
    let mut state = StoreState::load(storage)?;
    let (batch, value) = build(&state)?;

    let mut committed = Committed {
        batch_id: None,
        ops: Vec::new(),
        task_revision: state.tasks.revision,
        routine_revision: state.routines.revision,
    };
    if batch.is_empty() {
        return Ok((committed, value));
    }

    let now = Utc::now();
    let ops = batch.resolve(&state, now)?;
    if ops.is_empty() {
        debug!(writes = batch.len(), "batch resolved to no changes");
        return Ok((committed, value));
    }

    let journal = Journal::new(ops, now);
    storage
        .write_json(&storage.journal_file(), &journal)
        .map_err(|err| Error::BatchCommit(format!("writing journal: {err}")))?;

    let (tasks_changed, routines_changed) = state.apply(&journal.ops, now);
    state
        .persist(storage, tasks_changed, routines_changed)
        .map_err(|err| {
            Error::BatchCommit(format!(
                "batch {} interrupted, will be replayed: {err}",
                journal.batch_id
            ))
        })?;
    lock::remove_if_exists(storage.journal_file())?;

    debug!(
        batch = %journal.batch_id,
        ops = journal.ops.len(),
        task_revision = state.tasks.revision,
        routine_revision = state.routines.revision,
        "batch committed"
    );

    committed.batch_id = Some(journal.batch_id);
    committed.ops = journal.ops;
    committed.task_revision = state.tasks.revision;
    committed.routine_revision = state.routines.revision;
    Ok((committed, value))
}

/// Commit a prebuilt batch.
pub fn commit(storage: &Storage, lock_timeout_ms: u64, batch: WriteBatch) -> Result<Committed> {
    commit_with(storage, lock_timeout_ms, |_| Ok((batch, ()))).map(|(committed, ())| committed)
}

/// Replay a leftover journal, if any, under the namespace lock.
pub fn recover(storage: &Storage, lock_timeout_ms: u64) -> Result<Option<Uuid>> {
    if !storage.is_ready() || !storage.journal_file().exists() {
        return Ok(None);
    }
    let _lock = FileLock::acquire(storage.lock_file(), lock_timeout_ms)?;
    recover_locked(storage)
}

fn recover_locked(storage: &Storage) -> Result<Option<Uuid>> {
    let journal: Journal = match storage.read_json(&storage.journal_file())? {
        Some(journal) => journal,
        None => return Ok(None),
    };

    warn!(
        batch = %journal.batch_id,
        ops = journal.ops.len(),
        "replaying interrupted batch"
    );

    let mut state = StoreState::load(storage)?;
    let (tasks_changed, routines_changed) = state.apply(&journal.ops, Utc::now());
    state.persist(storage, tasks_changed, routines_changed)?;
    lock::remove_if_exists(storage.journal_file())?;
    Ok(Some(journal.batch_id))
}
