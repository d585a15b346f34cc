//! Routine deletion.
//!
//! Deleting a routine removes its incomplete instances and the routine
//! document in one batch. Completed instances stay as history; their
//! `routineId` then dangles.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::batch::WriteBatch;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::model::Task;
use crate::store::Store;

/// Which instances of a routine go and which stay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    pub routine_id: String,
    /// Incomplete instances to delete
    pub delete: Vec<String>,
    /// Completed instances kept as history
    pub preserve: Vec<String>,
}

pub fn plan_deletion(routine_id: &str, tasks: &[Task]) -> DeletionPlan {
    let mut plan = DeletionPlan {
        routine_id: routine_id.to_string(),
        ..DeletionPlan::default()
    };
    for task in tasks.iter().filter(|task| task.belongs_to(routine_id)) {
        if task.is_completed {
            plan.preserve.push(task.id.clone());
        } else {
            plan.delete.push(task.id.clone());
        }
    }
    plan
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub routine_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The routine document was already gone; only orphans were removed
    pub already_gone: bool,
    pub deleted_tasks: Vec<String>,
    pub preserved_tasks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
}

/// Delete a routine together with its incomplete instances.
///
/// The deletion set is computed under the writer lock, in the same batch as
/// the routine delete. An unknown routine id with leftover incomplete
/// instances cleans those up; with none it is `NotFound`.
pub fn delete_routine(store: &Store, routine_id: &str) -> Result<ReconcileReport> {
    store.ensure_ready()?;

    let (committed, (title, plan)) = store.commit_with(|state| {
        let title = state
            .routines
            .items
            .iter()
            .find(|routine| routine.id == routine_id)
            .map(|routine| routine.title.clone());
        let plan = plan_deletion(routine_id, &state.tasks.items);

        if title.is_none() && plan.delete.is_empty() {
            return Err(Error::routine_not_found(routine_id));
        }

        let mut batch = WriteBatch::new();
        for id in &plan.delete {
            batch.delete_task(id.clone());
        }
        if title.is_some() {
            batch.delete_routine(routine_id);
        }
        Ok((batch, (title, plan)))
    })?;

    let report = ReconcileReport {
        routine_id: routine_id.to_string(),
        already_gone: title.is_none(),
        title,
        deleted_tasks: committed.deleted_task_ids(),
        preserved_tasks: plan.preserve,
        batch_id: committed.batch_id,
    };

    info!(
        routine = %report.routine_id,
        deleted = report.deleted_tasks.len(),
        preserved = report.preserved_tasks.len(),
        already_gone = report.already_gone,
        "routine deleted"
    );
    if let Ok(event) = Event::new(EventKind::RoutineReconciled, None).with_data(&report) {
        store.emit(&event);
    }

    Ok(report)
}
