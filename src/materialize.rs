//! Routine materialization
//!
//! Keeps every routine expanded into concrete tasks over a rolling horizon
//! `[today, today + horizon_days)`. For each routine and each qualifying day
//! (on or after the start date, weekday in the frequency) there must be at
//! least one task tagged with that routine and due that day. A pass only
//! creates the missing `(routine, day)` slots, so a second pass over an
//! unchanged store stages nothing and writes nothing.
//!
//! Slots are keyed on the routine id alone: a manual task, or a task of
//! another routine, due the same day does not fill the slot.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::batch::WriteBatch;
use crate::calendar;
use crate::error::Result;
use crate::events::{Event, EventKind};
use crate::model::{NewTask, Routine, Task};
use crate::store::Store;

/// Default planning horizon in days
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

/// Instances missing from `tasks` for `routines` over the horizon, in
/// routine order then date order.
pub fn plan_missing(
    routines: &[Routine],
    tasks: &[Task],
    today: NaiveDate,
    horizon_days: u32,
    now: DateTime<Utc>,
) -> Vec<NewTask> {
    let mut filled: HashSet<(&str, NaiveDate)> = tasks
        .iter()
        .filter_map(|task| task.routine_id.as_deref().map(|id| (id, task.due_date)))
        .collect();

    let mut missing = Vec::new();
    for routine in routines {
        for day in calendar::days_from(today, horizon_days) {
            if !routine.occurs_on(day) {
                continue;
            }
            if filled.insert((routine.id.as_str(), day)) {
                missing.push(NewTask::for_routine(routine, day).stamped(now));
            }
        }
    }
    missing
}

/// Result of one materialization pass
#[derive(Debug, Clone, Serialize)]
pub struct MaterializeReport {
    /// True when the store was not ready and the pass did nothing
    pub skipped: bool,
    pub routines: usize,
    pub horizon_start: NaiveDate,
    pub horizon_days: u32,
    pub created: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    pub task_revision: u64,
}

impl MaterializeReport {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }
}

/// Run one pass: compute the missing instances against the locked store
/// state and commit them as a single batch.
///
/// The diff is recomputed under the writer lock, so concurrent passes from
/// other sessions never both create the same slot.
pub fn materialize(
    store: &Store,
    today: NaiveDate,
    horizon_days: u32,
) -> Result<MaterializeReport> {
    if !store.is_ready() {
        debug!("store not ready, skipping materialization");
        return Ok(MaterializeReport {
            skipped: true,
            routines: 0,
            horizon_start: today,
            horizon_days,
            created: Vec::new(),
            batch_id: None,
            task_revision: 0,
        });
    }

    let now = Utc::now();
    let (committed, routines) = store.commit_with(|state| {
        let mut batch = WriteBatch::new();
        for task in plan_missing(
            &state.routines.items,
            &state.tasks.items,
            today,
            horizon_days,
            now,
        ) {
            batch.create_task(task);
        }
        Ok((batch, state.routines.items.len()))
    })?;

    let report = MaterializeReport {
        skipped: false,
        routines,
        horizon_start: today,
        horizon_days,
        created: committed.created_task_ids(),
        batch_id: committed.batch_id,
        task_revision: committed.task_revision,
    };

    if report.created.is_empty() {
        debug!(routines, %today, "horizon already materialized");
    } else {
        info!(
            created = report.created.len(),
            routines,
            %today,
            horizon_days,
            "materialized routine instances"
        );
        if let Ok(event) = Event::new(EventKind::RoutinesMaterialized, None).with_data(&report) {
            store.emit(&event);
        }
    }

    Ok(report)
}
