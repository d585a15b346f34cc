//! planr routine command implementations.

use serde::Serialize;

use crate::agenda;
use crate::error::{Error, Result};
use crate::materialize::MaterializeReport;
use crate::model::{NewRoutine, Routine, RoutinePatch, WeekdaySet};
use crate::output::{emit_success, HumanOutput};
use crate::reconcile;

use super::Context;

pub struct AddOptions {
    pub title: String,
    pub days: String,
    pub start: String,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub days: Option<String>,
    pub start: Option<String>,
}

#[derive(Serialize)]
struct RoutineChangedOutput {
    routine: Routine,
    #[serde(skip_serializing_if = "Option::is_none")]
    materialized: Option<MaterializeReport>,
}

#[derive(Serialize)]
struct RoutineRow {
    #[serde(flatten)]
    routine: Routine,
    open_instances: usize,
    completed_instances: usize,
}

#[derive(Serialize)]
struct RoutineListOutput {
    total: usize,
    routines: Vec<RoutineRow>,
}

fn push_materialized(human: &mut HumanOutput, report: Option<&MaterializeReport>) {
    if let Some(report) = report {
        if report.created_count() > 0 {
            human.push_detail(format!(
                "{} instance(s) scheduled over the next {} days",
                report.created_count(),
                report.horizon_days
            ));
        }
    }
}

pub fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let frequency = WeekdaySet::parse(&options.days)?;
    let start = ctx.day_arg(Some(&options.start))?;

    let store = ctx.store()?;
    let id = store.create_routine(NewRoutine::new(options.title, frequency, start))?;
    let materialized = ctx.auto_materialize(&store)?;
    let routine = store.get_routine(&id)?;

    let mut human = HumanOutput::new("Routine created");
    human.push_summary("ID", routine.id.clone());
    human.push_summary("Title", routine.title.clone());
    human.push_summary("Days", agenda::frequency_label(&routine.frequency));
    human.push_summary("Starts", routine.start_date.to_string());
    push_materialized(&mut human, materialized.as_ref());

    emit_success(
        ctx.output,
        "routine add",
        &RoutineChangedOutput {
            routine,
            materialized,
        },
        Some(&human),
    )
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let state = store.state()?;

    let mut routines = state.routines.items;
    routines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let rows: Vec<RoutineRow> = routines
        .into_iter()
        .map(|routine| {
            let (completed, open) = state
                .tasks
                .items
                .iter()
                .filter(|task| task.belongs_to(&routine.id))
                .fold((0, 0), |(done, open), task| {
                    if task.is_completed {
                        (done + 1, open)
                    } else {
                        (done, open + 1)
                    }
                });
            RoutineRow {
                routine,
                open_instances: open,
                completed_instances: completed,
            }
        })
        .collect();

    let mut human = HumanOutput::new("Routines");
    human.push_summary("Total", rows.len().to_string());
    for row in &rows {
        human.push_detail(format!(
            "{} [{}] from {}  {} ({} open, {} done)",
            row.routine.title,
            agenda::frequency_label(&row.routine.frequency),
            row.routine.start_date,
            row.routine.id,
            row.open_instances,
            row.completed_instances
        ));
    }

    emit_success(
        ctx.output,
        "routine ls",
        &RoutineListOutput {
            total: rows.len(),
            routines: rows,
        },
        Some(&human),
    )
}

pub fn run_edit(ctx: &Context, options: EditOptions) -> Result<()> {
    let patch = RoutinePatch {
        title: options.title,
        frequency: options.days.as_deref().map(WeekdaySet::parse).transpose()?,
        start_date: match options.start.as_deref() {
            Some(raw) => Some(ctx.day_arg(Some(raw))?),
            None => None,
        },
    };
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to change (use --title, --days or --start)".to_string(),
        ));
    }

    let store = ctx.store()?;
    let id = store.resolve_routine_id(&options.id)?;
    store.update_routine(&id, patch)?;
    let materialized = ctx.auto_materialize(&store)?;
    let routine = store.get_routine(&id)?;

    let mut human = HumanOutput::new("Routine updated");
    human.push_summary("ID", routine.id.clone());
    human.push_summary("Title", routine.title.clone());
    human.push_summary("Days", agenda::frequency_label(&routine.frequency));
    human.push_summary("Starts", routine.start_date.to_string());
    human.push_detail("existing instances keep their title and date");
    push_materialized(&mut human, materialized.as_ref());

    emit_success(
        ctx.output,
        "routine edit",
        &RoutineChangedOutput {
            routine,
            materialized,
        },
        Some(&human),
    )
}

pub fn run_rm(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.store()?;
    let id = store.resolve_routine_id(id)?;
    let report = reconcile::delete_routine(&store, &id)?;

    let header = match &report.title {
        Some(title) => format!("Routine deleted: {title}"),
        None => "Routine already gone; removed leftover instances".to_string(),
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("ID", report.routine_id.clone());
    human.push_summary("Deleted tasks", report.deleted_tasks.len().to_string());
    human.push_summary("Kept completed", report.preserved_tasks.len().to_string());

    emit_success(ctx.output, "routine rm", &report, Some(&human))
}
