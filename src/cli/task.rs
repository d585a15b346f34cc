//! planr task command implementations.

use chrono::NaiveDate;
use serde::Serialize;

use crate::batch::WriteBatch;
use crate::error::{Error, Result};
use crate::model::{NewTask, RoutineRef, Task, TaskPatch};
use crate::output::{emit_success, HumanOutput};

use super::Context;

pub struct AddOptions {
    pub title: String,
    pub due: String,
}

pub struct ListOptions {
    pub all: bool,
    pub routine: Option<String>,
    pub date: Option<String>,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub due: Option<String>,
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct TaskShowOutput {
    #[serde(flatten)]
    task: Task,
    overdue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    routine_title: Option<String>,
    routine_deleted: bool,
}

#[derive(Serialize)]
struct TaskBatchOutput {
    ids: Vec<String>,
    changed: usize,
}

/// One display line: checkbox, due day, title, id.
pub(super) fn task_line(task: &Task, today: NaiveDate) -> String {
    let mark = if task.is_completed { "x" } else { " " };
    let mut line = format!(
        "[{mark}] {} {}  {}",
        task.due_date.format("%a %Y-%m-%d"),
        task.title,
        task.id
    );
    if task.is_routine {
        line.push_str(" (routine)");
    }
    if task.is_overdue(today) {
        line.push_str(" (overdue)");
    }
    line
}

fn sort_by_due(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let due = ctx.day_arg(Some(&options.due))?;
    let store = ctx.store()?;
    let id = store.create_task(NewTask::manual(options.title, due))?;
    let task = store.get_task(&id)?;

    let mut human = HumanOutput::new("Task created");
    human.push_summary("ID", task.id.clone());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Due", task.due_date.to_string());

    emit_success(ctx.output, "task add", &task, Some(&human))
}

pub fn run_list(ctx: &Context, options: ListOptions) -> Result<()> {
    let store = ctx.store()?;
    ctx.auto_materialize(&store)?;

    let routine_filter = match options.routine.as_deref() {
        Some(raw) => Some(store.resolve_routine_id(raw)?),
        None => None,
    };
    let date_filter = match options.date.as_deref() {
        Some(raw) => Some(ctx.day_arg(Some(raw))?),
        None => None,
    };

    let mut tasks: Vec<Task> = store
        .list_tasks()?
        .into_iter()
        .filter(|task| options.all || !task.is_completed)
        .filter(|task| {
            routine_filter
                .as_deref()
                .map_or(true, |routine_id| task.belongs_to(routine_id))
        })
        .filter(|task| date_filter.map_or(true, |date| task.due_date == date))
        .collect();
    sort_by_due(&mut tasks);

    let today = ctx.today();
    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Total", tasks.len().to_string());
    if let Some(routine_id) = &routine_filter {
        human.push_summary("Routine", routine_id.clone());
    }
    if let Some(date) = date_filter {
        human.push_summary("Due", date.to_string());
    }
    for task in &tasks {
        human.push_detail(task_line(task, today));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_success(ctx.output, "task ls", &output, Some(&human))
}

pub fn run_show(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.store()?;
    let state = store.state()?;
    let id = store.resolve_task_id(id)?;
    let task = state
        .tasks
        .items
        .iter()
        .find(|task| task.id == id)
        .cloned()
        .ok_or_else(|| Error::task_not_found(&id))?;

    let (routine_title, routine_deleted) = match task.routine_ref(&state.routines.items) {
        RoutineRef::Live(routine) => (Some(routine.title.clone()), false),
        RoutineRef::Gone(_) => (None, true),
        RoutineRef::None => (None, false),
    };

    let today = ctx.today();
    let mut human = HumanOutput::new(task.title.clone());
    human.push_summary("ID", task.id.clone());
    human.push_summary("Due", task.due_date.format("%a %Y-%m-%d").to_string());
    human.push_summary(
        "Status",
        if task.is_completed {
            "completed"
        } else if task.is_overdue(today) {
            "overdue"
        } else {
            "open"
        },
    );
    human.push_summary("Created", task.created_at.to_rfc3339());
    if let Some(title) = &routine_title {
        human.push_summary("Routine", title.clone());
    } else if routine_deleted {
        human.push_summary("Routine", "(deleted)");
    }

    let output = TaskShowOutput {
        overdue: task.is_overdue(today),
        task,
        routine_title,
        routine_deleted,
    };
    emit_success(ctx.output, "task show", &output, Some(&human))
}

pub fn run_edit(ctx: &Context, options: EditOptions) -> Result<()> {
    let patch = TaskPatch {
        title: options.title,
        due_date: match options.due.as_deref() {
            Some(raw) => Some(ctx.day_arg(Some(raw))?),
            None => None,
        },
        is_completed: None,
    };
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to change (use --title or --due)".to_string(),
        ));
    }

    let store = ctx.store()?;
    let id = store.resolve_task_id(&options.id)?;
    store.update_task(&id, patch)?;
    let task = store.get_task(&id)?;

    let mut human = HumanOutput::new("Task updated");
    human.push_summary("ID", task.id.clone());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Due", task.due_date.to_string());

    emit_success(ctx.output, "task edit", &task, Some(&human))
}

pub fn run_set_completed(ctx: &Context, ids: Vec<String>, done: bool) -> Result<()> {
    let store = ctx.store()?;
    let mut batch = WriteBatch::new();
    let mut resolved = Vec::with_capacity(ids.len());
    for raw in &ids {
        let id = store.resolve_task_id(raw)?;
        batch.update_task(id.clone(), TaskPatch::completed(done));
        resolved.push(id);
    }
    let committed = store.commit(batch)?;

    let command = if done { "task done" } else { "task reopen" };
    let verb = if done { "completed" } else { "reopened" };
    let output = TaskBatchOutput {
        changed: committed.ops.len(),
        ids: resolved,
    };

    let mut human = HumanOutput::new(format!("{} task(s) {verb}", output.changed));
    let unchanged = output.ids.len() - output.changed;
    if unchanged > 0 {
        human.push_detail(format!("{unchanged} already {verb}"));
    }
    emit_success(ctx.output, command, &output, Some(&human))
}

pub fn run_rm(ctx: &Context, ids: Vec<String>) -> Result<()> {
    let store = ctx.store()?;
    let mut batch = WriteBatch::new();
    let mut resolved = Vec::with_capacity(ids.len());
    for raw in &ids {
        let id = store.resolve_task_id(raw)?;
        batch.delete_task(id.clone());
        resolved.push(id);
    }
    let committed = store.commit(batch)?;

    let output = TaskBatchOutput {
        changed: committed.deleted_task_ids().len(),
        ids: resolved,
    };
    let mut human = HumanOutput::new(format!("{} task(s) deleted", output.changed));
    for id in &output.ids {
        human.push_detail(id.clone());
    }
    emit_success(ctx.output, "task rm", &output, Some(&human))
}
