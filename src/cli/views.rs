//! Calendar views: day, week, month, overdue and stats.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::agenda::{self, DayAgenda, MonthCell, Stats};
use crate::calendar;
use crate::error::Result;
use crate::model::Task;
use crate::output::{emit_success, HumanOutput};

use super::task::task_line;
use super::Context;

const RECENT_HISTORY: usize = 5;

#[derive(Serialize)]
struct WeekOutput {
    start: NaiveDate,
    days: Vec<DayAgenda>,
}

#[derive(Serialize)]
struct MonthOutput {
    year: i32,
    month: u32,
    cells: Vec<MonthCell>,
}

#[derive(Serialize)]
struct OverdueOutput {
    today: NaiveDate,
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct StatsOutput {
    #[serde(flatten)]
    stats: Stats,
    recently_completed: Vec<Task>,
}

/// Open the store, top up routine instances, and return all tasks.
fn load_tasks(ctx: &Context) -> Result<Vec<Task>> {
    let store = ctx.store()?;
    ctx.auto_materialize(&store)?;
    store.list_tasks()
}

fn push_day(human: &mut HumanOutput, day: &DayAgenda, today: NaiveDate) {
    for task in day.due.iter().chain(day.completed.iter()) {
        human.push_detail(task_line(task, today));
    }
}

pub fn run_day(ctx: &Context, date: Option<&str>) -> Result<()> {
    let date = ctx.day_arg(date)?;
    let tasks = load_tasks(ctx)?;
    let day = agenda::day(&tasks, date);

    let mut human = HumanOutput::new(date.format("%A %Y-%m-%d").to_string());
    human.push_summary("Due", day.due.len().to_string());
    human.push_summary("Completed", day.completed.len().to_string());
    if day.is_empty() {
        human.push_detail("nothing scheduled");
    }
    push_day(&mut human, &day, ctx.today());

    emit_success(ctx.output, "day", &day, Some(&human))
}

pub fn run_week(ctx: &Context, date: Option<&str>) -> Result<()> {
    let anchor = ctx.day_arg(date)?;
    let tasks = load_tasks(ctx)?;
    let days = agenda::week(&tasks, anchor);
    let start = calendar::start_of_week(anchor);
    let today = ctx.today();

    let mut human = HumanOutput::new(format!("Week of {}", start.format("%Y-%m-%d")));
    let open: usize = days.iter().map(|day| day.due.len()).sum();
    let done: usize = days.iter().map(|day| day.completed.len()).sum();
    human.push_summary("Open", open.to_string());
    human.push_summary("Completed", done.to_string());
    for day in &days {
        let marker = if day.date == today { " (today)" } else { "" };
        human.push_detail(format!("{}{marker}", day.date.format("%a %d")));
        push_day(&mut human, day, today);
    }

    emit_success(ctx.output, "week", &WeekOutput { start, days }, Some(&human))
}

pub fn run_month(ctx: &Context, date: Option<&str>) -> Result<()> {
    let anchor = ctx.day_arg(date)?;
    let tasks = load_tasks(ctx)?;
    let cells = agenda::month(&tasks, anchor);
    let today = ctx.today();

    let mut human = HumanOutput::new(anchor.format("%B %Y").to_string());
    human.push_detail("Mon Tue Wed Thu Fri Sat Sun");
    for row in cells.chunks(7) {
        let line = row
            .iter()
            .map(|cell| month_cell_text(cell, today))
            .collect::<Vec<_>>()
            .join(" ");
        human.push_detail(line);
    }

    let output = MonthOutput {
        year: anchor.year(),
        month: anchor.month(),
        cells,
    };
    emit_success(ctx.output, "month", &output, Some(&human))
}

/// Three characters: day number, then `*` for open tasks, `+` when all
/// done, `<` for today. Days outside the month print as dots.
fn month_cell_text(cell: &MonthCell, today: NaiveDate) -> String {
    if !cell.in_month {
        return " . ".to_string();
    }
    let flag = if cell.date == today {
        '<'
    } else if cell.open > 0 {
        '*'
    } else if cell.completed > 0 {
        '+'
    } else {
        ' '
    };
    format!("{:>2}{flag}", cell.date.day())
}

pub fn run_overdue(ctx: &Context) -> Result<()> {
    let tasks = load_tasks(ctx)?;
    let today = ctx.today();
    let overdue = agenda::overdue(&tasks, today);

    let mut human = HumanOutput::new("Overdue tasks");
    human.push_summary("Total", overdue.len().to_string());
    for task in &overdue {
        human.push_detail(task_line(task, today));
    }
    if !overdue.is_empty() {
        human.push_next_step("planr task done <id>");
    }

    let output = OverdueOutput {
        today,
        total: overdue.len(),
        tasks: overdue,
    };
    emit_success(ctx.output, "overdue", &output, Some(&human))
}

pub fn run_stats(ctx: &Context) -> Result<()> {
    let tasks = load_tasks(ctx)?;
    let today = ctx.today();
    let stats = agenda::stats(&tasks, today);
    let mut recently_completed = agenda::completed_history(&tasks);
    recently_completed.truncate(RECENT_HISTORY);

    let mut human = HumanOutput::new("Stats");
    human.push_summary("Total", stats.total.to_string());
    human.push_summary("Completed", stats.completed.to_string());
    human.push_summary("Active", stats.active.to_string());
    human.push_summary("Overdue", stats.overdue.to_string());
    human.push_summary("Completion rate", format!("{}%", stats.rate));
    for task in &recently_completed {
        human.push_detail(task_line(task, today));
    }

    emit_success(
        ctx.output,
        "stats",
        &StatsOutput {
            stats,
            recently_completed,
        },
        Some(&human),
    )
}
