//! Read-side views over the task collection.

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar;
use crate::model::{Task, WeekdaySet};

/// Tasks due on one day, split by completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAgenda {
    pub date: NaiveDate,
    pub due: Vec<Task>,
    pub completed: Vec<Task>,
}

impl DayAgenda {
    pub fn is_empty(&self) -> bool {
        self.due.is_empty() && self.completed.is_empty()
    }
}

/// One cell of the month view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub open: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub overdue: usize,
    /// Completion rate in whole percent
    pub rate: u32,
}

fn by_creation(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

pub fn day(tasks: &[Task], date: NaiveDate) -> DayAgenda {
    let (mut completed, mut due): (Vec<Task>, Vec<Task>) = tasks
        .iter()
        .filter(|task| task.due_date == date)
        .cloned()
        .partition(|task| task.is_completed);
    by_creation(&mut due);
    by_creation(&mut completed);
    DayAgenda {
        date,
        due,
        completed,
    }
}

/// The Monday-start week around `anchor`, one agenda per day.
pub fn week(tasks: &[Task], anchor: NaiveDate) -> Vec<DayAgenda> {
    calendar::week_of(anchor)
        .into_iter()
        .map(|date| day(tasks, date))
        .collect()
}

/// The 42-cell grid for `anchor`'s month with per-day counts.
pub fn month(tasks: &[Task], anchor: NaiveDate) -> Vec<MonthCell> {
    calendar::month_grid(anchor)
        .into_iter()
        .map(|(date, in_month)| {
            let (completed, open) = tasks
                .iter()
                .filter(|task| task.due_date == date)
                .fold((0, 0), |(done, open), task| {
                    if task.is_completed {
                        (done + 1, open)
                    } else {
                        (done, open + 1)
                    }
                });
            MonthCell {
                date,
                in_month,
                open,
                completed,
            }
        })
        .collect()
}

/// Incomplete tasks due before `today`, oldest first.
pub fn overdue(tasks: &[Task], today: NaiveDate) -> Vec<Task> {
    let mut overdue: Vec<Task> = tasks
        .iter()
        .filter(|task| task.is_overdue(today))
        .cloned()
        .collect();
    overdue.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    overdue
}

/// Completed tasks, most recent due date first.
pub fn completed_history(tasks: &[Task]) -> Vec<Task> {
    let mut done: Vec<Task> = tasks.iter().filter(|task| task.is_completed).cloned().collect();
    done.sort_by(|a, b| {
        b.due_date
            .cmp(&a.due_date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    done
}

pub fn stats(tasks: &[Task], today: NaiveDate) -> Stats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.is_completed).count();
    let overdue = tasks.iter().filter(|task| task.is_overdue(today)).count();
    let rate = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u32
    };
    Stats {
        total,
        completed,
        active: total - completed,
        overdue,
        rate,
    }
}

/// `daily` for every day of the week, otherwise e.g. `Mon, Wed`.
pub fn frequency_label(frequency: &WeekdaySet) -> String {
    frequency.label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn d(offset: i64) -> NaiveDate {
        calendar::add_days(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(), offset).unwrap()
    }

    fn task(id: &str, due: NaiveDate, done: bool, created_secs: i64) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            due_date: due,
            is_completed: done,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap()
                + Duration::seconds(created_secs),
            is_routine: false,
            routine_id: None,
        }
    }

    #[test]
    fn day_splits_due_and_completed() {
        let tasks = vec![
            task("b", d(0), false, 2),
            task("a", d(0), false, 1),
            task("c", d(0), true, 0),
            task("x", d(1), false, 0),
        ];
        let agenda = day(&tasks, d(0));
        let due: Vec<&str> = agenda.due.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(agenda.completed.len(), 1);
        assert!(day(&tasks, d(5)).is_empty());
    }

    #[test]
    fn week_is_monday_to_sunday() {
        let agendas = week(&[task("a", d(0), false, 0)], d(0));
        assert_eq!(agendas.len(), 7);
        assert_eq!(agendas[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(agendas[2].due.len(), 1);
    }

    #[test]
    fn month_counts_per_cell() {
        let tasks = vec![task("a", d(0), false, 0), task("b", d(0), true, 0)];
        let cells = month(&tasks, d(0));
        assert_eq!(cells.len(), 42);
        let cell = cells.iter().find(|cell| cell.date == d(0)).unwrap();
        assert_eq!((cell.open, cell.completed), (1, 1));
        assert!(cell.in_month);
    }

    #[test]
    fn overdue_is_oldest_first_and_excludes_done() {
        let tasks = vec![
            task("late", d(-1), false, 0),
            task("later", d(-5), false, 0),
            task("done", d(-3), true, 0),
            task("today", d(0), false, 0),
        ];
        let ids: Vec<String> = overdue(&tasks, d(0)).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["later".to_string(), "late".to_string()]);
    }

    #[test]
    fn history_is_newest_first() {
        let tasks = vec![
            task("old", d(-4), true, 0),
            task("new", d(-1), true, 0),
            task("open", d(-2), false, 0),
        ];
        let ids: Vec<String> = completed_history(&tasks).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn stats_rounds_rate() {
        let tasks = vec![
            task("a", d(-1), true, 0),
            task("b", d(-1), false, 0),
            task("c", d(1), false, 0),
        ];
        let stats = stats(&tasks, d(0));
        assert_eq!(
            stats,
            Stats {
                total: 3,
                completed: 1,
                active: 2,
                overdue: 1,
                rate: 33,
            }
        );
        assert_eq!(super::stats(&[], d(0)).rate, 0);
    }

    #[test]
    fn labels() {
        assert_eq!(frequency_label(&WeekdaySet::ALL), "daily");
        assert_eq!(frequency_label(&WeekdaySet::new([1, 3]).unwrap()), "Mon, Wed");
    }
}
