//! Task and routine documents.
//!
//! A [`Task`] is a dated unit of work; a [`Routine`] is a weekly recurrence
//! rule that the materializer expands into tasks. Generated tasks keep a weak
//! `routineId` back-reference that may dangle once the routine is deleted.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar;
use crate::error::{Error, Result};

const WEEKDAY_SHORT: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const WEEKDAY_LONG: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Fresh document id: a lowercase ULID.
pub fn new_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

fn validate_title(title: &str, what: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{what} title cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// A non-empty set of weekdays, Sunday = 0 through Saturday = 6.
///
/// Serialized as an ascending array of indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);

    /// Build from weekday indices; rejects empty input, values above 6 and
    /// repeated days.
    pub fn new(days: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut mask = 0u8;
        for day in days {
            if day > 6 {
                return Err(Error::Validation(format!(
                    "weekday index {day} out of range (0=Sunday..6=Saturday)"
                )));
            }
            let bit = 1 << day;
            if mask & bit != 0 {
                return Err(Error::Validation(format!(
                    "weekday {} listed more than once",
                    WEEKDAY_SHORT[day as usize]
                )));
            }
            mask |= bit;
        }
        if mask == 0 {
            return Err(Error::Validation(
                "routine frequency needs at least one weekday".to_string(),
            ));
        }
        Ok(WeekdaySet(mask))
    }

    /// Parse a comma or space separated list of day names, indices, or the
    /// shorthands `daily`, `weekdays` and `weekends`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut days = Vec::new();
        for token in input
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            let token = token.to_ascii_lowercase();
            match token.as_str() {
                "daily" => days.extend(0..=6),
                "weekdays" => days.extend(1..=5),
                "weekends" => days.extend([0, 6]),
                other => days.push(parse_weekday_token(other)?),
            }
        }
        Self::new(days)
    }

    pub fn contains(&self, index: u8) -> bool {
        index <= 6 && self.0 & (1 << index) != 0
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.contains(calendar::weekday_index(date))
    }

    /// Indices in ascending order.
    pub fn days(&self) -> Vec<u8> {
        (0..=6).filter(|day| self.contains(*day)).collect()
    }

    pub fn is_daily(&self) -> bool {
        *self == Self::ALL
    }

    /// `daily` for all seven days, otherwise short names Sunday-first.
    pub fn label(&self) -> String {
        if self.is_daily() {
            return "daily".to_string();
        }
        self.days()
            .into_iter()
            .map(|day| WEEKDAY_SHORT[day as usize])
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn parse_weekday_token(token: &str) -> Result<u8> {
    if let Ok(index) = token.parse::<u8>() {
        return Ok(index);
    }
    if token.len() >= 2 {
        let matches: Vec<usize> = WEEKDAY_LONG
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with(token))
            .map(|(idx, _)| idx)
            .collect();
        if matches.len() == 1 {
            return Ok(matches[0] as u8);
        }
    }
    Err(Error::Validation(format!("unrecognized weekday '{token}'")))
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = Error;

    fn try_from(days: Vec<u8>) -> Result<Self> {
        WeekdaySet::new(days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.days()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A concrete, dated unit of work.
///
/// `routineId` is present exactly when `isRoutine` is set; documents that
/// disagree are rejected on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TaskRecord")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub due_date: NaiveDate,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub is_routine: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_id: Option<String>,
}

/// Stored shape of a [`Task`] before the routine tag is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: String,
    title: String,
    due_date: NaiveDate,
    #[serde(default)]
    is_completed: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_routine: bool,
    #[serde(default)]
    routine_id: Option<String>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = Error;

    fn try_from(record: TaskRecord) -> Result<Self> {
        match (record.is_routine, record.routine_id.as_deref()) {
            (true, None) => {
                return Err(Error::Validation(format!(
                    "task {} is a routine instance without a routineId",
                    record.id
                )))
            }
            (false, Some(routine_id)) => {
                return Err(Error::Validation(format!(
                    "task {} carries routineId {routine_id} but is not a routine instance",
                    record.id
                )))
            }
            _ => {}
        }
        Ok(Task {
            id: record.id,
            title: record.title,
            due_date: record.due_date,
            is_completed: record.is_completed,
            created_at: record.created_at,
            is_routine: record.is_routine,
            routine_id: record.routine_id,
        })
    }
}

/// Resolution of a task's routine back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineRef<'a> {
    /// Generated by a routine that still exists
    Live(&'a Routine),
    /// Generated by a routine that has since been deleted
    Gone(&'a str),
    /// Created manually
    None,
}

impl Task {
    /// True when this task is the instance of `routine_id`.
    pub fn belongs_to(&self, routine_id: &str) -> bool {
        self.routine_id.as_deref() == Some(routine_id)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_completed && self.due_date < today
    }

    /// Look up the originating routine, tolerating a dangling id.
    pub fn routine_ref<'a>(&'a self, routines: &'a [Routine]) -> RoutineRef<'a> {
        match self.routine_id.as_deref() {
            None => RoutineRef::None,
            Some(id) => routines
                .iter()
                .find(|routine| routine.id == id)
                .map(RoutineRef::Live)
                .unwrap_or(RoutineRef::Gone(id)),
        }
    }
}

/// A weekly recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub title: String,
    pub frequency: WeekdaySet,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Routine {
    /// Whether the rule asks for an instance on `date`.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.frequency.contains_date(date)
    }
}

/// Input for creating a task.
///
/// The constructors are the only way to set the routine tag, so a manual task
/// never carries a routine id and a generated one always does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    title: String,
    due_date: NaiveDate,
    routine_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn manual(title: impl Into<String>, due_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            due_date,
            routine_id: None,
            created_at: None,
        }
    }

    /// The instance of `routine` for `day`, titled like the routine.
    pub fn for_routine(routine: &Routine, day: NaiveDate) -> Self {
        Self {
            title: routine.title.clone(),
            due_date: day,
            routine_id: Some(routine.id.clone()),
            created_at: None,
        }
    }

    /// Fix the creation timestamp instead of taking the commit time.
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn routine_id(&self) -> Option<&str> {
        self.routine_id.as_deref()
    }

    /// Validate and turn into a stored document with the given id.
    pub fn into_task(self, id: String, now: DateTime<Utc>) -> Result<Task> {
        let title = validate_title(&self.title, "task")?;
        Ok(Task {
            id,
            title,
            due_date: self.due_date,
            is_completed: false,
            created_at: self.created_at.unwrap_or(now),
            is_routine: self.routine_id.is_some(),
            routine_id: self.routine_id,
        })
    }
}

/// Partial update of a task. Routine tags and `createdAt` are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub is_completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(done: bool) -> Self {
        Self {
            is_completed: Some(done),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.due_date.is_none() && self.is_completed.is_none()
    }

    /// Apply onto `task`, returning whether anything changed.
    pub fn apply(&self, task: &mut Task) -> Result<bool> {
        let before = task.clone();
        if let Some(title) = &self.title {
            task.title = validate_title(title, "task")?;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(done) = self.is_completed {
            task.is_completed = done;
        }
        Ok(*task != before)
    }
}

/// Input for creating a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoutine {
    pub title: String,
    pub frequency: WeekdaySet,
    pub start_date: NaiveDate,
}

impl NewRoutine {
    pub fn new(title: impl Into<String>, frequency: WeekdaySet, start_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            frequency,
            start_date,
        }
    }

    pub fn into_routine(self, id: String, now: DateTime<Utc>) -> Result<Routine> {
        Ok(Routine {
            id,
            title: validate_title(&self.title, "routine")?,
            frequency: self.frequency,
            start_date: self.start_date,
            created_at: now,
        })
    }
}

/// Partial update of a routine.
///
/// Already generated instances keep their title and date; only future passes
/// see the new rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutinePatch {
    pub title: Option<String>,
    pub frequency: Option<WeekdaySet>,
    pub start_date: Option<NaiveDate>,
}

impl RoutinePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.frequency.is_none() && self.start_date.is_none()
    }

    pub fn apply(&self, routine: &mut Routine) -> Result<bool> {
        let before = routine.clone();
        if let Some(title) = &self.title {
            routine.title = validate_title(title, "routine")?;
        }
        if let Some(frequency) = self.frequency {
            routine.frequency = frequency;
        }
        if let Some(start_date) = self.start_date {
            routine.start_date = start_date;
        }
        Ok(*routine != before)
    }
}
