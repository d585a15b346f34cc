//! Event output for external integrations.
//!
//! Events are emitted as JSON lines to stdout or a configured file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::Op;
use crate::error::{Error, Result};

pub const EVENT_SCHEMA_VERSION: &str = "planr.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// Event kinds emitted by planr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    RoutineCreated,
    RoutineUpdated,
    RoutineDeleted,
    RoutinesMaterialized,
    RoutineReconciled,
    PlanApplied,
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event: EventKind, user: Option<String>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp: Utc::now(),
            user,
            data: None,
        }
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

/// One event per document op of a committed batch.
pub fn for_ops(ops: &[Op]) -> Vec<Event> {
    ops.iter()
        .filter_map(|op| {
            let (kind, data) = match op {
                Op::PutTask {
                    task,
                    created: true,
                } => (EventKind::TaskCreated, serde_json::to_value(task)),
                Op::PutTask {
                    task,
                    created: false,
                } => (EventKind::TaskUpdated, serde_json::to_value(task)),
                Op::DeleteTask { id } => {
                    (EventKind::TaskDeleted, Ok(serde_json::json!({ "id": id })))
                }
                Op::PutRoutine {
                    routine,
                    created: true,
                } => (EventKind::RoutineCreated, serde_json::to_value(routine)),
                Op::PutRoutine {
                    routine,
                    created: false,
                } => (EventKind::RoutineUpdated, serde_json::to_value(routine)),
                Op::DeleteRoutine { id } => (
                    EventKind::RoutineDeleted,
                    Ok(serde_json::json!({ "id": id })),
                ),
            };
            data.ok().map(|data| {
                let mut event = Event::new(kind, None);
                event.data = Some(data);
                event
            })
        })
        .collect()
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
    user: Option<String>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
            user: None,
        }
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
            user: None,
        })
    }

    /// Stamp events that carry no user with `user`.
    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = if event.user.is_none() && self.user.is_some() {
            let mut stamped = event.clone();
            stamped.user = self.user.clone();
            serde_json::to_vec(&stamped)?
        } else {
            serde_json::to_vec(event)?
        };
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}
