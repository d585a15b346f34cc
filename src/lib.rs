//! planr - personal task and routine planner
//!
//! Tasks are dated units of work. Routines are weekly recurrence rules that
//! planr expands into tasks over a rolling horizon, so the week and month
//! views always show upcoming routine work.
//!
//! # Core Concepts
//!
//! - **Materialization**: idempotent top-up of routine instances for the
//!   next `horizon_days` days, committed as one batch
//! - **Reconciliation**: deleting a routine drops its open instances and
//!   keeps completed ones as history
//! - **Batches**: all-or-nothing multi-document writes, journaled so an
//!   interrupted commit is replayed on next open
//! - **Live feeds**: per-collection snapshots that drive the engine
//!
//! # Module Organization
//!
//! - `calendar`: day, Monday-start week and 42-cell month arithmetic
//! - `model`: task and routine documents
//! - `storage` / `lock`: per-user namespace files and atomic writes
//! - `batch` / `store`: atomic batches, reads and live feeds
//! - `materialize` / `reconcile` / `engine`: routine lifecycle
//! - `watch`: cross-process change detection
//! - `agenda`: day, week, month, overdue and stats views
//! - `plan`: goal-to-steps generation (mock and Gemini)
//! - `identity`: signed-in user
//! - `config`, `events`, `output`, `error`, `cli`

pub mod agenda;
pub mod batch;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod lock;
pub mod materialize;
pub mod model;
pub mod output;
pub mod plan;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod watch;

pub use error::{Error, Result};
pub use store::Store;
