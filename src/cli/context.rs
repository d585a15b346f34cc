//! Shared command setup: data home, config, identity and store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::calendar;
use crate::config::Config;
use crate::engine::{Clock, FixedClock, SystemClock};
use crate::error::Result;
use crate::events::EventDestination;
use crate::identity::{self, Identity};
use crate::materialize::{self, MaterializeReport};
use crate::output::OutputOptions;
use crate::storage::{self, Storage};
use crate::store::Store;

use super::Cli;

pub struct Context {
    pub home: PathBuf,
    pub config: Config,
    pub output: OutputOptions,
    user: Option<String>,
    events: Option<EventDestination>,
    today: NaiveDate,
    today_pinned: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let home = storage::resolve_home(cli.home.as_deref())?;
        let config = Config::load_from_home(&home)?;
        let events = EventDestination::parse(cli.events.as_deref());
        let events_to_stdout = matches!(events, Some(EventDestination::Stdout));
        let today = match cli.today.as_deref() {
            Some(raw) => calendar::parse_day(raw, calendar::today())?,
            None => calendar::today(),
        };

        Ok(Self {
            home,
            config,
            output: OutputOptions {
                json: cli.json && !events_to_stdout,
                quiet: cli.quiet || events_to_stdout,
            },
            user: cli.user.clone(),
            events,
            today,
            today_pinned: cli.today.is_some(),
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Clock for long-running commands: the `--today` date when given,
    /// otherwise the wall clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        if self.today_pinned {
            Arc::new(FixedClock(self.today))
        } else {
            Arc::new(SystemClock)
        }
    }

    /// Parse a day argument relative to today, defaulting to today.
    pub fn day_arg(&self, raw: Option<&str>) -> Result<NaiveDate> {
        match raw {
            Some(raw) => calendar::parse_day(raw, self.today),
            None => Ok(self.today),
        }
    }

    pub fn identity(&self) -> Result<Identity> {
        identity::resolve_user(&self.home, self.user.as_deref())
    }

    pub fn storage_for(&self, user_id: &str) -> Result<Storage> {
        Storage::new(&self.home, &self.config.store.project, user_id)
    }

    /// Open the signed-in user's store, failing if it is not ready.
    pub fn store(&self) -> Result<Store> {
        let identity = self.identity()?;
        let store = Store::open(
            self.storage_for(&identity.user_id)?,
            self.config.store.lock_timeout_ms,
        )?;
        store.ensure_ready()?;
        if let Some(destination) = &self.events {
            store.set_event_sink(destination.open()?.for_user(identity.user_id));
        }
        Ok(store)
    }

    /// One materialization pass when `planner.auto_materialize` is on.
    pub fn auto_materialize(&self, store: &Store) -> Result<Option<MaterializeReport>> {
        if !self.config.planner.auto_materialize {
            debug!("auto materialization disabled");
            return Ok(None);
        }
        materialize::materialize(store, self.today, self.config.planner.horizon_days).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn context(args: &[&str]) -> Context {
        let cli = Cli::try_parse_from(args).unwrap();
        Context::from_cli(&cli).unwrap()
    }

    #[test]
    fn pinned_today_drives_the_clock() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().to_str().unwrap();
        let ctx = context(&["planr", "--home", home, "--today", "2024-03-04", "watch"]);

        let pinned = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(ctx.today(), pinned);
        assert_eq!(ctx.clock().today(), pinned);
    }

    #[test]
    fn relative_today_is_resolved_once() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().to_str().unwrap();
        let ctx = context(&["planr", "--home", home, "--today", "+3", "sync"]);

        assert_eq!(ctx.clock().today(), ctx.today());
        assert_eq!(ctx.day_arg(Some("today")).unwrap(), ctx.today());
    }
}
