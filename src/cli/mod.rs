//! Command-line interface for planr
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

mod auth;
mod context;
mod init;
mod plan;
mod routine;
mod sync;
mod task;
mod views;

pub use context::Context;

/// planr - personal task and routine planner
///
/// Routines are weekly rules ("every Mon/Wed from March 1") that planr keeps
/// expanded into dated tasks over a rolling horizon.
#[derive(Parser, Debug)]
#[command(name = "planr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true, env = "PLANR_HOME")]
    pub home: Option<PathBuf>,

    /// Act as this user id instead of the signed-in one (or PLANR_USER)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging for planr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit change events as JSONL to a file, or `-` for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    /// Override today's date (YYYY-MM-DD)
    #[arg(long, global = true, env = "PLANR_TODAY", hide = true)]
    pub today: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the config and sign in anonymously if needed
    Init,

    /// Sign in, sign out, show identity
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Manage recurring routines
    #[command(subcommand)]
    Routine(RoutineCommands),

    /// Run one materialization pass
    Sync,

    /// Keep routines materialized as the store changes (until ctrl-c)
    Watch,

    /// Tasks due on a day
    Day {
        /// Day to show (YYYY-MM-DD, today, tomorrow, +N); defaults to today
        date: Option<String>,
    },

    /// The Monday-start week around a day
    Week {
        date: Option<String>,
    },

    /// Month grid with per-day task counts
    Month {
        date: Option<String>,
    },

    /// Incomplete tasks due before today
    Overdue,

    /// Completion statistics
    Stats,

    /// Generate a step-by-step plan for a goal
    Plan {
        /// The goal, e.g. "learn to play guitar"
        #[arg(required = true)]
        goal: Vec<String>,

        /// Provider: mock, gemini, openai, claude
        #[arg(long)]
        provider: Option<String>,

        /// Provider API key
        #[arg(long, env = "PLANR_AI_KEY", hide_env_values = true)]
        key: Option<String>,

        /// Create the generated steps as tasks
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in anonymously or with a federated account
    Login {
        /// Start a new anonymous identity
        #[arg(long, conflicts_with_all = ["uid", "provider"])]
        anonymous: bool,

        /// Account id at the identity provider
        #[arg(long, requires = "provider")]
        uid: Option<String>,

        /// Identity provider, e.g. google
        #[arg(long, requires = "uid")]
        provider: Option<String>,
    },

    /// Forget the signed-in identity
    Logout,

    /// Show the active identity
    Whoami,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task
    Add {
        #[arg(required = true)]
        title: Vec<String>,

        /// Due day (YYYY-MM-DD, today, tomorrow, +N)
        #[arg(long, default_value = "today")]
        due: String,
    },

    /// List tasks
    Ls {
        /// Include completed tasks
        #[arg(long)]
        all: bool,

        /// Only instances of this routine
        #[arg(long)]
        routine: Option<String>,

        /// Only tasks due on this day
        #[arg(long)]
        date: Option<String>,
    },

    /// Show one task
    Show { id: String },

    /// Change title or due day
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        due: Option<String>,
    },

    /// Mark tasks completed
    Done {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Mark tasks not completed
    Reopen {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete tasks
    Rm {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RoutineCommands {
    /// Add a routine
    Add {
        #[arg(required = true)]
        title: Vec<String>,

        /// Weekdays: names, 0-6 (Sunday = 0), daily, weekdays, weekends
        #[arg(long)]
        days: String,

        /// First day instances may be generated for
        #[arg(long, default_value = "today")]
        start: String,
    },

    /// List routines
    Ls,

    /// Change a routine (existing instances keep their title and date)
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        days: Option<String>,

        #[arg(long)]
        start: Option<String>,
    },

    /// Delete a routine and its incomplete instances
    Rm { id: String },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = Context::from_cli(&self)?;
        match self.command {
            Commands::Init => init::run(&ctx),
            Commands::Auth(cmd) => match cmd {
                AuthCommands::Login {
                    anonymous,
                    uid,
                    provider,
                } => auth::run_login(
                    &ctx,
                    auth::LoginOptions {
                        anonymous,
                        uid,
                        provider,
                    },
                ),
                AuthCommands::Logout => auth::run_logout(&ctx),
                AuthCommands::Whoami => auth::run_whoami(&ctx),
            },
            Commands::Task(cmd) => match cmd {
                TaskCommands::Add { title, due } => task::run_add(
                    &ctx,
                    task::AddOptions {
                        title: title.join(" "),
                        due,
                    },
                ),
                TaskCommands::Ls { all, routine, date } => {
                    task::run_list(&ctx, task::ListOptions { all, routine, date })
                }
                TaskCommands::Show { id } => task::run_show(&ctx, &id),
                TaskCommands::Edit { id, title, due } => {
                    task::run_edit(&ctx, task::EditOptions { id, title, due })
                }
                TaskCommands::Done { ids } => task::run_set_completed(&ctx, ids, true),
                TaskCommands::Reopen { ids } => task::run_set_completed(&ctx, ids, false),
                TaskCommands::Rm { ids } => task::run_rm(&ctx, ids),
            },
            Commands::Routine(cmd) => match cmd {
                RoutineCommands::Add { title, days, start } => routine::run_add(
                    &ctx,
                    routine::AddOptions {
                        title: title.join(" "),
                        days,
                        start,
                    },
                ),
                RoutineCommands::Ls => routine::run_list(&ctx),
                RoutineCommands::Edit {
                    id,
                    title,
                    days,
                    start,
                } => routine::run_edit(
                    &ctx,
                    routine::EditOptions {
                        id,
                        title,
                        days,
                        start,
                    },
                ),
                RoutineCommands::Rm { id } => routine::run_rm(&ctx, &id),
            },
            Commands::Sync => sync::run_sync(&ctx),
            Commands::Watch => sync::run_watch(&ctx),
            Commands::Day { date } => views::run_day(&ctx, date.as_deref()),
            Commands::Week { date } => views::run_week(&ctx, date.as_deref()),
            Commands::Month { date } => views::run_month(&ctx, date.as_deref()),
            Commands::Overdue => views::run_overdue(&ctx),
            Commands::Stats => views::run_stats(&ctx),
            Commands::Plan {
                goal,
                provider,
                key,
                apply,
            } => plan::run(
                &ctx,
                plan::PlanOptions {
                    goal: goal.join(" "),
                    provider,
                    key,
                    apply,
                },
            ),
        }
    }
}
