//! planr sync / watch: one-shot and continuous routine materialization.

use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::Result;
use crate::materialize;
use crate::output::{emit_success, HumanOutput};
use crate::watch::spawn_watch;

use super::Context;

pub fn run_sync(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let report = materialize::materialize(&store, ctx.today(), ctx.config.planner.horizon_days)?;

    let mut human = HumanOutput::new(format!(
        "planr sync: created {} task(s)",
        report.created_count()
    ));
    human.push_summary("Routines", report.routines.to_string());
    human.push_summary(
        "Horizon",
        format!("{} + {} days", report.horizon_start, report.horizon_days),
    );
    if let Some(batch_id) = report.batch_id {
        human.push_summary("Batch", batch_id.to_string());
    }

    emit_success(ctx.output, "sync", &report, Some(&human))
}

pub fn run_watch(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let watcher = spawn_watch(store.clone(), ctx.config.watch.debounce_ms)?;
    let engine = Engine::new(store, ctx.clock(), ctx.config.planner.horizon_days)
        .with_rollover_check(Duration::from_secs(ctx.config.watch.rollover_check_secs));

    info!("watching for changes, ctrl-c to stop");
    let stats = runtime.block_on(engine.run(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler failed, stopping");
        }
    }));
    watcher.stop();
    let stats = stats?;

    let mut human = HumanOutput::new("planr watch: stopped");
    human.push_summary("Passes", stats.passes.to_string());
    human.push_summary("Created", stats.created.to_string());
    if stats.failures > 0 {
        human.push_warning(format!("{} pass(es) failed", stats.failures));
    }

    emit_success(ctx.output, "watch", &stats, Some(&human))
}
