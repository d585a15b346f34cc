//! planr plan: generate a dated step plan for a goal and optionally apply it.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::plan::{self, AppliedPlan, PlanEntry, Provider};

use super::Context;

pub struct PlanOptions {
    pub goal: String,
    pub provider: Option<String>,
    pub key: Option<String>,
    pub apply: bool,
}

#[derive(Serialize)]
struct PlanOutput {
    goal: String,
    provider: Provider,
    steps: Vec<PlanStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<AppliedPlan>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanStep {
    #[serde(flatten)]
    entry: PlanEntry,
    due_date: NaiveDate,
}

pub fn run(ctx: &Context, options: PlanOptions) -> Result<()> {
    let provider: Provider = options
        .provider
        .as_deref()
        .unwrap_or(&ctx.config.ai.default_provider)
        .parse()?;
    let generator = plan::generator_for(provider, options.key.as_deref(), &ctx.config.ai)?;

    // Fail before calling the provider when the plan could not be saved.
    let store = if options.apply {
        Some(ctx.store()?)
    } else {
        None
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let entries = runtime.block_on(generator.generate(&options.goal))?;

    let today = ctx.today();
    let steps = entries
        .iter()
        .map(|entry| {
            Ok(PlanStep {
                due_date: plan::entry_due_date(entry, today)?,
                entry: entry.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let applied = match &store {
        Some(store) => Some(plan::apply_plan(
            store,
            &entries,
            today,
            &ctx.config.planner.ai_title_prefix,
        )?),
        None => None,
    };

    let mut human = HumanOutput::new(format!("Plan: {}", options.goal.trim()));
    human.push_summary("Provider", provider.to_string());
    human.push_summary("Steps", steps.len().to_string());
    for step in &steps {
        human.push_detail(format!(
            "{} (+{}d)  {}",
            step.due_date.format("%a %Y-%m-%d"),
            step.entry.days_offset,
            step.entry.title
        ));
    }
    match &applied {
        Some(applied) => human.push_summary("Created", applied.task_ids.len().to_string()),
        None => human.push_next_step("re-run with --apply to add these as tasks"),
    }

    let output = PlanOutput {
        goal: options.goal.trim().to_string(),
        provider,
        steps,
        applied,
    };
    emit_success(ctx.output, "plan", &output, Some(&human))
}
