//! Deploy and teardown driver with terminal UI

use anyhow::Result;
use colored::Colorize;
use declarative::{
    Decision, DesiredConfig, Operation, PersistedState, ProgressCallback, ReconcileOutcome,
    Reconciler, Stage, TeardownOutcome,
};
use indicatif::ProgressBar;

use super::differ::display_decision;
use crate::progress;
use crate::ui;

/// Options for a deploy or teardown
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Show the plan and stop
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// No spinner or per-operation output
    pub quiet: bool,
}

/// Spinner that follows the state machine
pub struct SpinnerProgress {
    pb: ProgressBar,
    quiet: bool,
}

impl SpinnerProgress {
    pub fn new(msg: &str, quiet: bool) -> Self {
        let pb = if quiet {
            progress::hidden()
        } else {
            progress::spinner(msg)
        };
        Self { pb, quiet }
    }

    pub fn finish_success(&self, msg: &str) {
        if self.quiet {
            progress::finish_clear(&self.pb);
        } else {
            progress::finish_success(&self.pb, msg);
        }
    }

    pub fn finish_error(&self, msg: &str) {
        progress::finish_error(&self.pb, msg);
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_stage(&mut self, stage: Stage) {
        self.pb.set_message(stage_message(stage).to_string());
    }

    fn on_decision(&mut self, _decision: &Decision) {}

    fn on_operation(&mut self, operation: &Operation) {
        if !self.quiet {
            self.pb.println(format!("    {} {}", "•".cyan(), operation));
        }
    }
}

/// What the spinner says once a stage is reached
fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::NotDeployed => "Preparing...",
        Stage::RoleReady => "Packaging...",
        Stage::Packaged => "Placing code...",
        Stage::CodePlaced => "Updating configuration...",
        Stage::Configured => "Publishing...",
        Stage::Published => "Done",
        Stage::Removed => "Removed",
    }
}

/// Plan, confirm and reconcile; `None` when nothing was applied
pub fn deploy(
    reconciler: &Reconciler<'_>,
    previous: Option<&PersistedState>,
    desired: &DesiredConfig,
    opts: &DeployOptions,
) -> Result<Option<ReconcileOutcome>> {
    let plan = reconciler.plan(previous, desired).map_err(explain)?;
    display_decision(&desired.name, &plan.decision);

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(None);
    }

    if !plan.decision.is_noop() && !opts.yes && !confirm("Deploy these changes?", true)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(None);
    }

    let mut progress = SpinnerProgress::new("Preparing...", opts.quiet);
    match reconciler.reconcile(previous, desired, &mut progress) {
        Ok(outcome) => {
            progress.finish_success(&format!("Reached {}", outcome.stage));
            if !opts.quiet {
                print_summary(&outcome);
            }
            Ok(Some(outcome))
        }
        Err(e) => {
            progress.finish_error("Deployment failed");
            Err(explain(e))
        }
    }
}

/// Confirm and tear down; `None` when aborted
pub fn teardown(
    reconciler: &Reconciler<'_>,
    previous: &PersistedState,
    opts: &DeployOptions,
) -> Result<Option<TeardownOutcome>> {
    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Teardown".red().bold()
    );
    println!("│");
    println!("│ {} function {}", "-".red(), previous.name);
    if let Some(role) = &previous.auto_role_arn {
        println!("│ {} role     {}", "-".red(), role);
    }
    println!("│");
    println!("└─────────────────────────────────────────────────────┘");

    if !opts.yes && !confirm("Delete these resources?", false)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(None);
    }

    let mut progress = SpinnerProgress::new("Removing...", opts.quiet);
    match reconciler.destroy(previous, &mut progress) {
        Ok(outcome) => {
            progress.finish_success(&format!("Removed '{}'", previous.name));
            Ok(Some(outcome))
        }
        Err(e) => {
            progress.finish_error("Teardown failed");
            Err(explain(e))
        }
    }
}

/// Attach the category's advice to a reconciliation error
fn explain(err: declarative::Error) -> anyhow::Error {
    match err.provider_error() {
        Some(provider) => {
            let advice = provider.category.advice();
            anyhow::Error::new(err).context(advice)
        }
        None => anyhow::Error::new(err),
    }
}

fn confirm(prompt: &str, default: bool) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(outcome: &ReconcileOutcome) {
    println!();
    if outcome.changed() {
        println!("  {} Function deployed", "✓".green().bold());
    } else {
        println!("  {} Already up to date", "✓".green().bold());
    }

    let state = &outcome.state;
    ui::kv("arn", &state.arn);
    ui::kv("code", ui::short_hash(&state.content_hash));
    ui::kv_opt("version", state.version.as_deref());

    let remote_calls = outcome.log.iter().filter(|op| !op.is_local()).count();
    if remote_calls > 0 {
        println!("    • {} remote operations", remote_calls);
    }
}
