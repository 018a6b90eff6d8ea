use anyhow::Result;
use declarative::ReconcileOutcome;

use super::Session;
use crate::Context;
use crate::cli::DeployArgs;
use crate::engine::{self, DeployOptions};
use crate::ui;

pub fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let opts = DeployOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        quiet: ctx.quiet,
    };

    if let Some(outcome) = apply(&session, &opts)?
        && !ctx.quiet
    {
        ui::dim(&format!(
            "State saved to {} at stage {}",
            session.store.path().display(),
            outcome.stage
        ));
    }
    Ok(())
}

/// Deploy and persist the resulting state
///
/// State is only written once the run reached its terminal stage.
pub fn apply(session: &Session, opts: &DeployOptions) -> Result<Option<ReconcileOutcome>> {
    let previous = session.previous()?;
    let desired = session.project.desired();

    let outcome = engine::deploy(&session.reconciler(), previous.as_ref(), &desired, opts)?;
    if let Some(outcome) = &outcome {
        session.store.save(&outcome.state)?;
    }
    Ok(outcome)
}
