use anyhow::Result;
use declarative::TeardownOutcome;

use super::Session;
use crate::Context;
use crate::cli::DestroyArgs;
use crate::engine::{self, DeployOptions};
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let opts = DeployOptions {
        dry_run: false,
        yes: args.yes,
        quiet: ctx.quiet,
    };

    match remove(&session, &opts)? {
        Removal::NothingDeployed => {
            ui::info(&format!("Nothing deployed in stack '{}'", ctx.stack));
        }
        Removal::Aborted => {}
        Removal::Removed(outcome) => {
            if !ctx.quiet {
                ui::dim(&format!("{} remote operations", outcome.log.len()));
            }
        }
    }
    Ok(())
}

pub enum Removal {
    NothingDeployed,
    Aborted,
    Removed(TeardownOutcome),
}

/// Tear down the recorded function, then forget the state
pub fn remove(session: &Session, opts: &DeployOptions) -> Result<Removal> {
    let Some(previous) = session.previous()? else {
        return Ok(Removal::NothingDeployed);
    };

    match engine::teardown(&session.reconciler(), &previous, opts)? {
        Some(outcome) => {
            session.store.remove()?;
            Ok(Removal::Removed(outcome))
        }
        None => Ok(Removal::Aborted),
    }
}
