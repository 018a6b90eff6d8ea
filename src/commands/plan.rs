use anyhow::Result;

use super::Session;
use crate::Context;
use crate::engine::differ;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let previous = session.previous()?;
    let desired = session.project.desired();

    let plan = session.reconciler().plan(previous.as_ref(), &desired)?;
    differ::display_decision(&desired.name, &plan.decision);

    if ctx.verbose > 0 {
        ui::section("Desired configuration");
        ui::kv("role", &plan.config.role_arn);
        ui::kv("code", &plan.config.content_hash);
        if !plan.config.layers.is_empty() {
            ui::kv("layers", &plan.config.layers.join(", "));
        }
    }
    Ok(())
}
