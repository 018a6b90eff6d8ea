use anyhow::Result;
use colored::Colorize;
use declarative::{Decision, FieldChange, FunctionConfig, PersistedState, RemoteRecord};

use super::Session;
use crate::Context;
use crate::engine::differ;
use crate::state::StateFile;
use crate::ui;

/// Persisted, deployed and pending state of one stack
pub struct StatusReport {
    pub state: Option<StateFile>,
    pub remote: Option<RemoteRecord>,
    /// Fields changed on the provider since the last deploy
    pub drift: Vec<FieldChange>,
    pub pending: Decision,
}

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let report = inspect(&session)?;

    ui::header(&format!("Stack: {}", ctx.stack));
    show_state(&session, report.state.as_ref());
    show_remote(report.remote.as_ref(), &report.drift);

    ui::section("Pending");
    let name = &session.project.config.function.name;
    println!("  {}", differ::describe(name, &report.pending));
    println!();
    Ok(())
}

/// Gather everything `status` shows; only the artifact is written
pub fn inspect(session: &Session) -> Result<StatusReport> {
    let state = session.store.load()?;
    let previous = state.as_ref().map(|s| &s.function);
    let desired = session.project.desired();

    let name = previous.map_or(desired.name.as_str(), |p| p.name.as_str());
    let remote = declarative::get_remote(&session.cloud, name)?;
    let drift = match (previous, &remote) {
        (Some(previous), Some(remote)) => {
            declarative::changed_fields(remote, &recorded_config(previous))
        }
        _ => Vec::new(),
    };

    let pending = session.reconciler().plan(previous, &desired)?.decision;
    Ok(StatusReport {
        state,
        remote,
        drift,
        pending,
    })
}

/// The configuration the last deploy left on the provider
fn recorded_config(state: &PersistedState) -> FunctionConfig {
    FunctionConfig {
        name: state.name.clone(),
        description: state.description.clone(),
        runtime: state.runtime.clone(),
        role_arn: state.role_arn.clone(),
        handler: state.handler.clone(),
        memory_mb: state.memory_mb,
        timeout_sec: state.timeout_sec,
        env_vars: state.env_vars.clone(),
        content_hash: state.content_hash.clone(),
        layers: state.layers.clone(),
    }
}

fn show_state(session: &Session, state: Option<&StateFile>) {
    ui::section("Persisted");
    ui::kv("file", &session.store.path().display().to_string());

    let Some(state) = state else {
        ui::dim("Nothing deployed yet");
        return;
    };
    let f = &state.function;
    ui::kv("function", &f.name);
    ui::kv("updated", &state.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    ui::kv("runtime", &format!("{} ({})", f.runtime, f.handler));
    ui::kv("memory", &format!("{} MB", f.memory_mb));
    ui::kv("timeout", &format!("{} s", f.timeout_sec));
    ui::kv("role", &f.role_arn);
    ui::kv("code", ui::short_hash(&f.content_hash));
    ui::kv_opt("version", f.version.as_deref());
}

fn show_remote(remote: Option<&RemoteRecord>, drift: &[FieldChange]) {
    ui::section("Deployed");

    let Some(remote) = remote else {
        ui::dim("Function not found");
        return;
    };
    ui::kv("arn", &remote.arn);
    ui::kv("code", ui::short_hash(&remote.content_hash));

    if drift.is_empty() {
        println!("  {} Matches the last deploy", "✓".green());
    } else {
        println!("  {} Changed outside fnship:", "⚠".yellow());
        for change in drift {
            println!(
                "    {} {}: {} → {}",
                "~".yellow(),
                change.field,
                change.to.dimmed(),
                change.from
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{deploy, testing};
    use crate::engine::DeployOptions;
    use declarative::{Action, ComputeProvider, Field};
    use tempfile::TempDir;

    fn deployed(dir: &TempDir) -> Session {
        let session = testing::session(dir, "");
        let opts = DeployOptions {
            dry_run: false,
            yes: true,
            quiet: true,
        };
        deploy::apply(&session, &opts).unwrap();
        session
    }

    #[test]
    fn test_nothing_deployed() {
        let dir = TempDir::new().unwrap();
        let session = testing::session(&dir, "");

        let report = inspect(&session).unwrap();
        assert!(report.state.is_none());
        assert!(report.remote.is_none());
        assert_eq!(report.pending.action, Action::Create);
    }

    #[test]
    fn test_in_sync() {
        let dir = TempDir::new().unwrap();
        let session = deployed(&dir);

        let report = inspect(&session).unwrap();
        assert!(report.remote.is_some());
        assert!(report.drift.is_empty());
        assert!(report.pending.is_noop());
    }

    #[test]
    fn test_out_of_band_change_is_drift() {
        let dir = TempDir::new().unwrap();
        let session = deployed(&dir);

        let state = session.store.load().unwrap().unwrap().function;
        let mut changed = recorded_config(&state);
        changed.memory_mb = 2048;
        session.cloud.update_function_configuration(&changed).unwrap();

        let report = inspect(&session).unwrap();
        assert_eq!(report.drift.len(), 1);
        assert_eq!(report.drift[0].field, Field::MemoryMb);
        assert_eq!(report.pending.action, Action::UpdateConfigOnly);
    }
}
