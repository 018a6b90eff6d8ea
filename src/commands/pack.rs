use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;

use crate::Context;
use crate::cli::PackArgs;
use crate::config::Project;
use crate::progress;
use crate::ui;

pub fn run(ctx: &Context, args: PackArgs) -> Result<()> {
    let project = Project::load(&ctx.config)?;
    let output = args.output.unwrap_or_else(|| default_output(&project));

    let pb = if ctx.quiet {
        progress::hidden()
    } else {
        progress::spinner("Packaging...")
    };
    let artifact = match pack(&project, output) {
        Ok(artifact) => artifact,
        Err(e) => {
            progress::finish_error(&pb, "Packaging failed");
            return Err(e);
        }
    };
    if ctx.quiet {
        progress::finish_clear(&pb);
    } else {
        progress::finish_success(&pb, &format!("Packaged {} entries", artifact.entries));
        ui::kv("path", &artifact.path.display().to_string());
        ui::kv("format", artifact.format.extension());
        ui::kv("size", &ui::format_size(artifact.size));
        ui::kv("hash", &artifact.content_hash);
    }
    Ok(())
}

/// `<config dir>/<name>.<ext>` in the configured format
fn default_output(project: &Project) -> PathBuf {
    let f = &project.config.function;
    project
        .base_dir
        .join(format!("{}.{}", f.name, f.format.extension()))
}

fn pack(project: &Project, output: PathBuf) -> Result<packager::Artifact> {
    let mut desired = project.desired();
    desired.artifact_path = Some(output);
    packager::pack(&desired.pack_options())
        .with_context(|| format!("Failed to package {}", desired.code_path.display()))
}
