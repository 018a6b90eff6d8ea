use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fnship")]
#[command(version)]
#[command(about = "Deploy serverless functions declaratively", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the project configuration
    #[arg(
        short,
        long,
        global = true,
        env = "FNSHIP_CONFIG",
        default_value = "fnship.toml"
    )]
    pub config: PathBuf,

    /// Deployment stack (separate persisted state per stack)
    #[arg(short, long, global = true, default_value = "default")]
    pub stack: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Package the function code without deploying
    Pack(PackArgs),

    /// Show what a deploy would change
    Plan,

    /// Converge the deployed function to the configuration
    Deploy(DeployArgs),

    /// Show persisted and deployed state
    Status,

    /// Delete the function and its managed role
    Destroy(DestroyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PackArgs {
    /// Where to write the archive (extension selects the format)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeployArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan and stop
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
