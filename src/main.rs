mod cli;
mod cloud;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Project configuration file
    pub config: PathBuf,
    /// Stack whose state is read and written
    pub stack: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        stack: cli.stack,
    };

    match cli.command {
        Command::Pack(args) => commands::pack::run(&ctx, args),
        Command::Plan => commands::plan::run(&ctx),
        Command::Deploy(args) => commands::deploy::run(&ctx, args),
        Command::Status => commands::status::run(&ctx),
        Command::Destroy(args) => commands::destroy::run(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "fnship", &mut io::stdout());
            Ok(())
        }
    }
}
