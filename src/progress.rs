//! Progress indicators for the fnship CLI.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Hidden spinner for quiet runs
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}

/// Finish a spinner with a success line
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    println!("  {} {}", "✓".green(), msg);
}

/// Finish a spinner with an error line
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    eprintln!("  {} {}", "✗".red(), msg);
}

/// Finish a spinner without output
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}
