//! Decision display

use colored::{ColoredString, Colorize};
use declarative::{Action, Decision, Field};

/// Symbol for an action: + create, ~ update, - remove, ○ unchanged
fn symbol(action: &Action) -> ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::NoOp => "○".dimmed(),
        Action::UpdateCodeAndConfig | Action::UpdateConfigOnly => "~".yellow(),
        Action::Replace { .. } => "±".yellow(),
    }
}

/// Plain description of what a deploy would do
pub fn describe(name: &str, decision: &Decision) -> String {
    match &decision.action {
        Action::Create => format!("create function '{}'", name),
        Action::NoOp => format!("'{}' is up to date", name),
        Action::UpdateCodeAndConfig => format!("update code of '{}'", name),
        Action::UpdateConfigOnly => format!("update configuration of '{}'", name),
        Action::Replace { old_name, then } => match then.as_ref() {
            Action::Create => format!("create '{}' and delete '{}'", name, old_name),
            _ => format!("converge '{}' and delete '{}'", name, old_name),
        },
    }
}

/// Render a field value for a table cell
fn cell(field: Field, value: &str) -> String {
    match field {
        Field::ContentHash => crate::ui::short_hash(value).to_string(),
        _ if value.is_empty() => "(empty)".to_string(),
        _ => value.to_string(),
    }
}

/// Display a decision in a box
pub fn display_decision(name: &str, decision: &Decision) {
    if decision.is_noop() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Deployment Plan".bold()
    );
    println!("│");
    println!("│ {} {}", symbol(&decision.action), describe(name, decision).bold());

    if !decision.changes.is_empty() {
        println!("│");
        for change in &decision.changes {
            println!(
                "│   {} {:<12} {} → {}",
                "~".yellow(),
                change.field.name(),
                cell(change.field, &change.from).dimmed(),
                cell(change.field, &change.to)
            );
        }
    }

    if let Some(old_name) = decision.action.superseded() {
        println!("│");
        println!("│   {} {:<12} {}", "-".red(), "function", old_name.red());
    }

    println!("│");
    println!("└─────────────────────────────────────────────────────┘");
}
