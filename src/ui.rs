use colored::Colorize;
use waypointkit::{ApplyResult, Change, ErrorCategory, ExecuteSummary, Outcome, ResourceReport};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Reports
// ============================================================================

/// One-line description of a result, without colour.
pub fn describe(result: &ApplyResult) -> String {
    match result {
        ApplyResult::Reconciled { identity, outcome } => format!("{outcome} ({})", identity.id),
        ApplyResult::Planned { change } => format!("would {change}"),
        ApplyResult::Destroyed {
            identity,
            already_absent: true,
        } => format!("already gone ({})", identity.id),
        ApplyResult::Destroyed { identity, .. } => format!("destroyed ({})", identity.id),
        ApplyResult::Failed { category, error, .. } => format!("{category}: {error}"),
    }
}

/// Print one resource's result
pub fn resource(report: &ResourceReport) {
    let text = describe(&report.result);
    let (icon, text) = match &report.result {
        ApplyResult::Reconciled {
            outcome: Outcome::Unchanged,
            ..
        }
        | ApplyResult::Planned { change: Change::None } => ("·".dimmed(), text.dimmed()),
        ApplyResult::Reconciled { .. } | ApplyResult::Destroyed { .. } => ("✓".green(), text.normal()),
        ApplyResult::Planned {
            change: Change::Update(_),
        } => ("~".yellow(), text.yellow()),
        ApplyResult::Planned { .. } => ("→".cyan(), text.normal()),
        ApplyResult::Failed { .. } => ("✗".red(), text.red()),
    };
    println!("  {icon} {} {text}", report.key.bold());
}

/// Print what to do about each category of failure that occurred
pub fn advice<'a>(categories: impl IntoIterator<Item = &'a ErrorCategory>) {
    let mut seen = Vec::new();
    for category in categories {
        if !seen.contains(category) {
            seen.push(*category);
            dim(&format!("{}: {}", category.description(), category.advice()));
        }
    }
}

/// Print the summary line of a pass
pub fn summary(summary: &ExecuteSummary) {
    println!();
    let mut parts = Vec::new();
    if summary.created > 0 {
        parts.push(format!("{} created", summary.created).green().to_string());
    }
    if summary.updated > 0 {
        parts.push(format!("{} updated", summary.updated).green().to_string());
    }
    if summary.destroyed > 0 {
        parts.push(format!("{} destroyed", summary.destroyed).green().to_string());
    }
    if summary.planned > 0 {
        parts.push(format!("{} planned", summary.planned).cyan().to_string());
    }
    if summary.unchanged > 0 {
        parts.push(format!("{} unchanged", summary.unchanged).dimmed().to_string());
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed).red().to_string());
    }
    if parts.is_empty() {
        info("Nothing to do");
    } else {
        println!("  {}", parts.join(", "));
    }
}
