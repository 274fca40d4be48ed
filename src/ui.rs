use colored::Colorize;
use declarative::{Outcome, ResourceRef};
use std::time::Duration;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
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

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Resource outcomes
// ============================================================================

/// Status glyph for an outcome; `noop` turns changes into "would change"
pub fn glyph(outcome: &Outcome, noop: bool) -> String {
    match outcome {
        Outcome::Unchanged => "·".dimmed().to_string(),
        Outcome::Changed { .. } if noop => "~".yellow().to_string(),
        Outcome::Changed { .. } => "✓".green().to_string(),
        Outcome::Failed { .. } => "✗".red().to_string(),
        Outcome::Skipped { .. } => "⊘".yellow().to_string(),
    }
}

/// One line per resource: glyph, identity, and a short note
pub fn resource_line(resource: &ResourceRef, outcome: &Outcome, noop: bool, refreshed: bool) {
    let note = match outcome {
        Outcome::Unchanged => String::new(),
        Outcome::Changed { changes } if changes.is_empty() && refreshed => {
            "refreshed".dimmed().to_string()
        }
        Outcome::Changed { changes } => {
            let props: Vec<&str> = changes.iter().map(|c| c.property.as_str()).collect();
            props.join(", ").dimmed().to_string()
        }
        Outcome::Failed { error } => error.red().to_string(),
        Outcome::Skipped { reason } => reason.yellow().to_string(),
    };
    if note.is_empty() {
        println!("  {} {}", glyph(outcome, noop), resource);
    } else {
        println!("  {} {} {}", glyph(outcome, noop), resource, note);
    }
}

/// Print a unified diff with added/removed lines colored
pub fn diff(text: &str) {
    for line in text.lines() {
        let styled = if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else {
            line.to_string()
        };
        println!("      {styled}");
    }
}

/// Human-readable duration, e.g. `850ms` or `12.4s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
