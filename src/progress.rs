//! Run progress printed as resources complete.

use crate::ui;
use colored::Colorize;
use declarative::{
    ApplyReport, ApplySummary, DiffSummary, Outcome, PropertyChange, ProgressCallback,
    ResourceRef, ResourceReport, group_by_kind,
};

/// Prints one line per resource as the run goes.
///
/// Unchanged resources are only listed when `verbose` is set; changes,
/// failures and skips are always printed, along with any content diff.
pub struct CliProgress {
    verbose: bool,
    quiet: bool,
    noop: bool,
    total: usize,
    done: usize,
}

impl CliProgress {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            noop: false,
            total: 0,
            done: 0,
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_run_start(&mut self, total: usize, noop: bool) {
        self.total = total;
        self.done = 0;
        self.noop = noop;
        log::debug!("run started: {total} resources (noop: {noop})");
    }

    fn on_resource_start(&mut self, resource: &ResourceRef) {
        log::trace!("[{}/{}] {resource}", self.done + 1, self.total);
    }

    fn on_resource_complete(&mut self, report: &ResourceReport) {
        self.done += 1;
        let outcome = &report.outcome;
        let show = match outcome {
            Outcome::Unchanged => self.verbose,
            Outcome::Changed { .. } => !self.quiet,
            Outcome::Failed { .. } | Outcome::Skipped { .. } => true,
        };
        if !show {
            return;
        }
        ui::resource_line(&report.resource, outcome, self.noop, report.refreshed);
        if let Outcome::Changed { changes } = outcome
            && !self.quiet
        {
            print_changes(changes, self.verbose);
        }
    }

    fn on_run_complete(&mut self, summary: &ApplySummary) {
        if self.quiet && summary.is_success() {
            return;
        }
        let verb = if self.noop { "would change" } else { "changed" };
        println!();
        println!(
            "  {} {}, {} {}, {} {}, {} {}",
            summary.changed.to_string().green().bold(),
            verb,
            summary.unchanged.to_string().dimmed(),
            "unchanged".dimmed(),
            summary.failed.to_string().red().bold(),
            "failed",
            summary.skipped.to_string().yellow().bold(),
            "skipped"
        );
    }
}

fn print_changes(changes: &[PropertyChange], verbose: bool) {
    for change in changes {
        if verbose && change.detail.is_none() {
            ui::dim(&change.to_string());
        }
        if let Some(detail) = &change.detail {
            ui::diff(detail);
        }
    }
}

/// Headline for a noop plan, e.g. `3 resources would change (1 by refresh)`
pub fn plan_headline(summary: &DiffSummary) -> String {
    let noun = if summary.changed == 1 { "resource" } else { "resources" };
    let mut line = format!("{} {noun} would change", summary.changed);
    if summary.refreshed > 0 {
        line.push_str(&format!(" ({} by refresh)", summary.refreshed));
    }
    line
}

/// Print the pending changes of a noop plan, grouped by resource kind
pub fn print_plan(plan: &ApplyReport, verbose: bool) {
    ui::section("Pending changes");
    for (kind, entries) in group_by_kind(plan) {
        println!("  {}", kind.to_string().bold());
        for entry in entries {
            ui::resource_line(&entry.resource, &entry.outcome, true, entry.refreshed);
            if let Outcome::Changed { changes } = &entry.outcome {
                print_changes(changes, verbose);
            }
        }
    }
    for entry in plan.problems() {
        ui::resource_line(&entry.resource, &entry.outcome, true, entry.refreshed);
    }
    println!();
    ui::dim(&plan_headline(&DiffSummary::from_report(plan)));
}
