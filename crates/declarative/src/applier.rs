//! Convergence engine - walks a catalog in order and converges each resource
//!
//! Each resource moves `Pending -> Evaluating -> {Unchanged, Changed, Failed,
//! Skipped}` exactly once per run. A resource whose predecessor failed or was
//! skipped is skipped; unrelated resources are still evaluated. A change
//! delivers a refresh along the resource's notify edges, which the single
//! topological pass picks up when it reaches the target.

use crate::catalog::Catalog;
use crate::context::{ApplyContext, ConfirmCallback, NoProgress, ProgressCallback};
use crate::exec::{ExecOutcome, run_exec};
use crate::resource::{Attributes, Provider, Resource};
use crate::types::{ApplyReport, ApplySummary, Outcome, PropertyChange, ResourceReport};
use anyhow::Result;
use rayon::prelude::*;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Evaluating,
    Finished,
}

/// Converge a catalog once.
///
/// Never fails as a whole: every problem is recorded against the resource
/// that caused it.
pub fn apply<P: ProgressCallback + ?Sized>(
    catalog: &Catalog,
    ctx: &ApplyContext<'_>,
    progress: &mut P,
) -> ApplyReport {
    let started = Instant::now();
    let graph = catalog.graph();
    let mut phases = vec![Phase::Pending; catalog.len()];
    let mut outcomes: Vec<Option<Outcome>> = vec![None; catalog.len()];
    let mut refreshed = vec![false; catalog.len()];
    let mut report = ApplyReport {
        noop: ctx.noop(),
        ..Default::default()
    };

    progress.on_run_start(catalog.len(), ctx.noop());

    for &idx in catalog.order() {
        let resource = &catalog.resources()[idx];
        let reference = resource.reference();
        debug_assert_eq!(phases[idx], Phase::Pending);
        phases[idx] = Phase::Evaluating;
        progress.on_resource_start(&reference);
        log::trace!("{reference}: evaluating");

        let resource_started = Instant::now();
        let blocked = graph.predecessors(idx).iter().find_map(|&p| {
            match outcomes[p].as_ref() {
                Some(Outcome::Failed { .. }) => Some(format!(
                    "dependency {} failed",
                    catalog.resources()[p].reference()
                )),
                Some(Outcome::Skipped { .. }) => Some(format!(
                    "dependency {} was skipped",
                    catalog.resources()[p].reference()
                )),
                _ => None,
            }
        });

        let outcome = if ctx.cancel.is_cancelled() {
            report.cancelled = true;
            Outcome::Skipped {
                reason: "run cancelled".to_string(),
            }
        } else if let Some(reason) = blocked {
            Outcome::Skipped { reason }
        } else {
            evaluate(resource, refreshed[idx], ctx)
        };

        // Barriers pass a received refresh through to their own targets
        let forwards = outcome.is_change()
            || (matches!(resource.attributes, Attributes::Barrier) && refreshed[idx]);
        if forwards {
            for target in graph.refresh_targets(idx) {
                debug_assert_eq!(phases[target], Phase::Pending);
                refreshed[target] = true;
            }
        }

        match &outcome {
            Outcome::Failed { error } => log::warn!("{reference}: {error}"),
            Outcome::Skipped { reason } => log::info!("{reference}: skipped, {reason}"),
            other => log::debug!("{reference}: {}", other.label()),
        }

        let entry = ResourceReport {
            resource: reference,
            outcome: outcome.clone(),
            refreshed: refreshed[idx],
            duration: resource_started.elapsed(),
        };
        progress.on_resource_complete(&entry);
        report.summary.add_outcome(&outcome);
        report.resources.push(entry);
        outcomes[idx] = Some(outcome);
        phases[idx] = Phase::Finished;
    }

    report.duration = started.elapsed();
    progress.on_run_complete(&report.summary);
    report
}

fn evaluate(resource: &Resource, refreshed: bool, ctx: &ApplyContext<'_>) -> Outcome {
    match &resource.attributes {
        Attributes::Barrier => Outcome::Unchanged,
        Attributes::Exec(exec) => match run_exec(&resource.title, exec, refreshed, ctx) {
            Ok(ExecOutcome::NotRun { .. }) => Outcome::Unchanged,
            Ok(ExecOutcome::WouldRun | ExecOutcome::Ran { .. }) => Outcome::Changed {
                changes: vec![PropertyChange::new("returns", "notrun", "0")],
            },
            Err(e) => Outcome::Failed {
                error: e.to_string(),
            },
        },
        _ => match resource.provider() {
            Some(provider) => converge(provider, &resource.title, refreshed, ctx),
            None => Outcome::Unchanged,
        },
    }
}

fn converge(
    provider: &dyn Provider,
    title: &str,
    refreshed: bool,
    ctx: &ApplyContext<'_>,
) -> Outcome {
    let attempt = || -> Result<Vec<PropertyChange>> {
        let mut changes = provider.diff(title, ctx)?;
        if !changes.is_empty() && !ctx.noop() {
            provider.apply(title, &changes, ctx)?;
        }
        if refreshed && let Some(change) = provider.refresh(title, &changes, ctx)? {
            changes.push(change);
        }
        Ok(changes)
    };

    match attempt() {
        Ok(changes) if changes.is_empty() => Outcome::Unchanged,
        Ok(changes) => Outcome::Changed { changes },
        Err(e) => Outcome::Failed {
            error: format!("{e:#}"),
        },
    }
}

/// Converge several independent catalogs (one per host) in parallel.
///
/// Each catalog is still walked by a single thread.
pub fn apply_all(catalogs: &[Catalog], ctx: &ApplyContext<'_>) -> (Vec<ApplyReport>, ApplySummary) {
    let reports: Vec<ApplyReport> = catalogs
        .par_iter()
        .map(|catalog| apply(catalog, ctx, &mut NoProgress))
        .collect();
    let mut summary = ApplySummary::default();
    for report in &reports {
        summary.merge(&report.summary);
    }
    (reports, summary)
}

/// Result of a confirmed convergence
#[derive(Debug, Clone)]
pub enum Convergence {
    /// The plan found nothing to change; holds the plan
    InSync(ApplyReport),
    /// The user declined; holds the plan
    Declined(ApplyReport),
    /// Changes were applied; holds the real run
    Applied(ApplyReport),
}

impl Convergence {
    pub fn report(&self) -> &ApplyReport {
        match self {
            Self::InSync(r) | Self::Declined(r) | Self::Applied(r) => r,
        }
    }
}

/// Plan in noop mode, ask for confirmation, then apply.
pub fn converge_confirmed<P, C>(
    catalog: &Catalog,
    ctx: &ApplyContext<'_>,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Convergence>
where
    P: ProgressCallback + ?Sized,
    C: ConfirmCallback + ?Sized,
{
    let plan = apply(catalog, &ctx.as_noop(), &mut NoProgress);
    if plan.summary.changed == 0 && plan.summary.is_success() {
        return Ok(Convergence::InSync(plan));
    }

    confirm.review(&plan);
    let prompt = format!(
        "Apply {} change(s) to {} resource(s)?",
        plan.summary.changed,
        catalog.len()
    );
    if !confirm.confirm(&prompt)? {
        return Ok(Convergence::Declined(plan));
    }

    Ok(Convergence::Applied(apply(catalog, ctx, progress)))
}
