//! Diff rendering for file content and run reports

use crate::types::{ApplyReport, ResourceKind, ResourceReport};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::BTreeMap;

/// Largest content (in bytes) for which a unified diff is rendered
const MAX_DIFF_BYTES: usize = 64 * 1024;

/// Unified diff between two versions of a text file.
///
/// Returns `None` for binary or oversized content.
pub fn content_diff(path: &str, old: &[u8], new: &[u8]) -> Option<String> {
    if old.len() > MAX_DIFF_BYTES || new.len() > MAX_DIFF_BYTES {
        return None;
    }
    let old = std::str::from_utf8(old).ok()?;
    let new = std::str::from_utf8(new).ok()?;
    let diff = TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(path, path)
        .to_string();
    Some(diff)
}

/// Summary of the changes in a report, for display
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffSummary {
    pub changed: usize,
    pub refreshed: usize,
    pub properties: usize,
}

impl DiffSummary {
    pub fn from_report(report: &ApplyReport) -> Self {
        let mut summary = Self::default();
        for entry in report.changed() {
            summary.changed += 1;
            if entry.refreshed {
                summary.refreshed += 1;
            }
            if let crate::types::Outcome::Changed { changes } = &entry.outcome {
                summary.properties += changes.len();
            }
        }
        summary
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.changed > 0
    }
}

/// Group changed resources by kind
pub fn group_by_kind(report: &ApplyReport) -> BTreeMap<ResourceKind, Vec<&ResourceReport>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&ResourceReport>> = BTreeMap::new();
    for entry in report.changed() {
        groups.entry(entry.resource.kind).or_default().push(entry);
    }
    groups
}
