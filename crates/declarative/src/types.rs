//! Core types for catalog convergence

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

/// Kind of a managed resource.
///
/// The set is closed: every kind has a fixed attribute schema and a
/// provider that knows how to read and converge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Package,
    User,
    Group,
    Service,
    Exec,
    FileLine,
    IniSetting,
    /// Join node with no host state, used to order batches of resources
    Barrier,
}

impl ResourceKind {
    /// Name used in resource references, e.g. `Exec` in `Exec[setup]`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Package => "Package",
            Self::User => "User",
            Self::Group => "Group",
            Self::Service => "Service",
            Self::Exec => "Exec",
            Self::FileLine => "File_line",
            Self::IniSetting => "Ini_setting",
            Self::Barrier => "Barrier",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed identity of a declared resource.
///
/// Relations are expressed between references, never between bare strings,
/// so a relation to a different kind with the same title cannot happen by
/// accident.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub title: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.title)
    }
}

/// A single property that differs between the host and the declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    pub from: String,
    pub to: String,
    /// Extra detail for display, e.g. a unified content diff
    pub detail: Option<String>,
}

impl PropertyChange {
    pub fn new(property: &str, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            property: property.to_string(),
            from: from.into(),
            to: to.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for PropertyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} changed '{}' to '{}'", self.property, self.from, self.to)
    }
}

/// Final state of a resource after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Host already matched the declaration
    Unchanged,
    /// Host was converged (or would be, in noop mode)
    Changed { changes: Vec<PropertyChange> },
    /// Evaluation or convergence failed
    Failed { error: String },
    /// Not evaluated because a predecessor failed or the run was cancelled
    Skipped { reason: String },
}

impl Outcome {
    /// Check if the outcome blocks dependent resources
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Check if the outcome represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short lowercase label for display and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Changed { .. } => "changed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Per-resource entry of a run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub resource: ResourceRef,
    pub outcome: Outcome,
    /// Whether a notify/subscribe edge delivered a refresh to this resource
    pub refreshed: bool,
    pub duration: Duration,
}

/// Counters over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub unchanged: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ApplySummary {
    /// Total number of resources evaluated
    pub fn total(&self) -> usize {
        self.unchanged + self.changed + self.failed + self.skipped
    }

    /// A run is successful when nothing failed and nothing was skipped
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ApplySummary) {
        self.unchanged += other.unchanged;
        self.changed += other.changed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Changed { .. } => self.changed += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Result of one convergence run over a catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    /// One entry per resource, in evaluation order
    pub resources: Vec<ResourceReport>,
    pub summary: ApplySummary,
    pub noop: bool,
    pub cancelled: bool,
    pub duration: Duration,
}

impl ApplyReport {
    /// Look up the report for a resource
    pub fn get(&self, resource: &ResourceRef) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| &r.resource == resource)
    }

    /// Outcome for a resource, if it was part of the run
    pub fn outcome(&self, resource: &ResourceRef) -> Option<&Outcome> {
        self.get(resource).map(|r| &r.outcome)
    }

    /// Resources that changed (or would change) during the run
    pub fn changed(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(|r| r.outcome.is_change())
    }

    /// Resources that failed or were skipped
    pub fn problems(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(|r| r.outcome.is_blocking())
    }

    /// True when every resource is `Unchanged`
    pub fn is_converged(&self) -> bool {
        self.summary.unchanged == self.summary.total()
    }

    /// Process exit status for the run: non-zero when anything failed or was skipped
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.summary.is_success())
    }
}

/// Options for a convergence run
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Evaluate everything, mutate nothing
    pub noop: bool,
    /// Deadline for external commands without their own timeout
    pub command_timeout: Duration,
    /// Prefix for every filesystem path the providers touch (staging trees, tests)
    pub fs_root: Option<PathBuf>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            noop: false,
            command_timeout: Duration::from_secs(300),
            fs_root: None,
        }
    }
}

/// Output from an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Output with the given exit code and nothing captured
    pub fn exit(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get stdout as string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Exit status for messages: the code, or `signal`
    pub fn status_label(&self) -> String {
        self.code.map_or_else(|| "signal".to_string(), |c| c.to_string())
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}
