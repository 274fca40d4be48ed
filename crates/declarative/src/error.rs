//! Error types for catalog compilation and convergence.
//!
//! Compile-time errors are fatal and raised before any host mutation.
//! Apply-time errors are contained to the resource that produced them and
//! surface in the run report as a `Failed` outcome.

use std::time::Duration;
use thiserror::Error;

/// Phase in which an error is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// Catalog construction or validation; nothing has been touched yet
    Compile,
    /// Resource evaluation during a convergence run
    Apply,
}

impl ErrorPhase {
    /// Get a user-friendly description of this phase.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Compile => "catalog compilation failed",
            Self::Apply => "resource evaluation failed",
        }
    }
}

/// Errors raised by the catalog, graph and command adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// The same (kind, title) was declared twice with different attributes
    #[error("duplicate declaration of {resource} with different attributes")]
    DuplicateResource {
        /// Display form of the conflicting identity, e.g. `File[/etc/dirsrv]`
        resource: String,
    },

    /// A required parameter has no value at any level of the cascade
    #[error("missing required parameter `{parameter}` for {scope}")]
    MissingParameter {
        /// Name of the parameter
        parameter: String,
        /// Scope that was being compiled, e.g. `instance foo`
        scope: String,
    },

    /// A parameter has a value outside its allowed domain
    #[error("invalid parameter `{parameter}` for {scope}: {message}")]
    InvalidParameter {
        /// Name of the parameter
        parameter: String,
        /// Scope that was being compiled
        scope: String,
        /// What is wrong with the value
        message: String,
    },

    /// An exec declares more than one idempotence guard
    #[error("{resource} declares conflicting guards: {}", .guards.join(", "))]
    ConflictingGuard {
        /// The offending exec
        resource: String,
        /// Every guard that was set
        guards: Vec<String>,
    },

    /// The ordering relations contain a cycle
    #[error("dependency cycle: {}", cycle_path(.resources))]
    CycleDetected {
        /// Participants in path order
        resources: Vec<String>,
    },

    /// A relation names a resource that was never declared
    #[error("{referrer} has a relation to undeclared resource {target}")]
    UnknownResource {
        /// Resource declaring the relation
        referrer: String,
        /// The missing reference
        target: String,
    },

    /// A resource attribute failed kind-specific validation
    #[error("invalid attribute `{attribute}` on {resource}: {message}")]
    InvalidAttribute {
        /// The resource being declared
        resource: String,
        /// Attribute name
        attribute: String,
        /// What is wrong with the value
        message: String,
    },

    /// An external command ran past its deadline and was killed
    #[error("command timed out after {}s: {command}", .timeout.as_secs())]
    CommandTimeout {
        /// The shell command line
        command: String,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// An external command could not be started
    #[error("failed to spawn `{command}`")]
    CommandSpawn {
        /// The shell command line
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An external command exited with a status outside its accepted set
    #[error("`{command}` returned {status} instead of one of {expected:?}{}", stderr_suffix(.stderr))]
    CommandFailed {
        /// The shell command line
        command: String,
        /// Exit code, or `signal` when the process was killed
        status: String,
        /// Accepted exit codes
        expected: Vec<i32>,
        /// Tail of the command's standard error
        stderr: String,
    },
}

impl Error {
    /// Phase this error belongs to.
    pub fn phase(&self) -> ErrorPhase {
        match self {
            Self::DuplicateResource { .. }
            | Self::MissingParameter { .. }
            | Self::InvalidParameter { .. }
            | Self::ConflictingGuard { .. }
            | Self::CycleDetected { .. }
            | Self::UnknownResource { .. }
            | Self::InvalidAttribute { .. } => ErrorPhase::Compile,
            Self::CommandTimeout { .. } | Self::CommandSpawn { .. } | Self::CommandFailed { .. } => {
                ErrorPhase::Apply
            }
        }
    }

    /// Whether this error aborts compilation before anything is applied.
    pub fn is_compile_time(&self) -> bool {
        self.phase() == ErrorPhase::Compile
    }

    pub(crate) fn invalid_attribute(
        resource: impl ToString,
        attribute: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            resource: resource.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}

fn cycle_path(resources: &[String]) -> String {
    let mut path = resources.join(" -> ");
    if let Some(first) = resources.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Result type for catalog and adapter operations.
pub type Result<T> = std::result::Result<T, Error>;
