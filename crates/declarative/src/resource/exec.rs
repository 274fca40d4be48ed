//! Exec resource - an opaque shell command with an idempotence guard

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::validate_absolute;
use crate::error::{Error, Result};
use crate::types::ResourceRef;

/// Condition deciding whether an exec's command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Run only if this path does not exist
    Creates(String),
    /// Run only if this check command exits non-zero
    Unless(String),
    /// Run only if this check command exits zero
    OnlyIf(String),
    /// Run only when a refresh event was received
    RefreshOnly,
}

impl Guard {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Creates(_) => "creates",
            Self::Unless(_) => "unless",
            Self::OnlyIf(_) => "onlyif",
            Self::RefreshOnly => "refreshonly",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creates(path) => write!(f, "creates {path}"),
            Self::Unless(check) => write!(f, "unless `{check}`"),
            Self::OnlyIf(check) => write!(f, "onlyif `{check}`"),
            Self::RefreshOnly => f.write_str("refreshonly"),
        }
    }
}

/// Attributes of an `Exec` resource.
///
/// The title is a free-form label; the command is run through `sh -c`.
/// At most one of `creates`, `unless`, `onlyif` and `refreshonly` may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecAttrs {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Search path for the command and its checks, colon separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creates: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onlyif: Option<String>,
    #[serde(default)]
    pub refreshonly: bool,
    /// Accepted exit codes
    pub returns: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ExecAttrs {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            path: None,
            creates: None,
            unless: None,
            onlyif: None,
            refreshonly: false,
            returns: vec![0],
            timeout: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn creates(mut self, path: impl Into<String>) -> Self {
        self.creates = Some(path.into());
        self
    }

    pub fn unless(mut self, check: impl Into<String>) -> Self {
        self.unless = Some(check.into());
        self
    }

    pub fn onlyif(mut self, check: impl Into<String>) -> Self {
        self.onlyif = Some(check.into());
        self
    }

    pub fn refreshonly(mut self) -> Self {
        self.refreshonly = true;
        self
    }

    pub fn returns(mut self, codes: impl Into<Vec<i32>>) -> Self {
        self.returns = codes.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Every guard that is set, in a fixed order
    pub fn guards(&self) -> Vec<Guard> {
        let mut guards = Vec::new();
        if let Some(path) = &self.creates {
            guards.push(Guard::Creates(path.clone()));
        }
        if let Some(check) = &self.unless {
            guards.push(Guard::Unless(check.clone()));
        }
        if let Some(check) = &self.onlyif {
            guards.push(Guard::OnlyIf(check.clone()));
        }
        if self.refreshonly {
            guards.push(Guard::RefreshOnly);
        }
        guards
    }

    /// The single guard of a validated exec, if any
    pub fn guard(&self) -> Option<Guard> {
        self.guards().into_iter().next()
    }

    pub(crate) fn validate(&self, resource: &ResourceRef) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::invalid_attribute(resource, "command", "must not be empty"));
        }
        let guards = self.guards();
        if guards.len() > 1 {
            return Err(Error::ConflictingGuard {
                resource: resource.to_string(),
                guards: guards.iter().map(|g| g.name().to_string()).collect(),
            });
        }
        if let Some(cwd) = &self.cwd {
            validate_absolute(resource, "cwd", cwd)?;
        }
        if let Some(creates) = &self.creates {
            validate_absolute(resource, "creates", creates)?;
        }
        if self.returns.is_empty() {
            return Err(Error::invalid_attribute(
                resource,
                "returns",
                "at least one exit code must be accepted",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;

    fn exec_ref() -> ResourceRef {
        ResourceRef::new(ResourceKind::Exec, "Add trust for CA: foo")
    }

    #[test]
    fn test_single_guard() {
        let attrs = ExecAttrs::new("certutil -M").unless("certutil -L");
        assert!(attrs.validate(&exec_ref()).is_ok());
        assert_eq!(attrs.guard(), Some(Guard::Unless("certutil -L".into())));
        assert_eq!(ExecAttrs::new("true").guard(), None);
    }

    #[test]
    fn test_conflicting_guards_rejected() {
        let attrs = ExecAttrs::new("certutil -M")
            .creates("/etc/dirsrv/slapd-foo")
            .refreshonly();
        match attrs.validate(&exec_ref()).unwrap_err() {
            Error::ConflictingGuard { resource, guards } => {
                assert_eq!(resource, "Exec[Add trust for CA: foo]");
                assert_eq!(guards, vec!["creates", "refreshonly"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_relative_creates_rejected() {
        let attrs = ExecAttrs::new("touch x").creates("x.done");
        assert!(attrs.validate(&exec_ref()).is_err());
    }

    #[test]
    fn test_empty_returns_rejected() {
        let attrs = ExecAttrs::new("true").returns(Vec::new());
        assert!(attrs.validate(&exec_ref()).is_err());
    }
}
