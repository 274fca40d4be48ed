//! File resource - regular files and directories with content, mode and ownership

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::{Provider, validate_absolute, validate_mode};
use crate::context::{ApplyContext, shell_quote};
use crate::diff::content_diff;
use crate::error::Error;
use crate::types::{PropertyChange, ResourceRef};

/// Target state of a file resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEnsure {
    #[default]
    File,
    Directory,
    Absent,
}

impl FileEnsure {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Absent => "absent",
        }
    }
}

/// Attributes of a `File` resource. The title is the absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttrs {
    pub ensure: FileEnsure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Local source files, concatenated in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl FileAttrs {
    pub fn file() -> Self {
        Self::default()
    }

    pub fn directory() -> Self {
        Self {
            ensure: FileEnsure::Directory,
            ..Default::default()
        }
    }

    pub fn absent() -> Self {
        Self {
            ensure: FileEnsure::Absent,
            ..Default::default()
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Append a source file; several sources are concatenated
    pub fn source(mut self, path: impl Into<String>) -> Self {
        self.source.push(path.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub(crate) fn validate(&self, resource: &ResourceRef) -> crate::Result<()> {
        validate_absolute(resource, "path", &resource.title)?;
        validate_mode(resource, self.mode.as_deref())?;
        if self.content.is_some() && !self.source.is_empty() {
            return Err(Error::invalid_attribute(
                resource,
                "content",
                "content and source are mutually exclusive",
            ));
        }
        if self.ensure != FileEnsure::File && (self.content.is_some() || !self.source.is_empty()) {
            return Err(Error::invalid_attribute(
                resource,
                "ensure",
                format!("a {} cannot have content", self.ensure.as_str()),
            ));
        }
        for source in &self.source {
            validate_absolute(resource, "source", source)?;
        }
        Ok(())
    }

    /// Desired bytes, or `None` when only existence is managed
    fn desired_content(&self, ctx: &ApplyContext<'_>) -> Result<Option<Vec<u8>>> {
        if let Some(content) = &self.content {
            return Ok(Some(content.clone().into_bytes()));
        }
        if self.source.is_empty() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        for source in &self.source {
            let path = ctx.resolve(source);
            let chunk =
                fs::read(&path).with_context(|| format!("Could not read source {source}"))?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(Some(bytes))
    }

    fn current_ownership(&self, path: &Path, ctx: &ApplyContext<'_>) -> Result<(String, String)> {
        let output = ctx.run_checked(&format!(
            "stat -c %U:%G {}",
            shell_quote(&path.to_string_lossy())
        ))?;
        let stdout = output.stdout_str();
        let (owner, group) = stdout
            .trim()
            .split_once(':')
            .with_context(|| format!("Unexpected stat output: {}", stdout.trim()))?;
        Ok((owner.to_string(), group.to_string()))
    }

    fn chown(&self, path: &Path, ctx: &ApplyContext<'_>) -> Result<()> {
        let spec = match (&self.owner, &self.group) {
            (Some(owner), Some(group)) => format!("{owner}:{group}"),
            (Some(owner), None) => owner.clone(),
            (None, Some(group)) => format!(":{group}"),
            (None, None) => return Ok(()),
        };
        ctx.run_checked(&format!(
            "chown {} {}",
            shell_quote(&spec),
            shell_quote(&path.to_string_lossy())
        ))?;
        Ok(())
    }
}

fn current_kind(path: &Path) -> FileEnsure {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => FileEnsure::Directory,
        Ok(_) => FileEnsure::File,
        Err(_) => FileEnsure::Absent,
    }
}

fn normalize_mode(mode: &str) -> Option<u32> {
    u32::from_str_radix(mode, 8).ok()
}

impl Provider for FileAttrs {
    fn diff(&self, title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let path = ctx.resolve(title);
        let current = current_kind(&path);
        let mut changes = Vec::new();

        if self.ensure == FileEnsure::Absent {
            if current != FileEnsure::Absent {
                changes.push(PropertyChange::new("ensure", current.as_str(), "absent"));
            }
            return Ok(changes);
        }

        if current == FileEnsure::Absent {
            changes.push(PropertyChange::new("ensure", "absent", self.ensure.as_str()));
            return Ok(changes);
        }
        if current != self.ensure {
            anyhow::bail!(
                "{} exists as a {}, expected a {}",
                title,
                current.as_str(),
                self.ensure.as_str()
            );
        }

        if let Some(desired) = self.desired_content(ctx)? {
            let existing =
                fs::read(&path).with_context(|| format!("Could not read {}", path.display()))?;
            let (from, to) = (blake3::hash(&existing), blake3::hash(&desired));
            if from != to {
                let mut change = PropertyChange::new(
                    "content",
                    format!("{{blake3}}{}", &from.to_hex()[..16]),
                    format!("{{blake3}}{}", &to.to_hex()[..16]),
                );
                if let Some(detail) = content_diff(title, &existing, &desired) {
                    change = change.with_detail(detail);
                }
                changes.push(change);
            }
        }

        if let Some(mode) = &self.mode {
            let meta = fs::metadata(&path)?;
            let actual = meta.permissions().mode() & 0o7777;
            if normalize_mode(mode) != Some(actual) {
                changes.push(PropertyChange::new("mode", format!("{actual:04o}"), mode.clone()));
            }
        }

        if self.owner.is_some() || self.group.is_some() {
            let (owner, group) = self.current_ownership(&path, ctx)?;
            if let Some(want) = self.owner.as_ref().filter(|want| **want != owner) {
                changes.push(PropertyChange::new("owner", owner, want.clone()));
            }
            if let Some(want) = self.group.as_ref().filter(|want| **want != group) {
                changes.push(PropertyChange::new("group", group, want.clone()));
            }
        }

        Ok(changes)
    }

    fn apply(
        &self,
        title: &str,
        changes: &[PropertyChange],
        ctx: &ApplyContext<'_>,
    ) -> Result<()> {
        let path = ctx.resolve(title);
        let touched = |property: &str| changes.iter().any(|c| c.property == property);

        match self.ensure {
            FileEnsure::Absent => {
                let removed = if path.is_dir() {
                    fs::remove_dir(&path)
                } else {
                    fs::remove_file(&path)
                };
                removed.with_context(|| format!("Failed to remove {}", path.display()))?;
                return Ok(());
            }
            FileEnsure::Directory => {
                if touched("ensure") {
                    fs::create_dir(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                }
            }
            FileEnsure::File => {
                if touched("ensure") || touched("content") {
                    let content = self.desired_content(ctx)?.unwrap_or_default();
                    fs::write(&path, content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
            }
        }

        if let Some(mode) = self.mode.as_deref().and_then(normalize_mode) {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))
                .with_context(|| format!("Failed to set mode on {}", path.display()))?;
        }

        if touched("ensure") || touched("owner") || touched("group") {
            self.chown(&path, ctx)?;
        }
        Ok(())
    }
}
