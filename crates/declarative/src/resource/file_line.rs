//! File line resource - ensure a single line is present in a text file

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;

use super::{Presence, Provider, validate_absolute};
use crate::context::ApplyContext;
use crate::diff::content_diff;
use crate::error::Error;
use crate::types::{PropertyChange, ResourceRef};

/// Attributes of a `File_line` resource. The title is a free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLineAttrs {
    pub ensure: Presence,
    pub path: String,
    pub line: String,
    /// Regex selecting an existing line to replace instead of appending
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
}

impl FileLineAttrs {
    pub fn new(path: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            ensure: Presence::Present,
            path: path.into(),
            line: line.into(),
            matcher: None,
        }
    }

    pub fn absent(mut self) -> Self {
        self.ensure = Presence::Absent;
        self
    }

    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.matcher = Some(pattern.into());
        self
    }

    pub(crate) fn validate(&self, resource: &ResourceRef) -> crate::Result<()> {
        validate_absolute(resource, "path", &self.path)?;
        if self.line.is_empty() || self.line.contains('\n') {
            return Err(Error::invalid_attribute(
                resource,
                "line",
                "must be a single non-empty line",
            ));
        }
        if let Some(pattern) = &self.matcher {
            Regex::new(pattern)
                .map_err(|e| Error::invalid_attribute(resource, "match", e.to_string()))?;
        }
        Ok(())
    }

    /// Edited text, or `None` when the file already complies
    fn edit(&self, text: &str) -> Result<Option<String>> {
        let lines: Vec<&str> = text.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);

        match self.ensure {
            Presence::Present => {
                if lines.contains(&self.line.as_str()) {
                    return Ok(None);
                }
                let matcher = self.matcher.as_deref().map(Regex::new).transpose()?;
                let mut replaced = false;
                for line in &lines {
                    if !replaced && matcher.as_ref().is_some_and(|re| re.is_match(line)) {
                        out.push(self.line.clone());
                        replaced = true;
                    } else {
                        out.push((*line).to_string());
                    }
                }
                if !replaced {
                    out.push(self.line.clone());
                }
            }
            Presence::Absent => {
                if !lines.contains(&self.line.as_str()) {
                    return Ok(None);
                }
                out.extend(
                    lines
                        .iter()
                        .filter(|l| **l != self.line)
                        .map(|l| (*l).to_string()),
                );
            }
        }

        let mut edited = out.join("\n");
        if !edited.is_empty() {
            edited.push('\n');
        }
        Ok(Some(edited))
    }

    fn read(&self, ctx: &ApplyContext<'_>) -> Result<String> {
        let path = ctx.resolve(&self.path);
        if !path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&path).with_context(|| format!("Could not read {}", self.path))
    }
}

impl Provider for FileLineAttrs {
    fn diff(&self, _title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let current = self.read(ctx)?;
        let Some(edited) = self.edit(&current)? else {
            return Ok(Vec::new());
        };
        let (from, to) = match self.ensure {
            Presence::Present => ("absent", "present"),
            Presence::Absent => ("present", "absent"),
        };
        let mut change = PropertyChange::new("ensure", from, to);
        if let Some(detail) = content_diff(&self.path, current.as_bytes(), edited.as_bytes()) {
            change = change.with_detail(detail);
        }
        Ok(vec![change])
    }

    fn apply(
        &self,
        _title: &str,
        _changes: &[PropertyChange],
        ctx: &ApplyContext<'_>,
    ) -> Result<()> {
        let current = self.read(ctx)?;
        if let Some(edited) = self.edit(&current)? {
            let path = ctx.resolve(&self.path);
            fs::write(&path, edited).with_context(|| format!("Failed to write {}", self.path))?;
        }
        Ok(())
    }
}
