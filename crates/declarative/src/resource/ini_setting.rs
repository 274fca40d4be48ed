//! Ini setting resource - one `key=value` inside a `[section]`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use super::{Presence, Provider, validate_absolute};
use crate::context::ApplyContext;
use crate::diff::content_diff;
use crate::error::Error;
use crate::types::{PropertyChange, ResourceRef};

/// Attributes of an `Ini_setting` resource. The title is a free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IniSettingAttrs {
    pub ensure: Presence,
    pub path: String,
    pub section: String,
    pub setting: String,
    pub value: String,
}

impl IniSettingAttrs {
    pub fn new(
        path: impl Into<String>,
        section: impl Into<String>,
        setting: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            ensure: Presence::Present,
            path: path.into(),
            section: section.into(),
            setting: setting.into(),
            value: value.into(),
        }
    }

    pub fn absent(mut self) -> Self {
        self.ensure = Presence::Absent;
        self
    }

    pub(crate) fn validate(&self, resource: &ResourceRef) -> crate::Result<()> {
        validate_absolute(resource, "path", &self.path)?;
        if self.setting.trim().is_empty() || self.setting.contains('=') {
            return Err(Error::invalid_attribute(
                resource,
                "setting",
                "must be a non-empty key without '='",
            ));
        }
        Ok(())
    }

    /// Current value of the setting in `text`, with the line index
    fn find(&self, text: &str) -> (Option<usize>, Option<(usize, String)>) {
        let mut section_line = None;
        let mut in_section = false;
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                in_section = name.trim() == self.section;
                if in_section {
                    section_line = Some(idx);
                }
                continue;
            }
            if !in_section || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once('=')
                && key.trim() == self.setting
            {
                return (section_line, Some((idx, value.trim().to_string())));
            }
        }
        (section_line, None)
    }

    fn edit(&self, text: &str) -> Option<String> {
        let (section, setting) = self.find(text);
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let entry = format!("{}={}", self.setting, self.value);

        match (self.ensure, section, setting) {
            (Presence::Present, _, Some((_, value))) if value == self.value => return None,
            (Presence::Present, _, Some((idx, _))) => lines[idx] = entry,
            (Presence::Present, Some(idx), None) => lines.insert(idx + 1, entry),
            (Presence::Present, None, None) => {
                if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    lines.push(String::new());
                }
                lines.push(format!("[{}]", self.section));
                lines.push(entry);
            }
            (Presence::Absent, _, Some((idx, _))) => {
                lines.remove(idx);
            }
            (Presence::Absent, _, None) => return None,
        }

        let mut edited = lines.join("\n");
        edited.push('\n');
        Some(edited)
    }

    fn read(&self, ctx: &ApplyContext<'_>) -> Result<String> {
        let path = ctx.resolve(&self.path);
        if !path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&path).with_context(|| format!("Could not read {}", self.path))
    }
}

impl Provider for IniSettingAttrs {
    fn diff(&self, _title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let current = self.read(ctx)?;
        let Some(edited) = self.edit(&current) else {
            return Ok(Vec::new());
        };
        let from = self
            .find(&current)
            .1
            .map_or_else(|| "absent".to_string(), |(_, v)| v);
        let to = match self.ensure {
            Presence::Present => self.value.clone(),
            Presence::Absent => "absent".to_string(),
        };
        let mut change = PropertyChange::new(&self.setting, from, to);
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
        if let Some(edited) = self.edit(&current) {
            let path = ctx.resolve(&self.path);
            fs::write(&path, edited).with_context(|| format!("Failed to write {}", self.path))?;
        }
        Ok(())
    }
}
