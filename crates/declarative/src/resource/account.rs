//! User and group resources - local accounts via the shadow utilities

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{Presence, Provider, validate_absolute};
use crate::context::{ApplyContext, shell_quote};
use crate::types::{PropertyChange, ResourceRef};

/// Attributes of a `User` resource. The title is the login name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttrs {
    pub ensure: Presence,
    #[serde(default)]
    pub system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Primary group name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
}

impl UserAttrs {
    pub fn present() -> Self {
        Self::default()
    }

    pub fn absent() -> Self {
        Self {
            ensure: Presence::Absent,
            ..Default::default()
        }
    }

    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    pub fn home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn gid(mut self, gid: impl Into<String>) -> Self {
        self.gid = Some(gid.into());
        self
    }

    pub(crate) fn validate(&self, resource: &ResourceRef) -> crate::Result<()> {
        if let Some(home) = &self.home {
            validate_absolute(resource, "home", home)?;
        }
        if let Some(shell) = &self.shell {
            validate_absolute(resource, "shell", shell)?;
        }
        Ok(())
    }

    fn flags(&self, only: Option<&[PropertyChange]>) -> String {
        let wanted = |property: &str| only.is_none_or(|c| c.iter().any(|c| c.property == property));
        let mut flags = String::new();
        if let Some(home) = self.home.as_ref().filter(|_| wanted("home")) {
            flags.push_str(&format!(" -d {}", shell_quote(home)));
        }
        if let Some(shell) = self.shell.as_ref().filter(|_| wanted("shell")) {
            flags.push_str(&format!(" -s {}", shell_quote(shell)));
        }
        if let Some(gid) = self.gid.as_ref().filter(|_| wanted("gid")) {
            flags.push_str(&format!(" -g {}", shell_quote(gid)));
        }
        flags
    }
}

/// Entry from `getent passwd`: (home, shell)
fn passwd_entry(name: &str, ctx: &ApplyContext<'_>) -> Result<Option<(String, String)>> {
    let output = ctx.run(&format!("getent passwd {}", shell_quote(name)))?;
    if !output.success() {
        return Ok(None);
    }
    let line = output.stdout_str();
    let fields: Vec<&str> = line.trim().split(':').collect();
    match fields.as_slice() {
        [_, _, _, _, _, home, shell] => Ok(Some(((*home).to_string(), (*shell).to_string()))),
        _ => anyhow::bail!("Unexpected passwd entry for {name}: {}", line.trim()),
    }
}

fn group_exists(name: &str, ctx: &ApplyContext<'_>) -> Result<bool> {
    Ok(ctx
        .run(&format!("getent group {}", shell_quote(name)))?
        .success())
}

impl Provider for UserAttrs {
    fn diff(&self, title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let entry = passwd_entry(title, ctx)?;
        let mut changes = Vec::new();
        match (self.ensure, entry) {
            (Presence::Absent, Some(_)) => {
                changes.push(PropertyChange::new("ensure", "present", "absent"));
            }
            (Presence::Absent, None) => {}
            (Presence::Present, None) => {
                changes.push(PropertyChange::new("ensure", "absent", "present"));
            }
            (Presence::Present, Some((home, shell))) => {
                if let Some(want) = self.home.as_ref().filter(|want| **want != home) {
                    changes.push(PropertyChange::new("home", home, want.clone()));
                }
                if let Some(want) = self.shell.as_ref().filter(|want| **want != shell) {
                    changes.push(PropertyChange::new("shell", shell, want.clone()));
                }
                if let Some(want) = &self.gid {
                    let output = ctx.run_checked(&format!("id -gn {}", shell_quote(title)))?;
                    let group = output.stdout_str().trim().to_string();
                    if group != *want {
                        changes.push(PropertyChange::new("gid", group, want.clone()));
                    }
                }
            }
        }
        Ok(changes)
    }

    fn apply(&self, title: &str, changes: &[PropertyChange], ctx: &ApplyContext<'_>) -> Result<()> {
        let name = shell_quote(title);
        let command = match self.ensure {
            Presence::Absent => format!("userdel {name}"),
            Presence::Present if changes.iter().any(|c| c.property == "ensure") => {
                let system = if self.system { " -r" } else { "" };
                format!("useradd{system} -M{} {name}", self.flags(None))
            }
            Presence::Present => format!("usermod{} {name}", self.flags(Some(changes))),
        };
        ctx.run_checked(&command)?;
        Ok(())
    }
}

/// Attributes of a `Group` resource. The title is the group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAttrs {
    pub ensure: Presence,
    #[serde(default)]
    pub system: bool,
}

impl GroupAttrs {
    pub fn present() -> Self {
        Self::default()
    }

    pub fn absent() -> Self {
        Self {
            ensure: Presence::Absent,
            system: false,
        }
    }

    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }
}

impl Provider for GroupAttrs {
    fn diff(&self, title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let exists = group_exists(title, ctx)?;
        let change = match (self.ensure, exists) {
            (Presence::Present, false) => Some(PropertyChange::new("ensure", "absent", "present")),
            (Presence::Absent, true) => Some(PropertyChange::new("ensure", "present", "absent")),
            _ => None,
        };
        Ok(change.into_iter().collect())
    }

    fn apply(
        &self,
        title: &str,
        _changes: &[PropertyChange],
        ctx: &ApplyContext<'_>,
    ) -> Result<()> {
        let name = shell_quote(title);
        let command = match self.ensure {
            Presence::Present if self.system => format!("groupadd -r {name}"),
            Presence::Present => format!("groupadd {name}"),
            Presence::Absent => format!("groupdel {name}"),
        };
        ctx.run_checked(&command)?;
        Ok(())
    }
}
