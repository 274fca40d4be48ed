//! Package resource - installed through the host's package manager

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Provider;
use crate::context::ApplyContext;
use crate::types::PropertyChange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageEnsure {
    #[default]
    Installed,
    Absent,
}

/// Attributes of a `Package` resource. The title is the package name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAttrs {
    pub ensure: PackageEnsure,
}

impl PackageAttrs {
    pub fn installed() -> Self {
        Self::default()
    }

    pub fn absent() -> Self {
        Self {
            ensure: PackageEnsure::Absent,
        }
    }

    fn is_installed(name: &str, ctx: &ApplyContext<'_>) -> Result<bool> {
        let query = ctx.commands.render(&ctx.commands.package_query, name);
        Ok(ctx.run(&query)?.success())
    }
}

impl Provider for PackageAttrs {
    fn diff(&self, title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let installed = Self::is_installed(title, ctx)?;
        let change = match (self.ensure, installed) {
            (PackageEnsure::Installed, false) => {
                Some(PropertyChange::new("ensure", "absent", "installed"))
            }
            (PackageEnsure::Absent, true) => {
                Some(PropertyChange::new("ensure", "installed", "absent"))
            }
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
        let template = match self.ensure {
            PackageEnsure::Installed => &ctx.commands.package_install,
            PackageEnsure::Absent => &ctx.commands.package_remove,
        };
        ctx.run_checked(&ctx.commands.render(template, title))?;
        Ok(())
    }
}
