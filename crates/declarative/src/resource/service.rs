//! Service resource - running state and boot-time enablement

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Provider;
use crate::context::ApplyContext;
use crate::types::PropertyChange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEnsure {
    #[default]
    Running,
    Stopped,
}

impl ServiceEnsure {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Attributes of a `Service` resource. The title is the service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAttrs {
    pub ensure: ServiceEnsure,
    /// Boot-time enablement; `None` leaves it unmanaged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    /// Whether the init system supports `restart`; otherwise stop then start
    #[serde(default = "default_true")]
    pub hasrestart: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ServiceAttrs {
    fn default() -> Self {
        Self {
            ensure: ServiceEnsure::Running,
            enable: None,
            hasrestart: true,
        }
    }
}

impl ServiceAttrs {
    pub fn running() -> Self {
        Self::default()
    }

    pub fn stopped() -> Self {
        Self {
            ensure: ServiceEnsure::Stopped,
            ..Default::default()
        }
    }

    pub fn ensure(mut self, ensure: ServiceEnsure) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = Some(enable);
        self
    }

    pub fn hasrestart(mut self, hasrestart: bool) -> Self {
        self.hasrestart = hasrestart;
        self
    }

    fn check(template: &str, name: &str, ctx: &ApplyContext<'_>) -> Result<bool> {
        Ok(ctx.run(&ctx.commands.render(template, name))?.success())
    }

    fn invoke(template: &str, name: &str, ctx: &ApplyContext<'_>) -> Result<()> {
        ctx.run_checked(&ctx.commands.render(template, name))?;
        Ok(())
    }
}

impl Provider for ServiceAttrs {
    fn diff(&self, title: &str, ctx: &ApplyContext<'_>) -> Result<Vec<PropertyChange>> {
        let mut changes = Vec::new();

        let running = Self::check(&ctx.commands.service_status, title, ctx)?;
        let current = if running {
            ServiceEnsure::Running
        } else {
            ServiceEnsure::Stopped
        };
        if current != self.ensure {
            changes.push(PropertyChange::new(
                "ensure",
                current.as_str(),
                self.ensure.as_str(),
            ));
        }

        if let Some(enable) = self.enable {
            let enabled = Self::check(&ctx.commands.service_enabled, title, ctx)?;
            if enabled != enable {
                changes.push(PropertyChange::new(
                    "enable",
                    enabled.to_string(),
                    enable.to_string(),
                ));
            }
        }

        Ok(changes)
    }

    fn apply(&self, title: &str, changes: &[PropertyChange], ctx: &ApplyContext<'_>) -> Result<()> {
        let commands = ctx.commands;
        for change in changes {
            match change.property.as_str() {
                "ensure" => match self.ensure {
                    ServiceEnsure::Running => Self::invoke(&commands.service_start, title, ctx)?,
                    ServiceEnsure::Stopped => Self::invoke(&commands.service_stop, title, ctx)?,
                },
                "enable" => match self.enable {
                    Some(true) => Self::invoke(&commands.service_enable, title, ctx)?,
                    Some(false) => Self::invoke(&commands.service_disable, title, ctx)?,
                    None => {}
                },
                _ => {}
            }
        }
        Ok(())
    }

    fn refresh(
        &self,
        title: &str,
        applied: &[PropertyChange],
        ctx: &ApplyContext<'_>,
    ) -> Result<Option<PropertyChange>> {
        // A service started in this pass already runs the new configuration
        if self.ensure != ServiceEnsure::Running || applied.iter().any(|c| c.property == "ensure")
        {
            return Ok(None);
        }
        if !ctx.noop() {
            if self.hasrestart {
                Self::invoke(&ctx.commands.service_restart, title, ctx)?;
            } else {
                Self::invoke(&ctx.commands.service_stop, title, ctx)?;
                Self::invoke(&ctx.commands.service_start, title, ctx)?;
            }
        }
        log::info!("Service[{title}] restarted on refresh");
        Ok(Some(PropertyChange::new("refresh", "running", "restarted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostCommands;
    use crate::runner::{CommandRunner, CommandSpec};
    use crate::types::CommandOutput;
    use std::sync::Mutex;

    /// systemd with fixed active/enabled answers
    struct Systemd {
        active: bool,
        enabled: bool,
        log: Mutex<Vec<String>>,
    }

    impl Systemd {
        fn new(active: bool, enabled: bool) -> Self {
            Self {
                active,
                enabled,
                log: Mutex::new(Vec::new()),
            }
        }

        fn mutations(&self) -> Vec<String> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|c| !c.contains("--quiet"))
                .cloned()
                .collect()
        }
    }

    impl CommandRunner for Systemd {
        fn run(&self, spec: &CommandSpec) -> crate::Result<CommandOutput> {
            self.log.lock().unwrap().push(spec.command.clone());
            let ok = if spec.command.starts_with("systemctl is-active") {
                self.active
            } else if spec.command.starts_with("systemctl is-enabled") {
                self.enabled
            } else {
                true
            };
            Ok(CommandOutput::exit(if ok { 0 } else { 1 }))
        }
    }

    #[test]
    fn test_stopped_service_is_started_and_enabled() {
        let runner = Systemd::new(false, false);
        let commands = HostCommands::default();
        let ctx = ApplyContext::new(&runner, &commands);
        let attrs = ServiceAttrs::running().enable(true);

        let changes = attrs.diff("dirsrv@foo", &ctx).unwrap();
        let properties: Vec<&str> = changes.iter().map(|c| c.property.as_str()).collect();
        assert_eq!(properties, ["ensure", "enable"]);

        attrs.apply("dirsrv@foo", &changes, &ctx).unwrap();
        assert_eq!(
            runner.mutations(),
            ["systemctl start dirsrv@foo", "systemctl enable dirsrv@foo"]
        );

        // Just started, so a refresh in the same run does not restart it
        assert!(attrs.refresh("dirsrv@foo", &changes, &ctx).unwrap().is_none());
        assert_eq!(runner.mutations().len(), 2);
    }

    #[test]
    fn test_refresh_restarts_running_service() {
        let runner = Systemd::new(true, true);
        let commands = HostCommands::default();
        let ctx = ApplyContext::new(&runner, &commands);
        let attrs = ServiceAttrs::running().enable(true);

        assert!(attrs.diff("dirsrv@foo", &ctx).unwrap().is_empty());
        let refreshed = attrs.refresh("dirsrv@foo", &[], &ctx).unwrap().unwrap();
        assert_eq!(refreshed.to, "restarted");
        assert_eq!(runner.mutations(), ["systemctl restart dirsrv@foo"]);

        let runner = Systemd::new(true, true);
        let ctx = ApplyContext::new(&runner, &commands);
        ServiceAttrs::running()
            .hasrestart(false)
            .refresh("dirsrv@foo", &[], &ctx)
            .unwrap();
        assert_eq!(
            runner.mutations(),
            ["systemctl stop dirsrv@foo", "systemctl start dirsrv@foo"]
        );
    }

    #[test]
    fn test_noop_refresh_runs_nothing() {
        let runner = Systemd::new(true, true);
        let commands = HostCommands::default();
        let ctx = ApplyContext::new(&runner, &commands);
        let noop = ctx.as_noop();
        assert!(ServiceAttrs::running().refresh("dirsrv@foo", &[], &noop).unwrap().is_some());
        assert!(runner.mutations().is_empty());
    }
}
