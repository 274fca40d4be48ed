//! Apply context and provider traits
//!
//! These let the declarative crate run without depending on a particular
//! init system, package manager, terminal UI or process runner.

use crate::runner::{CommandRunner, CommandSpec};
use crate::types::{
    ApplyOptions, ApplyReport, ApplySummary, CommandOutput, ResourceRef, ResourceReport,
};
use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default search path for host queries and execs without their own `path`
pub const DEFAULT_SEARCH_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

/// Package manager family used to render package commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
}

/// Init system family used to render service commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    Systemd,
    SysV,
}

/// Command templates for host queries and mutations.
///
/// `{name}` is replaced by the shell-quoted package or service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommands {
    pub package_query: String,
    pub package_install: String,
    pub package_remove: String,
    pub service_status: String,
    pub service_enabled: String,
    pub service_start: String,
    pub service_stop: String,
    pub service_restart: String,
    pub service_enable: String,
    pub service_disable: String,
    pub search_path: String,
}

impl HostCommands {
    pub fn new(packages: PackageManager, services: ServiceManager) -> Self {
        let (package_query, package_install, package_remove) = match packages {
            PackageManager::Apt => (
                "dpkg-query -W -f='${Status}' {name} 2>/dev/null | grep -q 'install ok installed'",
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {name}",
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y {name}",
            ),
            PackageManager::Yum => (
                "rpm -q {name} >/dev/null 2>&1",
                "yum install -y {name}",
                "yum remove -y {name}",
            ),
        };
        let (status, enabled, start, stop, restart) = match services {
            ServiceManager::Systemd => (
                "systemctl is-active --quiet {name}",
                "systemctl is-enabled --quiet {name}",
                "systemctl start {name}",
                "systemctl stop {name}",
                "systemctl restart {name}",
            ),
            ServiceManager::SysV => (
                "service {name} status >/dev/null 2>&1",
                "",
                "service {name} start",
                "service {name} stop",
                "service {name} restart",
            ),
        };
        let (enabled, enable, disable) = match (services, packages) {
            (ServiceManager::Systemd, _) => (
                enabled,
                "systemctl enable {name}",
                "systemctl disable {name}",
            ),
            (ServiceManager::SysV, PackageManager::Apt) => (
                "ls /etc/rc2.d/S??{name} >/dev/null 2>&1",
                "update-rc.d {name} defaults",
                "update-rc.d {name} disable",
            ),
            (ServiceManager::SysV, PackageManager::Yum) => (
                "chkconfig {name}",
                "chkconfig {name} on",
                "chkconfig {name} off",
            ),
        };

        Self {
            package_query: package_query.to_string(),
            package_install: package_install.to_string(),
            package_remove: package_remove.to_string(),
            service_status: status.to_string(),
            service_enabled: enabled.to_string(),
            service_start: start.to_string(),
            service_stop: stop.to_string(),
            service_restart: restart.to_string(),
            service_enable: enable.to_string(),
            service_disable: disable.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
        }
    }

    /// Substitute `{name}` in a template
    pub fn render(&self, template: &str, name: &str) -> String {
        template.replace("{name}", &shell_quote(name))
    }
}

impl Default for HostCommands {
    fn default() -> Self {
        Self::new(PackageManager::Apt, ServiceManager::Systemd)
    }
}

/// Quote a word for `sh` unless it only contains safe characters
pub fn shell_quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Cooperative cancellation flag, checked between resources
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callback for convergence runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called before the first resource is evaluated
    fn on_run_start(&mut self, total: usize, noop: bool);

    /// Called when a resource starts evaluating
    fn on_resource_start(&mut self, resource: &ResourceRef);

    /// Called when a resource reaches its final state
    fn on_resource_complete(&mut self, report: &ResourceReport);

    /// Called after the last resource
    fn on_run_complete(&mut self, summary: &ApplySummary);
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback {
    /// Shown the noop plan before [`confirm`](Self::confirm) is asked
    fn review(&mut self, _plan: &ApplyReport) {}

    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize, _noop: bool) {}
    fn on_resource_start(&mut self, _resource: &ResourceRef) {}
    fn on_resource_complete(&mut self, _report: &ResourceReport) {}
    fn on_run_complete(&mut self, _summary: &ApplySummary) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to providers and the command adapter
#[derive(Clone)]
pub struct ApplyContext<'a> {
    pub options: ApplyOptions,
    /// Every process spawned during a run goes through this runner
    pub runner: &'a dyn CommandRunner,
    pub commands: &'a HostCommands,
    pub cancel: CancelToken,
}

impl<'a> ApplyContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, commands: &'a HostCommands) -> Self {
        Self {
            options: ApplyOptions::default(),
            runner,
            commands,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Same context with noop enabled
    pub fn as_noop(&self) -> Self {
        let mut ctx = self.clone();
        ctx.options.noop = true;
        ctx
    }

    pub fn noop(&self) -> bool {
        self.options.noop
    }

    /// Map a declared absolute path onto the filesystem root in use
    pub fn resolve(&self, path: &str) -> PathBuf {
        match &self.options.fs_root {
            None => PathBuf::from(path),
            Some(root) => {
                let relative: PathBuf = Path::new(path)
                    .components()
                    .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
                    .collect();
                root.join(relative)
            }
        }
    }

    /// Run a host query with the default search path and timeout
    pub fn run(&self, command: &str) -> crate::Result<CommandOutput> {
        log::trace!("query: {command}");
        self.runner.run(&CommandSpec {
            command: command.to_string(),
            cwd: None,
            search_path: self.commands.search_path.clone(),
            timeout: self.options.command_timeout,
        })
    }

    /// Run a host mutation, failing on a non-zero exit
    pub fn run_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.run(command)?;
        if !output.success() {
            anyhow::bail!(
                "`{}` failed with status {}: {}",
                command,
                output.status_label(),
                output.stderr_str().trim()
            );
        }
        Ok(output)
    }
}
