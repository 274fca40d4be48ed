//! Host-touching commands: `plan` (noop) and `apply`

use crate::Context;
use crate::cli::{ApplyArgs, ManifestArgs};
use crate::progress::{self, CliProgress};
use crate::ui;
use anyhow::Result;
use declarative::{
    ApplyContext, ApplyOptions, ApplyReport, AutoConfirm, Catalog, ConfirmCallback, Convergence,
    ProgressCallback, ShellRunner,
};
use std::time::Duration;

/// Shows the plan, then asks on the terminal before converging
struct DialoguerConfirm {
    verbose: bool,
}

impl ConfirmCallback for DialoguerConfirm {
    fn review(&mut self, plan: &ApplyReport) {
        progress::print_plan(plan, self.verbose);
    }

    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}

pub fn plan(ctx: &Context, args: ManifestArgs) -> Result<i32> {
    let compiled = super::compile(args.manifest.as_deref(), &ShellRunner)?;
    let commands = compiled.platform.host_commands();
    let apply_ctx = ApplyContext::new(&ShellRunner, &commands).as_noop();

    if !ctx.quiet {
        ui::header(&format!(
            "Plan for {} ({})",
            compiled.facts.fqdn, compiled.platform.id
        ));
    }
    let mut progress = CliProgress::new(ctx.verbose > 0, ctx.quiet);
    let report = declarative::apply(&compiled.catalog, &apply_ctx, &mut progress);
    if report.summary.changed == 0 && report.summary.is_success() && !ctx.quiet {
        ui::success("Nothing to change");
    }
    Ok(report.exit_code())
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<i32> {
    let compiled = super::compile(args.manifest.manifest.as_deref(), &ShellRunner)?;
    let commands = compiled.platform.host_commands();
    let options = ApplyOptions {
        command_timeout: Duration::from_secs(args.timeout),
        ..ApplyOptions::default()
    };
    let apply_ctx = ApplyContext::new(&ShellRunner, &commands).with_options(options);

    if !ctx.quiet {
        ui::header(&format!(
            "Converging {} ({})",
            compiled.facts.fqdn, compiled.platform.id
        ));
        ui::kv("manifest", &compiled.path.display().to_string());
        ui::kv(
            "started",
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
    }

    let mut progress = CliProgress::new(ctx.verbose > 0, ctx.quiet);
    let convergence = if args.yes {
        converge(&compiled.catalog, &apply_ctx, &mut progress, &mut AutoConfirm)?
    } else {
        let mut confirm = DialoguerConfirm {
            verbose: ctx.verbose > 0,
        };
        converge(&compiled.catalog, &apply_ctx, &mut progress, &mut confirm)?
    };
    report(&convergence, ctx.quiet);
    Ok(exit_code(&convergence))
}

fn converge<P, C>(
    catalog: &Catalog,
    apply_ctx: &ApplyContext<'_>,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Convergence>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let convergence = declarative::converge_confirmed(catalog, apply_ctx, progress, confirm)?;
    let summary = &convergence.report().summary;
    log::info!(
        "{} changed, {} unchanged, {} failed, {} skipped",
        summary.changed,
        summary.unchanged,
        summary.failed,
        summary.skipped
    );
    Ok(convergence)
}

fn report(convergence: &Convergence, quiet: bool) {
    match convergence {
        Convergence::InSync(_) => {
            if !quiet {
                ui::success("Already converged");
            }
        }
        Convergence::Declined(_) => ui::warn("Aborted, nothing was changed"),
        Convergence::Applied(report) => print_result(report, quiet),
    }
}

fn print_result(report: &ApplyReport, quiet: bool) {
    let elapsed = ui::format_duration(report.duration);
    if report.cancelled {
        ui::warn(&format!("Run cancelled after {elapsed}"));
    }
    if report.summary.is_success() {
        if !quiet {
            ui::success(&format!("Converged in {elapsed}"));
        }
        return;
    }
    ui::error(&format!(
        "{} failed, {} skipped",
        report.summary.failed, report.summary.skipped
    ));
    for entry in report.problems() {
        ui::dim(&format!("{}: {}", entry.resource, entry.outcome.label()));
    }
}

/// 1 when anything failed or was skipped; declining is not an error
fn exit_code(convergence: &Convergence) -> i32 {
    match convergence {
        Convergence::Declined(_) => 0,
        other => other.report().exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::{FOO, compile_on};
    use crate::platform::Platform;
    use declarative::{
        AutoDecline, CommandOutput, CommandRunner, CommandSpec, NoProgress, Outcome, ResourceKind,
        ResourceRef,
    };
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct HostState {
        packages: BTreeSet<String>,
        running: BTreeSet<String>,
        enabled: BTreeSet<String>,
        groups: BTreeSet<String>,
        /// name -> passwd line
        users: BTreeMap<String, String>,
        trusted: BTreeSet<String>,
        log: Vec<String>,
    }

    /// A Debian host simulated under a temporary root
    struct FakeHost {
        root: PathBuf,
        state: Mutex<HostState>,
    }

    impl FakeHost {
        fn new(root: &Path) -> Self {
            fs::create_dir_all(root.join("etc/default")).unwrap();
            Self {
                root: root.to_path_buf(),
                state: Mutex::new(HostState::default()),
            }
        }

        fn host_path(&self, path: &str) -> PathBuf {
            self.root.join(path.trim_start_matches('/'))
        }

        fn touch(&self, path: &str) {
            fs::write(self.host_path(path), "").unwrap();
        }

        fn commands(&self) -> Vec<String> {
            self.state.lock().unwrap().log.clone()
        }

        fn ran(&self, prefix: &str) -> usize {
            self.commands()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    fn last_word(command: &str) -> String {
        command.split_whitespace().last().unwrap().to_string()
    }

    fn quoted(command: &str) -> String {
        command.split('"').nth(1).unwrap().to_string()
    }

    fn status(ok: bool) -> CommandOutput {
        CommandOutput::exit(if ok { 0 } else { 1 })
    }

    impl CommandRunner for FakeHost {
        fn run(&self, spec: &CommandSpec) -> declarative::Result<CommandOutput> {
            let command = spec.command.as_str();
            let mut state = self.state.lock().unwrap();
            state.log.push(command.to_string());
            let words: Vec<&str> = command.split_whitespace().collect();

            let output = if command.starts_with("dpkg-query") {
                status(state.packages.contains(words[3]))
            } else if command.contains("apt-get install -y ") {
                state.packages.insert(last_word(command));
                status(true)
            } else if command.starts_with("systemctl is-active --quiet ") {
                status(state.running.contains(&last_word(command)))
            } else if command.starts_with("systemctl is-enabled --quiet ") {
                status(state.enabled.contains(&last_word(command)))
            } else if command.starts_with("systemctl start ") {
                state.running.insert(last_word(command));
                status(true)
            } else if command.starts_with("systemctl enable ") {
                state.enabled.insert(last_word(command));
                status(true)
            } else if command.starts_with("getent group ") {
                status(state.groups.contains(&last_word(command)))
            } else if command.starts_with("groupadd -r ") {
                state.groups.insert(last_word(command));
                status(true)
            } else if command.starts_with("getent passwd ") {
                match state.users.get(&last_word(command)) {
                    Some(line) => CommandOutput::ok(line.clone()),
                    None => status(false),
                }
            } else if command.starts_with("useradd -r -M ") {
                let flag = |name: &str| {
                    let at = words.iter().position(|w| *w == name).unwrap();
                    words[at + 1].to_string()
                };
                let name = last_word(command);
                let line = format!("{name}:x:999:{}::{}:{}\n", flag("-g"), flag("-d"), flag("-s"));
                state.users.insert(name, line);
                status(true)
            } else if command.starts_with("id -gn ") {
                CommandOutput::ok("dirsrv\n")
            } else if command.starts_with("stat -c %U:%G ") {
                CommandOutput::ok("dirsrv:dirsrv\n")
            } else if command.starts_with("/bin/mkdir -p ") {
                fs::create_dir_all(self.host_path(&last_word(command))).unwrap();
                status(true)
            } else if command.starts_with("setup-ds ") {
                let id = command.split("slapd.ServerIdentifier=").nth(1).unwrap();
                let id = id.split_whitespace().next().unwrap();
                fs::create_dir_all(self.host_path(&format!("/etc/dirsrv/slapd-{id}"))).unwrap();
                status(true)
            } else if command.starts_with("certutil -L ") {
                status(state.trusted.contains(&quoted(command)))
            } else if command.starts_with("certutil -M ") {
                state.trusted.insert(quoted(command));
                status(true)
            } else if let Some((_, pem)) = command.split_once(" -a > ") {
                let cwd = spec.cwd.as_ref().unwrap();
                fs::write(cwd.join(pem), format!("PEM {}\n", quoted(command))).unwrap();
                status(true)
            } else {
                if let Some((_, done)) = command.split_once("; touch ") {
                    self.touch(done);
                }
                status(true)
            };
            Ok(output)
        }
    }

    fn context<'a>(
        host: &'a FakeHost,
        commands: &'a declarative::HostCommands,
    ) -> ApplyContext<'a> {
        ApplyContext::new(host, commands).with_options(ApplyOptions {
            fs_root: Some(host.root.clone()),
            ..ApplyOptions::default()
        })
    }

    fn exec(title: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::Exec, title)
    }

    #[test]
    fn test_foo_converges_then_stays_unchanged() {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path());
        let commands = Platform::lookup("debian-8").unwrap().host_commands();
        let ctx = context(&host, &commands);
        let catalog = compile_on(FOO, "debian-8");

        let first = converge(&catalog, &ctx, &mut NoProgress, &mut AutoConfirm).unwrap();
        let report = match &first {
            Convergence::Applied(report) => report,
            other => panic!("expected an applied run, got {:?}", other.report().summary),
        };
        let problems: Vec<String> = report
            .problems()
            .map(|r| format!("{}: {:?}", r.resource, r.outcome))
            .collect();
        assert!(problems.is_empty(), "problems: {problems:#?}");
        assert_eq!(exit_code(&first), 0);

        assert!(dir.path().join("etc/dirsrv/slapd-foo/pin.txt").is_file());
        assert!(dir.path().join("etc/dirsrv/slapd-foo/ssl.done").is_file());
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/openldap/cacerts/fooCA.pem")).unwrap(),
            "PEM fooCA\n"
        );
        let ini = fs::read_to_string(dir.path().join("etc/default/dirsrv.systemd")).unwrap();
        assert!(ini.contains("LimitNOFILE=8192"));
        assert!(report.get(&exec("restart foo to pick up new token")).unwrap().refreshed);
        assert!(report.get(&exec("Restart foo to enable SSL")).unwrap().refreshed);
        assert_eq!(host.ran("setup-ds "), 1);
        assert_eq!(host.ran("certutil -M "), 2);

        let ran_before = host.commands().len();
        let second = converge(&catalog, &ctx, &mut NoProgress, &mut AutoConfirm).unwrap();
        assert!(matches!(second, Convergence::InSync(_)));
        assert!(second.report().is_converged());
        assert_eq!(exit_code(&second), 0);
        assert!(
            host.commands()[ran_before..]
                .iter()
                .all(|c| !c.starts_with("setup-ds") && !c.starts_with("certutil -M")),
            "second run mutated the host"
        );

        let again = declarative::apply(&catalog, &ctx, &mut NoProgress);
        assert!(again.is_converged());
        assert_eq!(
            again.outcome(&ResourceRef::new(ResourceKind::Service, "dirsrv@foo")),
            Some(&Outcome::Unchanged)
        );
    }

    /// Declines after counting the commands run before the prompt
    struct CountingDecline<'a> {
        host: &'a FakeHost,
        commands_at_prompt: usize,
    }

    impl ConfirmCallback for CountingDecline<'_> {
        fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
            self.commands_at_prompt = self.host.commands().len();
            Ok(false)
        }
    }

    #[test]
    fn test_prompt_follows_a_single_plan() {
        let catalog = compile_on(FOO, "debian-8");
        let commands = Platform::lookup("debian-8").unwrap().host_commands();

        let dir = TempDir::new().unwrap();
        let planned = FakeHost::new(dir.path());
        declarative::apply(&catalog, &context(&planned, &commands).as_noop(), &mut NoProgress);
        let one_plan = planned.commands().len();

        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path());
        let mut confirm = CountingDecline {
            host: &host,
            commands_at_prompt: 0,
        };
        let ctx = context(&host, &commands);
        let declined = converge(&catalog, &ctx, &mut NoProgress, &mut confirm).unwrap();
        assert!(matches!(declined, Convergence::Declined(_)));
        assert_eq!(confirm.commands_at_prompt, one_plan);
        assert_eq!(host.commands().len(), one_plan);
    }

    #[test]
    fn test_declined_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path());
        let commands = Platform::lookup("debian-8").unwrap().host_commands();
        let ctx = context(&host, &commands);
        let catalog = compile_on(FOO, "debian-8");

        let declined = converge(&catalog, &ctx, &mut NoProgress, &mut AutoDecline).unwrap();
        assert!(matches!(declined, Convergence::Declined(_)));
        assert!(declined.report().noop);
        assert_eq!(exit_code(&declined), 0);
        assert!(!dir.path().join("etc/dirsrv").exists());
        assert_eq!(host.ran("DEBIAN_FRONTEND=noninteractive apt-get"), 0);
        assert!(host.ran("dpkg-query") > 0);
    }
}
