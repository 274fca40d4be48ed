//! External command adapter: guard evaluation and exec invocation

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::resource::{ExecAttrs, Guard};
use crate::runner::CommandSpec;
use crate::types::CommandOutput;

const STDERR_TAIL_LINES: usize = 5;

/// What happened when an exec was evaluated
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// The guard decided the command should not run
    NotRun { reason: String },
    /// The command would run, but the context is noop
    WouldRun,
    /// The command ran and exited with an accepted status
    Ran { output: CommandOutput },
}

impl ExecOutcome {
    pub fn ran(&self) -> bool {
        !matches!(self, Self::NotRun { .. })
    }
}

fn spec_for(exec: &ExecAttrs, command: &str, ctx: &ApplyContext<'_>) -> CommandSpec {
    CommandSpec {
        command: command.to_string(),
        cwd: exec.cwd.as_deref().map(|cwd| ctx.resolve(cwd)),
        search_path: exec
            .path
            .clone()
            .unwrap_or_else(|| ctx.commands.search_path.clone()),
        timeout: exec.timeout.unwrap_or(ctx.options.command_timeout),
    }
}

/// Evaluate an exec's guard and run its command if the guard allows it.
///
/// Check commands (`unless`, `onlyif`) run even in noop mode; the main
/// command never does. An exit status outside `returns` is an error.
pub fn run_exec(
    title: &str,
    exec: &ExecAttrs,
    refreshed: bool,
    ctx: &ApplyContext<'_>,
) -> Result<ExecOutcome> {
    let skip = |reason: String| {
        log::debug!("Exec[{title}] not run: {reason}");
        Ok(ExecOutcome::NotRun { reason })
    };

    match exec.guard() {
        Some(Guard::RefreshOnly) if !refreshed => {
            return skip("refreshonly and no refresh received".to_string());
        }
        Some(Guard::Creates(path)) if ctx.resolve(&path).exists() => {
            return skip(format!("{path} exists"));
        }
        Some(Guard::Unless(check)) => {
            if ctx.runner.run(&spec_for(exec, &check, ctx))?.success() {
                return skip(format!("unless check `{check}` succeeded"));
            }
        }
        Some(Guard::OnlyIf(check)) => {
            if !ctx.runner.run(&spec_for(exec, &check, ctx))?.success() {
                return skip(format!("onlyif check `{check}` failed"));
            }
        }
        _ => {}
    }

    if ctx.noop() {
        return Ok(ExecOutcome::WouldRun);
    }

    let output = ctx.runner.run(&spec_for(exec, &exec.command, ctx))?;
    if output.code.is_some_and(|code| exec.returns.contains(&code)) {
        log::info!("Exec[{title}] executed successfully");
        Ok(ExecOutcome::Ran { output })
    } else {
        Err(Error::CommandFailed {
            command: exec.command.clone(),
            status: output.status_label(),
            expected: exec.returns.clone(),
            stderr: stderr_tail(&output),
        })
    }
}

fn stderr_tail(output: &CommandOutput) -> String {
    let stderr = output.stderr_str();
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
