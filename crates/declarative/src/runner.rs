//! Process execution for external commands
//!
//! [`CommandRunner`] is the only way the engine spawns processes, so tests
//! can substitute a scripted runner for the host.

use crate::error::{Error, Result};
use crate::types::CommandOutput;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A shell command line with its execution environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub cwd: Option<PathBuf>,
    /// Value of `PATH` for the command
    pub search_path: String,
    pub timeout: Duration,
}

/// Runs shell commands on behalf of the engine
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; callers decide which exit codes
    /// they accept. Errors are reserved for spawn failures and timeouts.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands through `/bin/sh -c` on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(&spec.command)
            .env("PATH", &spec.search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        log::debug!("running: {}", spec.command);
        let mut child = command.spawn().map_err(|source| Error::CommandSpawn {
            command: spec.command.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel();
        let mut streams = 0;
        if let Some(stdout) = child.stdout.take() {
            drain(Stream::Stdout, stdout, tx.clone());
            streams += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            drain(Stream::Stderr, stderr, tx.clone());
            streams += 1;
        }
        drop(tx);
        let deadline = Instant::now() + spec.timeout;
        let timed_out = |child: &mut Child| {
            kill_group(child);
            log::warn!("timed out after {:?}: {}", spec.timeout, spec.command);
            Error::CommandTimeout {
                command: spec.command.clone(),
                timeout: spec.timeout,
            }
        };

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // Background children can hold the pipes open after the shell exits
                    let Some((stdout, stderr)) = collect(&rx, streams, deadline) else {
                        return Err(timed_out(&mut child));
                    };
                    return Ok(CommandOutput {
                        code: status.code(),
                        stdout,
                        stderr,
                    });
                }
                Ok(None) if Instant::now() >= deadline => return Err(timed_out(&mut child)),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    kill_group(&mut child);
                    return Err(Error::CommandSpawn {
                        command: spec.command.clone(),
                        source,
                    });
                }
            }
        }
    }
}

enum Stream {
    Stdout,
    Stderr,
}

fn drain<R>(stream: Stream, mut reader: R, tx: Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
}

/// Wait for both pipes to reach EOF, giving up at `deadline`
fn collect(
    rx: &Receiver<(Stream, Vec<u8>)>,
    streams: usize,
    deadline: Instant,
) -> Option<(Vec<u8>, Vec<u8>)> {
    let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
    for _ in 0..streams {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining).ok()? {
            (Stream::Stdout, buf) => stdout = buf,
            (Stream::Stderr, buf) => stderr = buf,
        }
    }
    Some((stdout, stderr))
}

/// Kill the whole process group so pipelines and `; sleep` tails die too
fn kill_group(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; the group id is the child's pid
        // because it was spawned with process_group(0).
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
