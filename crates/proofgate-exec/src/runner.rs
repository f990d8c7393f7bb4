//! Direct subprocess execution with a wall-clock bound.
//!
//! Programs are spawned with an argument vector, never through a shell, so
//! nothing in a file path or flag is ever interpreted. A run that exceeds its
//! timeout is killed and reported as [`RunError::Timeout`]; a run that finishes
//! with a non-zero exit code is still an `Ok` [`ProcessOutput`].

use std::ffi::{OsStr, OsString};
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{program} not found")]
    ExecutableNotFound { program: String },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Captured result of a subprocess that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, separated by a newline when both are present.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut text = self.stdout.clone();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&self.stderr);
                text
            }
        }
    }

    /// stdout if the tool wrote anything there, stderr otherwise.
    pub fn primary_text(&self) -> &str {
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Seam between request handling and process creation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &OsStr,
        args: &[OsString],
        timeout: Duration,
    ) -> Result<ProcessOutput, RunError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &OsStr,
        args: &[OsString],
        timeout: Duration,
    ) -> Result<ProcessOutput, RunError> {
        run(program, args, timeout).await
    }
}

pub async fn run<P, I, A>(program: P, args: I, timeout: Duration) -> Result<ProcessOutput, RunError>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let program = program.as_ref();
    let shown = program.to_string_lossy().into_owned();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Tools such as tamarin-prover fork helpers (maude); put them all in one group.
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => RunError::ExecutableNotFound {
            program: shown.clone(),
        },
        _ => RunError::Io {
            program: shown.clone(),
            source,
        },
    })?;
    debug!(program = %shown, pid = ?child.id(), ?timeout, "spawned subprocess");
    let group = ProcessGroup(child.id());

    // Dropping the wait future on timeout drops the child; kill_on_drop sends SIGKILL
    // to it and `group` takes down anything it spawned.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            group.disarm();
            let exit_code = output.status.code().unwrap_or(-1);
            debug!(program = %shown, exit_code, "subprocess finished");
            Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code,
            })
        }
        Ok(Err(source)) => Err(RunError::Io {
            program: shown,
            source,
        }),
        Err(_) => {
            warn!(program = %shown, ?timeout, "subprocess timed out; killed");
            Err(RunError::Timeout {
                program: shown,
                timeout,
            })
        }
    }
}

/// Kills the child's process group when dropped, unless the child exited on its own.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.0.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes no pointers; it only signals the group created by
    // process_group(0) above.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %io::Error::last_os_error(), "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
