// Copyright 2024 CoreOS, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Helpers for shelling out to external tools.

use crate::errors::{MachineError, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use slog_scope::{trace, warn};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How long a process gets after SIGTERM before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(1);

/// Polling interval while waiting on a child.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// An external program, optionally with fixed leading arguments.
///
/// Leading arguments let a tool be a wrapper, e.g. `sudo rackpower` or
/// `sh /path/to/script`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tool {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a fixed leading argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Build a fresh command for this tool.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// How a waited-on process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own within the grace period.
    Exited(ExitStatus),
    /// Exited after SIGTERM.
    Terminated(ExitStatus),
    /// Had to be SIGKILLed.
    Killed(ExitStatus),
}

/// Render a command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command to completion, capturing its output.
///
/// A non-zero exit is an `ExternalCommand` error carrying stderr.
pub fn run_checked(mut cmd: Command, machine: &str) -> Result<Output> {
    let command = describe(&cmd);
    trace!("executing `{}`", command);

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| MachineError::Spawn {
            machine: machine.to_string(),
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(MachineError::ExternalCommand {
            machine: machine.to_string(),
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

/// Wait for a child to exit, escalating to SIGTERM and then SIGKILL.
///
/// The child is always reaped before this returns `Ok`.
pub fn wait_or_terminate(child: &mut Child, grace: Duration) -> io::Result<Termination> {
    if let Some(status) = wait_timeout(child, grace)? {
        return Ok(Termination::Exited(status));
    }

    warn!(
        "process {} still running after {:?}, sending SIGTERM",
        child.id(),
        grace
    );
    let pid = Pid::from_raw(child.id() as i32);
    if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
        trace!("SIGTERM to {} failed: {}", pid, e);
    }
    if let Some(status) = wait_timeout(child, TERM_GRACE)? {
        return Ok(Termination::Terminated(status));
    }

    warn!("process {} ignored SIGTERM, killing it", child.id());
    child.kill()?;
    let status = child.wait()?;
    Ok(Termination::Killed(status))
}

fn wait_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let tool = Tool::new("/usr/bin/sudo").arg("rackpower");
        let mut cmd = tool.command();
        cmd.args(["-r", "m1"]);
        assert_eq!(describe(&cmd), "/usr/bin/sudo rackpower -r m1");
    }

    #[test]
    fn test_run_checked() {
        let mut cmd = Tool::new("sh").command();
        cmd.args(["-c", "echo out; echo oops >&2"]);
        let out = run_checked(cmd, "m1").unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout), "out\n");

        let mut cmd = Tool::new("sh").command();
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        match run_checked(cmd, "m1").unwrap_err() {
            MachineError::ExternalCommand {
                machine,
                command,
                status,
                stderr,
            } => {
                assert_eq!(machine, "m1");
                assert_eq!(command, "sh -c echo oops >&2; exit 3");
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "oops");
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_run_checked_missing_program() {
        let cmd = Tool::new("/nonexistent/rackctl-tool").command();
        let err = run_checked(cmd, "m1").unwrap_err();
        assert!(matches!(err, MachineError::Spawn { .. }), "{err}");
    }

    #[test]
    fn test_wait_exited() {
        let mut child = Command::new("true").spawn().unwrap();
        let res = wait_or_terminate(&mut child, Duration::from_secs(5)).unwrap();
        match res {
            Termination::Exited(status) => assert!(status.success()),
            x => panic!("unexpected termination: {x:?}"),
        }
    }

    #[test]
    fn test_wait_terminated() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let res = wait_or_terminate(&mut child, Duration::from_millis(100)).unwrap();
        assert!(matches!(res, Termination::Terminated(_)), "{res:?}");
    }

    #[test]
    fn test_wait_killed() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; while true; do sleep 0.1; done"])
            .spawn()
            .unwrap();
        // give the shell a moment to install its trap
        thread::sleep(Duration::from_millis(200));
        let res = wait_or_terminate(&mut child, Duration::from_millis(100)).unwrap();
        assert!(matches!(res, Termination::Killed(_)), "{res:?}");
    }
}
