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

//! Console locking.
//!
//! A machine's serial console is "locked" by keeping a `console <machine>`
//! client attached to it, running on a pty owned by this process. The lock
//! is advisory: before attaching, the console server status is checked and
//! the lock is refused if anybody else holds write access. Nothing prevents
//! two callers from passing that check at the same time.

use crate::errors::{MachineError, Result};
use crate::util::{self, PtyChild, Termination, Tool};
use nix::poll::{poll, PollFd, PollFlags};
use slog_scope::{debug, trace, warn};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::process::Child;
use std::time::{Duration, Instant};

mod status;
pub use self::status::{ConsoleHolder, ConsoleStatus, StatusParseError};

/// Asks the console client to detach.
pub const DETACH_SEQUENCE: &[u8] = b"\x05c.";
/// Asks the console server for write access, bumping other writers.
pub const FORCE_WRITE_SEQUENCE: &[u8] = b"\x05cf";

/// Lock lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Acquiring,
    Locked,
    Releasing,
}

/// A held console lock.
#[derive(Debug)]
pub struct LockHandle {
    holder: Child,
    output: File,
}

impl LockHandle {
    /// Process id of the attached console client.
    pub fn pid(&self) -> u32 {
        self.holder.id()
    }
}

/// Console lock manager for one machine.
#[derive(Debug)]
pub struct ConsoleLock {
    machine: String,
    user: String,
    console: Tool,
    grace: Duration,
    state: LockState,
    handle: Option<LockHandle>,
}

impl ConsoleLock {
    pub fn new(machine: &str, user: &str, console: Tool, grace: Duration) -> Self {
        Self {
            machine: machine.to_string(),
            user: user.to_string(),
            console,
            grace,
            state: LockState::Unlocked,
            handle: None,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_ref()
    }

    /// Ask the console server who is attached to the console.
    pub fn query_status(&self) -> Result<ConsoleStatus> {
        let mut cmd = self.console.command();
        cmd.arg("-i").arg(&self.machine);
        debug!("executing `{}` to check state", util::describe(&cmd));
        let output = util::run_checked(cmd, &self.machine)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default();
        line.parse().map_err(|e: StatusParseError| MachineError::MalformedStatus {
            machine: self.machine.clone(),
            line: line.to_string(),
            reason: e.to_string(),
        })
    }

    /// Take the console lock.
    ///
    /// Fails with `MachineLocked` if another user holds write access. This
    /// makes a single attempt, retrying is up to the caller.
    pub fn acquire(&mut self) -> Result<()> {
        if self.handle.is_some() {
            debug!("console of '{}' is already locked", self.machine);
            return Ok(());
        }

        self.state = LockState::Acquiring;
        let res = self.try_acquire();
        self.state = match res {
            Ok(()) => LockState::Locked,
            Err(_) => LockState::Unlocked,
        };
        res
    }

    fn try_acquire(&mut self) -> Result<()> {
        let status = self.query_status()?;
        check_available(&status, &self.machine, &self.user)?;

        let mut cmd = self.console.command();
        cmd.arg(&self.machine);
        let command = util::describe(&cmd);
        debug!("starting `{}`", command);
        // The console client mangles a non-tty stdin, so give it a pty.
        let PtyChild { child, master } =
            util::spawn_on_pty(cmd).map_err(|source| MachineError::Spawn {
                machine: self.machine.clone(),
                command,
                source,
            })?;

        self.handle = Some(LockHandle {
            holder: child,
            output: master,
        });
        Ok(())
    }

    /// Drop the console lock, if held.
    ///
    /// The console client is asked to detach, and terminated if it does not
    /// exit within the grace period. The handle is always cleared.
    ///
    /// Returns `None` if no lock was held, otherwise how the console client
    /// ended or why it could not be reaped.
    pub fn release(&mut self) -> Option<io::Result<Termination>> {
        let mut handle = self.handle.take()?;
        self.state = LockState::Releasing;
        debug!("quitting console process ({})", handle.pid());

        if let Err(e) = handle.output.write_all(DETACH_SEQUENCE) {
            warn!(
                "failed to send detach sequence to console of '{}': {}",
                self.machine, e
            );
        }
        let termination = util::wait_or_terminate(&mut handle.holder, self.grace);
        match &termination {
            Ok(t) => trace!("console process ended: {:?}", t),
            Err(e) => warn!(
                "failed to reap console process ({}) of '{}': {}",
                handle.pid(),
                self.machine,
                e
            ),
        }

        self.state = LockState::Unlocked;
        Some(termination)
    }

    /// Seize write access on the console.
    ///
    /// `ctrl` is another session attached to the same console, used first
    /// when given. On any failure there, the sequence goes through the pty
    /// held by this lock instead.
    pub fn force_write(&mut self, ctrl: Option<&mut dyn Write>) -> Result<()> {
        if let Some(ctrl) = ctrl {
            match ctrl.write_all(FORCE_WRITE_SEQUENCE).and_then(|_| ctrl.flush()) {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    "unable to force write through console control of '{}', trying own pty: {}",
                    self.machine, e
                ),
            }
        }

        let machine = self.machine.clone();
        self.output()?
            .write_all(FORCE_WRITE_SEQUENCE)
            .map_err(|source| MachineError::ConsoleIo { machine, source })
    }

    /// Console output stream of the held lock.
    pub fn output(&mut self) -> Result<&mut File> {
        match self.handle.as_mut() {
            Some(handle) => Ok(&mut handle.output),
            None => Err(MachineError::NotLocked {
                machine: self.machine.clone(),
            }),
        }
    }
}

impl Drop for ConsoleLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Refuse the lock if anybody else holds write access.
pub fn check_available(status: &ConsoleStatus, machine: &str, user: &str) -> Result<()> {
    match status.foreign_writers(user).next() {
        Some(holder) => Err(MachineError::MachineLocked {
            machine: machine.to_string(),
            holder: holder.user.clone(),
            host: holder.host.clone(),
        }),
        None => Ok(()),
    }
}

/// Why `pump_output` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpEnd {
    /// The console client went away.
    Closed,
    /// The deadline passed.
    TimedOut,
}

/// Copy console output to `dst` until the console closes or `timeout` passes.
///
/// `src` is polled for readiness before every read.
pub fn pump_output<W: Write>(
    src: &mut File,
    dst: &mut W,
    timeout: Option<Duration>,
) -> io::Result<PumpEnd> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut buf = [0u8; 4096];

    loop {
        let wait_ms = match deadline {
            None => -1,
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(PumpEnd::TimedOut);
                }
                left.as_millis().clamp(1, i32::MAX as u128) as i32
            }
        };

        let mut fds = [PollFd::new(src.as_raw_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, wait_ms) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }

        match src.read(&mut buf) {
            Ok(0) => return Ok(PumpEnd::Closed),
            Ok(n) => {
                dst.write_all(&buf[..n])?;
                dst.flush()?;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports a pty whose slave side is gone as EIO.
            Err(e) if e.raw_os_error() == Some(nix::errno::Errno::EIO as i32) => {
                return Ok(PumpEnd::Closed)
            }
            Err(e) => return Err(e),
        }
    }
}
