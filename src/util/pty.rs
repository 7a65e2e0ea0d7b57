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

//! Run a child process on a pseudo-terminal.

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::pty::openpty;
use slog_scope::debug;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::process::{Child, Command, Stdio};

/// A child whose stdin and stdout are the slave side of a pty.
#[derive(Debug)]
pub struct PtyChild {
    pub child: Child,
    /// Master side of the pty.
    ///
    /// This is a bare `File`, reads and writes go straight to the
    /// descriptor. Callers poll it for readiness, so it must never be
    /// wrapped in a buffered reader.
    pub master: File,
}

/// Spawn `cmd` with its stdin and stdout attached to a fresh pty.
///
/// The slave side is closed in this process once the child is running.
pub fn spawn_on_pty(mut cmd: Command) -> io::Result<PtyChild> {
    let pty = openpty(None, None)?;
    // SAFETY: both descriptors were just opened by openpty and are owned
    // by nothing else.
    let (master, slave) = unsafe {
        (
            File::from_raw_fd(pty.master),
            OwnedFd::from_raw_fd(pty.slave),
        )
    };
    set_cloexec(master.as_raw_fd())?;
    set_cloexec(slave.as_raw_fd())?;

    cmd.stdin(Stdio::from(slave.try_clone()?))
        .stdout(Stdio::from(slave));
    let child = cmd.spawn()?;
    // The command still holds the slave descriptors.
    drop(cmd);
    debug!("spawned process {} on pty", child.id());

    Ok(PtyChild { child, master })
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}
