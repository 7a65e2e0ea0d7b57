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

//! Power and network boot control through the rack tools.
//!
//! Network boot setup must succeed, the caller power-cycles the machine
//! right after it. Power control goes through remote PDUs that fail now and
//! then, so a non-zero `rackpower` exit is only a warning.

use crate::arch::BootFamily;
use crate::errors::{MachineError, Result};
use crate::util::{self, Tool};
use slog_scope::{debug, warn};

/// Result of a control command that may fail without consequence.
#[derive(Debug)]
#[must_use]
pub enum ControlOutcome {
    Done,
    /// The command failed, and that is acceptable.
    Tolerated(String),
    /// The command could not be run at all.
    Fatal(MachineError),
}

impl ControlOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ControlOutcome::Done)
    }

    /// Fatal outcomes as errors, the tolerated failure detail otherwise.
    pub fn into_result(self) -> Result<Option<String>> {
        match self {
            ControlOutcome::Done => Ok(None),
            ControlOutcome::Tolerated(detail) => Ok(Some(detail)),
            ControlOutcome::Fatal(e) => Err(e),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAction {
    Reboot,
    Shutdown,
}

impl PowerAction {
    fn flag(self) -> &'static str {
        match self {
            PowerAction::Reboot => "-r",
            PowerAction::Shutdown => "-d",
        }
    }
}

/// Have the machine boot from the network next time it starts.
pub fn enable_next_network_boot(rackboot: &Tool, family: BootFamily, machine: &str) -> Result<()> {
    let mut cmd = rackboot.command();
    cmd.args(family.network_boot_flags()).arg(machine);
    debug!("enabling network boot: `{}`", util::describe(&cmd));
    util::run_checked(cmd, machine)?;
    Ok(())
}

/// Run `rackpower`, downgrading a failed exit to a warning.
pub fn power(rackpower: &Tool, action: PowerAction, machine: &str) -> ControlOutcome {
    let mut cmd = rackpower.command();
    cmd.arg(action.flag()).arg(machine);
    debug!("power control: `{}`", util::describe(&cmd));

    match util::run_checked(cmd, machine) {
        Ok(_) => ControlOutcome::Done,
        Err(e @ MachineError::ExternalCommand { .. }) => {
            let detail = e.to_string();
            warn!("rackpower {} {} failed: {}", action.flag(), machine, detail);
            ControlOutcome::Tolerated(detail)
        }
        Err(e) => ControlOutcome::Fatal(e),
    }
}
