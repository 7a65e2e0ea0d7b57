//! `reboot` and `shutdown` CLI sub-commands.

use super::Rack;
use anyhow::{Context, Result};
use clap::Parser;
use rackctl::power::ControlOutcome;
use rackctl::MachineOperations;
use slog_scope::info;

/// Power-cycle a machine
#[derive(Debug, Parser)]
pub struct CliReboot {
    /// Machine name
    machine: String,
}

impl CliReboot {
    /// Run the `reboot` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        let machine = rack.machine(&self.machine)?;
        report(machine.reboot(), &self.machine, "rebooting")
    }
}

/// Power a machine off
#[derive(Debug, Parser)]
pub struct CliShutdown {
    /// Machine name
    machine: String,
}

impl CliShutdown {
    /// Run the `shutdown` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        let machine = rack.machine(&self.machine)?;
        report(machine.shutdown(), &self.machine, "shutting down")
    }
}

/// Fail on fatal outcomes only; a tolerated failure was already logged.
pub(crate) fn report(outcome: ControlOutcome, machine: &str, action: &str) -> Result<()> {
    let tolerated = outcome
        .into_result()
        .with_context(|| format!("{action} '{machine}'"))?;
    if tolerated.is_none() {
        info!("{} '{}': done", action, machine);
    }
    Ok(())
}
