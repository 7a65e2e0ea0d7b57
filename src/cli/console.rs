//! `status` and `lock` CLI sub-commands.

use super::Rack;
use anyhow::{Context, Result};
use clap::Parser;
use rackctl::console::{self, PumpEnd};
use rackctl::retry::Retry;
use rackctl::{MachineError, MachineOperations};
use slog_scope::info;
use std::io::Write;
use std::time::Duration;

/// Show who holds a machine's console
#[derive(Debug, Parser)]
pub struct CliStatus {
    /// Machine name
    machine: String,
    /// Print the parsed status as JSON
    #[arg(long)]
    json: bool,
}

impl CliStatus {
    /// Run the `status` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        let machine = rack.machine(&self.machine)?;
        let status = machine
            .console()
            .query_status()
            .with_context(|| format!("querying console status of '{}'", self.machine))?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if self.json {
            serde_json::to_writer_pretty(&mut out, &status).context("serializing status")?;
            writeln!(out)?;
            return Ok(());
        }

        writeln!(out, "{}: {} ({})", status.console, status.state, status.conn_type)?;
        if status.holders.is_empty() {
            writeln!(out, "  no users attached")?;
        }
        for holder in &status.holders {
            writeln!(
                out,
                "  {:<3} {}@{} port {}",
                holder.mode, holder.user, holder.host, holder.port
            )?;
        }
        Ok(())
    }
}

/// Lock a machine's console and stream its output
#[derive(Debug, Parser)]
pub struct CliLock {
    /// Machine name
    machine: String,
    /// How many more times to try while somebody else holds the console
    #[arg(long, value_name = "N", default_value_t = 0)]
    retries: u32,
    /// Initial wait between attempts
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    interval: u64,
    /// Stop streaming and unlock after this long
    #[arg(long, value_name = "SECS")]
    seconds: Option<u64>,
}

impl CliLock {
    /// Run the `lock` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        let mut machine = rack.machine(&self.machine)?;
        let interval = Duration::from_secs(self.interval);

        Retry::new()
            .initial_backoff(interval)
            .max_backoff(interval.max(Duration::from_secs(60)))
            .max_retries(self.retries)
            .retry_while(
                |_| machine.lock(),
                |e| matches!(e, MachineError::MachineLocked { .. }),
            )
            .with_context(|| format!("locking console of '{}'", self.machine))?;
        info!("console of '{}' locked", self.machine);

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let src = machine.get_output()?;
        let end = console::pump_output(src, &mut out, self.seconds.map(Duration::from_secs))
            .with_context(|| format!("streaming console output of '{}'", self.machine))?;
        match end {
            PumpEnd::Closed => info!("console of '{}' closed", self.machine),
            PumpEnd::TimedOut => info!("done watching console of '{}'", self.machine),
        }

        machine.unlock();
        Ok(())
    }
}
