//! `list` CLI sub-command.

use super::Rack;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;

/// List the machine inventory
#[derive(Debug, Parser)]
pub struct CliList {
    /// Print the full configuration as JSON
    #[arg(long)]
    json: bool,
}

impl CliList {
    /// Run the `list` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let registry = rack.registry();

        if self.json {
            let configs: Vec<_> = registry.configs().collect();
            serde_json::to_writer_pretty(&mut out, &configs).context("serializing inventory")?;
            writeln!(out)?;
            return Ok(());
        }

        for config in registry.configs() {
            let accel = match config.accelerator.ncards {
                0 => String::new(),
                n => format!(" +{n} accelerator(s)"),
            };
            writeln!(
                out,
                "{:<12} {:<8} {:>3} cores{}",
                config.name, config.bootarch, config.ncores, accel
            )?;
        }
        Ok(())
    }
}
