//! `boot` and `setup` CLI sub-commands.

use super::Rack;
use anyhow::{Context, Result};
use clap::Parser;
use rackctl::boot::BootMenu;
use rackctl::MachineOperations;
use slog_scope::info;
use std::path::PathBuf;

/// Network-boot a machine into a boot menu
#[derive(Debug, Parser)]
pub struct CliBoot {
    /// Machine name
    machine: String,
    /// YAML file with the kernel and modules to boot
    #[arg(long, value_name = "yaml")]
    menu: PathBuf,
    /// Power-cycle the machine once the boot is set up
    #[arg(long)]
    reboot: bool,
}

impl CliBoot {
    /// Run the `boot` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        let input = std::fs::read_to_string(&self.menu)
            .with_context(|| format!("reading boot menu '{}'", self.menu.display()))?;
        let menu = BootMenu::from_yaml(&input)
            .with_context(|| format!("parsing boot menu '{}'", self.menu.display()))?;

        let machine = rack.machine(&self.machine)?;
        let artifact = machine
            .set_boot_modules(&menu)
            .with_context(|| format!("provisioning boot config of '{}'", self.machine))?;
        if let Some(published) = &artifact.published_path {
            println!("{}", published.display());
        }

        machine
            .enable_next_network_boot()
            .with_context(|| format!("enabling network boot of '{}'", self.machine))?;

        if self.reboot {
            super::power::report(machine.reboot(), &self.machine, "rebooting")?;
        } else {
            info!("'{}' boots the new config on next power cycle", self.machine);
        }
        Ok(())
    }
}

/// Have a machine boot from the network next time
#[derive(Debug, Parser)]
pub struct CliSetup {
    /// Machine name
    machine: String,
}

impl CliSetup {
    /// Run the `setup` sub-command.
    pub(crate) fn run(self, rack: &Rack) -> Result<()> {
        rack.machine(&self.machine)?
            .enable_next_network_boot()
            .with_context(|| format!("enabling network boot of '{}'", self.machine))
    }
}
