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

//! Rack machines.
//!
//! A machine is static configuration plus the operations the harness
//! drives it with. All per-machine variation is data: there is a single
//! machine type, built by the registry from an inventory entry.

use crate::arch::BootFamily;
use crate::boot::{BootConfigArtifact, BootModules, BootProvisioner};
use crate::console::{ConsoleLock, LockState};
use crate::errors::{MachineError, Result};
use crate::power::{self, ControlOutcome, PowerAction};
use crate::settings::Settings;
use serde::Serialize;
use slog_scope::debug;
use std::fs::File;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Operations the test harness drives a machine with.
pub trait MachineOperations {
    /// Take exclusive control of the serial console.
    fn lock(&mut self) -> Result<()>;
    /// Give the console back. Never fails, a no-op if not locked.
    fn unlock(&mut self);
    /// Seize write access to the console, through `ctrl` if possible.
    fn force_write(&mut self, ctrl: Option<&mut dyn Write>) -> Result<()>;
    /// Console output, readable while locked.
    fn get_output(&mut self) -> Result<&mut File>;
    /// Make `modules` the machine's next network boot.
    fn set_boot_modules(&self, modules: &dyn BootModules) -> Result<BootConfigArtifact>;
    /// Have the machine boot from the network next time.
    fn enable_next_network_boot(&self) -> Result<()>;
    fn reboot(&self) -> ControlOutcome;
    fn shutdown(&self) -> ControlOutcome;
}

/// Accelerator cards (Xeon Phi) attached to a machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AcceleratorInfo {
    pub ncards: u32,
    pub ram_gb: u32,
    pub ncores: u32,
    pub tickrate: u32,
}

/// Static configuration of one machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MachineConfig {
    pub name: String,
    pub bootarch: String,
    pub buildarchs: Vec<String>,
    pub ncores: u32,
    pub cores_per_socket: u32,
    pub kernel_args: Vec<String>,
    pub serial_binary: String,
    /// Seconds.
    pub boot_timeout: u64,
    pub platform: Option<String>,
    pub pci_args: Vec<String>,
    pub eth0: (u32, u32, u32),
    pub perfcount_type: Option<String>,
    pub accelerator: AcceleratorInfo,
}

impl MachineConfig {
    /// Check that the boot architecture is among the build architectures.
    pub fn validate(&self) -> Result<()> {
        if self.buildarchs.contains(&self.bootarch) {
            return Ok(());
        }
        Err(MachineError::InvalidMachineConfig {
            machine: self.name.clone(),
            reason: format!(
                "boot architecture '{}' is not among build architectures [{}]",
                self.bootarch,
                self.buildarchs.join(", ")
            ),
        })
    }

    pub fn boot_family(&self) -> BootFamily {
        BootFamily::of(&self.bootarch)
    }

    /// Build target producing everything this machine can boot.
    pub fn buildall_target(&self) -> String {
        format!("{}_Full", self.bootarch.to_uppercase())
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout)
    }
}

/// A machine in the rack, controlled through the console server and the
/// rack tools.
#[derive(Debug)]
pub struct RackMachine {
    config: MachineConfig,
    settings: Arc<Settings>,
    console: ConsoleLock,
}

impl RackMachine {
    /// Fails with `InvalidMachineConfig` if `config` does not validate.
    pub fn new(config: MachineConfig, settings: Arc<Settings>) -> Result<Self> {
        config.validate()?;
        let console = ConsoleLock::new(
            &config.name,
            &settings.user,
            settings.console.clone(),
            settings.release_grace,
        );
        Ok(Self {
            config,
            settings,
            console,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn console(&self) -> &ConsoleLock {
        &self.console
    }

    pub fn lock_state(&self) -> LockState {
        self.console.state()
    }

    pub fn hostname(&self) -> String {
        self.settings.hostname(&self.config.name)
    }

    /// Resolve the machine's IPv4 address.
    pub fn ip(&self) -> Result<Ipv4Addr> {
        let hostname = self.hostname();
        resolve_ipv4(&hostname).map_err(|source| MachineError::Resolve {
            machine: self.config.name.clone(),
            hostname,
            source,
        })
    }

    fn provisioner(&self) -> BootProvisioner<'_> {
        BootProvisioner::new(
            &self.settings.tftp_root,
            &self.settings.user,
            &self.config.name,
            self.config.boot_family(),
        )
    }

    /// Staging directory of this machine in the TFTP tree.
    pub fn tftp_dir(&self) -> std::path::PathBuf {
        self.provisioner().staging_dir()
    }
}

impl MachineOperations for RackMachine {
    fn lock(&mut self) -> Result<()> {
        self.console.acquire()
    }

    fn unlock(&mut self) {
        self.console.release();
    }

    fn force_write(&mut self, ctrl: Option<&mut dyn Write>) -> Result<()> {
        self.console.force_write(ctrl)
    }

    fn get_output(&mut self) -> Result<&mut File> {
        self.console.output()
    }

    fn set_boot_modules(&self, modules: &dyn BootModules) -> Result<BootConfigArtifact> {
        let ip = self.ip()?;
        debug!("provisioning boot of '{}' ({})", self.config.name, ip);
        self.provisioner()
            .provision(modules, &self.config.kernel_args, ip)
    }

    fn enable_next_network_boot(&self) -> Result<()> {
        power::enable_next_network_boot(
            &self.settings.rackboot,
            self.config.boot_family(),
            &self.config.name,
        )
    }

    fn reboot(&self) -> ControlOutcome {
        power::power(&self.settings.rackpower, PowerAction::Reboot, &self.config.name)
    }

    fn shutdown(&self) -> ControlOutcome {
        power::power(
            &self.settings.rackpower,
            PowerAction::Shutdown,
            &self.config.name,
        )
    }
}

/// Standard name resolution, first IPv4 address wins.
fn resolve_ipv4(hostname: &str) -> io::Result<Ipv4Addr> {
    (hostname, 0)
        .to_socket_addrs()?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no IPv4 address"))
}
