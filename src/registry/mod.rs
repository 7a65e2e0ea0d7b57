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

//! Machine registry.
//!
//! The rack inventory is a YAML mapping from machine name to its static
//! configuration. It is loaded and validated once, then stays read-only
//! for the lifetime of the process. The built-in inventory is compiled into
//! the binary; another one may be installed before first use.

use crate::errors::{MachineError, Result};
use crate::machine::{AcceleratorInfo, MachineConfig, RackMachine};
use crate::settings::Settings;
use serde::Deserialize;
use slog_scope::{trace, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

static BUILTIN_INVENTORY: &str = include_str!("machines.yaml");

static REGISTRY: OnceLock<MachineRegistry> = OnceLock::new();

fn default_ncores() -> u32 {
    1
}

fn default_serial_binary() -> String {
    "serial_pc16550d".to_string()
}

fn default_boot_timeout() -> u64 {
    360
}

fn default_eth0() -> (u32, u32, u32) {
    (0xff, 0xff, 0xff)
}

/// Inventory record of one machine, as written in the inventory.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistryEntry {
    pub bootarch: String,
    #[serde(default)]
    pub buildarchs: Option<Vec<String>>,
    #[serde(default = "default_ncores")]
    pub ncores: u32,
    #[serde(default)]
    pub cores_per_socket: Option<u32>,
    #[serde(default)]
    pub kernel_args: Vec<String>,
    #[serde(default = "default_serial_binary")]
    pub serial_binary: String,
    #[serde(default = "default_boot_timeout")]
    pub boot_timeout: u64,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub pci_args: Vec<String>,
    #[serde(default = "default_eth0")]
    pub eth0: (u32, u32, u32),
    #[serde(default)]
    pub perfcount_type: Option<String>,
    #[serde(default)]
    pub xphi_ncards: u32,
    #[serde(default)]
    pub xphi_ram_gb: u32,
    #[serde(default)]
    pub xphi_ncores: u32,
    #[serde(default)]
    pub xphi_tickrate: u32,
    /// Fields this version does not know about.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RegistryEntry {
    /// Resolve defaults and check invariants.
    pub fn into_config(self, name: &str) -> Result<MachineConfig> {
        if !self.extra.is_empty() {
            let keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
            warn!("machine '{}': ignoring unknown fields: {}", name, keys.join(", "));
        }

        let buildarchs = self
            .buildarchs
            .unwrap_or_else(|| vec![self.bootarch.clone()]);

        let config = MachineConfig {
            name: name.to_string(),
            bootarch: self.bootarch,
            buildarchs,
            ncores: self.ncores,
            cores_per_socket: self.cores_per_socket.unwrap_or(self.ncores),
            kernel_args: self.kernel_args,
            serial_binary: self.serial_binary,
            boot_timeout: self.boot_timeout,
            platform: self.platform,
            pci_args: self.pci_args,
            eth0: self.eth0,
            perfcount_type: self.perfcount_type,
            accelerator: AcceleratorInfo {
                ncards: self.xphi_ncards,
                ram_gb: self.xphi_ram_gb,
                ncores: self.xphi_ncores,
                tickrate: self.xphi_tickrate,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validated machine inventory.
#[derive(Clone, Debug, Default)]
pub struct MachineRegistry {
    machines: BTreeMap<String, MachineConfig>,
}

impl MachineRegistry {
    /// Parse and validate an inventory. `origin` names it in errors.
    pub fn from_yaml(input: &str, origin: &str) -> Result<Self> {
        let entries: BTreeMap<String, RegistryEntry> =
            serde_yaml::from_str(input).map_err(|source| MachineError::Inventory {
                origin: origin.to_string(),
                source,
            })?;

        let mut machines = BTreeMap::new();
        for (name, entry) in entries {
            trace!("registering machine '{}'", name);
            let config = entry.into_config(&name)?;
            machines.insert(name, config);
        }
        Ok(Self { machines })
    }

    /// The built-in inventory.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_INVENTORY, "built-in")
    }

    /// The process-wide registry, populated with the built-in inventory
    /// unless another one was installed first.
    pub fn global() -> Result<&'static Self> {
        if let Some(registry) = REGISTRY.get() {
            return Ok(registry);
        }
        let builtin = Self::builtin()?;
        Ok(REGISTRY.get_or_init(|| builtin))
    }

    /// Make `registry` the process-wide registry.
    ///
    /// Fails once the process-wide registry has been populated.
    pub fn install(registry: Self) -> Result<&'static Self> {
        REGISTRY
            .set(registry)
            .map_err(|_| MachineError::RegistryInstalled)?;
        Self::global()
    }

    /// Machine names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.machines.keys().map(String::as_str)
    }

    pub fn configs(&self) -> impl Iterator<Item = &MachineConfig> {
        self.machines.values()
    }

    pub fn config(&self, name: &str) -> Result<&MachineConfig> {
        self.machines
            .get(name)
            .ok_or_else(|| MachineError::UnknownMachine(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Build a controllable instance of machine `name`.
    pub fn create(&self, name: &str, settings: Arc<Settings>) -> Result<RackMachine> {
        let config = self.config(name)?.clone();
        RackMachine::new(config, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
sbrinz1:
  bootarch: x86_64
  buildarchs: [x86_64, x86_32]
  ncores: 16
  cores_per_socket: 4
  kernel_args: [serial=0x3f8]
  platform: AMD
  eth0: [1, 0, 0]
  perfcount_type: amd0f
  rack: 3
babybel1:
  bootarch: x86_64
  ncores: 20
  xphi_ncards: 2
  xphi_ram_gb: 8
  xphi_ncores: 57
  xphi_tickrate: 1100
cavium1:
  bootarch: armv8
"#;

    #[test]
    fn test_from_yaml() {
        let registry = MachineRegistry::from_yaml(INVENTORY, "test").unwrap();
        assert_eq!(registry.len(), 3);
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["babybel1", "cavium1", "sbrinz1"]);

        let sbrinz = registry.config("sbrinz1").unwrap();
        assert_eq!(sbrinz.buildarchs, vec!["x86_64", "x86_32"]);
        assert_eq!(sbrinz.ncores, 16);
        assert_eq!(sbrinz.cores_per_socket, 4);
        assert_eq!(sbrinz.kernel_args, vec!["serial=0x3f8"]);
        assert_eq!(sbrinz.platform.as_deref(), Some("AMD"));
        assert_eq!(sbrinz.eth0, (1, 0, 0));
        assert_eq!(sbrinz.perfcount_type.as_deref(), Some("amd0f"));
        assert_eq!(sbrinz.accelerator, AcceleratorInfo::default());

        let babybel = registry.config("babybel1").unwrap();
        assert_eq!(babybel.cores_per_socket, 20);
        assert_eq!(
            babybel.accelerator,
            AcceleratorInfo {
                ncards: 2,
                ram_gb: 8,
                ncores: 57,
                tickrate: 1100,
            }
        );
    }

    #[test]
    fn test_defaults() {
        let registry = MachineRegistry::from_yaml(INVENTORY, "test").unwrap();
        let cavium = registry.config("cavium1").unwrap();
        assert_eq!(cavium.buildarchs, vec!["armv8"]);
        assert_eq!(cavium.ncores, 1);
        assert_eq!(cavium.cores_per_socket, 1);
        assert!(cavium.kernel_args.is_empty());
        assert_eq!(cavium.serial_binary, "serial_pc16550d");
        assert_eq!(cavium.boot_timeout, 360);
        assert_eq!(cavium.platform, None);
        assert_eq!(cavium.eth0, (0xff, 0xff, 0xff));
        assert_eq!(cavium.perfcount_type, None);
    }

    #[test]
    fn test_invalid_entries() {
        let err = MachineRegistry::from_yaml(
            "m1:\n  bootarch: armv8\n  buildarchs: [x86_64]\n",
            "test",
        )
        .unwrap_err();
        match err {
            MachineError::InvalidMachineConfig { machine, .. } => assert_eq!(machine, "m1"),
            e => panic!("unexpected error: {e}"),
        }

        let err = MachineRegistry::from_yaml("m1:\n  ncores: 4\n", "test").unwrap_err();
        assert!(matches!(err, MachineError::Inventory { .. }), "{err}");
    }

    #[test]
    fn test_create() {
        let registry = MachineRegistry::from_yaml(INVENTORY, "test").unwrap();
        let settings = Arc::new(Settings::new("alice"));

        let machine = registry.create("cavium1", settings.clone()).unwrap();
        assert_eq!(machine.name(), "cavium1");
        assert_eq!(machine.config(), registry.config("cavium1").unwrap());

        match registry.create("gruyere", settings).unwrap_err() {
            MachineError::UnknownMachine(name) => assert_eq!(name, "gruyere"),
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_builtin() {
        let registry = MachineRegistry::global().unwrap();
        assert!(!registry.is_empty());
        for config in registry.configs() {
            assert!(
                config.buildarchs.contains(&config.bootarch),
                "machine {}",
                config.name
            );
        }
        // populated once, never replaced
        let err = MachineRegistry::install(MachineRegistry::default()).unwrap_err();
        assert!(matches!(err, MachineError::RegistryInstalled));
    }
}
