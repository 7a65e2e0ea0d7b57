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

//! Error types for machine control.
//!
//! Every variant carries the machine name (or the inventory it came from)
//! plus the command, status line or path that failed.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MachineError>;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("malformed console status for machine '{machine}' ({reason}): {line:?}")]
    MalformedStatus {
        machine: String,
        line: String,
        reason: String,
    },
    #[error("machine '{machine}' is locked by {holder}@{host}")]
    MachineLocked {
        machine: String,
        holder: String,
        host: String,
    },
    #[error("console of machine '{machine}' is not locked")]
    NotLocked { machine: String },
    #[error("`{command}` for machine '{machine}' failed with {status}: {stderr}")]
    ExternalCommand {
        machine: String,
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to run `{command}` for machine '{machine}': {source}")]
    Spawn {
        machine: String,
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("console I/O for machine '{machine}' failed: {source}")]
    ConsoleIo {
        machine: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write boot config '{}' for machine '{machine}': {source}", .path.display())]
    BootConfigWrite {
        machine: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "failed to publish boot config '{}' -> '{}' for machine '{machine}': {source}",
        .link.display(),
        .target.display()
    )]
    BootConfigPublish {
        machine: String,
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve IPv4 address of '{hostname}' for machine '{machine}': {source}")]
    Resolve {
        machine: String,
        hostname: String,
        #[source]
        source: io::Error,
    },
    #[error("unknown machine '{0}'")]
    UnknownMachine(String),
    #[error("invalid configuration for machine '{machine}': {reason}")]
    InvalidMachineConfig { machine: String, reason: String },
    #[error("failed to load machine inventory '{origin}': {source}")]
    Inventory {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("machine registry was already populated")]
    RegistryInstalled,
}
