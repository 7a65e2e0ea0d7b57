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

//! Control of lab test machines: console locking, network boot
//! provisioning and power control.
//!
//! Machines come from the [`registry::MachineRegistry`]; each one is a
//! [`machine::RackMachine`] driven through [`machine::MachineOperations`].

pub mod arch;
pub mod boot;
pub mod console;
pub mod errors;
pub mod machine;
pub mod power;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod util;

pub use errors::{MachineError, Result};
pub use machine::{MachineConfig, MachineOperations, RackMachine};
pub use registry::MachineRegistry;
pub use settings::Settings;
