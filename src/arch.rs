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

//! Boot architecture families.
//!
//! Machines booting through Hagfish (ARMv8 UEFI) read a different config
//! file and need a different network boot setup than everything else,
//! which boots via PXE/GRUB.

/// Boot architecture of Hagfish machines.
const ARM64_BOOTARCH: &str = "armv8";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootFamily {
    /// ARMv8 machines, booted by Hagfish.
    Hagfish,
    /// Everything else, booted by GRUB.
    Grub,
}

impl BootFamily {
    pub fn of(bootarch: &str) -> Self {
        if bootarch == ARM64_BOOTARCH {
            BootFamily::Hagfish
        } else {
            BootFamily::Grub
        }
    }

    /// Name of the boot config file in the TFTP tree.
    pub fn config_file_name(self) -> &'static str {
        match self {
            BootFamily::Hagfish => "hagfish.cfg",
            BootFamily::Grub => "menu.lst",
        }
    }

    /// `rackboot.sh` flags enabling the next network boot.
    pub fn network_boot_flags(self) -> &'static [&'static str] {
        match self {
            BootFamily::Hagfish => &["-b", "-H", "-n"],
            BootFamily::Grub => &["-b", "-n"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_family() {
        let tests = vec![
            ("armv8", BootFamily::Hagfish, "hagfish.cfg", vec!["-b", "-H", "-n"]),
            ("x86_64", BootFamily::Grub, "menu.lst", vec!["-b", "-n"]),
            ("x86_32", BootFamily::Grub, "menu.lst", vec!["-b", "-n"]),
            ("armv7", BootFamily::Grub, "menu.lst", vec!["-b", "-n"]),
            ("ARMV8", BootFamily::Grub, "menu.lst", vec!["-b", "-n"]),
        ];
        for (arch, family, file, flags) in tests {
            let res = BootFamily::of(arch);
            assert_eq!(res, family, "arch: {arch}");
            assert_eq!(res.config_file_name(), file, "arch: {arch}");
            assert_eq!(res.network_boot_flags(), flags.as_slice(), "arch: {arch}");
        }
    }
}
