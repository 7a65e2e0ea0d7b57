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

//! Network boot provisioning.
//!
//! Booting machines fetch `<config>.<ip>` from the root of the shared TFTP
//! tree. Each user stages configs under `<root>/<user>/<machine>_harness/`
//! and the published name is a symlink to the staged file, relative to the
//! root.

use crate::arch::BootFamily;
use crate::errors::{MachineError, Result};
use slog_scope::{debug, trace};
use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

mod menu;
pub use self::menu::{BootMenu, BootModule, BootModules};

/// A rendered boot config and where it lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootConfigArtifact {
    pub text: String,
    /// Absolute staging path.
    pub staging_path: PathBuf,
    /// Staging path relative to the TFTP root, the symlink target.
    pub relative_path: PathBuf,
    /// Published symlink, once published.
    pub published_path: Option<PathBuf>,
}

/// Boot config provisioning for one machine, on behalf of one user.
#[derive(Clone, Debug)]
pub struct BootProvisioner<'a> {
    root: &'a Path,
    user: &'a str,
    machine: &'a str,
    family: BootFamily,
}

impl<'a> BootProvisioner<'a> {
    pub fn new(root: &'a Path, user: &'a str, machine: &'a str, family: BootFamily) -> Self {
        Self {
            root,
            user,
            machine,
            family,
        }
    }

    /// Staging directory, relative to the TFTP root.
    fn staging_subdir(&self) -> PathBuf {
        Path::new(self.user).join(format!("{}_harness", self.machine))
    }

    /// Absolute staging directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(self.staging_subdir())
    }

    /// Staging directory as seen by the booting machine.
    pub fn tftp_dir(&self) -> String {
        format!("/{}", self.staging_subdir().display())
    }

    /// Path a machine with address `ip` boots from.
    pub fn published_path(&self, ip: Ipv4Addr) -> PathBuf {
        self.root
            .join(format!("{}.{}", self.family.config_file_name(), ip))
    }

    /// Render `modules` for this machine.
    pub fn render(&self, modules: &dyn BootModules, kernel_args: &[String]) -> BootConfigArtifact {
        let relative_path = self
            .staging_subdir()
            .join(self.family.config_file_name());
        BootConfigArtifact {
            text: modules.render(self.family, &self.tftp_dir(), kernel_args),
            staging_path: self.root.join(&relative_path),
            relative_path,
            published_path: None,
        }
    }

    /// Write the rendered config to its staging path.
    ///
    /// The text goes to a temporary file next to the staging path first, so
    /// the staging path only ever holds a complete config.
    pub fn stage(&self, artifact: &BootConfigArtifact) -> Result<()> {
        debug!("writing {}", artifact.staging_path.display());
        trace!("{}", artifact.text);

        let write_err = |source| MachineError::BootConfigWrite {
            machine: self.machine.to_string(),
            path: artifact.staging_path.clone(),
            source,
        };
        let dir = self.staging_dir();
        fs::create_dir_all(&dir).map_err(write_err)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&dir)
            .map_err(write_err)?;
        tmp.write_all(artifact.text.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&artifact.staging_path)
            .map_err(|e| write_err(e.error))?;
        Ok(())
    }

    /// Point the published config of `ip` at the staged artifact.
    ///
    /// A new symlink is created under a temporary name and renamed over
    /// the published one, so readers see either the old or the new target.
    pub fn publish(&self, artifact: &mut BootConfigArtifact, ip: Ipv4Addr) -> Result<()> {
        let link = self.published_path(ip);
        debug!(
            "relinking {} to {}",
            link.display(),
            artifact.relative_path.display()
        );

        let publish_err = |source| MachineError::BootConfigPublish {
            machine: self.machine.to_string(),
            link: link.clone(),
            target: artifact.relative_path.clone(),
            source,
        };
        // Unique per call, so concurrent publishes never touch each
        // other's temporary link and the last rename wins.
        let tmp_link = tempfile::Builder::new()
            .prefix(&format!(
                ".{}.{}.{}.",
                self.family.config_file_name(),
                ip,
                self.user
            ))
            .suffix(".tmp")
            .make_in(self.root, |path| symlink(&artifact.relative_path, path))
            .map_err(publish_err)?;
        tmp_link
            .persist(&link)
            .map_err(|e| publish_err(e.error))?;

        artifact.published_path = Some(link);
        Ok(())
    }

    /// Render, stage and publish `modules` as the next boot of `ip`.
    pub fn provision(
        &self,
        modules: &dyn BootModules,
        kernel_args: &[String],
        ip: Ipv4Addr,
    ) -> Result<BootConfigArtifact> {
        let mut artifact = self.render(modules, kernel_args);
        self.stage(&artifact)?;
        self.publish(&mut artifact, ip)?;
        Ok(artifact)
    }
}
