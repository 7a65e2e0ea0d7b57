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

//! Site settings shared by every machine: where the rack tools live, the
//! TFTP tree booting machines read from, and who we are acting as.

use crate::util::Tool;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shared TFTP tree served to booting machines.
pub const DEFAULT_TFTP_ROOT: &str = "/home/netos/tftpboot";
/// Directory holding the privileged rack tools.
pub const DEFAULT_TOOLS_DIR: &str = "/home/netos/tools/bin";
/// Console server client.
pub const DEFAULT_CONSOLE: &str = "console";
/// DNS suffix appended to machine names.
pub const DEFAULT_DOMAIN: &str = "in.barrelfish.org";
/// How long the console holder gets to detach before it is terminated.
pub const DEFAULT_RELEASE_GRACE: Duration = Duration::from_secs(5);

const RACKBOOT: &str = "rackboot.sh";
const RACKPOWER: &str = "rackpower";

#[derive(Clone, Debug)]
pub struct Settings {
    pub tftp_root: PathBuf,
    pub console: Tool,
    pub rackboot: Tool,
    pub rackpower: Tool,
    pub domain: String,
    /// Login used for lock ownership checks and staging paths.
    pub user: String,
    pub release_grace: Duration,
}

impl Settings {
    /// Site defaults, acting as `user`.
    pub fn new(user: impl Into<String>) -> Self {
        let tools = Path::new(DEFAULT_TOOLS_DIR);
        Self {
            tftp_root: PathBuf::from(DEFAULT_TFTP_ROOT),
            console: Tool::new(DEFAULT_CONSOLE),
            rackboot: Tool::new(tools.join(RACKBOOT)),
            rackpower: Tool::new(tools.join(RACKPOWER)),
            domain: DEFAULT_DOMAIN.to_string(),
            user: user.into(),
            release_grace: DEFAULT_RELEASE_GRACE,
        }
    }

    /// Site defaults, acting as the current login.
    pub fn for_current_user() -> Result<Self> {
        let user = users::get_current_username()
            .ok_or_else(|| anyhow!("unable to determine the current user"))?
            .into_string()
            .map_err(|name| anyhow!("current user name {:?} is not valid UTF-8", name))?;
        Ok(Self::new(user))
    }

    /// Look for `rackboot.sh` and `rackpower` in `dir`.
    pub fn tools_dir(mut self, dir: &Path) -> Self {
        self.rackboot = Tool::new(dir.join(RACKBOOT));
        self.rackpower = Tool::new(dir.join(RACKPOWER));
        self
    }

    pub fn tftp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tftp_root = root.into();
        self
    }

    pub fn console(mut self, console: Tool) -> Self {
        self.console = console;
        self
    }

    pub fn rackboot(mut self, rackboot: Tool) -> Self {
        self.rackboot = rackboot;
        self
    }

    pub fn rackpower(mut self, rackpower: Tool) -> Self {
        self.rackpower = rackpower;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    /// Fully qualified host name of a machine.
    ///
    /// An empty domain leaves the bare machine name.
    pub fn hostname(&self, machine: &str) -> String {
        if self.domain.is_empty() {
            machine.to_string()
        } else {
            format!("{}.{}", machine, self.domain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new("alice");
        assert_eq!(settings.tftp_root, PathBuf::from("/home/netos/tftpboot"));
        assert_eq!(
            settings.rackboot.program(),
            Path::new("/home/netos/tools/bin/rackboot.sh")
        );
        assert_eq!(
            settings.rackpower.program(),
            Path::new("/home/netos/tools/bin/rackpower")
        );
        assert_eq!(settings.console.program(), Path::new("console"));
        assert_eq!(settings.user, "alice");
    }

    #[test]
    fn test_tools_dir() {
        let settings = Settings::new("alice").tools_dir(Path::new("/opt/rack"));
        assert_eq!(
            settings.rackboot.program(),
            Path::new("/opt/rack/rackboot.sh")
        );
        assert_eq!(settings.rackpower.program(), Path::new("/opt/rack/rackpower"));
    }

    #[test]
    fn test_hostname() {
        let settings = Settings::new("alice");
        assert_eq!(settings.hostname("sbrinz1"), "sbrinz1.in.barrelfish.org");
        let settings = settings.domain("");
        assert_eq!(settings.hostname("localhost"), "localhost");
    }
}
