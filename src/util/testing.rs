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

//! Stand-ins for the rack tools, for tests.
//!
//! Scripts are run through `sh` rather than executed directly, so nothing
//! ever execs a file that another test thread may still have open for
//! writing.

use crate::settings::Settings;
use crate::util::Tool;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) struct FakeRack {
    dir: TempDir,
}

impl FakeRack {
    pub(crate) fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("rackctl-test-")
            .tempdir()
            .unwrap();
        fs::create_dir(dir.path().join("tftpboot")).unwrap();
        Self { dir }
    }

    pub(crate) fn tftp_root(&self) -> PathBuf {
        self.dir.path().join("tftpboot")
    }

    /// Write `body` as a shell script named `name`.
    pub(crate) fn script(&self, name: &str, body: &str) -> Tool {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        Tool::new("sh").arg(path)
    }

    /// A `console` stand-in.
    ///
    /// `console -i` prints `status`. Attaching puts the pty in raw mode,
    /// prints `ready`, then records the first three bytes it receives
    /// (the escape sequence) in `escape.bin` and exits.
    pub(crate) fn console(&self, status: &str) -> Tool {
        let escape = self.dir.path().join("escape.bin");
        self.script(
            "console",
            &format!(
                r#"if [ "$1" = "-i" ]; then
    printf '%s\n' '{status}'
    exit 0
fi
stty raw -echo
echo "ready $1"
head -c 3 > '{escape}'"#,
                escape = escape.display()
            ),
        )
    }

    /// A tool that records its arguments in `<name>.args` and exits with `code`.
    pub(crate) fn recorder(&self, name: &str, code: i32) -> Tool {
        let args = self.dir.path().join(format!("{name}.args"));
        self.script(
            name,
            &format!(
                "echo \"$@\" > '{}'\necho '{name} says no' >&2\nexit {code}",
                args.display()
            ),
        )
    }

    pub(crate) fn recorded_args(&self, name: &str) -> String {
        fs::read_to_string(self.dir.path().join(format!("{name}.args")))
            .unwrap()
            .trim()
            .to_string()
    }

    pub(crate) fn escape_bytes(&self) -> Option<Vec<u8>> {
        fs::read(self.dir.path().join("escape.bin")).ok()
    }

    /// Settings pointing at this fake rack, acting as `user`.
    pub(crate) fn settings(&self, user: &str, status: &str) -> Settings {
        Settings::new(user)
            .tftp_root(self.tftp_root())
            .console(self.console(status))
            .rackboot(self.recorder("rackboot", 0))
            .rackpower(self.recorder("rackpower", 0))
            .domain("")
            .release_grace(Duration::from_secs(5))
    }
}
