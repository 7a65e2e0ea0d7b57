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

//! Boot menus.

use crate::arch::BootFamily;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const DEFAULT_TITLE: &str = "Harness image";

/// Something that can be rendered into a machine's boot config.
pub trait BootModules {
    /// Render the boot config text.
    ///
    /// `tftp_dir` is the directory, as seen by the booting machine, that
    /// module paths are relative to. `kernel_args` are the machine's own
    /// kernel arguments.
    fn render(&self, family: BootFamily, tftp_dir: &str, kernel_args: &[String]) -> String;
}

/// One boot module: a path below the TFTP staging directory plus arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BootModule {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BootModule {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }
}

/// A kernel plus modules, as handed over by the harness.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BootMenu {
    #[serde(default)]
    pub title: Option<String>,
    pub kernel: BootModule,
    #[serde(default)]
    pub modules: Vec<BootModule>,
}

impl BootMenu {
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }
}

impl BootModules for BootMenu {
    fn render(&self, family: BootFamily, tftp_dir: &str, kernel_args: &[String]) -> String {
        let mut out = String::new();
        let title = self.title.as_deref().unwrap_or(DEFAULT_TITLE);

        if family == BootFamily::Grub {
            out.push_str("timeout 0\n");
        }
        let _ = writeln!(out, "title {title}");
        if family == BootFamily::Grub {
            out.push_str("root (nd)\n");
        }

        let kernel_args = self.kernel.args.iter().chain(kernel_args);
        push_line(&mut out, "kernel", tftp_dir, &self.kernel.path, kernel_args);
        for module in &self.modules {
            push_line(&mut out, "module", tftp_dir, &module.path, module.args.iter());
        }
        out
    }
}

fn push_line<'a>(
    out: &mut String,
    keyword: &str,
    tftp_dir: &str,
    path: &str,
    args: impl Iterator<Item = &'a String>,
) {
    let _ = write!(
        out,
        "{} {}/{}",
        keyword,
        tftp_dir.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> BootMenu {
        BootMenu {
            title: None,
            kernel: BootModule::new("x86_64/sbin/elver").arg("loglevel=3"),
            modules: vec![
                BootModule::new("/x86_64/sbin/cpu").arg("loglevel=3"),
                BootModule::new("x86_64/sbin/init"),
            ],
        }
    }

    #[test]
    fn test_render_grub() {
        let text = menu().render(
            BootFamily::Grub,
            "/alice/sbrinz1_harness",
            &["serial=0x3f8".to_string()],
        );
        let expected = "timeout 0
title Harness image
root (nd)
kernel /alice/sbrinz1_harness/x86_64/sbin/elver loglevel=3 serial=0x3f8
module /alice/sbrinz1_harness/x86_64/sbin/cpu loglevel=3
module /alice/sbrinz1_harness/x86_64/sbin/init
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_hagfish() {
        let mut menu = menu();
        menu.title = Some("ThunderX boot".to_string());
        let text = menu.render(BootFamily::Hagfish, "/alice/cavium1_harness/", &[]);
        let expected = "title ThunderX boot
kernel /alice/cavium1_harness/x86_64/sbin/elver loglevel=3
module /alice/cavium1_harness/x86_64/sbin/cpu loglevel=3
module /alice/cavium1_harness/x86_64/sbin/init
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_from_yaml() {
        let input = r#"
kernel:
  path: x86_64/sbin/elver
  args: [loglevel=3]
modules:
  - path: /x86_64/sbin/cpu
    args: [loglevel=3]
  - path: x86_64/sbin/init
"#;
        assert_eq!(BootMenu::from_yaml(input).unwrap(), menu());

        BootMenu::from_yaml("modules: []").unwrap_err();
    }
}
