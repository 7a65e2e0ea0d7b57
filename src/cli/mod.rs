//! Command-line arguments parsing.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rackctl::{MachineRegistry, RackMachine, Settings};
use slog_scope::trace;
use std::path::PathBuf;
use std::sync::Arc;

mod boot;
mod console;
mod list;
mod power;

#[derive(Debug, Parser)]
#[command(name = "rackctl", display_name = "rackctl")]
#[command(version, propagate_version = true)]
#[command(about = "Lock, provision and power-cycle lab test machines")]
pub(crate) struct CliConfig {
    #[command(flatten)]
    site: SiteArgs,
    #[command(subcommand)]
    cmd: CliCommand,
}

/// Site-wide overrides of the built-in settings.
#[derive(Debug, Args)]
struct SiteArgs {
    /// Machine inventory to use instead of the built-in one
    #[arg(long, global = true, value_name = "path")]
    inventory: Option<PathBuf>,
    /// Root of the shared TFTP tree
    #[arg(long, global = true, value_name = "dir")]
    tftp_root: Option<PathBuf>,
    /// Directory containing rackboot.sh and rackpower
    #[arg(long, global = true, value_name = "dir")]
    tools_dir: Option<PathBuf>,
    /// Console server client
    #[arg(long, global = true, value_name = "path")]
    console: Option<PathBuf>,
    /// DNS suffix of machine host names
    #[arg(long, global = true, value_name = "suffix")]
    domain: Option<String>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List the machine inventory
    List(list::CliList),
    /// Show who holds a machine's console
    Status(console::CliStatus),
    /// Lock a machine's console and stream its output
    Lock(console::CliLock),
    /// Network-boot a machine into a boot menu
    Boot(boot::CliBoot),
    /// Have a machine boot from the network next time
    Setup(boot::CliSetup),
    /// Power-cycle a machine
    Reboot(power::CliReboot),
    /// Power a machine off
    Shutdown(power::CliShutdown),
}

impl CliConfig {
    /// Run the relevant CLI sub-command.
    pub fn run(self) -> Result<()> {
        let rack = Rack::new(&self.site)?;
        match self.cmd {
            CliCommand::List(cmd) => cmd.run(&rack),
            CliCommand::Status(cmd) => cmd.run(&rack),
            CliCommand::Lock(cmd) => cmd.run(&rack),
            CliCommand::Boot(cmd) => cmd.run(&rack),
            CliCommand::Setup(cmd) => cmd.run(&rack),
            CliCommand::Reboot(cmd) => cmd.run(&rack),
            CliCommand::Shutdown(cmd) => cmd.run(&rack),
        }
    }
}

/// The machines and site settings every sub-command works with.
pub(crate) struct Rack {
    registry: &'static MachineRegistry,
    settings: Arc<Settings>,
}

impl Rack {
    fn new(site: &SiteArgs) -> Result<Self> {
        let registry = match &site.inventory {
            Some(path) => {
                let input = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read inventory '{}'", path.display()))?;
                let registry = MachineRegistry::from_yaml(&input, &path.display().to_string())?;
                MachineRegistry::install(registry)?
            }
            None => MachineRegistry::global()?,
        };

        let settings = site_settings(Settings::for_current_user()?, site);
        trace!("settings - {:?}", settings);
        Ok(Self {
            registry,
            settings: Arc::new(settings),
        })
    }

    pub(crate) fn registry(&self) -> &MachineRegistry {
        self.registry
    }

    pub(crate) fn machine(&self, name: &str) -> Result<RackMachine> {
        Ok(self.registry.create(name, self.settings.clone())?)
    }
}

/// Apply command-line overrides to `settings`.
fn site_settings(mut settings: Settings, site: &SiteArgs) -> Settings {
    if let Some(dir) = &site.tools_dir {
        settings = settings.tools_dir(dir);
    }
    if let Some(root) = &site.tftp_root {
        settings = settings.tftp_root(root);
    }
    if let Some(console) = &site.console {
        settings = settings.console(rackctl::util::Tool::new(console));
    }
    if let Some(domain) = &site.domain {
        settings = settings.domain(domain);
    }
    settings
}

/// Parse command-line arguments into CLI configuration.
pub(crate) fn parse_args(argv: impl IntoIterator<Item = String>) -> Result<CliConfig> {
    let cfg = match CliConfig::try_parse_from(argv) {
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => e.exit(),
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayVersion => e.exit(),
        v => v,
    }?;
    trace!("cli configuration - {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args(argv: &[&str]) -> Vec<String> {
        argv.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn clap_tests() {
        use clap::CommandFactory;
        CliConfig::command().debug_assert();
    }

    #[test]
    fn test_no_args() {
        parse_args(args(&["rackctl"])).unwrap_err();
    }

    #[test]
    fn test_unknown_subcommand() {
        parse_args(args(&["rackctl", "frobnicate", "sbrinz1"])).unwrap_err();
    }

    #[test]
    fn test_machine_required() {
        parse_args(args(&["rackctl", "reboot"])).unwrap_err();
        parse_args(args(&["rackctl", "boot", "sbrinz1"])).unwrap_err();
    }

    #[test]
    fn test_basic_cli_args() {
        let cfg = parse_args(args(&["rackctl", "reboot", "sbrinz1"])).unwrap();
        match cfg.cmd {
            CliCommand::Reboot(_) => {}
            x => panic!("unexpected cmd: {x:?}"),
        };

        let cfg = parse_args(args(&[
            "rackctl",
            "lock",
            "sbrinz1",
            "--retries",
            "3",
            "--tftp-root",
            "/srv/tftp",
        ]))
        .unwrap();
        match cfg.cmd {
            CliCommand::Lock(_) => {}
            x => panic!("unexpected cmd: {x:?}"),
        };
        assert_eq!(cfg.site.tftp_root.as_deref(), Some(Path::new("/srv/tftp")));
    }

    #[test]
    fn test_site_settings() {
        let cfg = parse_args(args(&[
            "rackctl",
            "--tools-dir",
            "/opt/rack",
            "--domain",
            "lab.example.org",
            "--console",
            "/usr/local/bin/console",
            "list",
        ]))
        .unwrap();
        let settings = site_settings(Settings::new("alice"), &cfg.site);
        assert_eq!(settings.rackboot.program(), Path::new("/opt/rack/rackboot.sh"));
        assert_eq!(settings.rackpower.program(), Path::new("/opt/rack/rackpower"));
        assert_eq!(settings.console.program(), Path::new("/usr/local/bin/console"));
        assert_eq!(settings.hostname("sbrinz1"), "sbrinz1.lab.example.org");
        assert_eq!(settings.tftp_root, Path::new("/home/netos/tftpboot"));
    }
}
