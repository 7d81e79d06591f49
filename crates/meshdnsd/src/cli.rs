use clap::{ArgGroup, Parser};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Parser, Debug)]
#[command(
    name = "meshdnsd",
    version,
    about = "Synchronize mesh-network devices into Cloudflare DNS A records"
)]
#[command(group(ArgGroup::new("mode").args(["watch", "list_devices", "cleanup", "validate"])))]
pub struct Cli {
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path to the JSON configuration file (missing file is allowed)"
    )]
    pub config: PathBuf,
    #[arg(long, help = "Plan and report without changing any DNS record")]
    pub dry_run: bool,
    #[arg(long, value_name = "SECONDS", help = "Seconds between runs in watch mode")]
    pub interval: Option<u64>,
    #[arg(long, value_name = "LEVEL", help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,
    #[arg(long, help = "Keep running and synchronize on every interval")]
    pub watch: bool,
    #[arg(long, help = "List the devices that would get records, then exit")]
    pub list_devices: bool,
    #[arg(long, help = "Remove every managed DNS record, then exit")]
    pub cleanup: bool,
    #[arg(long, help = "Check configuration and connectivity of both APIs, then exit")]
    pub validate: bool,
}

/// What the daemon does after loading its configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Once,
    Watch,
    ListDevices,
    Cleanup,
    Validate,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.watch {
            Mode::Watch
        } else if self.list_devices {
            Mode::ListDevices
        } else if self.cleanup {
            Mode::Cleanup
        } else if self.validate {
            Mode::Validate
        } else {
            Mode::Once
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_single_run() {
        let cli = Cli::try_parse_from(["meshdnsd"]).unwrap();
        assert_eq!(cli.mode(), Mode::Once);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.dry_run);
        assert_eq!(cli.interval, None);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "meshdnsd",
            "--config",
            "/etc/meshdns.json",
            "--dry-run",
            "--interval",
            "60",
            "--log-level",
            "debug",
            "--watch",
        ])
        .unwrap();

        assert_eq!(cli.mode(), Mode::Watch);
        assert!(cli.dry_run);
        assert_eq!(cli.interval, Some(60));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["meshdnsd", "--watch", "--cleanup"]).is_err());
        assert!(Cli::try_parse_from(["meshdnsd", "--list-devices", "--validate"]).is_err());
    }

    #[test]
    fn dry_run_combines_with_cleanup() {
        let cli = Cli::try_parse_from(["meshdnsd", "--cleanup", "--dry-run"]).unwrap();
        assert_eq!(cli.mode(), Mode::Cleanup);
        assert!(cli.dry_run);
    }
}
