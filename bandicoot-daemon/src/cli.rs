//! CLI argument definitions for bandicoot-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bandicoot/bandicoot.toml";

/// Bandicoot container firewall daemon.
///
/// Watches Docker container start/die events and keeps host firewall
/// rules in sync with each container's policy label.
#[derive(Parser, Debug)]
#[command(name = "bandicoot-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to bandicoot.toml configuration file.
    ///
    /// If the default path does not exist, built-in defaults are used.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log firewall directives instead of executing iptables.
    #[arg(long)]
    pub dry_run: bool,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Whether `--config` was left at its default value.
    pub fn uses_default_config(&self) -> bool {
        self.config.as_os_str() == DEFAULT_CONFIG_PATH
    }
}
