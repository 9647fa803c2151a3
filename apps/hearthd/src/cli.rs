//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hearthd - package lifecycle orchestrator
#[derive(Parser)]
#[command(name = "hearthd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Package lifecycle orchestrator for containerized packages")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format (logs and results)
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the package data directory
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the content gateway URL
    #[arg(long, global = true, value_name = "URL")]
    pub gateway_url: Option<String>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Settle a self restart left by a previous run
    Recover,

    /// Install a batch of packages described by a JSON file
    Install {
        /// JSON array of package install states
        batch: PathBuf,
    },

    /// Show what the state store records about installed packages
    Status {
        /// Package name (all packages when omitted)
        package: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_install_with_global_flags() {
        let cli = Cli::try_parse_from([
            "hearthd",
            "install",
            "/tmp/batch.json",
            "--json",
            "--data-dir",
            "/srv/packages",
        ])
        .unwrap();
        assert!(cli.global.json);
        assert_eq!(cli.global.data_dir, Some(PathBuf::from("/srv/packages")));
        assert!(matches!(cli.command, Commands::Install { batch } if batch == PathBuf::from("/tmp/batch.json")));
    }

    #[test]
    fn status_package_is_optional() {
        let cli = Cli::try_parse_from(["hearthd", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { package: None }));
        assert!(Cli::try_parse_from(["hearthd", "install"]).is_err());
    }
}
