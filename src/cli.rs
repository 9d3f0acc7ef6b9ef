//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the VPoW worker.

use clap::{Parser, Subcommand};

/// VPoW Worker - Vite proof-of-work worker
///
/// Connects to the VPoW coordinator, receives proof-of-work assignments,
/// computes them through a local work server, and returns nonces.
#[derive(Parser, Debug)]
#[command(name = "vpow-worker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the worker
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker (connects to the coordinator and computes work)
    Run {
        /// Vite address payouts go to (vite_ + 50 lowercase hex digits)
        address: Option<String>,

        /// OpenCL device selector passed to the work server (platform:device)
        gpu: Option<String>,

        /// Use the Python JSON-RPC work server instead of the pow-gpu binary
        #[arg(long)]
        rpc_server: bool,

        /// Path to configuration file
        #[arg(short, long, env = "VPOW_CONFIG")]
        config: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Verifies that the CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_positional_args() {
        let address = format!("vite_{}", "ab".repeat(25));
        let cli = Cli::parse_from(["vpow-worker", "run", address.as_str(), "0:1"]);
        match cli.command {
            Commands::Run { address: a, gpu, rpc_server, config } => {
                assert_eq!(a, Some(address));
                assert_eq!(gpu, Some("0:1".to_string()));
                assert!(!rpc_server);
                assert!(config.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_without_args() {
        let cli = Cli::parse_from(["vpow-worker", "run"]);
        match cli.command {
            Commands::Run { address, gpu, .. } => {
                assert!(address.is_none());
                assert!(gpu.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_rpc_server_flag() {
        let cli = Cli::parse_from(["vpow-worker", "run", "--rpc-server"]);
        match cli.command {
            Commands::Run { rpc_server, .. } => assert!(rpc_server),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_config() {
        let cli = Cli::parse_from(["vpow-worker", "run", "--config", "/path/to/worker.toml"]);
        match cli.command {
            Commands::Run { config, .. } => {
                assert_eq!(config, Some("/path/to/worker.toml".to_string()));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["vpow-worker", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["vpow-worker", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_show() {
        let cli = Cli::parse_from(["vpow-worker", "config", "show"]);
        match cli.command {
            Commands::Config { subcommand: ConfigSubcommand::Show { config } } => {
                assert!(config.is_none());
            }
            _ => panic!("Expected Config Show command"),
        }
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::parse_from(["vpow-worker", "config", "init", "--force"]);
        match cli.command {
            Commands::Config { subcommand: ConfigSubcommand::Init { path, force } } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
