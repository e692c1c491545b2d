//! Command-line argument definitions for the dpid client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Talks to a running dpid over its rendezvous socket.
#[derive(Parser, Debug)]
#[command(name = "dpidc", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Per-user configuration directory holding the keys and socket pointer
    /// files (defaults to ~/.dpid).
    #[arg(long, env = "DPID_CONFIG_DIR", value_name = "DIR")]
    pub(crate) config_dir: Option<PathBuf>,
    /// Action to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Client actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Asks the daemon to stop its server plugins and exit.
    Stop,
    /// Asks the daemon to rescan plugins and services.
    Register,
    /// Prints the socket path serving a service.
    Check {
        /// Service name, for example `proto.http`.
        #[arg(value_name = "SERVICE")]
        service: String,
    },
}
