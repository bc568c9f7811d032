//! Clap CLI definitions for Tether.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tether remote service admin.
#[derive(Parser)]
#[command(name = "tether", version, about = "Export local services over HTTP and call remote ones")]
pub struct Cli {
    /// Path to config file (default: ~/.tether/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the admin with the HTTP transport and export the echo service.
    Serve {
        /// Listen port (overrides config and RSA_PORT).
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
    /// POST a payload to an endpoint URL and print the reply.
    Call {
        /// Endpoint URL, e.g. http://127.0.0.1:8888/service/1/tether.Echo
        #[arg(long)]
        url: String,
        /// Request body.
        #[arg(long, default_value = "{}")]
        data: String,
        /// Request timeout in seconds (default: from config).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the effective configuration as TOML.
    Config,
}
