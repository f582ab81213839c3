//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// getproxy - caching package proxy
///
/// Fetches packages on demand with an external tool and serves a filtered
/// tar.gz of each package directory over HTTP.
#[derive(Parser, Debug)]
#[command(name = "getproxy")]
#[command(author, version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GETPROXY_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP proxy
    Serve(ServeArgs),

    /// Fetch one package and write its archive to a file
    Fetch(FetchArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port, ip:port, or 'envfd:NAME' to listen on
    #[arg(short, long, env = "GETPROXY_LISTEN")]
    pub listen: Option<String>,

    /// Workspace directory (packages live under <workspace>/src)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Package path, e.g. github.com/user/repo
    pub key: String,

    /// Where to write the tar.gz archive
    #[arg(short, long)]
    pub output: PathBuf,

    /// Workspace directory (packages live under <workspace>/src)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
