//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "droidflash")]
#[command(
    author,
    version,
    about = "Detect Android devices, fetch matching firmware and flash it",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML)
    /// Defaults to $DROIDFLASH_CONFIG, ./droidflash.toml, /etc/droidflash/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use emulated devices and recording backends instead of real tools
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the control tools are installed
    CheckTools,

    /// List connected devices with model and OS version
    Detect,

    /// Query the firmware catalog for a model
    Catalog {
        /// Model name (defaults to the connected device's model)
        model: Option<String>,

        /// Device to take the model from when several are connected
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Download a firmware image
    Download {
        /// Source URL (http, https or file)
        url: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Detect, pick firmware, download and flash it
    Install {
        /// Device to flash (prompted for when several are connected)
        #[arg(short, long)]
        device: Option<String>,

        /// Firmware version to install (prompted for if not given)
        #[arg(long, conflicts_with = "file")]
        version: Option<String>,

        /// Flash a local image instead of querying the catalog
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Directory to store the downloaded image in
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// List compiled-in flashing backends and the vendor rules
    ListBackends,
}
