//! droidflash - Android firmware provisioning tool
//!
//! Finds a connected device through the platform control tools, looks up
//! firmware for its model in an online catalog, downloads the chosen image
//! and flashes it with the backend that fits the device's vendor.
//!
//! # Architecture
//!
//! The binary is only a presentation layer. All orchestration lives in the
//! library crates:
//! - **droidflash-core** - discovery, catalog lookup, downloads, locks
//! - **droidflash-flash** - backend selection, confirmation gate, reboot
//!
//! Every command builds a `Session` from the configuration and calls into
//! those crates, rendering their results and progress events.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Session;
use droidflash_core::config::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v/-vv set the level; RUST_LOG, when set, takes precedence
    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(env_logger::Env::default())
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::ListBackends = cli.command {
        commands::list_backends(&config);
        return Ok(());
    }

    let session = Session::new(config, cli.simulate)?;

    match cli.command {
        Commands::CheckTools => commands::tools::run_check(&session),
        Commands::Detect => commands::detect::run_detect(&session),
        Commands::Catalog { model, device } => {
            commands::catalog::run_catalog(&session, model.as_deref(), device.as_deref())
        }
        Commands::Download { url, output } => {
            commands::download::run_download(&session, &url, &output)
        }
        Commands::Install {
            device,
            version,
            file,
            dir,
        } => commands::install::run_install(
            &session,
            device.as_deref(),
            version.as_deref(),
            file.as_deref(),
            &dir,
        ),
        Commands::ListBackends => Ok(()),
    }
}
