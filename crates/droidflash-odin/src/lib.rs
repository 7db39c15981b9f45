//! droidflash-odin - Samsung download-mode backend
//!
//! Samsung devices are not flashed through the Android control tools but
//! through an Odin-compatible program (`odin4`, Heimdall wrappers, ...) while
//! the phone sits in download mode. This crate only builds and runs the
//! command line; the program itself is configured.
//!
//! # Configuration
//!
//! ```toml
//! [backend.odin]
//! program = "odin4"
//! args = ["-a", "{artifact}", "-d", "{device}"]
//! enter_download_mode = true   # reboot into download mode first
//! settle_secs = 10             # wait for USB re-enumeration afterwards
//! ```
//!
//! `{artifact}` is replaced by the artifact path and `{device}` by the
//! device id.

use droidflash_core::tool::ControlTools;
use droidflash_core::{BackendError, FlashBackend};
use serde::Deserialize;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Backend options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OdinConfig {
    /// Program to run
    pub program: String,
    /// Argument template
    pub args: Vec<String>,
    /// Reboot the device into download mode through the primary tool first
    pub enter_download_mode: bool,
    /// Seconds to wait after the download-mode reboot
    pub settle_secs: u64,
}

impl Default for OdinConfig {
    fn default() -> Self {
        Self {
            program: "odin4".to_string(),
            args: ["-a", "{artifact}", "-d", "{device}"]
                .into_iter()
                .map(String::from)
                .collect(),
            enter_download_mode: false,
            settle_secs: 10,
        }
    }
}

impl OdinConfig {
    /// Expand the argument template for one flash
    pub fn command_args(&self, device_id: &str, artifact: &Path) -> Vec<String> {
        let artifact = artifact.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{artifact}", &artifact)
                    .replace("{device}", device_id)
            })
            .collect()
    }
}

/// Parse the `[backend.odin]` table
pub fn parse_options(options: Option<&toml::Table>) -> Result<OdinConfig, BackendError> {
    let config: OdinConfig = match options {
        Some(table) => toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| BackendError::Config(format!("backend.odin: {}", e)))?,
        None => OdinConfig::default(),
    };

    if config.program.trim().is_empty() {
        return Err(BackendError::Config(
            "backend.odin: program must not be empty".to_string(),
        ));
    }
    if !config.args.iter().any(|a| a.contains("{artifact}")) {
        return Err(BackendError::Config(
            "backend.odin: args must reference {artifact}".to_string(),
        ));
    }

    Ok(config)
}

/// Flashes through an Odin-compatible program
pub struct OdinBackend {
    tools: ControlTools,
    config: OdinConfig,
}

impl OdinBackend {
    /// Create a backend
    pub fn new(tools: ControlTools, config: OdinConfig) -> Self {
        Self { tools, config }
    }

    fn enter_download_mode(&self, device_id: &str) -> Result<(), BackendError> {
        log::info!("odin: rebooting {} into download mode", device_id);
        let output = self.tools.primary_for(device_id, &["reboot", "download"])?;
        if !output.success {
            return Err(BackendError::Failed {
                program: self.tools.primary_program().to_string(),
                detail: output.detail(),
            });
        }
        if self.config.settle_secs > 0 {
            log::debug!("odin: waiting {}s for download mode", self.config.settle_secs);
            thread::sleep(Duration::from_secs(self.config.settle_secs));
        }
        Ok(())
    }
}

impl FlashBackend for OdinBackend {
    fn name(&self) -> &str {
        "odin"
    }

    fn flash(&self, device_id: &str, artifact: &Path) -> Result<(), BackendError> {
        if self.config.enter_download_mode {
            self.enter_download_mode(device_id)?;
        }

        let args = self.config.command_args(device_id, artifact);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        log::info!("odin: {} {}", self.config.program, args.join(" "));

        let output = self.tools.runner().run(&self.config.program, &args)?;
        if !output.success {
            return Err(BackendError::Failed {
                program: self.config.program.clone(),
                detail: output.detail(),
            });
        }
        Ok(())
    }
}

/// Open the Odin backend with its configuration table
pub fn open_odin(
    tools: &ControlTools,
    options: Option<&toml::Table>,
) -> Result<OdinBackend, BackendError> {
    let config = parse_options(options)?;
    Ok(OdinBackend::new(tools.clone(), config))
}
