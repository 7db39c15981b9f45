//! droidflash-sideload - Generic OTA sideload backend
//!
//! Writes a full OTA package through the primary control tool's sideload
//! command. The device has to be in sideload mode, either already or by
//! asking for it with `enter_sideload = true`.
//!
//! # Configuration
//!
//! ```toml
//! [backend.sideload]
//! enter_sideload = true   # reboot into sideload mode first (default: false)
//! ```
//!
//! # Failure detection
//!
//! The sideload command does not always exit non-zero when the device
//! rejects a package, so its output is also scanned for error lines.

use droidflash_core::tool::{ControlTools, ToolOutput};
use droidflash_core::{BackendError, FlashBackend};
use serde::Deserialize;
use std::path::Path;

/// Backend options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SideloadConfig {
    /// Reboot into sideload mode and wait for the device before writing
    pub enter_sideload: bool,
}

/// Parse the `[backend.sideload]` table
pub fn parse_options(options: Option<&toml::Table>) -> Result<SideloadConfig, BackendError> {
    match options {
        Some(table) => toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| BackendError::Config(format!("backend.sideload: {}", e))),
        None => Ok(SideloadConfig::default()),
    }
}

/// OTA sideload through the primary control tool
pub struct SideloadBackend {
    tools: ControlTools,
    config: SideloadConfig,
}

impl SideloadBackend {
    /// Create a backend using `tools`
    pub fn new(tools: ControlTools, config: SideloadConfig) -> Self {
        Self { tools, config }
    }

    fn run(&self, device_id: &str, args: &[&str]) -> Result<ToolOutput, BackendError> {
        let output = self.tools.primary_for(device_id, args)?;
        if !output.success || reports_error(&output) {
            return Err(BackendError::Failed {
                program: self.tools.primary_program().to_string(),
                detail: output.detail(),
            });
        }
        Ok(output)
    }
}

/// Whether the tool printed a failure despite its exit status
fn reports_error(output: &ToolOutput) -> bool {
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim_start)
        .any(|line| line.starts_with("error:") || line.starts_with("adb: failed"))
}

impl FlashBackend for SideloadBackend {
    fn name(&self) -> &str {
        "sideload"
    }

    fn flash(&self, device_id: &str, artifact: &Path) -> Result<(), BackendError> {
        if self.config.enter_sideload {
            log::info!("sideload: rebooting {} into sideload mode", device_id);
            self.run(device_id, &["reboot", "sideload"])?;
            self.run(device_id, &["wait-for-sideload"])?;
        }

        let path = artifact.to_string_lossy();
        log::info!("sideload: sending {} to {}", path, device_id);
        let output = self.run(device_id, &["sideload", &*path])?;
        log::debug!("sideload: {}", output.detail());
        Ok(())
    }
}

/// Open the sideload backend with its configuration table
pub fn open_sideload(
    tools: &ControlTools,
    options: Option<&toml::Table>,
) -> Result<SideloadBackend, BackendError> {
    let config = parse_options(options)?;
    Ok(SideloadBackend::new(tools.clone(), config))
}
