//! CLI command implementations
//!
//! Each command takes a `Session`, which bundles the loaded configuration
//! with the control tools and discovery service built from it. With
//! `--simulate` the tools are emulated and every vendor is served by the
//! recording backend, so the whole flow can be exercised without hardware.

pub mod catalog;
pub mod detect;
pub mod download;
pub mod install;
mod list;
pub mod tools;

pub use list::list_backends;

use droidflash_core::config::Config;
use droidflash_core::discovery::Discovery;
use droidflash_core::tool::ControlTools;
use droidflash_core::VendorPolicy;
use droidflash_flash::BackendSet;

/// Everything a command needs to talk to devices
pub struct Session {
    /// Loaded configuration
    pub config: Config,
    /// Discovery service; also owns the tools and device locks
    pub discovery: Discovery,
    simulate: bool,
}

impl Session {
    /// Build the tools and discovery service from `config`
    pub fn new(config: Config, simulate: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let tools = control_tools(&config, simulate)?;
        let discovery = Discovery::new(tools, config.discovery.clone());
        Ok(Self {
            config,
            discovery,
            simulate,
        })
    }

    /// The control tools
    pub fn tools(&self) -> &ControlTools {
        self.discovery.tools()
    }

    /// Vendor classification rules from the configuration
    pub fn policy(&self) -> VendorPolicy {
        VendorPolicy::new(self.config.vendors.clone())
    }

    /// Open the backends that serve each vendor
    pub fn backends(&self) -> Result<BackendSet, Box<dyn std::error::Error>> {
        if self.simulate {
            let table: Vec<_> = droidflash_flash::BACKEND_TABLE
                .iter()
                .map(|(vendor, _)| (*vendor, "dummy"))
                .collect();
            return BackendSet::from_table(&table, &self.config, self.tools());
        }
        BackendSet::from_config(&self.config, self.tools())
    }
}

/// Fail unless both control tools answer; discovery must not start otherwise
pub fn require_tools(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = session.tools().check() {
        return Err(format!("{}; run 'droidflash check-tools' for details", e).into());
    }
    Ok(())
}

#[cfg(feature = "dummy")]
fn control_tools(
    config: &Config,
    simulate: bool,
) -> Result<ControlTools, Box<dyn std::error::Error>> {
    use droidflash_dummy::DummyTools;
    use std::sync::Arc;

    if simulate {
        log::info!("Simulation mode: no external tools will be run");
        let runner = DummyTools::simulated()
            .with_programs(&config.tools.primary, &config.tools.fallback);
        return Ok(ControlTools::new(Arc::new(runner), &config.tools));
    }
    Ok(ControlTools::system(&config.tools))
}

#[cfg(not(feature = "dummy"))]
fn control_tools(
    config: &Config,
    simulate: bool,
) -> Result<ControlTools, Box<dyn std::error::Error>> {
    if simulate {
        return Err("--simulate requires droidflash to be built with the 'dummy' feature".into());
    }
    Ok(ControlTools::system(&config.tools))
}

/// Pick the device to work on from the current listing
///
/// `wanted` must be listed; without it a single device is chosen
/// automatically and several devices are offered in a prompt.
pub fn choose_device(
    session: &Session,
    wanted: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    let ids = session.discovery.list_devices()?;

    if let Some(wanted) = wanted {
        if ids.iter().any(|id| id == wanted) {
            return Ok(wanted.to_string());
        }
        return Err(format!(
            "Device {} is not connected (found: {})",
            wanted,
            ids.join(", ")
        )
        .into());
    }

    if ids.len() == 1 {
        return Ok(ids[0].clone());
    }

    let selection = dialoguer::Select::new()
        .with_prompt("Several devices are connected; pick one")
        .items(&ids)
        .default(0)
        .interact()
        .map_err(|e| format!("Device selection failed: {}", e))?;
    Ok(ids[selection].clone())
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
