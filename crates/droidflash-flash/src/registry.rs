//! Backend registry
//!
//! Backends are opened by name, the way programmers are chosen on the command
//! line, and assigned to vendors through `BACKEND_TABLE`. Each backend crate
//! is behind a cargo feature; a backend that is not compiled in is simply
//! absent from the set and the orchestrator reports `NoBackend` for its
//! vendor.

use droidflash_core::config::Config;
use droidflash_core::tool::ControlTools;
use droidflash_core::{FlashBackend, Vendor};
use std::collections::BTreeMap;

/// Which backend flashes which vendor's devices
pub const BACKEND_TABLE: &[(Vendor, &str)] =
    &[(Vendor::Samsung, "odin"), (Vendor::Generic, "sideload")];

/// Information about a backend
pub struct BackendInfo {
    /// Name used in configuration and logs
    pub name: &'static str,
    /// Vendor it is assigned to, if any
    pub vendor: Option<Vendor>,
    /// Short description
    pub description: &'static str,
}

/// Backends compiled into this build
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "sideload")]
    backends.push(BackendInfo {
        name: "sideload",
        vendor: vendor_for("sideload"),
        description: "Generic OTA sideload through the primary control tool (adb sideload)",
    });

    #[cfg(feature = "odin")]
    backends.push(BackendInfo {
        name: "odin",
        vendor: vendor_for("odin"),
        description: "Samsung download-mode flashing via an Odin-compatible tool (program=, args=)",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        vendor: vendor_for("dummy"),
        description: "Records flash requests without touching a device (for --simulate)",
    });

    backends
}

fn vendor_for(name: &str) -> Option<Vendor> {
    BACKEND_TABLE
        .iter()
        .find(|(_, backend)| *backend == name)
        .map(|(vendor, _)| *vendor)
}

/// Comma separated backend names for help text
pub fn backend_names_short() -> String {
    available_backends()
        .iter()
        .map(|b| b.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Open a backend by name
///
/// `options` is the backend's `[backend.<name>]` configuration table.
#[allow(unused_variables)]
pub fn open_backend(
    name: &str,
    tools: &ControlTools,
    options: Option<&toml::Table>,
) -> Result<Box<dyn FlashBackend>, Box<dyn std::error::Error>> {
    match name {
        #[cfg(feature = "sideload")]
        "sideload" => Ok(Box::new(droidflash_sideload::open_sideload(tools, options)?)),

        #[cfg(feature = "odin")]
        "odin" => Ok(Box::new(droidflash_odin::open_odin(tools, options)?)),

        #[cfg(feature = "dummy")]
        "dummy" => Ok(Box::new(droidflash_dummy::DummyBackend::new("dummy"))),

        _ => Err(format!("Unknown or disabled backend: {}", name).into()),
    }
}

/// Backends keyed by the vendor they serve
#[derive(Default)]
pub struct BackendSet {
    backends: BTreeMap<Vendor, Box<dyn FlashBackend>>,
}

impl BackendSet {
    /// An empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the backend for `vendor`
    pub fn with(mut self, vendor: Vendor, backend: Box<dyn FlashBackend>) -> Self {
        self.insert(vendor, backend);
        self
    }

    /// Add or replace the backend for `vendor`
    pub fn insert(&mut self, vendor: Vendor, backend: Box<dyn FlashBackend>) {
        self.backends.insert(vendor, backend);
    }

    /// Backend for `vendor`
    pub fn get(&self, vendor: Vendor) -> Option<&dyn FlashBackend> {
        self.backends.get(&vendor).map(|b| b.as_ref())
    }

    /// Number of vendors covered
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no vendor is covered
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Open the backends named in `table`
    ///
    /// Backends that are not compiled in are skipped with a warning; a
    /// backend that fails to open is an error.
    pub fn from_table(
        table: &[(Vendor, &str)],
        config: &Config,
        tools: &ControlTools,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut set = Self::new();
        let compiled = available_backends();

        for (vendor, name) in table {
            if !compiled.iter().any(|b| b.name == *name) {
                log::warn!(
                    "Backend '{}' for {} devices is not compiled in",
                    name,
                    vendor
                );
                continue;
            }
            let backend = open_backend(name, tools, config.backend_options(name))
                .map_err(|e| format!("Failed to open backend '{}': {}", name, e))?;
            log::debug!("Backend '{}' serves {} devices", name, vendor);
            set.insert(*vendor, backend);
        }

        Ok(set)
    }

    /// Open the standard vendor assignment from `BACKEND_TABLE`
    pub fn from_config(
        config: &Config,
        tools: &ControlTools,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_table(BACKEND_TABLE, config, tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droidflash_core::config::ToolsConfig;
    use droidflash_dummy::DummyTools;
    use std::sync::Arc;

    fn tools() -> ControlTools {
        ControlTools::new(Arc::new(DummyTools::new(vec![])), &ToolsConfig::default())
    }

    #[test]
    fn test_every_vendor_has_a_table_entry() {
        for vendor in [Vendor::Samsung, Vendor::Generic] {
            assert!(BACKEND_TABLE.iter().any(|(v, _)| *v == vendor));
        }
    }

    #[test]
    fn test_unknown_backend() {
        let err = open_backend("nonexistent", &tools(), None)
            .err()
            .expect("unknown backend must not open");
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_backend_set_lookup() {
        let set = BackendSet::new().with(
            Vendor::Samsung,
            Box::new(droidflash_dummy::DummyBackend::new("test")),
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(Vendor::Samsung).map(|b| b.name()), Some("test"));
        assert!(set.get(Vendor::Generic).is_none());
    }

    #[cfg(all(feature = "sideload", feature = "odin"))]
    #[test]
    fn test_from_config_covers_all_vendors() {
        let set = BackendSet::from_config(&Config::default(), &tools()).unwrap();
        assert_eq!(set.get(Vendor::Samsung).map(|b| b.name()), Some("odin"));
        assert_eq!(set.get(Vendor::Generic).map(|b| b.name()), Some("sideload"));
    }
}
