//! TOML configuration
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [tools]
//! primary = "adb"
//! fallback = "fastboot"
//!
//! [catalog]
//! url_template = "https://samfw.com/firmware/{model}"
//! strict = false
//!
//! [[vendor]]
//! marker = "SM-"
//! vendor = "samsung"
//! match = "prefix"
//!
//! [backend.odin]
//! program = "odin4"
//! ```

use crate::backend::{MarkerMatch, Vendor, VendorRule};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "DROIDFLASH_CONFIG";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unexpected fields
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete droidflash configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// External control tool names
    pub tools: ToolsConfig,
    /// Device enumeration and property keys
    pub discovery: DiscoveryConfig,
    /// Remote firmware catalog
    pub catalog: CatalogConfig,
    /// Artifact downloads
    pub transfer: TransferConfig,
    /// Model markers used to classify devices by vendor
    #[serde(rename = "vendor")]
    pub vendors: Vec<VendorRule>,
    /// Per-backend option tables, keyed by backend name
    #[serde(rename = "backend")]
    pub backends: BTreeMap<String, toml::Table>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            discovery: DiscoveryConfig::default(),
            catalog: CatalogConfig::default(),
            transfer: TransferConfig::default(),
            vendors: default_vendor_rules(),
            backends: BTreeMap::new(),
        }
    }
}

/// Control tool program names (or paths)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Primary protocol tool
    pub primary: String,
    /// Fallback protocol tool
    pub fallback: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            primary: "adb".to_string(),
            fallback: "fastboot".to_string(),
        }
    }
}

/// Device discovery settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Listing states that count as ready
    pub ready_states: Vec<String>,
    /// Primary protocol property holding the model name
    pub model_property: String,
    /// Primary protocol property holding the OS version
    pub version_property: String,
    /// Fallback protocol variable holding the model name
    pub fallback_model_var: String,
    /// Fallback protocol variable holding the version
    pub fallback_version_var: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ready_states: vec![
                "device".to_string(),
                "recovery".to_string(),
                "sideload".to_string(),
            ],
            model_property: "ro.product.model".to_string(),
            version_property: "ro.build.version.release".to_string(),
            fallback_model_var: "product".to_string(),
            fallback_version_var: "version-bootloader".to_string(),
        }
    }
}

/// Firmware catalog settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Query URL; `{model}` is replaced by the normalised model name
    pub url_template: String,
    /// Replacement for spaces in model names
    pub separator: String,
    /// Reject malformed listing rows instead of skipping them
    pub strict: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header sent with catalog requests
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url_template: "https://samfw.com/firmware/{model}".to_string(),
            separator: "-".to_string(),
            strict: false,
            timeout_secs: 30,
            user_agent: concat!("droidflash/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Download settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Read buffer size in bytes
    pub chunk_size: usize,
    /// Connection timeout in seconds (the transfer itself is unbounded)
    pub connect_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            connect_timeout_secs: 30,
        }
    }
}

fn default_vendor_rules() -> Vec<VendorRule> {
    vec![
        VendorRule::new("SM-", Vendor::Samsung, MarkerMatch::Prefix),
        VendorRule::new("GT-", Vendor::Samsung, MarkerMatch::Prefix),
        VendorRule::new("samsung", Vendor::Samsung, MarkerMatch::Contains),
    ]
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from an explicit path, or the first default location that exists
    ///
    /// Lookup order: `path`, `$DROIDFLASH_CONFIG`, `./droidflash.toml`,
    /// `/etc/droidflash/config.toml`. If none exists the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_toml_file(PathBuf::from(path));
        }

        let default_paths = [
            PathBuf::from("droidflash.toml"),
            PathBuf::from("/etc/droidflash/config.toml"),
        ];

        for candidate in &default_paths {
            if candidate.is_file() {
                log::debug!("Loading config from {}", candidate.display());
                return Self::from_toml_file(candidate);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Option table for a backend, if one was configured
    pub fn backend_options(&self, name: &str) -> Option<&toml::Table> {
        self.backends.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.tools.primary, "adb");
        assert_eq!(config.tools.fallback, "fastboot");
        assert_eq!(config.discovery.ready_states.len(), 3);
        assert_eq!(config.catalog.separator, "-");
        assert!(!config.catalog.strict);
        assert_eq!(config.transfer.chunk_size, 65536);
        assert_eq!(config.vendors.len(), 3);
        assert!(config.backends.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[tools]
primary = "/opt/platform-tools/adb"

[catalog]
url_template = "https://firmware.example.com/{model}/list"
separator = "_"
strict = true

[[vendor]]
marker = "XQ-"
vendor = "generic"
match = "prefix"

[backend.odin]
program = "odin4"
settle_secs = 5
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.tools.primary, "/opt/platform-tools/adb");
        assert_eq!(config.tools.fallback, "fastboot");
        assert_eq!(config.catalog.separator, "_");
        assert!(config.catalog.strict);
        // an explicit vendor list replaces the defaults
        assert_eq!(config.vendors.len(), 1);
        assert_eq!(config.vendors[0].vendor, Vendor::Generic);

        let odin = config.backend_options("odin").unwrap();
        assert_eq!(odin.get("program").and_then(|v| v.as_str()), Some("odin4"));
        assert!(config.backend_options("sideload").is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::from_toml_str("[tools]\nprimry = \"adb\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transfer]\nchunk_size = 4096").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.transfer.chunk_size, 4096);
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/droidflash.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
