//! Flashing backends and vendor classification
//!
//! Writing an image to a device is delegated to a backend chosen by the
//! device's vendor. The vendor comes from matching the reported model string
//! against a list of `VendorRule`s, which is plain data (and configurable)
//! rather than conditionals scattered through the orchestrator.

use crate::error::BackendError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Normalised device vendor classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Samsung devices, which need a dedicated flashing tool
    Samsung,
    /// Anything else, flashed via the primary protocol's sideload
    Generic,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Samsung => "samsung",
            Self::Generic => "generic",
        })
    }
}

/// How a rule's marker is compared to a model string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerMatch {
    /// Model starts with the marker
    #[default]
    Prefix,
    /// Model contains the marker anywhere
    Contains,
}

/// One classification rule; comparison is case-insensitive
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VendorRule {
    /// Text to look for in the model string
    pub marker: String,
    /// Vendor assigned on a match
    pub vendor: Vendor,
    /// Comparison mode
    #[serde(default, rename = "match")]
    pub mode: MarkerMatch,
}

impl VendorRule {
    /// Create a rule
    pub fn new(marker: impl Into<String>, vendor: Vendor, mode: MarkerMatch) -> Self {
        Self {
            marker: marker.into(),
            vendor,
            mode,
        }
    }

    /// Whether this rule applies to `model`
    pub fn matches(&self, model: &str) -> bool {
        let model = model.trim().to_lowercase();
        let marker = self.marker.to_lowercase();
        if marker.is_empty() {
            return false;
        }
        match self.mode {
            MarkerMatch::Prefix => model.starts_with(&marker),
            MarkerMatch::Contains => model.contains(&marker),
        }
    }
}

/// Ordered rule list; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct VendorPolicy {
    rules: Vec<VendorRule>,
}

impl VendorPolicy {
    /// Build a policy from rules in priority order
    pub fn new(rules: Vec<VendorRule>) -> Self {
        Self { rules }
    }

    /// Classify a model string; unmatched models are `Vendor::Generic`
    pub fn classify(&self, model: &str) -> Vendor {
        self.rules
            .iter()
            .find(|rule| rule.matches(model))
            .map(|rule| rule.vendor)
            .unwrap_or(Vendor::Generic)
    }

    /// The rules, in priority order
    pub fn rules(&self) -> &[VendorRule] {
        &self.rules
    }
}

/// A pluggable executor that writes an artifact to device storage
///
/// Backends are opaque: they typically wrap an external tool. Implementations
/// must return an error rather than panic when the tool reports failure.
pub trait FlashBackend: Send + Sync {
    /// Short name used in logs and error reports
    fn name(&self) -> &str;

    /// Write `artifact` to the device identified by `device_id`
    fn flash(&self, device_id: &str, artifact: &Path) -> Result<(), BackendError>;
}
