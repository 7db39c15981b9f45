//! Device identity

use std::fmt;

/// Control protocol a device answered identity queries through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Primary protocol (Android running, adb)
    Primary,
    /// Fallback protocol (bootloader only, fastboot)
    Fallback,
    /// Not resolved yet
    #[default]
    Unknown,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Unknown => "unknown",
        })
    }
}

/// A connected device
///
/// `id` is stable per physical unit. `model` and `os_version` are only
/// meaningful once `protocol` is resolved; a resolved device never has
/// either field empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Serial number reported by the listing command
    pub id: String,
    /// Protocol the details were obtained through
    pub protocol: Protocol,
    /// Model name, e.g. "SM-G991B"
    pub model: String,
    /// OS (or bootloader) version
    pub os_version: String,
}

impl Device {
    /// A listed device whose details have not been queried
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol: Protocol::Unknown,
            model: String::new(),
            os_version: String::new(),
        }
    }

    /// Whether details were obtained through either protocol
    pub fn is_resolved(&self) -> bool {
        self.protocol != Protocol::Unknown
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_resolved() {
            write!(
                f,
                "{} ({}, version {}, via {} protocol)",
                self.id, self.model, self.os_version, self.protocol
            )
        } else {
            write!(f, "{} (details unknown)", self.id)
        }
    }
}
