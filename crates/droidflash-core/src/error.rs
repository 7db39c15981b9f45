//! Error types for droidflash-core
//!
//! Every component reports through its own error type so callers can tell a
//! missing tool apart from an unreachable catalog or an interrupted download.
//! None of these are fatal to the process; each failed step can be retried.

use std::fmt;
use std::io;
use thiserror::Error;

/// Failure to run an external program at all
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be spawned (not installed, not executable, ...)
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
}

/// Which of the two control tools is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingTool {
    /// The primary control tool (adb)
    Primary,
    /// The fallback control tool (fastboot)
    Fallback,
    /// Neither tool responded
    Both,
}

impl fmt::Display for MissingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary control tool"),
            Self::Fallback => write!(f, "fallback control tool"),
            Self::Both => write!(f, "primary and fallback control tools"),
        }
    }
}

/// One or both control tools did not answer a version query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{which} not available (install the platform tools and make sure they are in PATH)")]
pub struct ToolMissing {
    /// The missing tool(s)
    pub which: MissingTool,
}

/// Device enumeration and identity resolution errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A control tool could not be invoked
    #[error(transparent)]
    Tool(#[from] CommandError),

    /// The device listing command exited unsuccessfully
    #[error("device listing failed: {0}")]
    ListingFailed(String),

    /// No device in a ready state is connected
    #[error("no device detected, connect a device with USB debugging enabled")]
    NoDeviceFound,

    /// Neither protocol returned both model and OS version
    #[error(
        "could not read details of device {id}, check that USB debugging is authorized \
         and the drivers are installed"
    )]
    DetailsUnavailable {
        /// Device identifier that was queried
        id: String,
    },
}

/// Firmware catalog lookup errors
///
/// An empty firmware list is not an error; it means the catalog has nothing
/// for the model.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The HTTP client could not be initialised
    #[error("failed to initialise HTTP client: {0}")]
    Client(String),

    /// The query URL could not be built
    #[error("invalid catalog URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL after template substitution
        url: String,
        /// Parser message
        reason: String,
    },

    /// Transport failure or any status other than 200
    #[error("firmware catalog unreachable at {url}: {reason}")]
    Unreachable {
        /// Queried URL
        url: String,
        /// HTTP status or transport error
        reason: String,
    },

    /// A listing row did not have the expected shape (strict mode only)
    #[error("malformed catalog row {row}: {reason}")]
    Malformed {
        /// Zero-based row index in the listing
        row: usize,
        /// What was wrong with it
        reason: String,
    },
}

/// A download that did not complete
///
/// No partial file is left at the destination when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("download failed after {bytes_transferred} bytes: {reason}")]
pub struct TransferError {
    /// What went wrong
    pub reason: String,
    /// Bytes received before the failure
    pub bytes_transferred: u64,
}

impl TransferError {
    pub(crate) fn new(reason: impl Into<String>, bytes_transferred: u64) -> Self {
        Self {
            reason: reason.into(),
            bytes_transferred,
        }
    }
}

/// Errors reported by a flashing backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend's external tool could not be run
    #[error(transparent)]
    Tool(#[from] CommandError),

    /// The tool ran and reported failure
    #[error("{program} failed: {detail}")]
    Failed {
        /// Program that reported the failure
        program: String,
        /// Diagnostic output
        detail: String,
    },

    /// The backend was configured incorrectly
    #[error("invalid backend configuration: {0}")]
    Config(String),
}
