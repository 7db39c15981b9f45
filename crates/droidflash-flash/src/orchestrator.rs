//! Flash orchestration
//!
//! A flash pass is irreversible, so it only runs for a `FlashRequest` that a
//! `ConfirmGate` approved and whose artifact came from a completed download.
//! The device identity is resolved again right before acting, the backend is
//! picked from the resolved model's vendor, and the device is rebooted through
//! the primary protocol only if the backend reported success.

use crate::registry::BackendSet;
use droidflash_core::discovery::Discovery;
use droidflash_core::transfer::Artifact;
use droidflash_core::{Device, DiscoveryError, Vendor, VendorPolicy};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Flash orchestration errors
#[derive(Debug, Error)]
pub enum FlashError {
    /// The request was not approved by a confirmation gate
    #[error("flash not confirmed")]
    NotConfirmed,

    /// The artifact is gone from disk
    #[error("artifact {path} is not accessible: {source}")]
    ArtifactMissing {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The artifact has no content
    #[error("artifact {path} is empty")]
    ArtifactEmpty {
        /// Artifact path
        path: PathBuf,
    },

    /// Another operation holds the device
    #[error("device {id} is busy with another operation")]
    DeviceBusy {
        /// Device id
        id: String,
    },

    /// Re-resolving the device identity failed
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// No backend is available for the device's vendor
    #[error("no flashing backend available for {vendor} devices")]
    NoBackend {
        /// Classified vendor
        vendor: Vendor,
    },

    /// The backend ran and failed; the device was not rebooted
    #[error("flash backend '{backend}' failed: {detail}")]
    Backend {
        /// Backend name
        backend: String,
        /// Failure detail
        detail: String,
    },
}

/// Synchronous yes/no decision taken before a flash
pub trait ConfirmGate {
    /// Return `true` to allow flashing `request`
    fn confirm(&mut self, request: &FlashRequest) -> bool;
}

impl<F: FnMut(&FlashRequest) -> bool> ConfirmGate for F {
    fn confirm(&mut self, request: &FlashRequest) -> bool {
        self(request)
    }
}

/// One intended flash of an artifact onto a device
#[derive(Debug, Clone)]
pub struct FlashRequest {
    device: Device,
    artifact: Artifact,
    confirmed: bool,
}

impl FlashRequest {
    /// Create an unconfirmed request
    pub fn new(device: Device, artifact: Artifact) -> Self {
        Self {
            device,
            artifact,
            confirmed: false,
        }
    }

    /// Ask `gate` for approval; the answer replaces any previous one
    pub fn confirm_with(mut self, gate: &mut dyn ConfirmGate) -> Self {
        self.confirmed = gate.confirm(&self);
        log::debug!(
            "flash of {} onto {} {}",
            self.artifact.path().display(),
            self.device.id,
            if self.confirmed { "confirmed" } else { "declined" }
        );
        self
    }

    /// Target device as known when the request was created
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Image to write
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Whether a gate approved the request
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

/// Result of a successful flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashOutcome {
    /// Backend that wrote the image
    pub backend: String,
    /// Vendor the device was classified as
    pub vendor: Vendor,
    /// Device identity resolved right before flashing
    pub device: Device,
    /// Whether the post-flash reboot command succeeded
    pub rebooted: bool,
}

/// Selects a backend and runs a confirmed flash
pub struct FlashOrchestrator {
    discovery: Discovery,
    policy: VendorPolicy,
    backends: BackendSet,
}

impl FlashOrchestrator {
    /// Create an orchestrator
    ///
    /// `discovery` also provides the control tools and the device lock
    /// registry; share it with other components that touch devices.
    pub fn new(discovery: Discovery, policy: VendorPolicy, backends: BackendSet) -> Self {
        Self {
            discovery,
            policy,
            backends,
        }
    }

    /// The discovery service used for re-resolution
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Flash `request.artifact` onto `request.device`
    ///
    /// Unconfirmed requests are rejected before anything else happens.
    pub fn flash(&self, request: FlashRequest) -> Result<FlashOutcome, FlashError> {
        if !request.confirmed {
            log::warn!("Refusing unconfirmed flash of device {}", request.device.id);
            return Err(FlashError::NotConfirmed);
        }

        check_artifact(&request.artifact)?;

        let id = &request.device.id;
        let guard = self
            .discovery
            .locks()
            .try_acquire(id)
            .ok_or_else(|| FlashError::DeviceBusy { id: id.clone() })?;

        // Identity may have changed since the artifact was chosen
        let device = self.discovery.resolve_details_held(&guard)?;
        if device.model != request.device.model {
            log::warn!(
                "Device {} now reports model '{}' (was '{}')",
                id,
                device.model,
                request.device.model
            );
        }

        let vendor = self.policy.classify(&device.model);
        let backend = self
            .backends
            .get(vendor)
            .ok_or(FlashError::NoBackend { vendor })?;

        log::info!(
            "Flashing {} onto {} using backend '{}' ({} device)",
            request.artifact.path().display(),
            device,
            backend.name(),
            vendor
        );

        backend
            .flash(&device.id, request.artifact.path())
            .map_err(|e| {
                log::error!("Backend '{}' failed: {}", backend.name(), e);
                FlashError::Backend {
                    backend: backend.name().to_string(),
                    detail: e.to_string(),
                }
            })?;

        log::info!("Flash complete, rebooting {}", device.id);
        let rebooted = self.reboot(&device.id);

        Ok(FlashOutcome {
            backend: backend.name().to_string(),
            vendor,
            device,
            rebooted,
        })
    }

    fn reboot(&self, id: &str) -> bool {
        match self.discovery.tools().primary_for(id, &["reboot"]) {
            Ok(output) if output.success => true,
            Ok(output) => {
                log::warn!("Reboot of {} failed: {}", id, output.detail());
                false
            }
            Err(e) => {
                log::warn!("Reboot of {} failed: {}", id, e);
                false
            }
        }
    }
}

fn check_artifact(artifact: &Artifact) -> Result<(), FlashError> {
    let path = artifact.path();
    let metadata = fs::metadata(path).map_err(|source| FlashError::ArtifactMissing {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.len() == 0 {
        return Err(FlashError::ArtifactEmpty {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
