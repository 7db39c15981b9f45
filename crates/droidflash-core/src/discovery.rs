//! Device enumeration and identity resolution
//!
//! Devices are listed through the primary protocol. Details (model and OS
//! version) are read through the primary protocol first; if either value
//! comes back empty the fallback protocol's variable query is tried. Per
//! device the resolution runs through these states:
//!
//! ```text
//! Unqueried -> PrimaryTried -> Resolved(Primary)
//!                           -> FallbackTried -> Resolved(Fallback)
//!                                            -> Unresolved
//! ```

use crate::config::DiscoveryConfig;
use crate::device::{Device, Protocol};
use crate::error::DiscoveryError;
use crate::lock::{DeviceGuard, DeviceLocks};
use crate::tool::{ControlTools, ToolOutput};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One line of the primary protocol's device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDevice {
    /// Device serial
    pub id: String,
    /// Connection state, e.g. "device", "unauthorized", "offline"
    pub state: String,
}

/// Parse the output of the device listing command
///
/// Header lines, daemon notices and blank lines are ignored. Each remaining
/// line is `<serial> <state> [extra fields...]`.
pub fn parse_device_listing(output: &str) -> Vec<ListedDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            let state = fields.next()?;
            Some(ListedDevice {
                id: id.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Extract a variable from the fallback tool's `getvar` output
///
/// The tool prints `<name>: <value>` on stderr, sometimes prefixed with
/// `(bootloader) `, followed by a timing line.
pub fn parse_getvar(output: &ToolOutput, name: &str) -> Option<String> {
    output
        .stderr
        .lines()
        .chain(output.stdout.lines())
        .map(|line| line.trim().trim_start_matches("(bootloader)").trim())
        .filter_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Unqueried,
    PrimaryTried,
    FallbackTried,
    Resolved(Protocol),
    Unresolved,
}

/// Device discovery over the control tools
///
/// Clones share the device lock registry.
#[derive(Clone)]
pub struct Discovery {
    tools: ControlTools,
    config: DiscoveryConfig,
    locks: Arc<DeviceLocks>,
}

impl Discovery {
    /// Create a discovery service with its own lock registry
    pub fn new(tools: ControlTools, config: DiscoveryConfig) -> Self {
        Self::with_locks(tools, config, DeviceLocks::new())
    }

    /// Create a discovery service sharing a lock registry with other components
    pub fn with_locks(tools: ControlTools, config: DiscoveryConfig, locks: Arc<DeviceLocks>) -> Self {
        Self {
            tools,
            config,
            locks,
        }
    }

    /// The shared lock registry
    pub fn locks(&self) -> &Arc<DeviceLocks> {
        &self.locks
    }

    /// The control tools this service queries through
    pub fn tools(&self) -> &ControlTools {
        &self.tools
    }

    fn is_ready(&self, state: &str) -> bool {
        self.config.ready_states.iter().any(|s| s == state)
    }

    /// List ids of connected devices in a ready state
    ///
    /// Devices reported as unauthorized, offline or in any other state not
    /// listed in `ready_states` are left out.
    pub fn list_devices(&self) -> Result<Vec<String>, DiscoveryError> {
        let output = self.tools.primary(&["devices"])?;
        if !output.success {
            return Err(DiscoveryError::ListingFailed(output.detail()));
        }

        let mut ready = Vec::new();
        for entry in parse_device_listing(&output.stdout) {
            if self.is_ready(&entry.state) {
                ready.push(entry.id);
            } else {
                log::info!("Skipping device {} in state '{}'", entry.id, entry.state);
            }
        }

        if ready.is_empty() {
            return Err(DiscoveryError::NoDeviceFound);
        }

        log::debug!("Ready devices: {}", ready.join(", "));
        Ok(ready)
    }

    /// Resolve model and OS version of device `id`
    ///
    /// Waits for any other operation on the same device to finish first.
    pub fn resolve_details(&self, id: &str) -> Result<Device, DiscoveryError> {
        let guard = self.locks.acquire(id);
        self.resolve_details_held(&guard)
    }

    /// Resolve details of a device the caller already holds the lock for
    pub fn resolve_details_held(&self, guard: &DeviceGuard) -> Result<Device, DiscoveryError> {
        let id = guard.id();
        let mut details = None;
        let mut state = Resolution::Unqueried;

        loop {
            let next = match state {
                Resolution::Unqueried => {
                    details = self.query_primary(id);
                    match details {
                        Some(_) => Resolution::Resolved(Protocol::Primary),
                        None => Resolution::PrimaryTried,
                    }
                }
                Resolution::PrimaryTried => {
                    details = self.query_fallback(id);
                    match details {
                        Some(_) => Resolution::Resolved(Protocol::Fallback),
                        None => Resolution::FallbackTried,
                    }
                }
                Resolution::FallbackTried => Resolution::Unresolved,
                Resolution::Resolved(protocol) => {
                    let (model, os_version) = details.take().unwrap_or_default();
                    let device = Device {
                        id: id.to_string(),
                        protocol,
                        model,
                        os_version,
                    };
                    log::info!("Resolved {}", device);
                    return Ok(device);
                }
                Resolution::Unresolved => {
                    log::warn!("Could not resolve details of device {}", id);
                    return Err(DiscoveryError::DetailsUnavailable { id: id.to_string() });
                }
            };
            log::debug!("device {}: {:?} -> {:?}", id, state, next);
            state = next;
        }
    }

    fn query_primary(&self, id: &str) -> Option<(String, String)> {
        let model = self.getprop(id, &self.config.model_property)?;
        let version = self.getprop(id, &self.config.version_property)?;
        Some((model, version))
    }

    fn getprop(&self, id: &str, key: &str) -> Option<String> {
        match self.tools.primary_for(id, &["shell", "getprop", key]) {
            Ok(output) => output.value().map(str::to_string),
            Err(e) => {
                log::warn!("Property query {} on {} failed: {}", key, id, e);
                None
            }
        }
    }

    fn query_fallback(&self, id: &str) -> Option<(String, String)> {
        let model = self.getvar(id, &self.config.fallback_model_var)?;
        let version = self.getvar(id, &self.config.fallback_version_var)?;
        Some((model, version))
    }

    fn getvar(&self, id: &str, name: &str) -> Option<String> {
        match self.tools.fallback_for(id, &["getvar", name]) {
            Ok(output) if output.success => parse_getvar(&output, name),
            Ok(output) => {
                log::debug!("getvar {} on {} failed: {}", name, id, output.detail());
                None
            }
            Err(e) => {
                log::warn!("Variable query {} on {} failed: {}", name, id, e);
                None
            }
        }
    }

    /// Enumerate devices and bring `table` up to date
    ///
    /// Devices that are no longer listed are dropped. Every listed device is
    /// resolved again; a failed resolution keeps whatever details the device
    /// already had so a resolved protocol is never downgraded.
    pub fn refresh(&self, table: &mut DeviceTable) -> Result<(), DiscoveryError> {
        let ids = match self.list_devices() {
            Ok(ids) => ids,
            Err(DiscoveryError::NoDeviceFound) => {
                table.reconcile(&[]);
                return Err(DiscoveryError::NoDeviceFound);
            }
            Err(e) => return Err(e),
        };

        table.reconcile(&ids);

        for id in &ids {
            match self.resolve_details(id) {
                Ok(device) => table.update(device),
                Err(DiscoveryError::DetailsUnavailable { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Devices seen by the most recent enumeration, ordered by id
#[derive(Debug, Clone, Default)]
pub struct DeviceTable {
    devices: BTreeMap<String, Device>,
}

impl DeviceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep exactly the listed ids; new ones start unresolved
    pub fn reconcile(&mut self, listed: &[String]) {
        self.devices.retain(|id, _| {
            let keep = listed.contains(id);
            if !keep {
                log::info!("Device {} disconnected", id);
            }
            keep
        });
        for id in listed {
            self.devices
                .entry(id.clone())
                .or_insert_with(|| Device::unresolved(id.clone()));
        }
    }

    /// Store freshly resolved details for a listed device
    ///
    /// Devices that are not in the table (not listed) are ignored, as are
    /// unresolved values.
    pub fn update(&mut self, device: Device) {
        if !device.is_resolved() {
            return;
        }
        if let Some(slot) = self.devices.get_mut(&device.id) {
            *slot = device;
        }
    }

    /// Look up a device by id
    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// All devices, ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is listed
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
