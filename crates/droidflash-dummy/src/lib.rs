//! droidflash-dummy - Simulated devices for testing
//!
//! This crate provides a `CommandRunner` that answers the control tools'
//! command lines for a set of in-memory devices, and a `FlashBackend` that
//! records what it was asked to flash. Together they let the whole pipeline
//! run without a phone attached.

use droidflash_core::tool::{CommandRunner, ToolOutput};
use droidflash_core::{BackendError, CommandError, FlashBackend};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One emulated device
#[derive(Debug, Clone)]
pub struct DummyDevice {
    /// Serial number
    pub id: String,
    /// State shown in the device listing ("device", "recovery", "unauthorized", ...)
    pub state: String,
    /// Properties readable through the primary protocol
    pub properties: BTreeMap<String, String>,
    /// Variables readable through the fallback protocol
    pub variables: BTreeMap<String, String>,
    /// Error printed by a sideload attempt, if it should fail
    pub sideload_error: Option<String>,
}

impl DummyDevice {
    /// A booted device answering property queries
    pub fn android(id: &str, model: &str, version: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("ro.product.model".to_string(), model.to_string());
        properties.insert("ro.build.version.release".to_string(), version.to_string());
        Self {
            id: id.to_string(),
            state: "device".to_string(),
            properties,
            variables: BTreeMap::new(),
            sideload_error: None,
        }
    }

    /// A device only reachable through the bootloader protocol
    pub fn bootloader(id: &str, product: &str, version: &str) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("product".to_string(), product.to_string());
        variables.insert("version-bootloader".to_string(), version.to_string());
        Self {
            id: id.to_string(),
            state: "sideload".to_string(),
            properties: BTreeMap::new(),
            variables,
            sideload_error: None,
        }
    }

    /// Change the listing state
    pub fn with_state(mut self, state: &str) -> Self {
        self.state = state.to_string();
        self
    }

    /// Make sideload attempts fail with `error`
    pub fn with_sideload_error(mut self, error: &str) -> Self {
        self.sideload_error = Some(error.to_string());
        self
    }
}

/// Emulated control tools
///
/// Every invocation is recorded as a single space-joined line.
pub struct DummyTools {
    primary: String,
    fallback: String,
    devices: Vec<DummyDevice>,
    missing: Vec<String>,
    failing: BTreeMap<String, String>,
    fail_reboot: bool,
    calls: Mutex<Vec<String>>,
}

impl DummyTools {
    /// Emulate `adb` and `fastboot` for `devices`
    pub fn new(devices: Vec<DummyDevice>) -> Self {
        Self {
            primary: "adb".to_string(),
            fallback: "fastboot".to_string(),
            devices,
            missing: Vec::new(),
            failing: BTreeMap::new(),
            fail_reboot: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A Samsung phone and a generic phone, both booted
    pub fn simulated() -> Self {
        Self::new(vec![
            DummyDevice::android("R58N123ABCD", "SM-G991B", "14"),
            DummyDevice::android("0A1B2C3D4E5F", "Pixel 7", "15"),
        ])
    }

    /// Use different program names for the two protocols
    pub fn with_programs(mut self, primary: &str, fallback: &str) -> Self {
        self.primary = primary.to_string();
        self.fallback = fallback.to_string();
        self
    }

    /// Pretend `program` is not installed
    pub fn without(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Make any invocation of `program` (other than the control tools) fail
    pub fn failing(mut self, program: &str, stderr: &str) -> Self {
        self.failing.insert(program.to_string(), stderr.to_string());
        self
    }

    /// Make reboot commands fail
    pub fn with_failing_reboot(mut self) -> Self {
        self.fail_reboot = true;
        self
    }

    /// Recorded invocations, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded invocations starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn device(&self, id: &str) -> Option<&DummyDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    fn primary_command(&self, args: &[&str]) -> ToolOutput {
        match args {
            ["version"] => ok("Android Debug Bridge version 1.0.41\n"),
            ["devices"] => {
                let mut listing = String::from("List of devices attached\n");
                for device in &self.devices {
                    listing.push_str(&format!("{}\t{}\n", device.id, device.state));
                }
                ok(&listing)
            }
            ["-s", id, rest @ ..] => match self.device(id) {
                Some(device) => self.primary_device_command(device, rest),
                None => failed(&format!("error: device '{}' not found\n", id)),
            },
            _ => failed("adb: usage: unknown command\n"),
        }
    }

    fn primary_device_command(&self, device: &DummyDevice, args: &[&str]) -> ToolOutput {
        match args {
            ["shell", "getprop", key] => match device.properties.get(*key) {
                Some(value) => ok(&format!("{}\n", value)),
                // Devices without a shell (recovery, sideload) have no properties
                None if device.properties.is_empty() => failed("error: closed\n"),
                None => ok("\n"),
            },
            ["reboot", ..] if self.fail_reboot => failed("error: closed\n"),
            ["reboot", ..] => ok(""),
            ["wait-for-sideload"] => ok(""),
            ["sideload", _path] => match &device.sideload_error {
                Some(error) => failed(error),
                None => ok("Total xfer: 1.00x\n"),
            },
            _ => failed("adb: usage: unknown command\n"),
        }
    }

    fn fallback_command(&self, args: &[&str]) -> ToolOutput {
        match args {
            ["--version"] => ok("fastboot version 35.0.0\n"),
            ["-s", id, "getvar", name] => {
                let value = self.device(id).and_then(|d| d.variables.get(*name));
                match value {
                    Some(value) => ToolOutput {
                        success: true,
                        stdout: String::new(),
                        stderr: format!("{}: {}\nFinished. Total time: 0.001s\n", name, value),
                    },
                    None => failed(&format!(
                        "getvar:{} FAILED (remote: 'unknown variable')\n",
                        name
                    )),
                }
            }
            _ => failed("fastboot: usage: unknown command\n"),
        }
    }
}

impl CommandRunner for DummyTools {
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput, CommandError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!("dummy: {}", line);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line);
        }

        if self.missing.iter().any(|m| m == program) {
            return Err(CommandError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        }

        if program == self.primary {
            Ok(self.primary_command(args))
        } else if program == self.fallback {
            Ok(self.fallback_command(args))
        } else if let Some(stderr) = self.failing.get(program) {
            Ok(failed(stderr))
        } else {
            Ok(ok(""))
        }
    }
}

fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        success: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failed(stderr: &str) -> ToolOutput {
    ToolOutput {
        success: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// A flash call seen by a `DummyBackend`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashCall {
    /// Target device
    pub device_id: String,
    /// Artifact path
    pub artifact: PathBuf,
}

/// Shared view of a `DummyBackend`'s calls that outlives moving the backend
#[derive(Debug, Clone, Default)]
pub struct FlashLog(Arc<Mutex<Vec<FlashCall>>>);

impl FlashLog {
    /// Calls so far, oldest first
    pub fn calls(&self) -> Vec<FlashCall> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether the backend was never invoked
    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }
}

/// Backend that records requests instead of flashing
pub struct DummyBackend {
    name: String,
    failure: Option<String>,
    log: FlashLog,
}

impl DummyBackend {
    /// A backend that always succeeds
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failure: None,
            log: FlashLog::default(),
        }
    }

    /// A backend that always fails with `detail`
    pub fn failing(name: &str, detail: &str) -> Self {
        Self {
            failure: Some(detail.to_string()),
            ..Self::new(name)
        }
    }

    /// Handle to the recorded calls
    pub fn log(&self) -> FlashLog {
        self.log.clone()
    }
}

impl FlashBackend for DummyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn flash(&self, device_id: &str, artifact: &Path) -> Result<(), BackendError> {
        log::info!(
            "dummy: flashing {} onto {}",
            artifact.display(),
            device_id
        );
        if let Ok(mut calls) = self.log.0.lock() {
            calls.push(FlashCall {
                device_id: device_id.to_string(),
                artifact: artifact.to_path_buf(),
            });
        }

        match &self.failure {
            Some(detail) => Err(BackendError::Failed {
                program: self.name.clone(),
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing() {
        let tools = DummyTools::new(vec![
            DummyDevice::android("A1", "SM-G991B", "14"),
            DummyDevice::android("B2", "Pixel 7", "15").with_state("unauthorized"),
        ]);
        let out = tools.run("adb", &["devices"]).unwrap();
        assert!(out.success);
        assert_eq!(
            out.stdout,
            "List of devices attached\nA1\tdevice\nB2\tunauthorized\n"
        );
    }

    #[test]
    fn test_getprop() {
        let tools = DummyTools::new(vec![DummyDevice::android("A1", "SM-G991B", "14")]);
        let out = tools
            .run("adb", &["-s", "A1", "shell", "getprop", "ro.product.model"])
            .unwrap();
        assert_eq!(out.value(), Some("SM-G991B"));

        let out = tools
            .run("adb", &["-s", "ZZ", "shell", "getprop", "ro.product.model"])
            .unwrap();
        assert!(!out.success);
    }

    #[test]
    fn test_getvar_on_stderr() {
        let tools = DummyTools::new(vec![DummyDevice::bootloader("F1", "beyond1", "G973FXXU")]);
        let out = tools
            .run("fastboot", &["-s", "F1", "getvar", "product"])
            .unwrap();
        assert!(out.success);
        assert!(out.stderr.starts_with("product: beyond1"));
    }

    #[test]
    fn test_missing_program() {
        let tools = DummyTools::new(vec![]).without("fastboot");
        assert!(tools.run("fastboot", &["--version"]).is_err());
        assert!(tools.run("adb", &["version"]).is_ok());
        assert_eq!(tools.calls(), vec!["fastboot --version", "adb version"]);
    }

    #[test]
    fn test_failing_external_program() {
        let tools = DummyTools::new(vec![]).failing("odin4", "Fail to open device");
        let out = tools.run("odin4", &["-a", "fw.tar.md5"]).unwrap();
        assert!(!out.success);
        assert_eq!(out.detail(), "Fail to open device");
    }

    #[test]
    fn test_backend_records_calls() {
        let backend = DummyBackend::new("dummy");
        let log = backend.log();
        backend.flash("A1", Path::new("/tmp/fw.zip")).unwrap();
        assert_eq!(
            log.calls(),
            vec![FlashCall {
                device_id: "A1".to_string(),
                artifact: PathBuf::from("/tmp/fw.zip"),
            }]
        );
    }

    #[test]
    fn test_failing_backend() {
        let backend = DummyBackend::failing("dummy", "write error");
        let err = backend.flash("A1", Path::new("fw.zip")).unwrap_err();
        assert!(err.to_string().contains("write error"));
        assert_eq!(backend.log().calls().len(), 1);
    }
}
