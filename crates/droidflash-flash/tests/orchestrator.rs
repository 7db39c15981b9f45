//! Orchestrator tests against simulated devices

use droidflash_core::config::{Config, DiscoveryConfig, ToolsConfig, TransferConfig};
use droidflash_core::discovery::Discovery;
use droidflash_core::tool::ControlTools;
use droidflash_core::transfer::{Artifact, CancelToken, NoProgress, TransferManager};
use droidflash_core::{Device, DiscoveryError, Protocol, Vendor, VendorPolicy};
use droidflash_dummy::{DummyBackend, DummyDevice, DummyTools, FlashLog};
use droidflash_flash::{BackendSet, FlashError, FlashOrchestrator, FlashRequest};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

struct Rig {
    orchestrator: FlashOrchestrator,
    runner: Arc<DummyTools>,
    samsung: FlashLog,
    generic: FlashLog,
}

fn rig(runner: DummyTools, samsung: DummyBackend, generic: DummyBackend) -> Rig {
    let runner = Arc::new(runner);
    let tools = ControlTools::new(runner.clone(), &ToolsConfig::default());
    let discovery = Discovery::new(tools, DiscoveryConfig::default());
    let policy = VendorPolicy::new(Config::default().vendors);
    let (samsung_log, generic_log) = (samsung.log(), generic.log());
    let backends = BackendSet::new()
        .with(Vendor::Samsung, Box::new(samsung))
        .with(Vendor::Generic, Box::new(generic));

    Rig {
        orchestrator: FlashOrchestrator::new(discovery, policy, backends),
        runner,
        samsung: samsung_log,
        generic: generic_log,
    }
}

fn default_rig(devices: Vec<DummyDevice>) -> Rig {
    rig(
        DummyTools::new(devices),
        DummyBackend::new("odin"),
        DummyBackend::new("sideload"),
    )
}

/// Produce an artifact the only way callers can: through a completed transfer
fn artifact(dir: &Path, content: &[u8]) -> Artifact {
    let manager = TransferManager::new(&TransferConfig::default()).unwrap();
    let dest = dir.join("fw.zip");
    let job = manager
        .receive(
            Cursor::new(content.to_vec()),
            Some(content.len() as u64),
            "file:///fw.zip",
            &dest,
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();
    job.artifact().expect("completed job yields an artifact")
}

fn known(id: &str, model: &str) -> Device {
    Device {
        id: id.to_string(),
        protocol: Protocol::Primary,
        model: model.to_string(),
        os_version: "14".to_string(),
    }
}

#[test]
fn test_unconfirmed_request_never_reaches_backend() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("R58", "SM-G991B", "14")]);

    let request = FlashRequest::new(known("R58", "SM-G991B"), artifact(dir.path(), b"image"))
        .confirm_with(&mut |_: &FlashRequest| false);
    assert!(!request.is_confirmed());

    let err = rig.orchestrator.flash(request).unwrap_err();
    assert!(matches!(err, FlashError::NotConfirmed));
    assert!(rig.samsung.is_empty());
    assert!(rig.generic.is_empty());
    assert!(rig.runner.calls().is_empty());
}

#[test]
fn test_samsung_device_uses_samsung_backend() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("R58", "SM-G991B", "14")]);
    let artifact = artifact(dir.path(), b"image");
    let path = artifact.path().to_path_buf();

    let request = FlashRequest::new(known("R58", "SM-G991B"), artifact)
        .confirm_with(&mut |_: &FlashRequest| true);
    let outcome = rig.orchestrator.flash(request).unwrap();

    assert_eq!(outcome.backend, "odin");
    assert_eq!(outcome.vendor, Vendor::Samsung);
    assert!(outcome.rebooted);
    assert_eq!(rig.samsung.calls().len(), 1);
    assert_eq!(rig.samsung.calls()[0].device_id, "R58");
    assert_eq!(rig.samsung.calls()[0].artifact, path);
    assert!(rig.generic.is_empty());
    assert_eq!(rig.runner.count("adb -s R58 reboot"), 1);
}

#[test]
fn test_generic_device_uses_generic_backend() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("P7", "Pixel 7", "15")]);

    let request = FlashRequest::new(known("P7", "Pixel 7"), artifact(dir.path(), b"ota"))
        .confirm_with(&mut |_: &FlashRequest| true);
    let outcome = rig.orchestrator.flash(request).unwrap();

    assert_eq!(outcome.backend, "sideload");
    assert_eq!(outcome.vendor, Vendor::Generic);
    assert!(rig.samsung.is_empty());
    assert_eq!(rig.generic.calls().len(), 1);
}

#[test]
fn test_vendor_follows_re_resolved_model() {
    // The device was a Pixel when the request was built but now reports a
    // Samsung model; routing follows the fresh identity.
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("X1", "SM-A525F", "13")]);

    let request = FlashRequest::new(known("X1", "Pixel 7"), artifact(dir.path(), b"fw"))
        .confirm_with(&mut |_: &FlashRequest| true);
    let outcome = rig.orchestrator.flash(request).unwrap();

    assert_eq!(outcome.vendor, Vendor::Samsung);
    assert_eq!(outcome.device.model, "SM-A525F");
    assert!(rig.generic.is_empty());
}

#[test]
fn test_backend_failure_skips_reboot() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        DummyTools::new(vec![DummyDevice::android("R58", "SM-G991B", "14")]),
        DummyBackend::failing("odin", "Fail to open device"),
        DummyBackend::new("sideload"),
    );

    let request = FlashRequest::new(known("R58", "SM-G991B"), artifact(dir.path(), b"image"))
        .confirm_with(&mut |_: &FlashRequest| true);
    match rig.orchestrator.flash(request) {
        Err(FlashError::Backend { backend, detail }) => {
            assert_eq!(backend, "odin");
            assert!(detail.contains("Fail to open device"));
        }
        other => panic!("expected backend failure, got {:?}", other),
    }
    assert_eq!(rig.runner.count("adb -s R58 reboot"), 0);
}

#[test]
fn test_failed_reboot_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        DummyTools::new(vec![DummyDevice::android("P7", "Pixel 7", "15")]).with_failing_reboot(),
        DummyBackend::new("odin"),
        DummyBackend::new("sideload"),
    );

    let request = FlashRequest::new(known("P7", "Pixel 7"), artifact(dir.path(), b"ota"))
        .confirm_with(&mut |_: &FlashRequest| true);
    let outcome = rig.orchestrator.flash(request).unwrap();
    assert!(!outcome.rebooted);
}

#[test]
fn test_busy_device_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("R58", "SM-G991B", "14")]);
    let _held = rig.orchestrator.discovery().locks().acquire("R58");

    let request = FlashRequest::new(known("R58", "SM-G991B"), artifact(dir.path(), b"image"))
        .confirm_with(&mut |_: &FlashRequest| true);
    match rig.orchestrator.flash(request) {
        Err(FlashError::DeviceBusy { id }) => assert_eq!(id, "R58"),
        other => panic!("expected DeviceBusy, got {:?}", other),
    }
    assert!(rig.samsung.is_empty());
}

#[test]
fn test_lock_released_after_flash() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("P7", "Pixel 7", "15")]);

    let request = FlashRequest::new(known("P7", "Pixel 7"), artifact(dir.path(), b"ota"))
        .confirm_with(&mut |_: &FlashRequest| true);
    rig.orchestrator.flash(request).unwrap();
    assert!(!rig.orchestrator.discovery().locks().is_held("P7"));
}

#[test]
fn test_unresolvable_device() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![]);

    let request = FlashRequest::new(known("GONE", "Pixel 7"), artifact(dir.path(), b"ota"))
        .confirm_with(&mut |_: &FlashRequest| true);
    match rig.orchestrator.flash(request) {
        Err(FlashError::Discovery(DiscoveryError::DetailsUnavailable { id })) => {
            assert_eq!(id, "GONE")
        }
        other => panic!("expected DetailsUnavailable, got {:?}", other),
    }
    assert!(rig.generic.is_empty());
}

#[test]
fn test_missing_backend_for_vendor() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(DummyTools::new(vec![DummyDevice::android(
        "R58", "SM-G991B", "14",
    )]));
    let tools = ControlTools::new(runner, &ToolsConfig::default());
    let orchestrator = FlashOrchestrator::new(
        Discovery::new(tools, DiscoveryConfig::default()),
        VendorPolicy::new(Config::default().vendors),
        BackendSet::new().with(Vendor::Generic, Box::new(DummyBackend::new("sideload"))),
    );

    let request = FlashRequest::new(known("R58", "SM-G991B"), artifact(dir.path(), b"image"))
        .confirm_with(&mut |_: &FlashRequest| true);
    assert!(matches!(
        orchestrator.flash(request),
        Err(FlashError::NoBackend {
            vendor: Vendor::Samsung
        })
    ));
}

#[test]
fn test_deleted_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("P7", "Pixel 7", "15")]);
    let artifact = artifact(dir.path(), b"ota");
    std::fs::remove_file(artifact.path()).unwrap();

    let request =
        FlashRequest::new(known("P7", "Pixel 7"), artifact).confirm_with(&mut |_: &FlashRequest| true);
    assert!(matches!(
        rig.orchestrator.flash(request),
        Err(FlashError::ArtifactMissing { .. })
    ));
    assert!(rig.runner.calls().is_empty());
}

#[test]
fn test_empty_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let rig = default_rig(vec![DummyDevice::android("P7", "Pixel 7", "15")]);

    let request = FlashRequest::new(known("P7", "Pixel 7"), artifact(dir.path(), b""))
        .confirm_with(&mut |_: &FlashRequest| true);
    assert!(matches!(
        rig.orchestrator.flash(request),
        Err(FlashError::ArtifactEmpty { .. })
    ));
}

#[test]
fn test_gate_sees_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut seen = Vec::new();
    let request = FlashRequest::new(known("R58", "SM-G991B"), artifact(dir.path(), b"image"))
        .confirm_with(&mut |req: &FlashRequest| {
            seen.push(req.device().model.clone());
            true
        });
    assert!(request.is_confirmed());
    assert_eq!(seen, vec!["SM-G991B"]);
}
