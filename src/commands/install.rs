//! Install command implementation
//!
//! detect -> catalog -> select -> download -> confirm -> flash

use super::catalog::{fetch, print_records};
use super::download::download_with_progress;
use super::{choose_device, format_size, require_tools, Session};
use droidflash_core::catalog::FirmwareRecord;
use droidflash_core::transfer::destination_for;
use droidflash_core::Device;
use droidflash_flash::{FlashOrchestrator, FlashRequest};
use std::path::Path;
use url::Url;

/// Run the install command
pub fn run_install(
    session: &Session,
    device: Option<&str>,
    version: Option<&str>,
    file: Option<&Path>,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    require_tools(session)?;

    let id = choose_device(session, device)?;
    let target = session.discovery.resolve_details(&id)?;
    println!("Device: {}", target);

    let (url, destination) = match file {
        Some(file) => {
            let path = file
                .canonicalize()
                .map_err(|e| format!("Cannot open {}: {}", file.display(), e))?;
            let url = Url::from_file_path(&path)
                .map_err(|()| format!("Cannot use {} as a source", path.display()))?;
            let name = path.file_name().ok_or("Image path has no file name")?;
            (url.to_string(), dir.join(name))
        }
        None => {
            let records = fetch(session, &target.model)?;
            if records.is_empty() {
                return Err(format!("No firmware listed for {}", target.model).into());
            }
            let record = choose_record(&records, version)?;
            (record.download_url.clone(), destination_for(dir, record))
        }
    };

    // Starting a transfer removes the destination first
    if same_file(file, &destination) {
        return Err("Output directory must differ from the image's directory".into());
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Cannot create {}: {}", dir.display(), e))?;

    let job = download_with_progress(session, &url, &destination)?;
    let artifact = job
        .artifact()
        .ok_or_else(|| format!("Download ended in state '{}'", job.state()))?;

    let request = FlashRequest::new(target, artifact)
        .confirm_with(&mut |request: &FlashRequest| prompt(request));

    let orchestrator =
        FlashOrchestrator::new(session.discovery.clone(), session.policy(), session.backends()?);
    let outcome = orchestrator.flash(request)?;

    println!(
        "Flashed {} with backend '{}' ({} device)",
        outcome.device, outcome.backend, outcome.vendor
    );
    if outcome.rebooted {
        println!("Device is rebooting");
    } else {
        println!("Reboot failed; restart the device manually");
    }
    Ok(())
}

fn choose_record<'a>(
    records: &'a [FirmwareRecord],
    version: Option<&str>,
) -> Result<&'a FirmwareRecord, Box<dyn std::error::Error>> {
    if let Some(version) = version {
        return records
            .iter()
            .find(|r| r.version.eq_ignore_ascii_case(version))
            .ok_or_else(|| format!("Version {} is not listed", version).into());
    }

    print_records(records);
    let items: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    let selection = dialoguer::Select::new()
        .with_prompt("Firmware to install")
        .items(&items)
        .default(0)
        .interact()
        .map_err(|e| format!("Firmware selection failed: {}", e))?;
    Ok(&records[selection])
}

/// The confirmation gate; an interrupted prompt counts as "no"
fn prompt(request: &FlashRequest) -> bool {
    let device: &Device = request.device();
    let artifact = request.artifact();
    println!();
    println!("About to flash {}", artifact.path().display());
    println!("  size:   {}", format_size(artifact.size()));
    println!("  device: {}", device);
    println!("This overwrites the device's system software and cannot be undone.");

    match dialoguer::Confirm::new()
        .with_prompt("Flash now?")
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Confirmation prompt failed: {}", e);
            false
        }
    }
}

fn same_file(source: Option<&Path>, destination: &Path) -> bool {
    match (source.and_then(|s| s.canonicalize().ok()), destination.canonicalize().ok()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
