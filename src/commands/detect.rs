//! Detect command implementation

use super::{require_tools, Session};
use droidflash_core::discovery::DeviceTable;
use droidflash_core::Device;

/// Run the detect command
pub fn run_detect(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    require_tools(session)?;

    let mut table = DeviceTable::new();
    session.discovery.refresh(&mut table)?;

    let policy = session.policy();

    println!(
        "{:<20} {:<10} {:<20} {:<12} {:<8}",
        "Device", "Protocol", "Model", "Version", "Vendor"
    );
    println!("{}", "-".repeat(74));

    for device in table.iter() {
        let vendor = if device.is_resolved() {
            policy.classify(&device.model).to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:<20} {:<10} {:<20} {:<12} {:<8}",
            device.id,
            device.protocol,
            or_dash(&device.model),
            or_dash(&device.os_version),
            vendor
        );
    }

    let unresolved: Vec<&Device> = table.iter().filter(|d| !d.is_resolved()).collect();
    if !unresolved.is_empty() {
        println!();
        println!(
            "{} device(s) did not answer identity queries; check authorization on the device",
            unresolved.len()
        );
    }

    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
