//! List command implementation

use droidflash_core::config::Config;
use droidflash_core::VendorPolicy;
use droidflash_flash::{available_backends, BACKEND_TABLE};

/// List compiled-in backends, the vendor assignment and classification rules
pub fn list_backends(config: &Config) {
    println!("Available backends:");
    println!();
    let backends = available_backends();
    if backends.is_empty() {
        println!("  (none; rebuild with --features sideload,odin)");
    }
    for backend in &backends {
        println!("  {:<10} - {}", backend.name, backend.description);
    }

    println!();
    println!("Vendor assignment:");
    println!();
    for (vendor, name) in BACKEND_TABLE {
        let compiled = backends.iter().any(|b| b.name == *name);
        println!(
            "  {:<10} -> {}{}",
            vendor.to_string(),
            name,
            if compiled { "" } else { " (not compiled in)" }
        );
    }

    println!();
    println!("Vendor rules (first match wins, otherwise generic):");
    println!();
    let policy = VendorPolicy::new(config.vendors.clone());
    for rule in policy.rules() {
        let mode = format!("{:?}", rule.mode).to_lowercase();
        println!("  {:<12} {:<9} -> {}", rule.marker, mode, rule.vendor);
    }
}
