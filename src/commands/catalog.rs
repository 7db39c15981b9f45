//! Catalog command implementation

use super::{choose_device, require_tools, Session};
use droidflash_core::catalog::{CatalogResolver, FirmwareRecord};

/// Run the catalog command
pub fn run_catalog(
    session: &Session,
    model: Option<&str>,
    device: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = match model {
        Some(model) => model.to_string(),
        None => {
            require_tools(session)?;
            let id = choose_device(session, device)?;
            session.discovery.resolve_details(&id)?.model
        }
    };

    let records = fetch(session, &model)?;
    if records.is_empty() {
        println!("No firmware listed for {}", model);
        return Ok(());
    }

    print_records(&records);
    Ok(())
}

/// Query the catalog for `model`, showing the URL being queried
pub fn fetch(
    session: &Session,
    model: &str,
) -> Result<Vec<FirmwareRecord>, Box<dyn std::error::Error>> {
    let resolver = CatalogResolver::new(session.config.catalog.clone())?;
    println!("Querying {}", resolver.query_url(model)?);
    Ok(resolver.fetch_firmware(model)?)
}

/// Print records as a numbered table
pub fn print_records(records: &[FirmwareRecord]) {
    println!("{:>3}  {:<24} {:<8} URL", "#", "Version", "Region");
    println!("{}", "-".repeat(80));
    for (i, record) in records.iter().enumerate() {
        println!(
            "{:>3}  {:<24} {:<8} {}",
            i + 1,
            record.version,
            record.region,
            record.download_url
        );
    }
}
