//! Remote firmware catalog lookup
//!
//! The catalog is an HTML page per device model with a listing table:
//!
//! ```html
//! <table class="firmwares-table">
//!   <tbody>
//!     <tr><td>G991BXXU5CVLL</td><td>DBT</td><td>...</td><td><a href="...">Download</a></td></tr>
//!   </tbody>
//! </table>
//! ```
//!
//! Catalog markup is not a stable contract. By default rows that do not
//! have at least four cells, or whose fourth cell has no link, are skipped;
//! strict mode rejects them instead.

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::time::Duration;
use url::Url;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".firmwares-table tbody tr").expect("valid row selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("valid cell selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("valid link selector"));

/// Minimum number of cells in a usable listing row
const MIN_CELLS: usize = 4;

/// One firmware build offered for a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRecord {
    /// Build version string
    pub version: String,
    /// Region / carrier code
    pub region: String,
    /// Absolute download URL
    pub download_url: String,
}

impl fmt::Display for FirmwareRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.version, self.region)
    }
}

/// How to treat listing rows that do not have the expected shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Skip them
    #[default]
    Lenient,
    /// Fail the whole lookup
    Strict,
}

/// Extract firmware records from catalog markup, in document order
///
/// Relative links are resolved against `base`.
pub fn parse_catalog(
    html: &str,
    base: &Url,
    mode: ParseMode,
) -> Result<Vec<FirmwareRecord>, CatalogError> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for (index, row) in document.select(&ROW_SELECTOR).enumerate() {
        match parse_row(row, base) {
            Ok(record) => records.push(record),
            Err(reason) => match mode {
                ParseMode::Lenient => log::warn!("Skipping catalog row {}: {}", index, reason),
                ParseMode::Strict => return Err(CatalogError::Malformed { row: index, reason }),
            },
        }
    }

    Ok(records)
}

fn parse_row(row: ElementRef<'_>, base: &Url) -> Result<FirmwareRecord, String> {
    let cells: Vec<ElementRef<'_>> = row.select(&CELL_SELECTOR).collect();
    if cells.len() < MIN_CELLS {
        return Err(format!("expected {} cells, found {}", MIN_CELLS, cells.len()));
    }

    let href = cells[3]
        .select(&LINK_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| "download cell has no link".to_string())?;

    let download_url = base
        .join(href.trim())
        .map_err(|e| format!("invalid link '{}': {}", href, e))?;

    Ok(FirmwareRecord {
        version: cell_text(cells[0]),
        region: cell_text(cells[1]),
        download_url: download_url.to_string(),
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Queries the firmware catalog for a device model
pub struct CatalogResolver {
    client: Client,
    config: CatalogConfig,
}

impl CatalogResolver {
    /// Create a resolver with its own HTTP client
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn parse_mode(&self) -> ParseMode {
        if self.config.strict {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        }
    }

    /// The URL queried for `model`
    ///
    /// Spaces in the model name are replaced by the configured separator.
    pub fn query_url(&self, model: &str) -> Result<Url, CatalogError> {
        let normalized = model.trim().replace(' ', &self.config.separator);
        let raw = self.config.url_template.replace("{model}", &normalized);
        Url::parse(&raw).map_err(|e| CatalogError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Fetch the firmware builds the catalog lists for `model`
    ///
    /// An empty list means the catalog has no compatible firmware. Any
    /// response status other than 200 is `CatalogError::Unreachable`.
    pub fn fetch_firmware(&self, model: &str) -> Result<Vec<FirmwareRecord>, CatalogError> {
        let url = self.query_url(model)?;
        log::debug!("Querying firmware catalog: {}", url);

        let unreachable = |reason: String| CatalogError::Unreachable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(unreachable(format!("HTTP {}", status)));
        }

        let body = response.text().map_err(|e| unreachable(e.to_string()))?;
        let records = parse_catalog(&body, &url, self.parse_mode())?;

        if records.is_empty() {
            log::info!("No compatible firmware listed for {}", model);
        } else {
            log::info!("Found {} firmware build(s) for {}", records.len(), model);
        }

        Ok(records)
    }
}
