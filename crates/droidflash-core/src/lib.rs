//! droidflash-core - Core library for mobile device provisioning
//!
//! This crate contains everything droidflash needs short of actually writing
//! an image to a device:
//!
//! - Invoking the two external control tools (`tool`)
//! - Enumerating devices and resolving their identity (`discovery`)
//! - Looking up compatible firmware in a remote catalog (`catalog`)
//! - Downloading a firmware artifact with progress and cancellation
//!   (`transfer`)
//! - Classifying devices by vendor and the `FlashBackend` trait that vendor
//!   specific flashing tools implement (`backend`)
//!
//! The flash orchestration itself lives in `droidflash-flash`, which builds on
//! the types exported here.
//!
//! # Example
//!
//! ```ignore
//! use droidflash_core::{config::Config, discovery::Discovery, tool::ControlTools};
//!
//! let config = Config::default();
//! let tools = ControlTools::system(&config.tools);
//! tools.check()?;
//!
//! let discovery = Discovery::new(tools, config.discovery.clone());
//! for id in discovery.list_devices()? {
//!     let device = discovery.resolve_details(&id)?;
//!     println!("{}: {} (Android {})", device.id, device.model, device.os_version);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod lock;
pub mod tool;
pub mod transfer;

pub use backend::{FlashBackend, Vendor, VendorPolicy};
pub use device::{Device, Protocol};
pub use error::{
    BackendError, CatalogError, CommandError, DiscoveryError, MissingTool, ToolMissing,
    TransferError,
};
