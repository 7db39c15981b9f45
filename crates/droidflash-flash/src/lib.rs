//! High-level flash orchestration
//!
//! This crate turns a downloaded firmware artifact and a device identity into
//! a flashed, rebooted device. It hides the individual flashing tools behind
//! the `FlashBackend` trait from `droidflash-core`; the CLI only deals with
//! `FlashOrchestrator` and `BackendSet`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CLI (bin/droidflash)                   │
//! │  - Renders devices, firmware lists and progress             │
//! │  - Owns the confirmation prompt                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  droidflash-flash (this crate)              │
//! │  - FlashOrchestrator: confirm, re-resolve, select, reboot   │
//! │  - BackendSet / BACKEND_TABLE: vendor -> backend            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │    droidflash-core       │   │  Backend crates          │
//! │  - Discovery, catalog    │   │  - sideload, odin, dummy │
//! │  - Transfers, locks      │   │  - Implement             │
//! │  - FlashBackend trait    │   │    FlashBackend          │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use droidflash_flash::{BackendSet, FlashOrchestrator, FlashRequest};
//!
//! let backends = BackendSet::from_config(&config, &tools)?;
//! let orchestrator = FlashOrchestrator::new(discovery, policy, backends);
//!
//! let request = FlashRequest::new(device, artifact)
//!     .confirm_with(&mut |req: &FlashRequest| ask_user(req));
//! let outcome = orchestrator.flash(request)?;
//! ```

mod orchestrator;
mod registry;

pub use orchestrator::{ConfirmGate, FlashError, FlashOrchestrator, FlashOutcome, FlashRequest};
pub use registry::{
    available_backends, backend_names_short, open_backend, BackendInfo, BackendSet, BACKEND_TABLE,
};
