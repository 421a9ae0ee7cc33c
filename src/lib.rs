//! FanCtl firmware library.
//!
//! Exposes the fan controller, the USB fast-charge negotiator, the status
//! screen and the firmware update session for integration testing.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module; the simulation halves run on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod context;
pub mod events;
pub mod fan;
pub mod flags;
pub mod persist;
pub mod power;
pub mod ui;
pub mod update;

pub mod error;
pub mod pins;

// Hardware-facing modules; their ESP-IDF halves are cfg-gated inside.
pub mod adapters;
pub mod drivers;
