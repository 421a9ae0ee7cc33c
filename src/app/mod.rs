//! Application core: domain orchestration, zero direct I/O.
//!
//! Ties the fan controller, power negotiator, status screen and update
//! session together.  All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
