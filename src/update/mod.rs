//! Firmware update over a byte-stream link.
//!
//! A peer opens a session with a one-line ASCII command and then streams
//! the raw image.  The session is transport-agnostic: the radio adapter
//! feeds it inbound chunks and implements [`UpdateTransport`] for the
//! replies.
//!
//! [`UpdateTransport`]: crate::app::ports::UpdateTransport

pub mod command;
pub mod session;

pub use command::{Command, Response};
pub use session::{SessionState, UpdateSession};

/// Staging ring between the link callback and the flash writer.
pub const RING_CAPACITY: usize = 512;

/// Largest single write handed to the firmware store.
pub const WRITE_CHUNK: usize = 512;
