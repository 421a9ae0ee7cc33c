//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (PWM, DAC/ADC, display, flash slots, radio) implement
//! these traits.  The [`AppService`](super::service::AppService) and the
//! subsystem controllers consume them via generics, so the domain core
//! never touches hardware directly.
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - All port errors are typed; callers must handle every variant explicitly.

use crate::config::BoardConfig;
use crate::ui::TextBox;

// ───────────────────────────────────────────────────────────────
// Actuator port (domain → fan hardware)
// ───────────────────────────────────────────────────────────────

pub trait ActuatorPort {
    /// Fan PWM duty, 0–255.
    fn set_fan_pwm(&mut self, duty: u8);

    /// RGB fan channels (ignored on boards without them).
    fn set_fan_rgb(&mut self, r: u8, g: u8, b: u8);

    /// Enable or disable the tachometer edge interrupt and watchdog timer.
    fn set_tach_enabled(&mut self, enabled: bool);
}

// ───────────────────────────────────────────────────────────────
// Charger port (domain ↔ USB data-line DACs and ADC)
// ───────────────────────────────────────────────────────────────

/// The two analog control outputs of the fast-charge network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    /// DAC1, D+ side.
    Dp,
    /// DAC2, D- side.
    Dm,
}

pub trait ChargerPort {
    /// Program a control output, 8-bit code over a 3.3 V range.
    fn set_line(&mut self, line: ControlLine, code: u8);

    /// Connect or release a control output.
    fn enable_line(&mut self, line: ControlLine, enabled: bool);

    /// Sample the data-line ADC.
    fn sample(&mut self) -> u16;
}

// ───────────────────────────────────────────────────────────────
// Platform port (domain → chip services)
// ───────────────────────────────────────────────────────────────

pub trait PlatformPort {
    /// Free heap, in bytes.
    fn free_heap(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Display port (domain → panel driver)
// ───────────────────────────────────────────────────────────────

pub trait DisplayPort {
    fn set_backlight(&mut self, level: u8);

    fn draw_text_box(&mut self, text_box: &TextBox<'_>);

    fn flush(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (domain ↔ persistent board config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the board configuration.
///
/// Implementations MUST validate values before persisting and reject
/// invalid ranges with [`ConfigError::ValidationFailed`] rather than
/// clamping them.
pub trait ConfigPort {
    /// Returns [`BoardConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<BoardConfig, ConfigError>;

    fn save(&self, config: &BoardConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Best-effort persistent key-value storage.
///
/// Write operations MUST be atomic: no partial writes on power loss.
/// The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Firmware slot port (update session → flash partitions)
// ───────────────────────────────────────────────────────────────

/// An inactive firmware partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Partition subtype (OTA index).
    pub index: u8,
    /// Flash offset.
    pub address: u32,
}

pub trait FirmwareStore {
    /// The slot the next image should be written to, if any.
    fn next_slot(&mut self) -> Option<SlotInfo>;

    /// Open `slot` for a streamed write.
    fn begin(&mut self, slot: SlotInfo) -> Result<(), SlotError>;

    fn write(&mut self, data: &[u8]) -> Result<(), SlotError>;

    /// Close the write and validate the image.
    fn finalize(&mut self) -> Result<(), SlotError>;

    /// Mark the finalized slot as the next boot target.
    fn set_boot_slot(&mut self, slot: SlotInfo) -> Result<(), SlotError>;

    /// Drop any open write.  Safe to call when nothing is open.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Update transport port (update session → radio link)
// ───────────────────────────────────────────────────────────────

pub trait UpdateTransport {
    /// Send one of the fixed status lines (`OK`, `FAIL`, ...).
    fn send_response(&mut self, text: &str);

    /// Send a free-form reply.
    fn send_data(&mut self, data: &[u8]);

    /// Close the connection carrying the session.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Update host port (update session → the rest of the system)
// ───────────────────────────────────────────────────────────────

/// What the update session needs from the system around it.
pub trait UpdateHost {
    /// Pause fan, display and key scanning for the transfer.
    fn suspend(&mut self);

    /// Undo [`suspend`](Self::suspend).
    fn resume(&mut self);

    /// Release the charger control lines ahead of a reset.
    fn release_power(&mut self);

    /// Free heap, in bytes.
    fn free_memory(&self) -> u32;

    fn firmware_version(&self) -> &str;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
}

/// Errors from [`FirmwareStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    NoSlot,
    BeginFailed,
    WriteFailed,
    FinalizeFailed,
    BootSetFailed,
    /// Write or finalize without an open slot.
    NotOpen,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for SlotError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSlot => write!(f, "no inactive firmware slot"),
            Self::BeginFailed => write!(f, "slot begin failed"),
            Self::WriteFailed => write!(f, "slot write failed"),
            Self::FinalizeFailed => write!(f, "image validation failed"),
            Self::BootSetFailed => write!(f, "set boot slot failed"),
            Self::NotOpen => write!(f, "no slot open"),
        }
    }
}
