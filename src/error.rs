//! Unified error type for the fan controller firmware.
//!
//! Each subsystem keeps its own small error enum next to the code that
//! produces it; this module folds them into a single [`Error`] so the
//! runtime loops can log and propagate failures uniformly.  All variants
//! are `Copy`.

use core::fmt;

use crate::app::ports::{ConfigError, SlotError, StorageError};
use crate::drivers::hw_init::HwInitError;
use crate::drivers::ina219::MonitorError;
use crate::power::PowerError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Key-value storage rejected a read or write.
    Storage(StorageError),
    /// Board configuration could not be loaded or failed validation.
    Config(ConfigError),
    /// Power tier request was refused.
    Power(PowerError),
    /// INA219 bus transaction failed.
    Monitor(MonitorError),
    /// Firmware slot operation failed.
    Slot(SlotError),
    /// Peripheral initialisation failed.
    Init(HwInitError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Power(e) => write!(f, "power: {e}"),
            Self::Monitor(e) => write!(f, "monitor: {e}"),
            Self::Slot(e) => write!(f, "slot: {e}"),
            Self::Init(e) => write!(f, "init: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<PowerError> for Error {
    fn from(e: PowerError) -> Self {
        Self::Power(e)
    }
}

impl From<MonitorError> for Error {
    fn from(e: MonitorError) -> Self {
        Self::Monitor(e)
    }
}

impl From<SlotError> for Error {
    fn from(e: SlotError) -> Self {
        Self::Slot(e)
    }
}

impl From<HwInitError> for Error {
    fn from(e: HwInitError) -> Self {
        Self::Init(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
