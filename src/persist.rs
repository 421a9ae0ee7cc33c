//! Debounced persistence.
//!
//! Settings that change under rapid user input (fan duty, power tier) are
//! written only after a quiescence window: every change marks the value
//! dirty and restarts a countdown, and the owning task's tick advances the
//! countdown.  Reaching the threshold writes the value exactly once.
//!
//! A failed write keeps the value dirty and restarts the countdown, so the
//! write is retried after another full window instead of hammering flash.

use heapless::Vec;
use log::{info, warn};

use crate::app::ports::StoragePort;

/// NVS namespace for persisted settings.
pub const NAMESPACE: &str = "fanctl";

/// Largest encoded record.
pub const MAX_RECORD: usize = 8;

/// A value with a fixed little-endian storage record.
pub trait Persisted: Copy + PartialEq {
    /// NVS key (at most 15 bytes).
    const KEY: &'static str;

    fn encode(&self) -> Vec<u8, MAX_RECORD>;

    /// `None` when the record is too short to hold the value.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

/// Read `T` from storage, or `None` if the key is absent or unreadable.
pub fn load<T: Persisted>(storage: &impl StoragePort) -> Option<T> {
    let mut buf = [0u8; MAX_RECORD];
    let len = storage.read(NAMESPACE, T::KEY, &mut buf).ok()?;
    T::decode(&buf[..len])
}

pub struct Debounced<T: Persisted> {
    value: T,
    dirty: bool,
    countdown: u16,
    threshold: u16,
}

impl<T: Persisted> Debounced<T> {
    /// A clean value, as if just loaded.
    pub fn new(value: T, threshold: u16) -> Self {
        Self {
            value,
            dirty: false,
            countdown: 0,
            threshold,
        }
    }

    /// Load the stored value, falling back to `default` on first boot.
    pub fn load_or(storage: &impl StoragePort, default: T, threshold: u16) -> Self {
        Self::new(load(storage).unwrap_or(default), threshold)
    }

    pub fn get(&self) -> T {
        self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Ticks elapsed since the last change while dirty.
    pub fn countdown(&self) -> u16 {
        self.countdown
    }

    /// Replace the value.  Only an actual change marks dirty and restarts
    /// the countdown; returns whether it changed.
    pub fn update(&mut self, value: T) -> bool {
        if value == self.value {
            return false;
        }
        self.value = value;
        self.dirty = true;
        self.countdown = 0;
        true
    }

    /// Advance the quiescence countdown.  Returns `true` if a write happened.
    pub fn tick(&mut self, storage: &mut impl StoragePort) -> bool {
        if !self.dirty {
            return false;
        }
        self.countdown = self.countdown.saturating_add(1);
        if self.countdown < self.threshold {
            return false;
        }
        self.write(storage)
    }

    /// Write now if dirty (before reset, sleep, or a confirmed negotiation).
    pub fn flush(&mut self, storage: &mut impl StoragePort) -> bool {
        if !self.dirty {
            return false;
        }
        self.write(storage)
    }

    /// Replace the value and write it immediately unless storage already
    /// holds it.
    pub fn commit(&mut self, value: T, storage: &mut impl StoragePort) -> bool {
        self.update(value);
        if !self.dirty && load::<T>(storage) == Some(value) {
            return false;
        }
        self.write(storage)
    }

    fn write(&mut self, storage: &mut impl StoragePort) -> bool {
        self.countdown = 0;
        match storage.write(NAMESPACE, T::KEY, &self.value.encode()) {
            Ok(()) => {
                self.dirty = false;
                info!("persist: {} saved", T::KEY);
                true
            }
            Err(e) => {
                warn!("persist: {} write failed ({}), retrying after next window", T::KEY, e);
                false
            }
        }
    }
}
