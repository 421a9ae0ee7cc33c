//! Input power selection.
//!
//! The board can draw from a plain USB port, a dedicated charger, or a
//! Quick Charge capable supply that accepts a voltage request over the
//! data lines.  [`negotiator`] classifies the supply at boot and drives
//! the data-line DACs for the requested tier afterwards.

pub mod negotiator;

use core::fmt;

use heapless::Vec;

use crate::persist::{MAX_RECORD, Persisted};

pub use negotiator::PowerNegotiator;

/// Supply classification, ordered by negotiation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum PowerTier {
    /// Barrel jack or unknown source.
    DcIn = 0,
    StandardPort = 1,
    DedicatedCharger = 2,
    Qc5V = 3,
    Qc9V = 4,
    Qc12V = 5,
}

impl PowerTier {
    pub const fn is_fast_charge(self) -> bool {
        matches!(self, Self::Qc5V | Self::Qc9V | Self::Qc12V)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::DcIn => "DC IN",
            Self::StandardPort => "SDP 5V",
            Self::DedicatedCharger => "DCP 5V",
            Self::Qc5V => "QC 5V",
            Self::Qc9V => "QC 9V",
            Self::Qc12V => "QC 12V",
        }
    }

    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::DcIn),
            1 => Some(Self::StandardPort),
            2 => Some(Self::DedicatedCharger),
            3 => Some(Self::Qc5V),
            4 => Some(Self::Qc9V),
            5 => Some(Self::Qc12V),
            _ => None,
        }
    }

    /// Next fast-charge tier for the power-mode key (wraps 12V back to 5V).
    pub const fn next_fast_charge(self) -> Self {
        match self {
            Self::Qc5V => Self::Qc9V,
            Self::Qc9V => Self::Qc12V,
            _ => Self::Qc5V,
        }
    }

    /// `(D+, D-)` DAC codes requesting this tier, or `None` for tiers that
    /// are detected rather than requested.
    pub const fn dac_pair(self) -> Option<(u8, u8)> {
        match self {
            Self::Qc5V => Some((dac_code(600), dac_code(0))),
            Self::Qc9V => Some((dac_code(3300), dac_code(600))),
            Self::Qc12V => Some((dac_code(600), dac_code(600))),
            _ => None,
        }
    }
}

impl fmt::Display for PowerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Persisted for PowerTier {
    const KEY: &'static str = "pwr_tier";

    fn encode(&self) -> Vec<u8, MAX_RECORD> {
        let mut out = Vec::new();
        let _ = out.extend_from_slice(&(*self as u16).to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
        Self::from_u16(u16::from_le_bytes(raw))
    }
}

/// DAC full scale in millivolts.
pub const DAC_FULL_SCALE_MV: u32 = 3300;

/// 8-bit DAC code for `mv` millivolts.
pub const fn dac_code(mv: u32) -> u8 {
    let mv = if mv > DAC_FULL_SCALE_MV { DAC_FULL_SCALE_MV } else { mv };
    (255 * mv / DAC_FULL_SCALE_MV) as u8
}

/// Probe level driven on D+ while classifying the port.
pub const PROBE_CODE: u8 = dac_code(325);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// The supply did not accept the fast-charge handshake.
    NotNegotiable,
    /// Only fast-charge tiers can be requested.
    InvalidTier(PowerTier),
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNegotiable => write!(f, "supply is not fast-charge capable"),
            Self::InvalidTier(t) => write!(f, "tier {} cannot be requested", t),
        }
    }
}
