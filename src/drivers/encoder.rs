//! Rotary encoder sampler.
//!
//! Polled every millisecond.  Each sample compares the previous and
//! current phase levels; a change on phase A decodes a direction from the
//! phase-B level, the push-button promotes it to a big step.  At most one
//! [`ControlEvent`] results per sample and `None` is never queued.
//!
//! Quadrature truth table (index = prevA·8 + prevB·4 + curA·2 + curB),
//! `Normal` polarity, both A edges:
//!
//! | A edge  | curB | direction |
//! |---------|------|-----------|
//! | rising  | 0    | Cw        |
//! | rising  | 1    | Ccw       |
//! | falling | 1    | Cw        |
//! | falling | 0    | Ccw       |
//!
//! `SingleDetent` keeps only the falling rows.  `Inverted` swaps Cw/Ccw.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use log::error;

use crate::config::{DecodeMode, EncoderConfig, Polarity};
use crate::context::SystemContext;
use crate::events::{ControlEvent, FanEvent};
use crate::flags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Cw,
    Ccw,
}

/// Direction for one phase transition, or `None` when A did not change
/// (or changed on an edge the decode mode ignores).  The previous B level
/// never decides the direction, only A's edge and the new B level do.
pub const fn decode(
    prev_a: bool,
    cur_a: bool,
    cur_b: bool,
    mode: DecodeMode,
    polarity: Polarity,
) -> Option<Direction> {
    if prev_a == cur_a {
        return None;
    }
    if matches!(mode, DecodeMode::SingleDetent) && cur_a {
        return None;
    }
    let cw = cur_a != cur_b;
    let cw = match polarity {
        Polarity::Normal => cw,
        Polarity::Inverted => !cw,
    };
    Some(if cw { Direction::Cw } else { Direction::Ccw })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Levels {
    a: bool,
    b: bool,
    pressed: bool,
}

/// Pure decoder state: previous levels plus configuration.
pub struct QuadratureDecoder {
    config: EncoderConfig,
    prev: Levels,
}

impl QuadratureDecoder {
    /// Start from the levels read at boot so the first sample does not
    /// decode a phantom edge.
    pub fn new(config: EncoderConfig, a: bool, b: bool, button_high: bool) -> Self {
        Self {
            config,
            prev: Levels {
                a,
                b,
                pressed: config.button_active.asserted(button_high),
            },
        }
    }

    /// Decode one sample.
    pub fn step(&mut self, a: bool, b: bool, button_high: bool) -> ControlEvent {
        let cur = Levels {
            a,
            b,
            pressed: self.config.button_active.asserted(button_high),
        };
        let prev = core::mem::replace(&mut self.prev, cur);

        let dir = decode(prev.a, cur.a, cur.b, self.config.decode, self.config.polarity);
        match (dir, cur.pressed) {
            (Some(Direction::Cw), false) => ControlEvent::Increment,
            (Some(Direction::Ccw), false) => ControlEvent::Decrement,
            (Some(Direction::Cw), true) => ControlEvent::IncrementBig,
            (Some(Direction::Ccw), true) => ControlEvent::DecrementBig,
            (None, true) if !prev.pressed && self.config.press_events => ControlEvent::Press,
            (None, _) => ControlEvent::None,
        }
    }
}

/// Encoder pins plus decoder.
pub struct EncoderSampler<A, B, P> {
    phase_a: A,
    phase_b: B,
    button: P,
    decoder: QuadratureDecoder,
    last: (bool, bool, bool),
}

impl<A: InputPin, B: InputPin, P: InputPin> EncoderSampler<A, B, P> {
    pub fn new(mut phase_a: A, mut phase_b: B, mut button: P, config: EncoderConfig) -> Self {
        let a = phase_a.is_high().unwrap_or(true);
        let b = phase_b.is_high().unwrap_or(true);
        let btn = button.is_high().unwrap_or(true);
        Self {
            phase_a,
            phase_b,
            button,
            decoder: QuadratureDecoder::new(config, a, b, btn),
            last: (a, b, btn),
        }
    }

    /// Read the pins and decode.  A failed read repeats the previous
    /// level, so a glitch decodes as "no change".
    pub fn sample(&mut self) -> ControlEvent {
        let a = self.phase_a.is_high().unwrap_or(self.last.0);
        let b = self.phase_b.is_high().unwrap_or(self.last.1);
        let btn = self.button.is_high().unwrap_or(self.last.2);
        self.last = (a, b, btn);
        self.decoder.step(a, b, btn)
    }

    /// One sampler tick: decode and, while the fan runs, queue the event.
    ///
    /// Blocks on `delay` when the queue is full.  A full queue at 1 kHz
    /// against a 500 ms consumer means the fan task stalled, so it is
    /// logged first.
    pub fn poll(&mut self, ctx: &SystemContext, delay: &mut impl DelayNs) -> Option<ControlEvent> {
        let event = self.sample();
        if event == ControlEvent::None || !ctx.flags.is_set(flags::FAN_RUN) {
            return None;
        }
        if let Err(ev) = ctx.fan_events.try_send(FanEvent::Control(event)) {
            error!("encoder: fan event queue full, consumer stalled");
            ctx.fan_events.send_blocking(ev, delay);
        }
        Some(event)
    }
}
