//! Status screen: duty, RPM, power tier, bus voltage and current.
//!
//! ```text
//!   ┌──────────────────────────┐
//!   │ PWM:             128*    │  * = unsaved
//!   │ RPM:             1450    │
//!   │ PWR:            QC 9V    │
//!   │   8.972V      0.412A     │
//!   └──────────────────────────┘
//! ```

use core::fmt::Write as _;

use heapless::String;
use log::info;

use crate::app::ports::DisplayPort;
use crate::flags::{self, EventFlags};

use super::{Color, Font, Justify, TextBox};

pub const BACKLIGHT_ON: u8 = 255;
pub const BACKLIGHT_OFF: u8 = 0;

/// Refresh period while on.
pub const REFRESH_MS: u32 = 20;

const ROW_H: u16 = 32;
const VALUE_X: i16 = 95;
const VALUE_W: u16 = 143;

/// Everything one frame shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub duty: u8,
    pub fan_saved: bool,
    pub rpm: u32,
    pub power_label: &'static str,
    pub power_saved: bool,
    pub bus_voltage: f32,
    pub current: f32,
}

pub struct StatusScreen {
    on: bool,
    labels_drawn: bool,
}

impl StatusScreen {
    pub const fn new() -> Self {
        Self {
            on: false,
            labels_drawn: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Switch the screen on or off and wake the refresh task.  The panel
    /// is not trusted to keep its contents while off, so the next frame
    /// after switching back on redraws the labels.
    pub fn set_mode(&mut self, on: bool, flags: &EventFlags) {
        if !on {
            self.labels_drawn = false;
        }
        self.on = on;
        flags.set(flags::GUI_RELOAD);
        info!("gui: {}", if on { "on" } else { "off" });
    }

    /// Draw one frame, or turn the backlight off when the screen is off.
    pub fn render(&mut self, snap: &StatusSnapshot, display: &mut impl DisplayPort) {
        if !self.on {
            display.set_backlight(BACKLIGHT_OFF);
            return;
        }
        if !self.labels_drawn {
            self.draw_labels(display);
            self.labels_drawn = true;
        }
        display.set_backlight(BACKLIGHT_ON);

        let mut text: String<32> = String::new();
        let _ = write!(text, "{}{}", snap.duty, unsaved_mark(snap.fan_saved));
        display.draw_text_box(&value_box(2, &text, Color::YELLOW));

        text.clear();
        let _ = write!(text, "{}", snap.rpm);
        display.draw_text_box(&value_box(34, &text, Color::CYAN));

        text.clear();
        let _ = write!(text, "{}{}", snap.power_label, unsaved_mark(snap.power_saved));
        display.draw_text_box(&value_box(67, &text, Color::MAGENTA));

        let volts = format_voltage(snap.bus_voltage);
        display.draw_text_box(&TextBox {
            x: 2,
            y: 100,
            w: 118,
            h: ROW_H,
            text: &volts,
            font: Font::Sans32,
            fg: Color::LIME,
            bg: Color::BLACK,
            justify: Justify::Right,
        });

        let amps = format_current(snap.current);
        display.draw_text_box(&TextBox {
            x: 120,
            y: 100,
            w: 118,
            h: ROW_H,
            text: &amps,
            font: Font::Sans32,
            fg: current_color(snap.current),
            bg: Color::BLACK,
            justify: Justify::Right,
        });

        display.flush();
    }

    fn draw_labels(&self, display: &mut impl DisplayPort) {
        for (y, label, fg) in [
            (2, "PWM:", Color::YELLOW),
            (34, "RPM:", Color::CYAN),
            (67, "PWR:", Color::MAGENTA),
        ] {
            display.draw_text_box(&TextBox {
                x: 2,
                y,
                w: 93,
                h: ROW_H,
                text: label,
                font: Font::Sans32,
                fg,
                bg: Color::BLACK,
                justify: Justify::Left,
            });
        }
    }
}

impl Default for StatusScreen {
    fn default() -> Self {
        Self::new()
    }
}

fn value_box<'t>(y: i16, text: &'t str, fg: Color) -> TextBox<'t> {
    TextBox {
        x: VALUE_X,
        y,
        w: VALUE_W,
        h: ROW_H,
        text,
        font: Font::Sans32,
        fg,
        bg: Color::BLACK,
        justify: Justify::Right,
    }
}

fn unsaved_mark(saved: bool) -> &'static str {
    if saved { "" } else { "*" }
}

/// Three decimals below 10 V, two above.
pub fn format_voltage(volts: f32) -> String<16> {
    let mut s = String::new();
    let v = volts.abs();
    let _ = if v < 10.0 {
        write!(s, "{:4.3}V", v)
    } else {
        write!(s, "{:4.2}V", v)
    };
    s
}

pub fn format_current(amps: f32) -> String<16> {
    let mut s = String::new();
    let _ = write!(s, "{:4.3}A", amps.abs());
    s
}

/// Reverse current is shown in a different colour.
pub fn current_color(amps: f32) -> Color {
    if amps < 0.0 { Color::SKY_BLUE } else { Color::ORANGE }
}
