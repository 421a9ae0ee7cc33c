//! Retained text-cell display adapter.
//!
//! Implements [`DisplayPort`] by keeping the latest text of every box,
//! keyed by its origin, and logging the frame on flush when it changed.
//! The pixel panel driver is an external component; this adapter stands
//! in for it on boards without a panel and in host simulation.

use heapless::{String, Vec};
use log::debug;

use crate::app::ports::DisplayPort;
use crate::ui::TextBox;

/// Distinct text boxes a frame can hold.
pub const MAX_CELLS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub x: i16,
    pub y: i16,
    pub text: String<32>,
}

pub struct TextPanel {
    backlight: u8,
    cells: Vec<Cell, MAX_CELLS>,
    dirty: bool,
    flushes: u32,
}

impl TextPanel {
    pub const fn new() -> Self {
        Self {
            backlight: 0,
            cells: Vec::new(),
            dirty: false,
            flushes: 0,
        }
    }

    pub fn backlight(&self) -> u8 {
        self.backlight
    }

    /// Text last drawn at `(x, y)`.
    pub fn text_at(&self, x: i16, y: i16) -> Option<&str> {
        self.cells
            .iter()
            .find(|c| c.x == x && c.y == y)
            .map(|c| c.text.as_str())
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn flush_count(&self) -> u32 {
        self.flushes
    }
}

impl Default for TextPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPort for TextPanel {
    fn set_backlight(&mut self, level: u8) {
        self.backlight = level;
    }

    fn draw_text_box(&mut self, text_box: &TextBox<'_>) {
        let mut text = String::new();
        // over-long text is cut to the cell
        for ch in text_box.text.chars() {
            if text.push(ch).is_err() {
                break;
            }
        }
        if let Some(cell) = self
            .cells
            .iter_mut()
            .find(|c| c.x == text_box.x && c.y == text_box.y)
        {
            if cell.text != text {
                cell.text = text;
                self.dirty = true;
            }
            return;
        }
        let cell = Cell {
            x: text_box.x,
            y: text_box.y,
            text,
        };
        if self.cells.push(cell).is_ok() {
            self.dirty = true;
        }
    }

    fn flush(&mut self) {
        self.flushes = self.flushes.wrapping_add(1);
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let mut line: String<128> = String::new();
        for cell in &self.cells {
            let _ = line.push_str(&cell.text);
            let _ = line.push(' ');
        }
        debug!("panel | {}", line.trim_end());
    }
}
