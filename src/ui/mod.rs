//! Display primitives consumed through [`DisplayPort`].
//!
//! The panel driver owns fonts and pixels; the core only describes text
//! boxes.
//!
//! [`DisplayPort`]: crate::app::ports::DisplayPort

pub mod screen;

pub use screen::{StatusScreen, StatusSnapshot};

/// RGB565 colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u16);

impl Color {
    pub const BLACK: Self = Self(0x0000);
    pub const YELLOW: Self = Self(0xFFE0);
    pub const CYAN: Self = Self(0x07FF);
    pub const MAGENTA: Self = Self(0xF81F);
    pub const LIME: Self = Self(0x07E0);
    pub const SKY_BLUE: Self = Self(0x867D);
    pub const ORANGE: Self = Self(0xFD20);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    /// DejaVu Sans, 32 px.
    Sans32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
    Right,
}

/// One filled text box: the area is cleared to `bg`, then `text` drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox<'a> {
    pub x: i16,
    pub y: i16,
    pub w: u16,
    pub h: u16,
    pub text: &'a str,
    pub font: Font,
    pub fg: Color,
    pub bg: Color,
    pub justify: Justify,
}
