//! Native panel palette
//!
//! The panel stores one 4-bit code per pixel. Only six codes are defined;
//! `0x4` and `0x7` are reserved by the controller and rejected here.

use crate::error::Error;

/// A pixel color the panel can show, with its native nibble code
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    Black = 0x0,
    #[default]
    White = 0x1,
    Yellow = 0x2,
    Red = 0x3,
    Blue = 0x5,
    Green = 0x6,
}

/// Palette in the order the binding layer exposes it (`getColors`)
pub const PALETTE: [(&str, Color); 6] = [
    ("BLACK", Color::Black),
    ("WHITE", Color::White),
    ("YELLOW", Color::Yellow),
    ("RED", Color::Red),
    ("BLUE", Color::Blue),
    ("GREEN", Color::Green),
];

impl Color {
    /// Native 4-bit code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Byte holding this color in both nibbles
    pub const fn packed_pair(self) -> u8 {
        (self.code() << 4) | self.code()
    }

    /// Upper-case palette name
    pub fn name(self) -> &'static str {
        match self {
            Color::Black => "BLACK",
            Color::White => "WHITE",
            Color::Yellow => "YELLOW",
            Color::Red => "RED",
            Color::Blue => "BLUE",
            Color::Green => "GREEN",
        }
    }

    /// Look up a palette entry by name, ignoring case
    pub fn from_name(name: &str) -> Option<Color> {
        PALETTE
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .map(|&(_, c)| c)
    }
}

impl TryFrom<u8> for Color {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x0 => Ok(Color::Black),
            0x1 => Ok(Color::White),
            0x2 => Ok(Color::Yellow),
            0x3 => Ok(Color::Red),
            0x5 => Ok(Color::Blue),
            0x6 => Ok(Color::Green),
            other => Err(Error::InvalidColor(other)),
        }
    }
}

impl From<Color> for u8 {
    fn from(color: Color) -> u8 {
        color.code()
    }
}

impl core::fmt::Display for Color {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
