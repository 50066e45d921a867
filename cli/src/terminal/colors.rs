use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 96, g: 165, b: 250 };
pub const ACCENT: Color = Color::TrueColor { r: 250, g: 204, b: 21 };
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const IPV4_ADDR: Color = Color::TrueColor { r: 74, g: 222, b: 128 };
pub const IPV4_PREFIX: Color = Color::Green;
pub const MAC_ADDR: Color = Color::TrueColor { r: 192, g: 132, b: 252 };

pub const ALIVE: Color = Color::Green;
pub const UNREACHABLE: Color = Color::Red;
pub const UNKNOWN: Color = Color::BrightBlack;
