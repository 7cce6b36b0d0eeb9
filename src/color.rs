//! Color transport across the engine boundary.
//!
//! The engine takes colors as a single `u32` with `r` in the low byte:
//! `r | g << 8 | b << 16 | a << 24`. In memory colors are a validated
//! [`ColorValue`]; raw channel input goes through [`ColorValue::normalize`].

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// An RGBA color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorValue {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorValue {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// Build a color from arbitrary numeric channels, clamping to `[0, 255]`
    /// and rounding to the nearest integer. NaN maps to 0.
    #[must_use]
    pub fn normalize(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: normalize_channel(r),
            g: normalize_channel(g),
            b: normalize_channel(b),
            a: normalize_channel(a),
        }
    }

    #[must_use]
    pub const fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Same color with full alpha.
    #[must_use]
    pub const fn opaque(self) -> Self {
        Self { a: 255, ..self }
    }

    #[must_use]
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(PanelError::Other(format!(
                "Invalid color format '{s}': expected 6 or 8 hex digits (e.g., ff0000)"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| PanelError::Other(format!("Invalid hex color: {s}")))
        };
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

fn normalize_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0).round() as u8
}

/// Pack a color into the engine's `u32` wire form.
#[must_use]
pub const fn pack(color: ColorValue) -> u32 {
    (color.r as u32) | ((color.g as u32) << 8) | ((color.b as u32) << 16) | ((color.a as u32) << 24)
}

/// Unpack the engine's `u32` wire form. Never fails.
#[must_use]
pub const fn unpack(value: u32) -> ColorValue {
    ColorValue {
        r: (value & 0xFF) as u8,
        g: ((value >> 8) & 0xFF) as u8,
        b: ((value >> 16) & 0xFF) as u8,
        a: ((value >> 24) & 0xFF) as u8,
    }
}

impl From<ColorValue> for u32 {
    fn from(color: ColorValue) -> Self {
        pack(color)
    }
}

impl From<u32> for ColorValue {
    fn from(value: u32) -> Self {
        unpack(value)
    }
}

impl From<ColorValue> for image::Rgba<u8> {
    fn from(color: ColorValue) -> Self {
        Self(color.to_array())
    }
}
