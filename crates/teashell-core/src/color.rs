//! Color profiles and colors.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Color depth a terminal can render, ordered from fewest to most colors.
///
/// `Ascii < Ansi < Ansi256 < TrueColor`, so `min` of two profiles is the one
/// both sides can display.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ColorProfile {
    /// No color at all
    #[default]
    Ascii,
    /// 16 ANSI colors
    Ansi,
    /// 256-color palette
    Ansi256,
    /// 24-bit RGB
    TrueColor,
}

impl ColorProfile {
    /// All profiles in ascending order.
    pub const ALL: [ColorProfile; 4] = [
        ColorProfile::Ascii,
        ColorProfile::Ansi,
        ColorProfile::Ansi256,
        ColorProfile::TrueColor,
    ];

    /// Human-readable name used in client-facing messages.
    pub fn name(self) -> &'static str {
        match self {
            ColorProfile::Ascii => "Ascii",
            ColorProfile::Ansi => "ANSI",
            ColorProfile::Ansi256 => "ANSI256",
            ColorProfile::TrueColor => "TrueColor",
        }
    }

    /// Whether a color can be rendered under this profile.
    pub fn supports(self, color: Color) -> bool {
        color.required_profile() <= self
    }
}

impl std::fmt::Display for ColorProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascii" | "none" => Ok(ColorProfile::Ascii),
            "ansi" | "basic" => Ok(ColorProfile::Ansi),
            "ansi256" | "256" | "extended" => Ok(ColorProfile::Ansi256),
            "truecolor" | "24bit" | "full" => Ok(ColorProfile::TrueColor),
            _ => Err(Error::InvalidColorProfile(s.to_string())),
        }
    }
}

/// A foreground color a renderer can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Default terminal color
    Default,

    /// Standard and bright ANSI colors (0-15)
    Ansi(u8),

    /// 256-color palette index (0-255)
    Indexed(u8),

    /// True color RGB (24-bit)
    Rgb {
        /// Red component
        r: u8,
        /// Green component
        g: u8,
        /// Blue component
        b: u8,
    },
}

impl Color {
    /// Lowest profile able to display this color.
    pub fn required_profile(self) -> ColorProfile {
        match self {
            Color::Default => ColorProfile::Ascii,
            Color::Ansi(_) => ColorProfile::Ansi,
            Color::Indexed(_) => ColorProfile::Ansi256,
            Color::Rgb { .. } => ColorProfile::TrueColor,
        }
    }

    /// SGR parameters selecting this color as foreground, if any.
    pub fn fg_params(self) -> Option<String> {
        match self {
            Color::Default => None,
            Color::Ansi(n) if n < 8 => Some(format!("{}", 30 + n)),
            Color::Ansi(n) => Some(format!("{}", 90 + (n.min(15) - 8))),
            Color::Indexed(n) => Some(format!("38;5;{n}")),
            Color::Rgb { r, g, b } => Some(format!("38;2;{r};{g};{b}")),
        }
    }
}
