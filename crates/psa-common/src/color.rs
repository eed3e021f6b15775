//! Sequential color maps and derived color bars.
//!
//! The maps are the nine-class ColorBrewer sequential palettes. A map is
//! evaluated on a normalized position in `[0, 1]` by linear interpolation
//! between neighbouring stops.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PsaError;

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse "#rrggbb" (leading '#' optional).
    pub fn from_hex(s: &str) -> Result<Self, PsaError> {
        let hex = s.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(PsaError::InvalidParameter {
                param: "color".to_string(),
                message: format!("expected #rrggbb, got '{}'", s),
            });
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| PsaError::InvalidParameter {
                param: "color".to_string(),
                message: format!("{}: {}", s, e),
            })
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Lowercase "#rrggbb".
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Linear interpolation between two colors, `t` clamped to `[0, 1]`.
    pub fn lerp(&self, other: &Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Color::rgb(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Known color map names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMapName {
    Blues,
    Greens,
    Reds,
    Greys,
    Purples,
    Oranges,
}

impl ColorMapName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMapName::Blues => "Blues",
            ColorMapName::Greens => "Greens",
            ColorMapName::Reds => "Reds",
            ColorMapName::Greys => "Greys",
            ColorMapName::Purples => "Purples",
            ColorMapName::Oranges => "Oranges",
        }
    }

    /// The concrete color map for this name.
    pub fn colormap(&self) -> ColorMap {
        let stops: &[u32; 9] = match self {
            ColorMapName::Blues => &[
                0xf7fbff, 0xdeebf7, 0xc6dbef, 0x9ecae1, 0x6baed6, 0x4292c6, 0x2171b5, 0x08519c,
                0x08306b,
            ],
            ColorMapName::Greens => &[
                0xf7fcf5, 0xe5f5e0, 0xc7e9c0, 0xa1d99b, 0x74c476, 0x41ab5d, 0x238b45, 0x006d2c,
                0x00441b,
            ],
            ColorMapName::Reds => &[
                0xfff5f0, 0xfee0d2, 0xfcbba1, 0xfc9272, 0xfb6a4a, 0xef3b2c, 0xcb181d, 0xa50f15,
                0x67000d,
            ],
            ColorMapName::Greys => &[
                0xffffff, 0xf0f0f0, 0xd9d9d9, 0xbdbdbd, 0x969696, 0x737373, 0x525252, 0x252525,
                0x000000,
            ],
            ColorMapName::Purples => &[
                0xfcfbfd, 0xefedf5, 0xdadaeb, 0xbcbddc, 0x9e9ac8, 0x807dba, 0x6a51a3, 0x54278f,
                0x3f007d,
            ],
            ColorMapName::Oranges => &[
                0xfff5eb, 0xfee6ce, 0xfdd0a2, 0xfdae6b, 0xfd8d3c, 0xf16913, 0xd94801, 0xa63603,
                0x7f2704,
            ],
        };
        ColorMap {
            stops: stops
                .iter()
                .map(|c| Color::rgb((c >> 16) as u8, (c >> 8) as u8, *c as u8))
                .collect(),
        }
    }
}

impl fmt::Display for ColorMapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorMapName {
    type Err = PsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Blues" => Ok(ColorMapName::Blues),
            "Greens" => Ok(ColorMapName::Greens),
            "Reds" => Ok(ColorMapName::Reds),
            "Greys" => Ok(ColorMapName::Greys),
            "Purples" => Ok(ColorMapName::Purples),
            "Oranges" => Ok(ColorMapName::Oranges),
            other => Err(PsaError::InvalidParameter {
                param: "color_map".to_string(),
                message: format!("unknown color map '{}'", other),
            }),
        }
    }
}

/// A piecewise-linear color map over evenly spaced stops.
#[derive(Debug, Clone)]
pub struct ColorMap {
    stops: Vec<Color>,
}

impl ColorMap {
    /// Evaluate at a normalized position; values outside `[0, 1]` clamp.
    pub fn eval(&self, t: f64) -> Color {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let last = self.stops.len() - 1;
        let scaled = t * last as f64;
        let i = (scaled.floor() as usize).min(last.saturating_sub(1));
        self.stops[i].lerp(&self.stops[(i + 1).min(last)], scaled - i as f64)
    }

    /// Evaluate `value` normalized over `[min, max]`. A degenerate range maps to 0.
    pub fn eval_in_range(&self, value: f64, min: f64, max: f64) -> Color {
        let span = max - min;
        let t = if span > 0.0 { (value - min) / span } else { 0.0 };
        self.eval(t)
    }
}

/// One `(value, color)` entry of a color bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: Color,
}

/// An ordered color bar spanning a variable's value range.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorScale {
    pub stops: Vec<ColorStop>,
}

impl ColorScale {
    /// Build `steps` evenly spaced stops from `min` to `max`.
    ///
    /// When the range spans at least `steps` units the stop values are
    /// ceiled to integers. Each color is evaluated at the stop's final value,
    /// after ceiling, within `min..=max`.
    pub fn build(map: ColorMapName, min: f64, max: f64, steps: usize) -> Self {
        if steps == 0 || !min.is_finite() || !max.is_finite() {
            return Self::default();
        }

        let colormap = map.colormap();
        let round = max - min >= steps as f64;
        let stops = linspace(min, max, steps)
            .into_iter()
            .map(|v| {
                let value = if round { v.ceil() } else { v };
                ColorStop {
                    value,
                    color: colormap.eval_in_range(value, min, max),
                }
            })
            .collect();

        Self { stops }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// `[[value, "#rrggbb"], ...]` as stored with the variable record.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.stops
                .iter()
                .map(|s| serde_json::json!([s.value, s.color.to_hex()]))
                .collect(),
        )
    }

    /// Parse the stored `[[value, "#rrggbb"], ...]` form.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PsaError> {
        let invalid = || PsaError::Serialization(format!("invalid color bar: {}", value));
        let entries = value.as_array().ok_or_else(invalid)?;
        let stops = entries
            .iter()
            .map(|entry| {
                let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(invalid)?;
                let value = pair[0].as_f64().ok_or_else(invalid)?;
                let color = Color::from_hex(pair[1].as_str().ok_or_else(invalid)?)?;
                Ok(ColorStop { value, color })
            })
            .collect::<Result<Vec<_>, PsaError>>()?;
        Ok(Self { stops })
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}
