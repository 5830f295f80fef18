use serde::{Deserialize, Serialize};

/// Color of a feature. In scene files colors are written as hex strings.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from_hex(&value).ok_or_else(|| format!("invalid color '{value}'"))
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_hex()
    }
}

impl Color {
    /// Transparent color: `#00000000`
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// White color: `#FFFFFFFF`
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// Black color: `#000000FF`
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    /// Gray color: `#AAAAAAFF`
    pub const GRAY: Color = Color::rgba(170, 170, 170, 255);

    /// Constructs color from its RGBA channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Converts the color into the normalized float array stored in vertices.
    pub fn to_f32_array(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Converts the color into HEX8 string: `#RRGGBBAA`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// Parses a color from `#RGB`, `#RGBA`, `#RRGGBB` or `#RRGGBBAA`.
    pub fn try_from_hex(hex_string: &str) -> Option<Self> {
        let digits = hex_string.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }

        let channel = |i: usize, width: usize| -> Option<u8> {
            let value = u8::from_str_radix(digits.get(i * width..(i + 1) * width)?, 16).ok()?;
            Some(if width == 1 { value * 17 } else { value })
        };

        match digits.len() {
            3 => Some(Self::rgba(channel(0, 1)?, channel(1, 1)?, channel(2, 1)?, 255)),
            4 => Some(Self::rgba(
                channel(0, 1)?,
                channel(1, 1)?,
                channel(2, 1)?,
                channel(3, 1)?,
            )),
            6 => Some(Self::rgba(channel(0, 2)?, channel(1, 2)?, channel(2, 2)?, 255)),
            8 => Some(Self::rgba(
                channel(0, 2)?,
                channel(1, 2)?,
                channel(2, 2)?,
                channel(3, 2)?,
            )),
            _ => None,
        }
    }

    /// Returns true if the color is fully transparent (`a == 0`).
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Linear interpolation between two colors, channel by channel.
    pub fn lerp(&self, other: &Color, t: f32) -> Color {
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}
