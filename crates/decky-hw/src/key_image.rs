//! RGB888 bitmap for a single key display.

use crate::rotation::Rotation;
use crate::{Error, Result};
use image::{DynamicImage, RgbImage};

/// RGB colour triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Formats as `#RRGGBB`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Square RGB888 key bitmap.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyImage {
    /// Row-major pixel data.
    data: Vec<Rgb>,
    /// Edge length in pixels.
    size: u32,
}

impl std::fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyImage").field("size", &self.size).finish()
    }
}

impl KeyImage {
    /// Creates a black key image.
    pub fn new(size: u32) -> Self {
        Self::filled(size, Rgb::BLACK)
    }

    /// Creates a key image of a single colour.
    pub fn filled(size: u32, color: Rgb) -> Self {
        Self {
            data: vec![color; size as usize * size as usize],
            size,
        }
    }

    /// Builds a key image from RGBA8 bytes, dropping alpha.
    pub fn from_rgba8(size: u32, data: &[u8]) -> Result<Self> {
        let expected = size as usize * size as usize * 4;
        if data.len() != expected {
            return Err(Error::ImageSize {
                expected,
                actual: data.len(),
            });
        }
        let data = data
            .chunks_exact(4)
            .map(|px| Rgb(px[0], px[1], px[2]))
            .collect();
        Ok(Self { data, size })
    }

    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Raw pixels.
    pub fn pixels(&self) -> &[Rgb] {
        &self.data
    }

    /// Sets a pixel; out of range coordinates are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        if x < self.size && y < self.size {
            let idx = y as usize * self.size as usize + x as usize;
            self.data[idx] = color;
        }
    }

    /// Gets a pixel at the given coordinates.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x < self.size && y < self.size {
            Some(self.data[y as usize * self.size as usize + x as usize])
        } else {
            None
        }
    }

    /// Fills the whole image with one colour.
    pub fn fill(&mut self, color: Rgb) {
        self.data.fill(color);
    }

    /// Returns a rotated copy.
    pub fn rotated(&self, rotation: Rotation) -> KeyImage {
        KeyImage {
            data: rotation.apply(&self.data, self.size as usize),
            size: self.size,
        }
    }

    /// Converts to the image type the driver uploads from.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        let buffer = RgbImage::from_fn(self.size, self.size, |x, y| {
            let px = self.data[y as usize * self.size as usize + x as usize];
            image::Rgb([px.0, px.1, px.2])
        });
        DynamicImage::ImageRgb8(buffer)
    }
}

/// Parses a `#RRGGBB` or `RRGGBB` colour string.
pub fn parse_hex_color(hex: &str) -> Option<Rgb> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgb(r, g, b))
}
