//! Canvas for composing a single key bitmap.

use decky_hw::{KeyImage, Rgb};
use image::RgbaImage;
use tiny_skia::{Color, ColorU8, Pixmap, PixmapPaint, Transform};

use super::text::TextRenderer;

/// Square drawing surface the size of one key.
pub struct KeyCanvas {
    pixmap: Pixmap,
    size: u32,
    background: Rgb,
}

impl KeyCanvas {
    /// Creates a canvas cleared to `background`. Returns `None` for a zero size.
    pub fn new(size: u32, background: Rgb) -> Option<Self> {
        let mut pixmap = Pixmap::new(size, size)?;
        pixmap.fill(Color::from_rgba8(background.0, background.1, background.2, 255));
        Some(Self {
            pixmap,
            size,
            background,
        })
    }

    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Composites an RGBA image with its top-left corner at (`x`, `y`).
    pub fn draw_image(&mut self, image: &RgbaImage, x: i32, y: i32) {
        let Some(mut source) = Pixmap::new(image.width(), image.height()) else {
            return;
        };
        for (dst, px) in source.pixels_mut().iter_mut().zip(image.pixels()) {
            *dst = ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
        }
        self.pixmap.draw_pixmap(
            x,
            y,
            source.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Draws one line of text with its top edge at `y`.
    pub fn draw_text(&mut self, text: &TextRenderer, x: i32, y: i32, line: &str, color: Rgb) {
        text.draw_text(&mut self.pixmap, x, y, line, color);
    }

    /// Converts the canvas into a device bitmap.
    pub fn into_key_image(self) -> KeyImage {
        // The background is opaque, so premultiplied data equals straight RGBA
        KeyImage::from_rgba8(self.size, self.pixmap.data())
            .unwrap_or_else(|_| KeyImage::filled(self.size, self.background))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_fill() {
        let canvas = KeyCanvas::new(72, Rgb(10, 20, 30)).unwrap();
        let image = canvas.into_key_image();
        assert_eq!(image.size(), 72);
        assert!(image.pixels().iter().all(|&px| px == Rgb(10, 20, 30)));
    }

    #[test]
    fn test_zero_size() {
        assert!(KeyCanvas::new(0, Rgb::BLACK).is_none());
    }

    #[test]
    fn test_draw_image() {
        let mut canvas = KeyCanvas::new(10, Rgb::BLACK).unwrap();
        let icon = RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        canvas.draw_image(&icon, 4, 4);
        let image = canvas.into_key_image();

        assert_eq!(image.get_pixel(4, 4), Some(Rgb(255, 0, 0)));
        assert_eq!(image.get_pixel(5, 5), Some(Rgb(255, 0, 0)));
        assert_eq!(image.get_pixel(3, 3), Some(Rgb::BLACK));
        assert_eq!(image.get_pixel(9, 9), Some(Rgb::BLACK));
    }

    #[test]
    fn test_transparent_image_keeps_background() {
        let mut canvas = KeyCanvas::new(4, Rgb(0, 0, 200)).unwrap();
        let icon = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 0]));
        canvas.draw_image(&icon, 0, 0);
        let image = canvas.into_key_image();
        assert_eq!(image.get_pixel(1, 1), Some(Rgb(0, 0, 200)));
    }
}
