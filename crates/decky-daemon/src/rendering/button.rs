//! Composes button text, icon and style into a key bitmap.

use decky_hw::KeyImage;
use image::imageops::FilterType;
use image::RgbaImage;
use tracing::warn;

use super::canvas::KeyCanvas;
use super::icons::IconResolver;
use super::style::Style;
use super::text::{FontCache, TextRenderer};
use super::RenderError;
use crate::config::{ButtonSpec, HAlign, VAlign};

/// Pixels between wrapped lines.
const LINE_SPACING: i32 = 2;

/// Largest text outline drawn, in pixels.
const MAX_OUTLINE: i32 = 8;

/// Renders buttons. Rendering never fails: problems degrade to a
/// text-only or blank bitmap.
pub struct ButtonRenderer {
    fonts: FontCache,
    icons: IconResolver,
}

impl ButtonRenderer {
    /// Creates a renderer with the standard font search path.
    pub fn new(icons: IconResolver) -> Result<Self, RenderError> {
        Ok(Self::with_fonts(FontCache::new()?, icons))
    }

    /// Creates a renderer with an explicit font cache.
    pub fn with_fonts(fonts: FontCache, icons: IconResolver) -> Self {
        Self { fonts, icons }
    }

    /// Icon lookup shared with the animation loader.
    pub fn icons(&self) -> &IconResolver {
        &self.icons
    }

    /// Renders a button from its config entry, loading its icon from disk. Without
    /// an icon, the first frame of its animation source is used.
    ///
    /// `text` overrides the button's configured text (used by widgets).
    pub fn render_button(
        &self,
        spec: &ButtonSpec,
        text: Option<&str>,
        style: &Style,
        size: u32,
    ) -> KeyImage {
        let text = text.or(spec.text.as_deref());
        let icon_name = spec.icon.as_deref().or(spec.animation.as_deref());
        let icon = icon_name.and_then(|name| {
            self.icons
                .read(name)
                .and_then(|bytes| decode_icon(name, &bytes))
                .map_err(|e| warn!("Icon unavailable, rendering without it: {}", e))
                .ok()
        });
        self.compose(text, icon.as_ref(), style, size)
    }

    /// Renders from raw icon bytes. Undecodable bytes are dropped with a warning.
    pub fn render(
        &self,
        text: Option<&str>,
        icon_bytes: Option<&[u8]>,
        style: &Style,
        size: u32,
    ) -> KeyImage {
        let icon = icon_bytes.and_then(|bytes| {
            decode_icon("icon", bytes)
                .map_err(|e| warn!("Icon unavailable, rendering without it: {}", e))
                .ok()
        });
        self.compose(text, icon.as_ref(), style, size)
    }

    /// A key showing only the style's background.
    pub fn render_blank(&self, style: &Style, size: u32) -> KeyImage {
        KeyImage::filled(size, style.background_color)
    }

    /// Composes already-decoded content.
    pub fn compose(
        &self,
        text: Option<&str>,
        icon: Option<&RgbaImage>,
        style: &Style,
        size: u32,
    ) -> KeyImage {
        let Some(mut canvas) = KeyCanvas::new(size, style.background_color) else {
            return self.render_blank(style, size);
        };

        if let Some(icon) = icon {
            let fitted = fit_icon(icon, icon_area(size, style));
            let x = (size as i32 - fitted.width() as i32) / 2;
            let y = (size as i32 - fitted.height() as i32) / 2;
            canvas.draw_image(&fitted, x, y);
        }

        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            let outline = style.border_width(icon.is_some()).min(MAX_OUTLINE as u32) as i32;
            self.draw_text_block(&mut canvas, text, style, outline);
        }

        canvas.into_key_image()
    }

    /// Draws wrapped text. A non-zero `outline` first stamps each line in the
    /// border colour at every offset within that many pixels.
    fn draw_text_block(&self, canvas: &mut KeyCanvas, text: &str, style: &Style, outline: i32) {
        let size = canvas.size() as i32;
        let padding = style.padding as i32;
        let renderer = TextRenderer::new(self.fonts.get(&style.font), style.font_size);

        let lines = renderer.wrap(text, (size - 2 * padding).max(1));
        let line_height = renderer.line_height();
        let count = lines.len() as i32;
        let total = count * line_height + (count - 1).max(0) * LINE_SPACING;

        let top = match style.valign {
            VAlign::Top => padding,
            VAlign::Center => (size - total) / 2,
            VAlign::Bottom => size - padding - total,
        } + style.text_offset;

        for (i, line) in lines.iter().enumerate() {
            let width = renderer.text_width(line);
            let x = match style.halign {
                HAlign::Left => padding,
                HAlign::Center => (size - width) / 2,
                HAlign::Right => size - padding - width,
            };
            let y = top + i as i32 * (line_height + LINE_SPACING);
            for dx in -outline..=outline {
                for dy in -outline..=outline {
                    if dx != 0 || dy != 0 {
                        canvas.draw_text(&renderer, x + dx, y + dy, line, style.border_color);
                    }
                }
            }
            canvas.draw_text(&renderer, x, y, line, style.text_color);
        }
    }
}

/// Edge of the square an icon is scaled into.
pub fn icon_area(size: u32, style: &Style) -> u32 {
    size.saturating_sub(2 * style.padding).max(1)
}

/// Scales `icon` to fit a `bound` square, preserving aspect ratio.
pub fn fit_icon(icon: &RgbaImage, bound: u32) -> RgbaImage {
    let (w, h) = icon.dimensions();
    if w == 0 || h == 0 {
        return icon.clone();
    }
    let scale = (bound as f32 / w as f32).min(bound as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, bound);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, bound);
    if (new_w, new_h) == (w, h) {
        return icon.clone();
    }
    image::imageops::resize(icon, new_w, new_h, FilterType::Triangle)
}

fn decode_icon(name: &str, bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|source| RenderError::Decode {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use decky_hw::Rgb;

    fn renderer() -> ButtonRenderer {
        let fonts = FontCache::with_search_dirs(Vec::new()).unwrap();
        ButtonRenderer::with_fonts(fonts, IconResolver::default())
    }

    fn style_with_bg(bg: Rgb) -> Style {
        Style {
            background_color: bg,
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_button() {
        let image = renderer().compose(None, None, &Style::default(), 72);
        assert_eq!(image.size(), 72);
        assert!(image.pixels().iter().all(|&px| px == Rgb::BLACK));
    }

    #[test]
    fn test_text_button_draws_text() {
        let style = style_with_bg(Rgb(0, 0, 80));
        let image = renderer().compose(Some("Play"), None, &style, 72);
        assert_eq!(image.size(), 72);
        assert!(image.pixels().iter().any(|&px| px != Rgb(0, 0, 80)));
        // Corners stay background with no border
        assert_eq!(image.get_pixel(0, 0), Some(Rgb(0, 0, 80)));
    }

    #[test]
    fn test_text_alignment() {
        let r = renderer();
        let top = Style {
            valign: VAlign::Top,
            ..Default::default()
        };
        let bottom = Style {
            valign: VAlign::Bottom,
            ..Default::default()
        };
        let first_lit_row = |image: &KeyImage| {
            (0..image.size())
                .find(|&y| (0..image.size()).any(|x| image.get_pixel(x, y) != Some(Rgb::BLACK)))
                .unwrap()
        };
        let top_row = first_lit_row(&r.compose(Some("Go"), None, &top, 72));
        let bottom_row = first_lit_row(&r.compose(Some("Go"), None, &bottom, 72));
        assert!(top_row < bottom_row);
    }

    #[test]
    fn test_icon_is_centered_and_scaled() {
        let style = Style {
            padding: 0,
            border_size: Some(0),
            ..Default::default()
        };
        let icon = RgbaImage::from_pixel(10, 5, image::Rgba([0, 255, 0, 255]));
        let image = renderer().compose(None, Some(&icon), &style, 72);

        // Scaled to 72x36, centered vertically
        assert_eq!(image.get_pixel(36, 36), Some(Rgb(0, 255, 0)));
        assert_eq!(image.get_pixel(36, 5), Some(Rgb::BLACK));
        assert_eq!(image.get_pixel(36, 66), Some(Rgb::BLACK));
    }

    #[test]
    fn test_text_over_icon_is_outlined_without_frame() {
        let style = Style {
            padding: 0,
            valign: VAlign::Center,
            ..Default::default()
        };
        let icon = RgbaImage::from_pixel(72, 72, image::Rgba([0, 255, 0, 255]));
        let image = renderer().compose(Some("Hi"), Some(&icon), &style, 72);

        // Icon reaches the key edges untouched
        for (x, y) in [(0, 0), (71, 0), (0, 71), (71, 71), (36, 0)] {
            assert_eq!(image.get_pixel(x, y), Some(Rgb(0, 255, 0)), "({}, {})", x, y);
        }
        // Default outline of 1px in black around white text
        assert!(image.pixels().contains(&Rgb::BLACK));
        assert!(image.pixels().contains(&Rgb::WHITE));
    }

    #[test]
    fn test_outline_only_when_requested() {
        let plain = Style {
            background_color: Rgb(0, 0, 90),
            border_color: Rgb(255, 0, 0),
            ..Default::default()
        };
        let outlined = Style {
            border_size: Some(2),
            ..plain.clone()
        };
        let r = renderer();
        let without = r.compose(Some("Ok"), None, &plain, 72);
        let with = r.compose(Some("Ok"), None, &outlined, 72);

        assert!(!without.pixels().contains(&Rgb(255, 0, 0)));
        assert!(with.pixels().contains(&Rgb(255, 0, 0)));
        assert_eq!(with.get_pixel(0, 0), Some(Rgb(0, 0, 90)));
    }

    #[test]
    fn test_fit_icon_preserves_aspect() {
        let icon = RgbaImage::new(200, 100);
        let fitted = fit_icon(&icon, 64);
        assert_eq!(fitted.dimensions(), (64, 32));

        let small = RgbaImage::new(16, 16);
        assert_eq!(fit_icon(&small, 64).dimensions(), (64, 64));
    }

    #[test]
    fn test_corrupt_icon_bytes_fall_back_to_text() {
        let style = style_with_bg(Rgb(40, 0, 0));
        let r = renderer();
        let image = r.render(Some("Mail"), Some(b"not an image"), &style, 72);
        let text_only = r.compose(Some("Mail"), None, &style, 72);
        assert_eq!(image, text_only);
    }

    #[test]
    fn test_unreadable_icon_path_renders_text_on_background() {
        let style = style_with_bg(Rgb(0, 60, 0));
        let spec = ButtonSpec {
            text: Some("Home".to_string()),
            icon: Some("/nonexistent/decky/home.png".to_string()),
            ..Default::default()
        };
        let r = renderer();
        let image = r.render_button(&spec, None, &style, 96);

        assert_eq!(image.size(), 96);
        assert_eq!(image.get_pixel(0, 0), Some(Rgb(0, 60, 0)));
        assert!(image.pixels().iter().any(|&px| px != Rgb(0, 60, 0)));
        assert_eq!(image, r.compose(Some("Home"), None, &style, 96));
    }
}
