//! Text rendering using fontdue.

use decky_hw::Rgb;
use fontdue::{Font, FontSettings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use super::RenderError;

/// Embedded DejaVu Sans font, used when a style's font cannot be found.
const FONT_DATA: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");

/// Name the embedded font answers to.
const FALLBACK_FAMILY: &str = "DejaVu Sans";

/// System font directories, relative ones resolved against `$HOME`.
const SYSTEM_FONT_DIRS: [&str; 2] = ["/usr/share/fonts", "/usr/local/share/fonts"];
const USER_FONT_DIRS: [&str; 2] = [".fonts", ".local/share/fonts"];

/// Loaded fonts keyed by the name a style uses.
pub struct FontCache {
    fallback: Arc<Font>,
    search_dirs: Vec<PathBuf>,
    /// `None` marks a name already reported missing
    loaded: Mutex<HashMap<String, Option<Arc<Font>>>>,
}

impl FontCache {
    /// Creates a cache searching the standard font directories.
    pub fn new() -> Result<Self, RenderError> {
        let mut dirs: Vec<PathBuf> = SYSTEM_FONT_DIRS.iter().map(PathBuf::from).collect();
        if let Ok(home) = std::env::var("HOME") {
            dirs.extend(USER_FONT_DIRS.iter().map(|d| Path::new(&home).join(d)));
        }
        Self::with_search_dirs(dirs)
    }

    /// Creates a cache searching only `search_dirs`.
    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Result<Self, RenderError> {
        let fallback =
            Font::from_bytes(FONT_DATA, FontSettings::default()).map_err(|e| RenderError::Font {
                name: FALLBACK_FAMILY.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            fallback: Arc::new(fallback),
            search_dirs,
            loaded: Mutex::new(HashMap::new()),
        })
    }

    /// The embedded font.
    pub fn fallback(&self) -> Arc<Font> {
        Arc::clone(&self.fallback)
    }

    /// Returns the font for `name`: a font file path or a family name.
    /// Missing fonts are reported once and replaced by the fallback.
    pub fn get(&self, name: &str) -> Arc<Font> {
        if name.is_empty() || normalize(name) == normalize(FALLBACK_FAMILY) {
            return self.fallback();
        }

        let mut loaded = self.loaded.lock();
        if let Some(entry) = loaded.get(name) {
            return entry.clone().unwrap_or_else(|| self.fallback());
        }

        let font = self.load(name);
        match &font {
            Ok(_) => debug!("Loaded font '{}'", name),
            Err(e) => warn!("{}; using {}", e, FALLBACK_FAMILY),
        }
        let font = font.ok().map(Arc::new);
        loaded.insert(name.to_string(), font.clone());
        font.unwrap_or_else(|| self.fallback())
    }

    fn load(&self, name: &str) -> Result<Font, RenderError> {
        let path = if is_font_file(Path::new(name)) {
            PathBuf::from(expand_home(name))
        } else {
            let wanted = normalize(name);
            self.search_dirs
                .iter()
                .find_map(|dir| find_font(dir, &wanted, 0))
                .ok_or_else(|| RenderError::Font {
                    name: name.to_string(),
                    reason: "not found in font directories".to_string(),
                })?
        };

        let data = std::fs::read(&path).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        Font::from_bytes(data, FontSettings::default()).map_err(|e| RenderError::Font {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Lowercases and strips separators so "DejaVu Sans" matches `DejaVuSans.ttf`.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "ttf" | "otf"))
        .unwrap_or(false)
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => path.to_string(),
    }
}

fn find_font(dir: &Path, wanted: &str, depth: usize) -> Option<PathBuf> {
    if depth > 6 {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if is_font_file(&path) {
            let stem = path.file_stem().and_then(|s| s.to_str()).map(normalize);
            if let Some(stem) = stem {
                if stem == wanted || stem == format!("{}regular", wanted) {
                    return Some(path);
                }
            }
        }
    }
    subdirs
        .iter()
        .find_map(|sub| find_font(sub, wanted, depth + 1))
}

/// Text renderer for one font at one size.
pub struct TextRenderer {
    font: Arc<Font>,
    size: f32,
}

impl TextRenderer {
    /// Creates a renderer for `font` at `size` pixels.
    pub fn new(font: Arc<Font>, size: f32) -> Self {
        Self { font, size }
    }

    /// Distance from the top of a line to its baseline.
    pub fn ascent(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.size)
            .map(|m| m.ascent)
            .unwrap_or(self.size * 0.8)
    }

    /// Height of one line without extra spacing.
    pub fn line_height(&self) -> i32 {
        self.font
            .horizontal_line_metrics(self.size)
            .map(|m| m.ascent - m.descent)
            .unwrap_or(self.size * 1.2)
            .ceil() as i32
    }

    /// Returns the advance width of `text`.
    pub fn text_width(&self, text: &str) -> i32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, self.size).advance_width)
            .sum::<f32>()
            .ceil() as i32
    }

    /// Splits `text` into lines no wider than `max_width`. Explicit newlines
    /// are kept; words wider than a line are broken between characters.
    pub fn wrap(&self, text: &str, max_width: i32) -> Vec<String> {
        let mut lines = Vec::new();
        for paragraph in text.split('\n') {
            let mut line = String::new();
            for word in paragraph.split_whitespace() {
                let candidate = if line.is_empty() {
                    word.to_string()
                } else {
                    format!("{} {}", line, word)
                };
                if self.text_width(&candidate) <= max_width {
                    line = candidate;
                    continue;
                }
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                line = self.break_word(word, max_width, &mut lines);
            }
            lines.push(line);
        }
        lines
    }

    /// Pushes full-width pieces of `word` and returns the remainder.
    fn break_word(&self, word: &str, max_width: i32, lines: &mut Vec<String>) -> String {
        let mut piece = String::new();
        for ch in word.chars() {
            piece.push(ch);
            if self.text_width(&piece) > max_width && piece.chars().count() > 1 {
                piece.pop();
                lines.push(std::mem::take(&mut piece));
                piece.push(ch);
            }
        }
        piece
    }

    /// Draws a single line with its top edge at `y`.
    pub fn draw_text(&self, pixmap: &mut Pixmap, x: i32, y: i32, text: &str, color: Rgb) {
        let baseline = y + self.ascent().round() as i32;
        let width = pixmap.width() as i32;
        let height = pixmap.height() as i32;
        let mut cursor_x = x as f32;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.size);
            let left = cursor_x.round() as i32 + metrics.xmin;
            let top = baseline - metrics.ymin - metrics.height as i32;

            for glyph_y in 0..metrics.height {
                for glyph_x in 0..metrics.width {
                    let coverage = bitmap[glyph_y * metrics.width + glyph_x];
                    let px = left + glyph_x as i32;
                    let py = top + glyph_y as i32;
                    if coverage == 0 || px < 0 || py < 0 || px >= width || py >= height {
                        continue;
                    }

                    let idx = (py * width + px) as usize * 4;
                    let data = pixmap.data_mut();

                    // Alpha blend the glyph over the opaque background
                    let alpha = coverage as f32 / 255.0;
                    let inv_alpha = 1.0 - alpha;
                    data[idx] = (color.0 as f32 * alpha + data[idx] as f32 * inv_alpha) as u8;
                    data[idx + 1] =
                        (color.1 as f32 * alpha + data[idx + 1] as f32 * inv_alpha) as u8;
                    data[idx + 2] =
                        (color.2 as f32 * alpha + data[idx + 2] as f32 * inv_alpha) as u8;
                    data[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(size: f32) -> TextRenderer {
        let cache = FontCache::with_search_dirs(Vec::new()).unwrap();
        TextRenderer::new(cache.fallback(), size)
    }

    #[test]
    fn test_metrics() {
        let text = renderer(14.0);
        assert!(text.text_width("Hello") > 0);
        assert!(text.text_width("Hello world") > text.text_width("Hello"));
        assert!(text.line_height() >= 14);
    }

    #[test]
    fn test_wrap_words() {
        let text = renderer(14.0);
        let lines = text.wrap("one two three four five", 50);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text.text_width(line) <= 50, "{} too wide", line);
        }
        assert_eq!(lines.join(" "), "one two three four five");
    }

    #[test]
    fn test_wrap_newlines_and_long_words() {
        let text = renderer(14.0);
        assert_eq!(text.wrap("CPU\n42%", 200), vec!["CPU", "42%"]);

        let lines = text.wrap("Supercalifragilistic", 40);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "Supercalifragilistic");
    }

    #[test]
    fn test_draw_text_marks_pixels() {
        let text = renderer(14.0);
        let mut pixmap = Pixmap::new(72, 72).unwrap();
        text.draw_text(&mut pixmap, 4, 4, "Hi", Rgb::WHITE);
        assert!(pixmap.data().chunks(4).any(|px| px[0] > 0));
    }

    #[test]
    fn test_missing_font_falls_back() {
        let cache = FontCache::with_search_dirs(Vec::new()).unwrap();
        let font = cache.get("No Such Font");
        assert!(Arc::ptr_eq(&font, &cache.fallback()));
        // Second lookup is served from the cache
        assert!(Arc::ptr_eq(&cache.get("No Such Font"), &cache.fallback()));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("DejaVu Sans"), "dejavusans");
        assert_eq!(normalize("Noto-Sans_Mono"), "notosansmono");
    }
}
