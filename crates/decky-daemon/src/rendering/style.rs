//! Style cascade: built-in default, global style table, per-button overrides.

use decky_hw::{parse_hex_color, Rgb};
use std::collections::HashMap;
use tracing::warn;

use crate::config::{ButtonSpec, HAlign, StyleConfig, VAlign};

/// Name of the style applied to every button before its own style.
pub const DEFAULT_STYLE: &str = "default";

/// Fully resolved style. Every field has a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub font: String,
    pub font_size: f32,
    pub text_color: Rgb,
    pub background_color: Rgb,
    pub valign: VAlign,
    pub halign: HAlign,
    pub padding: u32,
    pub text_offset: i32,
    /// Unset means "1px when an icon is drawn, none otherwise"
    pub border_size: Option<u32>,
    pub border_color: Rgb,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            font: "DejaVu Sans".to_string(),
            font_size: 14.0,
            text_color: Rgb::WHITE,
            background_color: Rgb::BLACK,
            valign: VAlign::Bottom,
            halign: HAlign::Center,
            padding: 4,
            text_offset: 0,
            border_size: None,
            border_color: Rgb::BLACK,
        }
    }
}

impl Style {
    /// Overlays the fields a layer sets.
    pub fn apply(&mut self, layer: &StyleConfig) {
        if let Some(font) = &layer.font {
            self.font = font.clone();
        }
        if let Some(size) = layer.font_size.filter(|s| s.is_finite() && *s > 0.0) {
            self.font_size = size;
        }
        apply_color(&mut self.text_color, layer.text_color.as_deref(), "text_color");
        apply_color(
            &mut self.background_color,
            layer.background_color.as_deref(),
            "background_color",
        );
        apply_color(&mut self.border_color, layer.border_color.as_deref(), "border_color");
        if let Some(valign) = layer.text_align {
            self.valign = valign;
        }
        if let Some(halign) = layer.text_halign {
            self.halign = halign;
        }
        if let Some(padding) = layer.padding {
            self.padding = padding;
        }
        if let Some(offset) = layer.text_offset {
            self.text_offset = offset;
        }
        if let Some(border) = layer.border_size {
            self.border_size = Some(border);
        }
    }

    /// Border width to draw.
    pub fn border_width(&self, has_icon: bool) -> u32 {
        self.border_size.unwrap_or(u32::from(has_icon))
    }
}

fn apply_color(target: &mut Rgb, value: Option<&str>, field: &str) {
    if let Some(value) = value {
        match parse_hex_color(value) {
            Some(color) => *target = color,
            None => warn!("Ignoring invalid {} '{}'", field, value),
        }
    }
}

/// Resolves the style for a button.
pub fn resolve_style(styles: &HashMap<String, StyleConfig>, button: &ButtonSpec) -> Style {
    let mut style = Style::default();
    if let Some(layer) = styles.get(DEFAULT_STYLE) {
        style.apply(layer);
    }
    if let Some(layer) = button
        .style
        .as_deref()
        .filter(|name| *name != DEFAULT_STYLE)
        .and_then(|name| styles.get(name))
    {
        style.apply(layer);
    }
    style.apply(&button.overrides);
    style
}
