//! Date and time widget.

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use std::fmt::Write;
use tracing::warn;

use super::{Widget, DEFAULT_TIME_FORMAT};
use crate::config::WidgetSpec;

/// Shows local time using a strftime format.
pub struct DateTimeWidget {
    format: String,
}

impl DateTimeWidget {
    /// Creates a widget; an unusable format falls back to the default.
    pub fn new(format: &str) -> Self {
        let valid = !format.is_empty()
            && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
        if !valid {
            warn!(
                "Invalid datetime format '{}', using '{}'",
                format, DEFAULT_TIME_FORMAT
            );
        }
        Self {
            format: if valid { format } else { DEFAULT_TIME_FORMAT }.to_string(),
        }
    }

    /// Creates a widget from its `format` parameter.
    pub fn from_spec(spec: &WidgetSpec) -> Self {
        Self::new(spec.param_str("format").unwrap_or(DEFAULT_TIME_FORMAT))
    }

    /// Formats `time` with this widget's format.
    pub fn format_time<Tz: chrono::TimeZone>(&self, time: &chrono::DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = String::new();
        if write!(out, "{}", time.format(&self.format)).is_err() {
            out.clear();
        }
        out
    }
}

impl Widget for DateTimeWidget {
    fn render_text(&mut self) -> String {
        self.format_time(&Local::now())
    }
}
