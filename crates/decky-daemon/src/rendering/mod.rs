//! Rendering module for key bitmaps.

mod button;
mod canvas;
mod icons;
mod style;
mod text;

pub use button::{fit_icon, icon_area, ButtonRenderer};
pub use icons::IconResolver;
pub use style::{resolve_style, Style};
pub use text::FontCache;

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing button content. All of them are recovered
/// by falling back to a simpler bitmap.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A font file could not be parsed.
    #[error("failed to load font {name}: {reason}")]
    Font { name: String, reason: String },

    /// Icon reference did not resolve to a file.
    #[error("icon '{0}' not found in any search directory")]
    IconNotFound(String),

    /// Icon file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Icon bytes are not a supported image.
    #[error("cannot decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
}
