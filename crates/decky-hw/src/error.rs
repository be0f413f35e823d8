//! Error types for the Decky hardware library.

use elgato_streamdeck::StreamDeckError;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with a panel.
#[derive(Error, Debug)]
pub enum Error {
    /// No supported panel is attached.
    #[error("no Stream Deck found (VID 0FD9)")]
    DeviceNotFound,

    /// The device node exists but cannot be opened by this user.
    #[error(
        "permission denied opening {path}; install a udev rule granting access to \
         VID 0FD9 (e.g. TAG+=\"uaccess\") and replug the device"
    )]
    PermissionDenied { path: String },

    /// USB HID communication error.
    #[error("USB HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Error reported by the Stream Deck driver.
    #[error("Stream Deck error: {0}")]
    StreamDeck(#[from] StreamDeckError),

    /// The device stopped answering mid-operation.
    #[error("device disconnected")]
    Disconnected,

    /// Key index outside the panel's range.
    #[error("invalid key {key} (device has {count} keys)")]
    InvalidKey { key: usize, count: usize },

    /// Bitmap size does not match the panel's key size.
    #[error("key image size mismatch: expected {expected}, got {actual}")]
    ImageSize { expected: usize, actual: usize },

    /// Invalid rotation value.
    #[error("invalid rotation: {0}")]
    InvalidRotation(String),

    /// Brightness outside 0-100.
    #[error("invalid brightness (must be 0-100): {0}")]
    InvalidBrightness(u8),
}

impl Error {
    /// Returns true for errors that need user action rather than a retry.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::PermissionDenied { .. } => true,
            Error::Hid(e) => hid_message_is_permission(&e.to_string()),
            Error::StreamDeck(StreamDeckError::HidError(e)) => {
                hid_message_is_permission(&e.to_string())
            }
            _ => false,
        }
    }

    /// Returns true for transport errors that mean the handle is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::Hid(_)
                | Error::StreamDeck(StreamDeckError::HidError(_))
                | Error::Disconnected
                | Error::DeviceNotFound
        )
    }
}

/// hidapi reports open failures as free-form strings.
pub(crate) fn hid_message_is_permission(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission denied") || lower.contains("access denied") || lower.contains("eacces")
}
