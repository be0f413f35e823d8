//! Decky Hardware Library
//!
//! Provides hardware abstraction for Elgato Stream Deck panels on top of
//! the `elgato_streamdeck` driver, plus per-key bitmaps and rotation.

pub mod device;
pub mod error;
pub mod key_image;
pub mod kind;
pub mod rotation;

pub use device::{DeckDevice, DeviceProvider, HidDeck, HidProvider};
pub use error::{Error, Result};
pub use key_image::{parse_hex_color, KeyImage, Rgb};
pub use kind::DeckKind;
pub use rotation::Rotation;

/// USB vendor id shared by all Elgato panels.
pub const ELGATO_VID: u16 = 0x0FD9;
