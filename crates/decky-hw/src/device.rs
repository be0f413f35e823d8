//! Panel communication via the `elgato_streamdeck` driver.

use crate::error::hid_message_is_permission;
use crate::key_image::KeyImage;
use crate::kind::DeckKind;
use crate::rotation::Rotation;
use crate::{Error, Result, ELGATO_VID};
use elgato_streamdeck::{list_devices, new_hidapi, StreamDeck, StreamDeckError, StreamDeckInput};
use std::time::Duration;
use tracing::{debug, info};

/// One open panel.
///
/// Callers serialize access; implementations are not expected to be safe
/// for concurrent writes. Dropping the handle closes the device.
pub trait DeckDevice: Send {
    /// Model of the panel.
    fn kind(&self) -> DeckKind;

    /// Serial number reported at open time.
    fn serial(&self) -> &str;

    /// Last brightness applied, in percent.
    fn brightness(&self) -> u8;

    /// Number of keys.
    fn key_count(&self) -> usize {
        self.kind().key_count()
    }

    /// Key image edge length in pixels.
    fn key_size(&self) -> u32 {
        self.kind().key_size()
    }

    /// Sets backlight brightness in percent.
    fn set_brightness(&mut self, percent: u8) -> Result<()>;

    /// Sets the software rotation applied to subsequent images.
    fn set_rotation(&mut self, rotation: Rotation);

    /// Uploads a bitmap to one key.
    fn set_key_image(&mut self, key: usize, image: &KeyImage) -> Result<()>;

    /// Waits up to `timeout` for a key report.
    ///
    /// Returns `Ok(None)` on timeout or for non-key reports.
    fn read_key_states(&mut self, timeout: Duration) -> Result<Option<Vec<bool>>>;

    /// Cheap round-trip used to detect removal.
    fn probe(&mut self) -> Result<()>;

    /// Clears all keys back to the idle logo.
    fn reset(&mut self) -> Result<()>;
}

/// Opens panels. A fresh enumeration happens on every call.
pub trait DeviceProvider: Send + Sync {
    /// Opens the first supported panel found.
    fn open_first(&self) -> Result<Box<dyn DeckDevice>>;
}

/// Stream Deck driven through `elgato_streamdeck`.
pub struct HidDeck {
    deck: StreamDeck,
    kind: DeckKind,
    serial: String,
    brightness: u8,
    rotation: Rotation,
}

impl HidDeck {
    /// Opens the first attached Stream Deck with key displays.
    pub fn open() -> Result<Self> {
        let api = new_hidapi()?;

        let devices: Vec<_> = list_devices(&api)
            .into_iter()
            .filter_map(|(kind, serial)| {
                debug!("Found {:?} (serial={})", kind, serial);
                DeckKind::from_streamdeck(kind).map(|k| (k, serial))
            })
            .collect();

        let (kind, serial) = devices.into_iter().next().ok_or(Error::DeviceNotFound)?;

        let deck = StreamDeck::connect(&api, kind.to_streamdeck(), &serial).map_err(|e| {
            debug!("Failed to open device: {}", e);
            match e {
                StreamDeckError::HidError(ref hid) if hid_message_is_permission(&hid.to_string()) => {
                    Error::PermissionDenied {
                        path: format!("{} ({})", kind, serial),
                    }
                }
                other => Error::StreamDeck(other),
            }
        })?;

        let serial = match deck.serial_number() {
            Ok(reported) if !reported.is_empty() => reported,
            _ => serial,
        };

        info!(
            "{} opened (VID:{:04X} PID:{:04X}, serial={})",
            kind,
            ELGATO_VID,
            kind.to_streamdeck().product_id(),
            serial
        );

        Ok(Self {
            deck,
            kind,
            serial,
            brightness: 100,
            rotation: Rotation::default(),
        })
    }

    /// Reads the firmware version string.
    pub fn firmware_version(&self) -> Result<String> {
        Ok(self.deck.firmware_version()?)
    }
}

impl DeckDevice for HidDeck {
    fn kind(&self) -> DeckKind {
        self.kind
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(Error::InvalidBrightness(percent));
        }
        self.deck.set_brightness(percent)?;
        self.brightness = percent;
        debug!("Set brightness to {}%", percent);
        Ok(())
    }

    fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    fn set_key_image(&mut self, key: usize, image: &KeyImage) -> Result<()> {
        let count = self.kind.key_count();
        if key >= count {
            return Err(Error::InvalidKey { key, count });
        }
        if image.size() != self.kind.key_size() {
            let edge = self.kind.key_size() as usize;
            return Err(Error::ImageSize {
                expected: edge * edge,
                actual: image.size() as usize * image.size() as usize,
            });
        }

        // The driver applies the model's native mounting flip and encoding
        let upload = image.rotated(self.rotation).to_dynamic_image();
        self.deck.set_button_image(key as u8, upload)?;
        self.deck.flush()?;

        debug!("Key {} updated", key);
        Ok(())
    }

    fn read_key_states(&mut self, timeout: Duration) -> Result<Option<Vec<bool>>> {
        match self.deck.read_input(Some(timeout))? {
            StreamDeckInput::ButtonStateChange(states) => Ok(Some(states)),
            // Dials, touch strip and empty reads carry no key state
            _ => Ok(None),
        }
    }

    fn probe(&mut self) -> Result<()> {
        self.firmware_version().map(|_| ())
    }

    fn reset(&mut self) -> Result<()> {
        self.deck.reset()?;
        debug!("Device reset");
        Ok(())
    }
}

/// Opens real panels through hidapi.
#[derive(Debug, Default, Clone, Copy)]
pub struct HidProvider;

impl DeviceProvider for HidProvider {
    fn open_first(&self) -> Result<Box<dyn DeckDevice>> {
        Ok(Box::new(HidDeck::open()?))
    }
}
