//! Device driver seam
//!
//! The controller only talks to these traits. [`super::device::HidDriver`]
//! implements them over USB, [`super::mock::MockDriver`] in memory.

use image::RgbImage;

/// Receives every key edge as `(key, pressed)`, usually on a driver thread
pub type KeyCallback = Box<dyn Fn(u8, bool) + Send + Sync>;

/// An attached deck as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckInfo {
    /// Driver specific handle used to open the deck (HID path for USB)
    pub id: String,
    pub model: String,
    pub product_id: u16,
    pub key_count: usize,
    /// Edge length of the square key images
    pub key_pixels: u32,
    pub serial: Option<String>,
}

/// Errors from driver and deck operations
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Device disconnected")]
    Disconnected,
    #[error("Invalid key index {0}")]
    InvalidKey(u8),
    #[error("Unsupported device: {0}")]
    Unsupported(String),
}

/// Finds and opens decks
pub trait DeckDriver: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeckInfo>, DeckError>;
    fn open(&self, info: &DeckInfo) -> Result<Box<dyn Deck>, DeckError>;
}

/// One open deck
pub trait Deck: Send {
    fn info(&self) -> &DeckInfo;

    fn key_count(&self) -> usize {
        self.info().key_count
    }

    fn key_pixels(&self) -> u32 {
        self.info().key_pixels
    }

    /// Clear all keys and restore the device default state
    fn reset(&mut self) -> Result<(), DeckError>;

    /// Set brightness in percent (0-100)
    fn set_brightness(&mut self, percent: u8) -> Result<(), DeckError>;

    /// Replace the key edge callback
    fn set_key_callback(&mut self, callback: KeyCallback);

    /// Show `image` on `key`; it is scaled to the key size if needed
    fn set_key_image(&mut self, key: u8, image: &RgbImage) -> Result<(), DeckError>;

    fn is_connected(&self) -> bool;

    /// Release the device; further calls fail with [`DeckError::Disconnected`]
    fn close(&mut self);
}
