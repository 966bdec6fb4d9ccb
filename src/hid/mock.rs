//! In-memory deck driver
//!
//! Records every deck call and lets tests inject key edges and unplug
//! events from any thread. Also backs the `mock-hid` build of the binary.

use super::driver::{Deck, DeckDriver, DeckError, DeckInfo, KeyCallback};
use super::protocol;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A recorded deck call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Reset,
    Brightness(u8),
    Image { key: u8, image: RgbImage },
    Close,
}

type SharedCallback = Arc<dyn Fn(u8, bool) + Send + Sync>;

#[derive(Default)]
struct Shared {
    decks: Mutex<Vec<DeckInfo>>,
    calls: Mutex<Vec<MockCall>>,
    callback: Mutex<Option<SharedCallback>>,
    connected: AtomicBool,
    fail_enumerate: AtomicBool,
    fail_open: AtomicBool,
    fail_reset: AtomicBool,
    opens: AtomicUsize,
}

/// Driver handle; clones share the same simulated hardware
#[derive(Clone, Default)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

impl MockDriver {
    /// No decks attached
    pub fn new() -> Self {
        Self::default()
    }

    /// One Stream Deck XL attached
    pub fn xl() -> Self {
        let driver = Self::new();
        driver.attach(Self::xl_info());
        driver
    }

    pub fn xl_info() -> DeckInfo {
        Self::info_for(0x006C, "mock-xl")
    }

    /// Deck info for a model from the product table
    pub fn info_for(product_id: u16, id: &str) -> DeckInfo {
        let model = protocol::model_for(product_id);
        DeckInfo {
            id: id.to_string(),
            model: model.map_or("Unknown", |m| m.name).to_string(),
            product_id,
            key_count: model.map_or(0, |m| m.key_count),
            key_pixels: model.map_or(72, |m| m.key_pixels),
            serial: Some(format!("{}-serial", id)),
        }
    }

    pub fn attach(&self, info: DeckInfo) {
        self.shared.decks.lock().push(info);
    }

    /// Remove every deck; an open deck reports itself disconnected
    pub fn unplug(&self) {
        self.shared.decks.lock().clear();
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    pub fn set_fail_enumerate(&self, fail: bool) {
        self.shared.fail_enumerate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reset(&self, fail: bool) {
        self.shared.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Deliver a key edge through the installed callback
    pub fn emit(&self, key: u8, pressed: bool) -> bool {
        let callback = self.shared.callback.lock().clone();
        match callback {
            Some(cb) => {
                cb(key, pressed);
                true
            }
            None => false,
        }
    }

    /// Press and release a key
    pub fn press(&self, key: u8) -> bool {
        self.emit(key, true) && self.emit(key, false)
    }

    pub fn is_open(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.shared.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    /// Every image pushed to `key`, oldest first
    pub fn images(&self, key: u8) -> Vec<RgbImage> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::Image { key: k, image } if *k == key => Some(image.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_image(&self, key: u8) -> Option<RgbImage> {
        self.images(key).pop()
    }
}

impl DeckDriver for MockDriver {
    fn enumerate(&self) -> Result<Vec<DeckInfo>, DeckError> {
        if self.shared.fail_enumerate.load(Ordering::SeqCst) {
            return Err(DeckError::Disconnected);
        }
        Ok(self.shared.decks.lock().clone())
    }

    fn open(&self, info: &DeckInfo) -> Result<Box<dyn Deck>, DeckError> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(DeckError::Disconnected);
        }
        if !self.shared.decks.lock().contains(info) {
            return Err(DeckError::Disconnected);
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(Box::new(MockDeck {
            info: info.clone(),
            shared: Arc::clone(&self.shared),
            open: true,
        }))
    }
}

/// Deck returned by [`MockDriver::open`]
pub struct MockDeck {
    info: DeckInfo,
    shared: Arc<Shared>,
    open: bool,
}

impl MockDeck {
    fn record(&self, call: MockCall) -> Result<(), DeckError> {
        if !self.is_connected() {
            return Err(DeckError::Disconnected);
        }
        self.shared.calls.lock().push(call);
        Ok(())
    }
}

impl Deck for MockDeck {
    fn info(&self) -> &DeckInfo {
        &self.info
    }

    fn reset(&mut self) -> Result<(), DeckError> {
        if self.shared.fail_reset.load(Ordering::SeqCst) {
            return Err(DeckError::Disconnected);
        }
        self.record(MockCall::Reset)
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeckError> {
        self.record(MockCall::Brightness(percent.min(100)))
    }

    fn set_key_callback(&mut self, callback: KeyCallback) {
        *self.shared.callback.lock() = Some(Arc::from(callback));
    }

    fn set_key_image(&mut self, key: u8, image: &RgbImage) -> Result<(), DeckError> {
        if key as usize >= self.info.key_count {
            return Err(DeckError::InvalidKey(key));
        }
        self.record(MockCall::Image {
            key,
            image: image.clone(),
        })
    }

    fn is_connected(&self) -> bool {
        self.open && self.shared.connected.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.callback.lock().take();
        self.shared.calls.lock().push(MockCall::Close);
    }
}
