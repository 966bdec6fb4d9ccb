//! USB Stream Deck access over hidapi

use super::driver::{Deck, DeckDriver, DeckError, DeckInfo, KeyCallback};
use super::protocol::{self, Model, INPUT_REPORT_SIZE};
use anyhow::{Context, Result};
use hidapi::{HidApi, HidDevice};
use image::RgbImage;
use parking_lot::Mutex;
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Read timeout per input poll; writers wait at most this long for the device
const READ_TIMEOUT_MS: i32 = 10;

/// Pause between polls when the device lock is taken
const READ_BACKOFF: Duration = Duration::from_millis(5);

/// Enumerates and opens Elgato decks
pub struct HidDriver {
    api: Mutex<HidApi>,
    vendor_id: u16,
}

impl HidDriver {
    pub fn new(vendor_id: u16) -> Result<Self> {
        let api = HidApi::new().context("Failed to initialize HID API")?;
        Ok(Self {
            api: Mutex::new(api),
            vendor_id,
        })
    }
}

impl DeckDriver for HidDriver {
    fn enumerate(&self) -> Result<Vec<DeckInfo>, DeckError> {
        let mut api = self.api.lock();
        api.refresh_devices()?;

        let mut decks: Vec<DeckInfo> = Vec::new();
        for dev in api.device_list().filter(|d| d.vendor_id() == self.vendor_id) {
            let Some(model) = protocol::model_for(dev.product_id()) else {
                debug!("Ignoring unknown Elgato product 0x{:04X}", dev.product_id());
                continue;
            };
            if !model.supported {
                debug!("Ignoring unsupported {}", model.name);
                continue;
            }

            let id = dev.path().to_string_lossy().into_owned();
            if decks.iter().any(|d| d.id == id) {
                continue;
            }
            decks.push(DeckInfo {
                id,
                model: model.name.to_string(),
                product_id: model.product_id,
                key_count: model.key_count,
                key_pixels: model.key_pixels,
                serial: dev.serial_number().map(str::to_string),
            });
        }

        debug!("Found {} Stream Deck(s)", decks.len());
        Ok(decks)
    }

    fn open(&self, info: &DeckInfo) -> Result<Box<dyn Deck>, DeckError> {
        let model = protocol::model_for(info.product_id)
            .filter(|m| m.supported)
            .ok_or_else(|| DeckError::Unsupported(info.model.clone()))?;
        let path = CString::new(info.id.as_str()).map_err(|_| DeckError::Unsupported(info.id.clone()))?;

        let device = self.api.lock().open_path(&path)?;
        let mut info = info.clone();
        if let Some(serial) = read_serial(&device) {
            info.serial = Some(serial);
        }

        info!(
            "Opened {} ({}x{} keys, serial {})",
            info.model,
            model.columns,
            model.rows(),
            info.serial.as_deref().unwrap_or("unknown")
        );
        Ok(Box::new(HidDeck::new(device, info, model)))
    }
}

fn read_serial(device: &HidDevice) -> Option<String> {
    let mut buf = protocol::serial_request();
    match device.get_feature_report(&mut buf) {
        Ok(n) => protocol::parse_serial(&buf[..n.min(buf.len())]),
        Err(e) => {
            debug!("Failed to read serial number: {}", e);
            None
        }
    }
}

/// An open USB deck with its input reader thread
pub struct HidDeck {
    info: DeckInfo,
    model: &'static Model,
    device: Arc<Mutex<Option<HidDevice>>>,
    callback: Arc<Mutex<Option<KeyCallback>>>,
    connected: Arc<AtomicBool>,
    stop_reader: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl HidDeck {
    fn new(device: HidDevice, info: DeckInfo, model: &'static Model) -> Self {
        let mut deck = Self {
            info,
            model,
            device: Arc::new(Mutex::new(Some(device))),
            callback: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(true)),
            stop_reader: Arc::new(AtomicBool::new(false)),
            reader: None,
        };
        deck.start_reader();
        deck
    }

    /// Poll input reports and turn state changes into key edges
    fn start_reader(&mut self) {
        let device = Arc::clone(&self.device);
        let callback = Arc::clone(&self.callback);
        let connected = Arc::clone(&self.connected);
        let stop = Arc::clone(&self.stop_reader);
        let key_count = self.model.key_count;

        self.reader = Some(thread::spawn(move || {
            debug!("Key reader thread started");
            let mut states = vec![false; key_count];
            let mut buf = [0u8; INPUT_REPORT_SIZE];

            while !stop.load(Ordering::Relaxed) {
                let read = {
                    let Some(guard) = device.try_lock() else {
                        thread::sleep(READ_BACKOFF);
                        continue;
                    };
                    match guard.as_ref() {
                        Some(dev) => dev.read_timeout(&mut buf, READ_TIMEOUT_MS),
                        None => break,
                    }
                };

                match read {
                    Ok(0) => thread::sleep(READ_BACKOFF),
                    Ok(n) => {
                        let Some(current) = protocol::parse_key_states(&buf[..n], key_count) else {
                            continue;
                        };
                        let edges = protocol::key_edges(&states, &current);
                        states = current;
                        if edges.is_empty() {
                            continue;
                        }
                        if let Some(cb) = callback.lock().as_ref() {
                            for (key, pressed) in edges {
                                cb(key, pressed);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Stream Deck read failed: {}", e);
                        connected.store(false, Ordering::Relaxed);
                        break;
                    }
                }
            }
            debug!("Key reader thread stopped");
        }));
    }

    fn with_device<T>(&self, f: impl FnOnce(&HidDevice) -> Result<T, hidapi::HidError>) -> Result<T, DeckError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(DeckError::Disconnected);
        }
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(DeckError::Disconnected)?;
        f(device).map_err(|e| {
            self.connected.store(false, Ordering::Relaxed);
            DeckError::from(e)
        })
    }
}

impl Deck for HidDeck {
    fn info(&self) -> &DeckInfo {
        &self.info
    }

    fn reset(&mut self) -> Result<(), DeckError> {
        self.with_device(|dev| dev.send_feature_report(&protocol::reset_report()))
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeckError> {
        self.with_device(|dev| dev.send_feature_report(&protocol::brightness_report(percent)))?;
        debug!("Brightness set to {}%", percent.min(100));
        Ok(())
    }

    fn set_key_callback(&mut self, callback: KeyCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn set_key_image(&mut self, key: u8, image: &RgbImage) -> Result<(), DeckError> {
        if key as usize >= self.model.key_count {
            return Err(DeckError::InvalidKey(key));
        }
        let jpeg = protocol::encode_key_image(image, self.model.key_pixels)?;
        let reports = protocol::image_reports(key, &jpeg);
        self.with_device(|dev| {
            for report in &reports {
                dev.write(report)?;
            }
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn close(&mut self) {
        self.stop_reader.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Key reader thread panicked");
            }
        }
        if self.device.lock().take().is_some() {
            info!("Closed {}", self.info.model);
        }
        self.connected.store(false, Ordering::Relaxed);
        self.callback.lock().take();
    }
}

impl Drop for HidDeck {
    fn drop(&mut self) {
        self.close();
    }
}
