//! Elgato Stream Deck protocol (second generation devices)
//!
//! - Feature reports are 32 bytes, report id first
//! - Key images are JPEG, rotated 180 degrees, split into 1024-byte
//!   output reports with an 8-byte header
//! - Input reports carry one byte per key starting at offset 4

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageError, RgbImage};

/// Elgato USB vendor id
pub const ELGATO_VENDOR_ID: u16 = 0x0FD9;

pub const FEATURE_REPORT_SIZE: usize = 32;
pub const IMAGE_REPORT_SIZE: usize = 1024;
pub const IMAGE_HEADER_SIZE: usize = 8;
pub const IMAGE_PAYLOAD_SIZE: usize = IMAGE_REPORT_SIZE - IMAGE_HEADER_SIZE;
pub const INPUT_REPORT_SIZE: usize = 512;
pub const KEY_STATE_OFFSET: usize = 4;

const REPORT_FEATURE: u8 = 0x03;
const REPORT_IMAGE: u8 = 0x02;
const REPORT_SERIAL: u8 = 0x06;
const CMD_RESET: u8 = 0x02;
const CMD_BRIGHTNESS: u8 = 0x08;
const CMD_SET_IMAGE: u8 = 0x07;

const JPEG_QUALITY: u8 = 95;

/// Static description of a deck model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    pub name: &'static str,
    pub product_id: u16,
    pub key_count: usize,
    pub columns: usize,
    pub key_pixels: u32,
    /// Speaks the protocol implemented here
    pub supported: bool,
}

impl Model {
    pub fn rows(&self) -> usize {
        self.key_count / self.columns
    }
}

/// Known Elgato decks
pub const MODELS: &[Model] = &[
    Model { name: "Stream Deck Original", product_id: 0x0060, key_count: 15, columns: 5, key_pixels: 72, supported: false },
    Model { name: "Stream Deck Mini", product_id: 0x0063, key_count: 6, columns: 3, key_pixels: 80, supported: false },
    Model { name: "Stream Deck XL", product_id: 0x006C, key_count: 32, columns: 8, key_pixels: 96, supported: true },
    Model { name: "Stream Deck Original v2", product_id: 0x006D, key_count: 15, columns: 5, key_pixels: 72, supported: true },
    Model { name: "Stream Deck MK.2", product_id: 0x0080, key_count: 15, columns: 5, key_pixels: 72, supported: true },
    Model { name: "Stream Deck Plus", product_id: 0x0084, key_count: 8, columns: 4, key_pixels: 120, supported: false },
    Model { name: "Stream Deck XL v2", product_id: 0x008F, key_count: 32, columns: 8, key_pixels: 96, supported: true },
    Model { name: "Stream Deck Mini v2", product_id: 0x0090, key_count: 6, columns: 3, key_pixels: 80, supported: false },
    Model { name: "Stream Deck Neo", product_id: 0x009A, key_count: 8, columns: 4, key_pixels: 96, supported: false },
];

/// Look up a model by USB product id
pub fn model_for(product_id: u16) -> Option<&'static Model> {
    MODELS.iter().find(|m| m.product_id == product_id)
}

fn feature_report(bytes: &[u8]) -> [u8; FEATURE_REPORT_SIZE] {
    let mut report = [0u8; FEATURE_REPORT_SIZE];
    report[..bytes.len()].copy_from_slice(bytes);
    report
}

/// Clears all keys and shows the Elgato logo
pub fn reset_report() -> [u8; FEATURE_REPORT_SIZE] {
    feature_report(&[REPORT_FEATURE, CMD_RESET])
}

/// Brightness in percent, clamped to 100
pub fn brightness_report(percent: u8) -> [u8; FEATURE_REPORT_SIZE] {
    feature_report(&[REPORT_FEATURE, CMD_BRIGHTNESS, percent.min(100)])
}

/// Buffer for reading the serial number feature report
pub fn serial_request() -> [u8; FEATURE_REPORT_SIZE] {
    feature_report(&[REPORT_SERIAL])
}

/// Serial number from a feature report response
pub fn parse_serial(report: &[u8]) -> Option<String> {
    let data = report.get(2..)?;
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let serial = String::from_utf8_lossy(&data[..end]).trim().to_string();
    (!serial.is_empty()).then_some(serial)
}

/// Encode a key image: scaled to `pixels`, rotated 180 degrees, JPEG
pub fn encode_key_image(image: &RgbImage, pixels: u32) -> Result<Vec<u8>, ImageError> {
    let rotated = if image.dimensions() == (pixels, pixels) {
        imageops::rotate180(image)
    } else {
        let scaled = imageops::resize(image, pixels, pixels, FilterType::Lanczos3);
        imageops::rotate180(&scaled)
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rotated)?;
    Ok(jpeg)
}

/// Split encoded image data into output reports for `key`
pub fn image_reports(key: u8, data: &[u8]) -> Vec<[u8; IMAGE_REPORT_SIZE]> {
    let pages = data.len().div_ceil(IMAGE_PAYLOAD_SIZE).max(1);

    (0..pages)
        .map(|page| {
            let start = page * IMAGE_PAYLOAD_SIZE;
            let chunk = &data[start.min(data.len())..(start + IMAGE_PAYLOAD_SIZE).min(data.len())];
            let is_last = page + 1 == pages;

            let mut report = [0u8; IMAGE_REPORT_SIZE];
            report[0] = REPORT_IMAGE;
            report[1] = CMD_SET_IMAGE;
            report[2] = key;
            report[3] = is_last as u8;
            report[4..6].copy_from_slice(&(chunk.len() as u16).to_le_bytes());
            report[6..8].copy_from_slice(&(page as u16).to_le_bytes());
            report[IMAGE_HEADER_SIZE..IMAGE_HEADER_SIZE + chunk.len()].copy_from_slice(chunk);
            report
        })
        .collect()
}

/// Key states from an input report, `None` if the report is too short
pub fn parse_key_states(report: &[u8], key_count: usize) -> Option<Vec<bool>> {
    let states = report.get(KEY_STATE_OFFSET..KEY_STATE_OFFSET + key_count)?;
    Some(states.iter().map(|&b| b != 0).collect())
}

/// Keys whose state differs between two snapshots, as `(key, pressed)`
pub fn key_edges(previous: &[bool], current: &[bool]) -> Vec<(u8, bool)> {
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(key, (_, &pressed))| (key as u8, pressed))
        .collect()
}
