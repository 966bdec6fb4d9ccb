//! Key icon loading and caching

use anyhow::Context;
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Icons decoded from `<dir>/<filename>`, each file decoded at most once
///
/// Only successful loads are cached. A missing icon is looked up again on
/// every render so files installed later still show up; it is warned about
/// once and logged at debug level afterwards.
pub struct IconCache {
    dir: PathBuf,
    icons: Mutex<HashMap<String, RgbaImage>>,
    missing: Mutex<HashSet<String>>,
}

impl IconCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            icons: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
        }
    }

    /// Get an icon by filename. The caller owns the returned copy.
    pub fn get(&self, name: &str) -> Option<RgbaImage> {
        if let Some(icon) = self.icons.lock().get(name) {
            return Some(icon.clone());
        }

        let path = self.dir.join(name);
        match load_png(&path) {
            Ok(icon) => {
                debug!("Loaded icon {:?} ({}x{})", path, icon.width(), icon.height());
                self.missing.lock().remove(name);
                self.icons.lock().insert(name.to_string(), icon.clone());
                Some(icon)
            }
            Err(e) => {
                if self.missing.lock().insert(name.to_string()) {
                    warn!("Icon {:?} unavailable: {:#}", path, e);
                } else {
                    debug!("Icon {:?} still unavailable: {:#}", path, e);
                }
                None
            }
        }
    }

    /// Number of icons decoded so far
    pub fn len(&self) -> usize {
        self.icons.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_png(path: &Path) -> anyhow::Result<RgbaImage> {
    let data = std::fs::read(path).context("Failed to read icon")?;
    decode_png(&data)
}

/// Decode PNG data into RGBA
pub fn decode_png(data: &[u8]) -> anyhow::Result<RgbaImage> {
    let mut decoder = png::Decoder::new(std::io::Cursor::new(data));
    // Palette and 16-bit images come out as 8-bit RGB(A)
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder.read_info()?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    buf.truncate(info.buffer_size());

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks(2)
            .flat_map(|c| [c[0], c[0], c[0], c[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => anyhow::bail!("Indexed color not expanded"),
    };

    RgbaImage::from_raw(info.width, info.height, rgba)
        .ok_or_else(|| anyhow::anyhow!("PNG buffer does not match {}x{}", info.width, info.height))
}
