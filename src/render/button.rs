//! Key image composition

use super::font::TextRenderer;
use super::icons::IconCache;
use crate::core::layout::Rgb;
use image::imageops::{self, FilterType};
use image::{Rgb as Pixel, RgbImage};
use std::sync::Arc;

/// Icons are scaled to this square size
pub const ICON_SIZE: u32 = 64;

/// Distance from the icon to the top edge
pub const ICON_TOP: u32 = 8;

/// Distance from the label to the bottom edge
pub const LABEL_MARGIN: u32 = 8;

const LABEL_COLOR: Rgb = [255, 255, 255];

/// Renders key images of one pixel size
pub struct ButtonRenderer {
    size: u32,
    icons: Arc<IconCache>,
    text: TextRenderer,
}

impl ButtonRenderer {
    pub fn new(size: u32, icons: Arc<IconCache>, text: TextRenderer) -> Self {
        Self { size, icons, text }
    }

    /// Background, then the icon, then the label
    pub fn render(&self, icon: Option<&str>, title: &str, background: Rgb) -> RgbImage {
        let mut img = self.solid(background);

        if let Some(icon) = icon.and_then(|name| self.icons.get(name)) {
            let icon = if icon.dimensions() == (ICON_SIZE, ICON_SIZE) {
                icon
            } else {
                imageops::resize(&icon, ICON_SIZE, ICON_SIZE, FilterType::Lanczos3)
            };
            let left = (self.size.saturating_sub(ICON_SIZE) / 2) as i64;
            overlay_rgba(&mut img, &icon, left, ICON_TOP as i64);
        }

        if !title.is_empty() {
            let (w, h) = self.text.measure(title);
            let x = (self.size as i32 - w as i32) / 2;
            let y = self.size as i32 - h as i32 - LABEL_MARGIN as i32;
            self.text.draw(&mut img, title, x, y, LABEL_COLOR);
        }

        img
    }

    pub fn solid(&self, color: Rgb) -> RgbImage {
        RgbImage::from_pixel(self.size, self.size, Pixel(color))
    }

    pub fn blank(&self) -> RgbImage {
        self.solid([0, 0, 0])
    }
}

/// Alpha-blend an RGBA image onto an RGB one
fn overlay_rgba(dst: &mut RgbImage, src: &image::RgbaImage, left: i64, top: i64) {
    for (x, y, px) in src.enumerate_pixels() {
        let dx = left + x as i64;
        let dy = top + y as i64;
        if dx < 0 || dy < 0 || dx >= dst.width() as i64 || dy >= dst.height() as i64 {
            continue;
        }
        let alpha = px.0[3] as u32;
        if alpha == 0 {
            continue;
        }
        let out = dst.get_pixel_mut(dx as u32, dy as u32);
        for c in 0..3 {
            out.0[c] = ((px.0[c] as u32 * alpha + out.0[c] as u32 * (255 - alpha) + 127) / 255) as u8;
        }
    }
}
