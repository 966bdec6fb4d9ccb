//! Label text rendering
//!
//! TrueType fonts are rasterized with `ab_glyph`. When no candidate font can
//! be loaded, labels fall back to the 8x8 bitmap font from `font8x8`.

use crate::core::layout::Rgb;
use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use font8x8::legacy::BASIC_LEGACY;
use image::RgbImage;
use std::path::PathBuf;
use tracing::{debug, info};

const BITMAP_GLYPH: u32 = 8;

enum Face {
    TrueType(FontVec),
    Bitmap { scale: u32 },
}

/// Draws single-line labels onto key images
pub struct TextRenderer {
    face: Face,
    size: f32,
}

impl TextRenderer {
    /// Use the first candidate that parses, or the built-in font
    pub fn load(candidates: &[PathBuf], size: f32) -> Self {
        for path in candidates {
            let data = match std::fs::read(path) {
                Ok(data) => data,
                Err(e) => {
                    debug!("Font {:?} not readable: {}", path, e);
                    continue;
                }
            };
            // Collections (.ttc) use their first face
            match FontVec::try_from_vec_and_index(data, 0) {
                Ok(font) => {
                    info!("Using font {:?}", path);
                    return Self {
                        face: Face::TrueType(font),
                        size,
                    };
                }
                Err(e) => debug!("Font {:?} not usable: {}", path, e),
            }
        }

        info!("No TrueType font found, using built-in bitmap font");
        Self::builtin(size)
    }

    /// The built-in bitmap font, scaled by whole pixels to roughly `size`
    pub fn builtin(size: f32) -> Self {
        let scale = ((size / BITMAP_GLYPH as f32).floor() as u32).max(1);
        Self {
            face: Face::Bitmap { scale },
            size,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.face, Face::Bitmap { .. })
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    /// Width and height of `text` in pixels
    pub fn measure(&self, text: &str) -> (u32, u32) {
        match &self.face {
            Face::TrueType(font) => {
                let scaled = font.as_scaled(PxScale::from(self.size));
                let mut width = 0.0f32;
                let mut prev = None;
                for c in text.chars() {
                    let id = scaled.glyph_id(c);
                    if let Some(prev) = prev {
                        width += scaled.kern(prev, id);
                    }
                    width += scaled.h_advance(id);
                    prev = Some(id);
                }
                let height = scaled.ascent() - scaled.descent();
                (width.ceil().max(0.0) as u32, height.ceil().max(0.0) as u32)
            }
            Face::Bitmap { scale } => {
                let glyph = BITMAP_GLYPH * scale;
                (text.chars().count() as u32 * glyph, glyph)
            }
        }
    }

    /// Draw `text` with its top-left corner at (x, y), clipped to the image
    pub fn draw(&self, img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb) {
        match &self.face {
            Face::TrueType(font) => draw_truetype(font, self.size, img, text, x, y, color),
            Face::Bitmap { scale } => draw_bitmap(*scale, img, text, x, y, color),
        }
    }
}

fn draw_truetype(font: &FontVec, size: f32, img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb) {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let baseline = y as f32 + scaled.ascent();

    let mut caret = x as f32;
    let mut prev = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, baseline));
        caret += scaled.h_advance(id);
        prev = Some(id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                blend(img, px, py, color, coverage);
            });
        }
    }
}

fn draw_bitmap(scale: u32, img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb) {
    let advance = (BITMAP_GLYPH * scale) as i32;
    for (i, c) in text.chars().enumerate() {
        let code = if c.is_ascii() { c as usize } else { '?' as usize };
        let rows = BASIC_LEGACY[code];
        let origin_x = x + i as i32 * advance;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..BITMAP_GLYPH {
                // Least significant bit is the leftmost pixel
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + (col * scale + dx) as i32;
                        let py = y + (row as u32 * scale + dy) as i32;
                        blend(img, px, py, color, 1.0);
                    }
                }
            }
        }
    }
}

fn blend(img: &mut RgbImage, x: i32, y: i32, color: Rgb, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    let coverage = coverage.clamp(0.0, 1.0);
    let pixel = img.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in pixel.0.iter_mut().zip(color) {
        *dst = (*dst as f32 * (1.0 - coverage) + src as f32 * coverage).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb as Pixel;

    #[test]
    fn test_missing_fonts_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junk.ttf"), b"not a font").unwrap();
        let candidates = vec![dir.path().join("absent.ttf"), dir.path().join("junk.ttf")];

        let text = TextRenderer::load(&candidates, 14.0);
        assert!(text.is_builtin());
        assert_eq!(text.size(), 14.0);
    }

    #[test]
    fn test_builtin_measure() {
        let text = TextRenderer::builtin(14.0);
        assert_eq!(text.measure("Ready"), (40, 8));
        assert_eq!(text.measure(""), (0, 8));

        let big = TextRenderer::builtin(16.0);
        assert_eq!(big.measure("Go"), (32, 16));
    }

    #[test]
    fn test_builtin_draw_marks_pixels() {
        let text = TextRenderer::builtin(8.0);
        let mut img = RgbImage::from_pixel(16, 8, Pixel([0, 0, 0]));
        text.draw(&mut img, "H", 0, 0, [255, 255, 255]);

        let lit = img.pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert!(lit > 0);
        // Second cell stays untouched
        for y in 0..8 {
            for x in 8..16 {
                assert_eq!(img.get_pixel(x, y).0, [0, 0, 0]);
            }
        }
    }

    #[test]
    fn test_draw_clips_outside_image() {
        let text = TextRenderer::builtin(8.0);
        let mut img = RgbImage::from_pixel(4, 4, Pixel([9, 9, 9]));
        text.draw(&mut img, "Offline", -20, -3, [255, 0, 0]);
        text.draw(&mut img, "X", 100, 100, [255, 0, 0]);
    }

    #[test]
    fn test_blend() {
        let mut img = RgbImage::from_pixel(1, 1, Pixel([0, 0, 0]));
        blend(&mut img, 0, 0, [200, 100, 0], 0.5);
        assert_eq!(img.get_pixel(0, 0).0, [100, 50, 0]);
    }
}
