//! Immutable CPU bitmaps
//!
//! Pixel storage is shared behind an `Arc`, so cloning a bitmap is cheap and
//! every clone keeps the same id. Caches key textures on that id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::color::Color;

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BitmapConfig {
    /// Four bytes per pixel, r g b a, premultiplied
    #[default]
    Argb8888,
    /// One coverage byte per pixel
    Alpha8,
}

impl BitmapConfig {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            BitmapConfig::Argb8888 => 4,
            BitmapConfig::Alpha8 => 1,
        }
    }
}

/// A bitmap with shared, immutable pixels
#[derive(Clone, Debug)]
pub struct Bitmap {
    id: u64,
    width: u32,
    height: u32,
    config: BitmapConfig,
    opaque: bool,
    pixels: Arc<[u8]>,
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Bitmap {
    /// Wrap pixel data. The buffer is resized (zero filled or truncated) to
    /// exactly `width * height * bpp` bytes.
    pub fn new(width: u32, height: u32, config: BitmapConfig, mut pixels: Vec<u8>) -> Self {
        let len = width as usize * height as usize * config.bytes_per_pixel();
        pixels.resize(len, 0);
        let opaque = match config {
            BitmapConfig::Argb8888 => pixels.chunks_exact(4).all(|p| p[3] == 255),
            BitmapConfig::Alpha8 => false,
        };
        Self {
            id: NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            config,
            opaque,
            pixels: pixels.into(),
        }
    }

    /// Solid color bitmap
    pub fn from_color(width: u32, height: u32, color: Color) -> Self {
        let [r, g, b, a] = color.to_rgba8();
        let premul = |c: u8| ((c as u32 * a as u32 + 127) / 255) as u8;
        let px = [premul(r), premul(g), premul(b), a];
        let pixels = px
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, BitmapConfig::Argb8888, pixels)
    }

    /// Build a bitmap from a per-pixel function of unpremultiplied colors
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Color) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let c = f(x, y);
                let [r, g, b, a] = c.premultiplied(1.0).map(|v| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8);
                pixels.extend_from_slice(&[r, g, b, a]);
            }
        }
        Self::new(width, height, BitmapConfig::Argb8888, pixels)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn config(&self) -> BitmapConfig {
        self.config
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.config.bytes_per_pixel()
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Premultiplied pixel value, `None` outside the bitmap
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.row_bytes() + x as usize * self.config.bytes_per_pixel();
        Some(match self.config {
            BitmapConfig::Argb8888 => [
                self.pixels[i],
                self.pixels[i + 1],
                self.pixels[i + 2],
                self.pixels[i + 3],
            ],
            BitmapConfig::Alpha8 => [0, 0, 0, self.pixels[i]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_keeps_id() {
        let a = Bitmap::from_color(2, 2, Color::RED);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), Bitmap::from_color(2, 2, Color::RED).id());
    }

    #[test]
    fn test_from_color_premultiplies() {
        let bitmap = Bitmap::from_color(1, 1, Color::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(bitmap.pixel(0, 0), Some([128, 0, 0, 128]));
        assert!(!bitmap.is_opaque());
        assert!(Bitmap::from_color(1, 1, Color::BLUE).is_opaque());
    }

    #[test]
    fn test_short_buffer_is_padded() {
        let bitmap = Bitmap::new(2, 2, BitmapConfig::Alpha8, vec![255]);
        assert_eq!(bitmap.byte_size(), 4);
        assert_eq!(bitmap.pixel(1, 1), Some([0, 0, 0, 0]));
        assert_eq!(bitmap.pixel(2, 0), None);
    }
}
