//! Text shadow textures
//!
//! A shadow is the coverage of a string blurred by the shadow radius. The
//! result is uploaded as an alpha texture and reused for every draw of the
//! same string, size and radius.

use gloss_paint::{Paint, Point};
use lru::LruCache;

use crate::device::{GpuDevice, TextureFormat};
use crate::font::FontRenderer;
use crate::state::StateCache;
use crate::tessellator::AlphaMask;
use crate::texture::{upload_pixels, Texture};

/// Blurred text coverage. Texel `(0, 0)` sits at `(x - left, y - top)` for
/// text drawn with its pen at `(x, y)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowTexture {
    pub texture: Texture,
    pub left: f32,
    pub top: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ShadowKey {
    text: String,
    text_size: u32,
    radius: u32,
    flags: u32,
    positions: Vec<u32>,
}

/// Convert a blur radius into a gaussian sigma
fn sigma(radius: f32) -> f32 {
    if radius > 0.0 {
        radius * 0.57735 + 0.5
    } else {
        0.0
    }
}

/// Separable gaussian blur, growing the mask by the kernel reach on each side.
/// Returns the blurred mask and that reach.
pub fn blur(mask: &AlphaMask, radius: f32) -> (AlphaMask, u32) {
    let sigma = sigma(radius);
    if sigma <= 0.0 {
        return (mask.clone(), 0);
    }
    let reach = (sigma * 3.0).ceil() as i32;
    let kernel: Vec<f32> = {
        let raw: Vec<f32> = (-reach..=reach)
            .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
            .collect();
        let sum: f32 = raw.iter().sum();
        raw.into_iter().map(|k| k / sum).collect()
    };

    let pad = reach as u32;
    let (w, h) = (mask.width + pad * 2, mask.height + pad * 2);
    let src = |x: i32, y: i32| -> f32 {
        let (mx, my) = (x - reach, y - reach);
        if mx < 0 || my < 0 {
            return 0.0;
        }
        mask.get(mx as u32, my as u32) as f32
    };

    let mut horizontal = vec![0.0f32; (w * h) as usize];
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                acc += src(x + k as i32 - reach, y) * weight;
            }
            horizontal[(y as u32 * w + x as u32) as usize] = acc;
        }
    }

    let mut out = AlphaMask::new(w, h);
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = y + k as i32 - reach;
                if sy >= 0 && sy < h as i32 {
                    acc += horizontal[(sy as u32 * w + x as u32) as usize] * weight;
                }
            }
            out.pixels[(y as u32 * w + x as u32) as usize] = (acc + 0.5).clamp(0.0, 255.0) as u8;
        }
    }
    (out, pad)
}

/// Shadow textures bounded by bytes
pub struct DropShadowCache {
    entries: LruCache<ShadowKey, ShadowTexture>,
    size: usize,
    max_size: usize,
}

impl DropShadowCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size: 0,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        font: &dyn FontRenderer,
        text: &str,
        paint: &Paint,
        radius: f32,
        positions: Option<&[Point]>,
    ) -> Option<ShadowTexture> {
        let key = ShadowKey {
            text: text.to_owned(),
            text_size: paint.text_size.to_bits(),
            radius: radius.to_bits(),
            flags: paint.flags.bits(),
            positions: positions
                .unwrap_or_default()
                .iter()
                .flat_map(|p| [p.x.to_bits(), p.y.to_bits()])
                .collect(),
        };
        if let Some(entry) = self.entries.get(&key) {
            return Some(*entry);
        }

        let text_mask = font.rasterize(text, paint, positions)?;
        let (blurred, pad) = blur(&text_mask.mask, radius);
        if blurred.width == 0 || blurred.height == 0 {
            return None;
        }
        let texture = upload_pixels(
            device,
            state,
            TextureFormat::Alpha,
            blurred.width,
            blurred.height,
            &blurred.pixels,
        )?;
        let entry = ShadowTexture {
            texture,
            left: -text_mask.left + pad as f32,
            top: -text_mask.top + pad as f32,
        };

        let bytes = texture.byte_size();
        while self.size + bytes > self.max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.size -= evicted.texture.byte_size();
                    evicted.texture.release(device, state);
                }
                None => break,
            }
        }
        self.size += bytes;
        self.entries.put(key, entry);
        Some(entry)
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D, state: &mut StateCache) {
        while let Some((_, entry)) = self.entries.pop_lru() {
            entry.texture.release(device, state);
        }
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gloss_paint::IRect;

    #[test]
    fn test_zero_radius_keeps_mask() {
        let mut mask = AlphaMask::new(4, 4);
        mask.fill_rect(IRect::new(1, 1, 3, 3));
        let (out, pad) = blur(&mask, 0.0);
        assert_eq!(pad, 0);
        assert_eq!(out, mask);
    }

    #[test]
    fn test_blur_spreads_and_conserves() {
        let mut mask = AlphaMask::new(4, 4);
        mask.fill_rect(IRect::new(0, 0, 4, 4));
        let (out, pad) = blur(&mask, 2.0);
        assert!(pad > 0);
        assert_eq!(out.width, 4 + pad * 2);
        // Edges soften, the corner of the padded area stays almost empty
        assert!(out.get(pad + 1, pad + 1) < 255);
        assert!(out.get(pad + 1, pad + 1) > 0);
        assert!(out.get(0, 0) < 8);
        let before: u32 = mask.pixels.iter().map(|&p| p as u32).sum();
        let after: u32 = out.pixels.iter().map(|&p| p as u32).sum();
        assert!((after as i64 - before as i64).abs() < before as i64 / 10);
    }
}
