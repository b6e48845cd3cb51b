//! Gradient ramps
//!
//! Each distinct stop list becomes a one pixel high RGBA texture sampled by
//! the gradient shader stage. Texels are premultiplied.

use gloss_paint::{Color, GradientStop};
use lru::LruCache;

use crate::device::{GpuDevice, TextureFormat};
use crate::state::StateCache;
use crate::texture::{upload_pixels, Texture};

/// Texels per ramp
pub const GRADIENT_TEXTURE_WIDTH: u32 = 256;

/// Premultiplied ramp for `stops`, sorted by offset. Positions before the
/// first stop and after the last one take the nearest stop color.
pub fn build_ramp(stops: &[GradientStop], width: u32) -> Vec<u8> {
    let mut sorted: Vec<GradientStop> = stops.to_vec();
    sorted.sort_by(|a, b| a.offset.total_cmp(&b.offset));

    let mut pixels = Vec::with_capacity(width as usize * 4);
    for i in 0..width {
        let t = if width > 1 { i as f32 / (width - 1) as f32 } else { 0.0 };
        let color = sample(&sorted, t);
        let premul = color.premultiplied(1.0);
        pixels.extend(premul.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8));
    }
    pixels
}

fn sample(stops: &[GradientStop], t: f32) -> Color {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Color::TRANSPARENT;
    };
    if t <= first.offset {
        return first.color;
    }
    if t >= last.offset {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t >= a.offset && t <= b.offset {
            let span = b.offset - a.offset;
            let f = if span > 0.0 { (t - a.offset) / span } else { 0.0 };
            return Color::new(
                a.color.r + (b.color.r - a.color.r) * f,
                a.color.g + (b.color.g - a.color.g) * f,
                a.color.b + (b.color.b - a.color.b) * f,
                a.color.a + (b.color.a - a.color.a) * f,
            );
        }
    }
    last.color
}

fn key(stops: &[GradientStop]) -> Vec<u32> {
    stops
        .iter()
        .flat_map(|s| {
            [
                s.offset.to_bits(),
                s.color.r.to_bits(),
                s.color.g.to_bits(),
                s.color.b.to_bits(),
                s.color.a.to_bits(),
            ]
        })
        .collect()
}

/// Ramp textures bounded by bytes
pub struct GradientCache {
    entries: LruCache<Vec<u32>, Texture>,
    size: usize,
    max_size: usize,
}

impl GradientCache {
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

    pub fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        stops: &[GradientStop],
    ) -> Option<Texture> {
        let key = key(stops);
        if let Some(texture) = self.entries.get(&key) {
            return Some(*texture);
        }

        let pixels = build_ramp(stops, GRADIENT_TEXTURE_WIDTH);
        let mut texture = upload_pixels(
            device,
            state,
            TextureFormat::Rgba,
            GRADIENT_TEXTURE_WIDTH,
            1,
            &pixels,
        )?;
        texture.blend = stops.iter().any(|s| s.color.a < 1.0);

        let bytes = texture.byte_size();
        while self.size + bytes > self.max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.size -= evicted.byte_size();
                    evicted.release(device, state);
                }
                None => break,
            }
        }
        self.size += bytes;
        self.entries.put(key, texture);
        Some(texture)
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D, state: &mut StateCache) {
        while let Some((_, texture)) = self.entries.pop_lru() {
            texture.release(device, state);
        }
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_endpoints() {
        let stops = [
            GradientStop::new(0.0, Color::RED),
            GradientStop::new(1.0, Color::BLUE),
        ];
        let ramp = build_ramp(&stops, 3);
        assert_eq!(&ramp[0..4], &[255, 0, 0, 255]);
        assert_eq!(&ramp[4..8], &[128, 0, 128, 255]);
        assert_eq!(&ramp[8..12], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_ramp_is_premultiplied() {
        let stops = [
            GradientStop::new(0.0, Color::WHITE.with_alpha(0.5)),
            GradientStop::new(1.0, Color::WHITE.with_alpha(0.5)),
        ];
        let ramp = build_ramp(&stops, 2);
        assert_eq!(&ramp[0..4], &[128, 128, 128, 128]);
    }

    #[test]
    fn test_unsorted_stops_clamp_to_ends() {
        let stops = [
            GradientStop::new(0.75, Color::BLUE),
            GradientStop::new(0.25, Color::RED),
        ];
        let ramp = build_ramp(&stops, 5);
        assert_eq!(&ramp[0..4], &[255, 0, 0, 255]);
        assert_eq!(&ramp[16..20], &[0, 0, 255, 255]);
    }
}
