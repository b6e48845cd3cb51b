//! Bitmap textures
//!
//! [`TextureCache`] uploads bitmaps on first use and keeps them under a byte
//! budget, evicting least recently used entries. Bitmaps larger than the
//! budget are uploaded as transient textures the caller deletes after the
//! draw.

use gloss_paint::{Bitmap, BitmapConfig};
use lru::LruCache;

use crate::device::{GpuDevice, TextureFilter, TextureFormat, TextureId, TextureWrap};
use crate::state::StateCache;

/// A device texture and the facts the renderer needs about it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Texture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Contents may be translucent
    pub blend: bool,
    /// Not owned by a cache, delete after use
    pub cleanup: bool,
}

impl Texture {
    pub fn is_alpha8(&self) -> bool {
        self.format == TextureFormat::Alpha
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Delete the device texture
    pub fn release<D: GpuDevice + ?Sized>(self, device: &mut D, state: &mut StateCache) {
        state.forget_texture(self.id);
        device.delete_texture(self.id);
    }
}

/// Upload tightly packed pixels into a fresh texture
pub fn upload_pixels<D: GpuDevice + ?Sized>(
    device: &mut D,
    state: &mut StateCache,
    format: TextureFormat,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Option<Texture> {
    let limits = device.limits();
    if width > limits.max_texture_size || height > limits.max_texture_size {
        tracing::warn!(
            "pixels too large to be uploaded into a texture ({}x{}, max={})",
            width,
            height,
            limits.max_texture_size
        );
        return None;
    }

    let id = device.create_texture();
    if let Err(err) = device.allocate_texture(id, format, width, height, Some(pixels)) {
        tracing::warn!("failed to upload a {}x{} texture: {}", width, height, err);
        device.delete_texture(id);
        return None;
    }
    state.set_texture_filter(device, id, TextureFilter::Linear, true);
    state.set_texture_wrap(device, id, TextureWrap::Clamp, TextureWrap::Clamp);

    Some(Texture {
        id,
        width,
        height,
        format,
        blend: format == TextureFormat::Alpha,
        cleanup: false,
    })
}

/// Upload a bitmap into a fresh texture
pub fn upload_bitmap<D: GpuDevice + ?Sized>(
    device: &mut D,
    state: &mut StateCache,
    bitmap: &Bitmap,
) -> Option<Texture> {
    let format = match bitmap.config() {
        BitmapConfig::Argb8888 => TextureFormat::Rgba,
        BitmapConfig::Alpha8 => TextureFormat::Alpha,
    };
    let mut texture = upload_pixels(
        device,
        state,
        format,
        bitmap.width(),
        bitmap.height(),
        bitmap.pixels(),
    )?;
    texture.blend = !bitmap.is_opaque() || format == TextureFormat::Alpha;
    Some(texture)
}

/// Cache statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bitmap id to texture, bounded by bytes
pub struct TextureCache {
    entries: LruCache<u64, Texture>,
    size: usize,
    max_size: usize,
    stats: TextureCacheStats,
}

impl TextureCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size: 0,
            max_size,
            stats: TextureCacheStats::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TextureCacheStats {
        self.stats
    }

    /// Texture for `bitmap`. Bitmaps over budget come back with `cleanup`
    /// set. `None` when the device cannot hold the bitmap.
    pub fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        bitmap: &Bitmap,
    ) -> Option<Texture> {
        if let Some(texture) = self.entries.get(&bitmap.id()) {
            self.stats.hits += 1;
            return Some(*texture);
        }
        self.stats.misses += 1;

        let size = bitmap.byte_size();
        if size >= self.max_size {
            return self.get_transient(device, state, bitmap);
        }
        while self.size + size > self.max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.size -= evicted.byte_size();
                    self.stats.evictions += 1;
                    evicted.release(device, state);
                }
                None => break,
            }
        }

        let texture = upload_bitmap(device, state, bitmap)?;
        self.size += texture.byte_size();
        self.entries.put(bitmap.id(), texture);
        Some(texture)
    }

    /// Upload `bitmap` without caching it
    pub fn get_transient<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        bitmap: &Bitmap,
    ) -> Option<Texture> {
        let mut texture = upload_bitmap(device, state, bitmap)?;
        texture.cleanup = true;
        Some(texture)
    }

    /// Drop the texture of a bitmap that is going away
    pub fn remove<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        bitmap_id: u64,
    ) {
        if let Some(texture) = self.entries.pop(&bitmap_id) {
            self.size -= texture.byte_size();
            texture.release(device, state);
        }
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
    use crate::headless::SoftwareDevice;
    use gloss_paint::Color;

    #[test]
    fn test_hit_after_first_upload() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut cache = TextureCache::new(1024 * 1024);
        let bitmap = Bitmap::from_color(4, 4, Color::RED);

        let first = cache.get(&mut device, &mut state, &bitmap).unwrap();
        let second = cache.get(&mut device, &mut state, &bitmap).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.size(), 64);
        assert!(!first.blend);
    }

    #[test]
    fn test_evicts_least_recent_over_budget() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut cache = TextureCache::new(100);
        let a = Bitmap::from_color(4, 4, Color::RED);
        let b = Bitmap::from_color(4, 4, Color::BLUE);

        cache.get(&mut device, &mut state, &a).unwrap();
        cache.get(&mut device, &mut state, &b).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_bitmap_is_transient() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut cache = TextureCache::new(16);
        let bitmap = Bitmap::from_color(4, 4, Color::RED);

        let texture = cache.get(&mut device, &mut state, &bitmap).unwrap();
        assert!(texture.cleanup);
        assert!(cache.is_empty());
    }
}
