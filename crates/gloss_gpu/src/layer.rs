//! Off-screen layers and the pools that recycle them
//!
//! A [`Layer`] is a move-only value: the pool hands it out by value and takes
//! it back by value. `put` returns the layer to the caller when the pool
//! refuses it, and the caller releases it right away. Hardware layers that
//! outlive a frame are shared as [`SharedLayer`].

use std::sync::Arc;

use gloss_paint::{ColorFilter, IRect, Matrix4, Rect, Region, TransferMode};
use parking_lot::Mutex;

use crate::device::{FramebufferId, GpuDevice, RenderBufferId, TextureFilter, TextureFormat, TextureWrap};
use crate::display_list::DisplayList;
use crate::state::StateCache;
use crate::texture::Texture;

/// Layer textures are allocated in multiples of this many pixels
pub const LAYER_SIZE: u32 = 64;

/// Round a layer dimension up to the pool granularity
pub fn round_layer_size(size: u32) -> u32 {
    size.div_ceil(LAYER_SIZE).max(1) * LAYER_SIZE
}

/// Layer shared between the frame and the code scheduling its updates
pub type SharedLayer = Arc<Mutex<Layer>>;

/// A display list waiting to be rendered into a layer
#[derive(Clone)]
pub struct DeferredUpdate {
    pub display_list: Arc<dyn DisplayList>,
    pub dirty: Rect,
}

impl std::fmt::Debug for DeferredUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredUpdate")
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// An off-screen drawing surface
#[derive(Debug)]
pub struct Layer {
    texture: Texture,
    /// Bounds in the parent's coordinates
    pub bounds: Rect,
    /// Texture coordinates of `bounds` inside the texture, `(left, top,
    /// right, bottom)`; top is the larger `v` because rows run bottom-up
    pub tex_coords: Rect,
    /// Clip in the layer's own coordinates
    pub clip_rect: Rect,
    pub alpha: u8,
    pub mode: TransferMode,
    pub blend: bool,
    /// Pixels touched since the last composition, in layer coordinates
    pub region: Region,
    pub color_filter: Option<ColorFilter>,
    /// Texture storage has not been allocated yet
    pub empty: bool,
    pub fbo: Option<FramebufferId>,
    pub stencil: Option<(RenderBufferId, u32, u32)>,
    pub cacheable: bool,
    /// Backed by an externally produced texture
    pub texture_layer: bool,
    pub external: bool,
    pub texture_transform: Matrix4,
    /// Draw through this matrix when compositing a texture layer
    pub transform: Matrix4,
    pub deferred_update: Option<DeferredUpdate>,
    /// Tint the next draw of this layer
    pub debug_draw_update: bool,
}

impl Layer {
    /// Wrap a freshly created texture
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            bounds: Rect::EMPTY,
            tex_coords: Rect::new(0.0, 1.0, 1.0, 0.0),
            clip_rect: Rect::EMPTY,
            alpha: 255,
            mode: TransferMode::SrcOver,
            blend: true,
            region: Region::new(),
            color_filter: None,
            empty: true,
            fbo: None,
            stencil: None,
            cacheable: true,
            texture_layer: false,
            external: false,
            texture_transform: Matrix4::IDENTITY,
            transform: Matrix4::IDENTITY,
            deferred_update: None,
            debug_draw_update: false,
        }
    }

    pub fn texture(&self) -> Texture {
        self.texture
    }

    /// Width of the backing texture
    pub fn width(&self) -> u32 {
        self.texture.width
    }

    /// Height of the backing texture
    pub fn height(&self) -> u32 {
        self.texture.height
    }

    pub fn is_texture_layer(&self) -> bool {
        self.texture_layer
    }

    /// Schedule `display_list` to be rendered into the layer before its next
    /// use. Dirty rects of successive schedules are merged.
    pub fn set_deferred_update(&mut self, display_list: Arc<dyn DisplayList>, dirty: Rect) {
        let mut dirty = dirty;
        if let Some(previous) = &self.deferred_update {
            dirty.union_with(&previous.dirty);
        }
        self.deferred_update = Some(DeferredUpdate {
            display_list,
            dirty,
        });
    }

    /// Collapse the dirty region to its bounds. Sets `tex_coords` to match
    /// and returns the bounds in parent coordinates.
    pub fn set_region_as_rect(&mut self) -> Rect {
        let bounds = self.region.bounds().to_rect();
        let tex_x = 1.0 / self.texture.width as f32;
        let tex_y = 1.0 / self.texture.height as f32;
        let height = self.bounds.height();
        self.tex_coords = Rect::new(
            bounds.left * tex_x,
            (height - bounds.top) * tex_y,
            bounds.right * tex_x,
            (height - bounds.bottom) * tex_y,
        );
        let mut rect = bounds;
        rect.translate(self.bounds.left, self.bounds.top);
        rect
    }

    /// Grow or shrink the backing texture to hold `width` by `height`.
    /// Returns false when the device cannot hold the new size, leaving the
    /// layer untouched.
    pub fn resize<D: GpuDevice + ?Sized>(&mut self, device: &mut D, width: u32, height: u32) -> bool {
        let (width, height) = (round_layer_size(width), round_layer_size(height));
        if width == self.texture.width && height == self.texture.height {
            return true;
        }
        let max = device.limits().max_texture_size;
        if width > max || height > max {
            tracing::warn!(
                "layer too large to be resized ({}x{}, max={})",
                width,
                height,
                max
            );
            return false;
        }
        if !self.empty {
            let id = self.texture.id;
            if let Err(err) = device.allocate_texture(id, TextureFormat::Rgba, width, height, None) {
                tracing::warn!("failed to resize layer to {}x{}: {}", width, height, err);
                return false;
            }
        }
        self.texture.width = width;
        self.texture.height = height;
        true
    }

    /// Record the size of externally produced texture contents
    pub fn set_texture_size(&mut self, width: u32, height: u32) {
        self.texture.width = width;
        self.texture.height = height;
    }

    /// Mark a layer-space rect dirty
    pub fn dirty(&mut self, rect: IRect) {
        self.region.op_rect(rect, gloss_paint::RegionOp::Union);
    }

    /// Reset per-use state before the layer goes back into a pool
    fn recycle(&mut self) {
        self.region.set_empty();
        self.color_filter = None;
        self.deferred_update = None;
        self.debug_draw_update = false;
        self.alpha = 255;
        self.mode = TransferMode::SrcOver;
        self.blend = true;
    }

    /// Delete every device resource the layer owns
    pub fn release<D: GpuDevice + ?Sized>(self, device: &mut D, state: &mut StateCache) {
        if let Some(fbo) = self.fbo {
            device.delete_framebuffer(fbo);
        }
        if let Some((stencil, _, _)) = self.stencil {
            device.delete_render_buffer(stencil);
        }
        self.texture.release(device, state);
    }
}

/// A layer reachable from a snapshot
#[derive(Clone, Debug)]
pub enum LayerRef {
    /// Owned by the snapshot at this stack index
    Owned(usize),
    /// Hardware layer being updated
    Shared(SharedLayer),
}

impl PartialEq for LayerRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LayerRef::Owned(a), LayerRef::Owned(b)) => a == b,
            (LayerRef::Shared(a), LayerRef::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Pool statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejections: u64,
}

/// Recycles layers keyed by their rounded texture size
pub struct LayerPool {
    /// Sorted by `(width, height)`, smallest first
    layers: Vec<Layer>,
    size: usize,
    max_size: usize,
    stats: PoolStats,
}

impl LayerPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            layers: Vec::new(),
            size: 0,
            max_size,
            stats: PoolStats::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn layer_bytes(layer: &Layer) -> usize {
        layer.width() as usize * layer.height() as usize * 4
    }

    /// A layer whose texture is at least `width` by `height`. Reuses a pooled
    /// layer of the same rounded size, or creates one.
    pub fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        width: u32,
        height: u32,
    ) -> Option<Layer> {
        let (width, height) = (round_layer_size(width), round_layer_size(height));
        if let Some(index) = self
            .layers
            .iter()
            .position(|l| l.width() == width && l.height() == height)
        {
            let layer = self.layers.remove(index);
            self.size -= Self::layer_bytes(&layer);
            self.stats.hits += 1;
            return Some(layer);
        }

        self.stats.misses += 1;
        let id = device.create_texture();
        state.set_texture_filter(device, id, TextureFilter::Nearest, true);
        state.set_texture_wrap(device, id, TextureWrap::Clamp, TextureWrap::Clamp);
        Some(Layer::new(Texture {
            id,
            width,
            height,
            format: TextureFormat::Rgba,
            blend: true,
            cleanup: false,
        }))
    }

    /// Return a layer. Hands it back when it is not cacheable or larger than
    /// the whole pool.
    pub fn put<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        mut layer: Layer,
    ) -> Result<(), Layer> {
        let bytes = Self::layer_bytes(&layer);
        if !layer.cacheable || bytes >= self.max_size {
            self.stats.rejections += 1;
            return Err(layer);
        }
        while self.size + bytes > self.max_size && !self.layers.is_empty() {
            let evicted = self.layers.remove(0);
            self.size -= Self::layer_bytes(&evicted);
            self.stats.evictions += 1;
            evicted.release(device, state);
        }

        layer.recycle();
        let key = (layer.width(), layer.height());
        let index = self
            .layers
            .partition_point(|l| (l.width(), l.height()) <= key);
        self.layers.insert(index, layer);
        self.size += bytes;
        Ok(())
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D, state: &mut StateCache) {
        for layer in self.layers.drain(..) {
            layer.release(device, state);
        }
        self.size = 0;
    }
}

/// Recycles framebuffer objects
pub struct FboPool {
    fbos: Vec<FramebufferId>,
    max_count: usize,
}

impl FboPool {
    pub fn new(max_count: usize) -> Self {
        Self {
            fbos: Vec::new(),
            max_count,
        }
    }

    pub fn len(&self) -> usize {
        self.fbos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fbos.is_empty()
    }

    pub fn get<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> FramebufferId {
        self.fbos.pop().unwrap_or_else(|| device.create_framebuffer())
    }

    pub fn put(&mut self, fbo: FramebufferId) -> Result<(), FramebufferId> {
        if self.fbos.len() >= self.max_count || self.fbos.contains(&fbo) {
            return Err(fbo);
        }
        self.fbos.push(fbo);
        Ok(())
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for fbo in self.fbos.drain(..) {
            device.delete_framebuffer(fbo);
        }
    }
}

/// Recycles stencil render buffers keyed by size
pub struct RenderBufferPool {
    buffers: Vec<(RenderBufferId, u32, u32)>,
    size: usize,
    max_size: usize,
}

impl RenderBufferPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffers: Vec::new(),
            size: 0,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// A stencil buffer of exactly `width` by `height`
    pub fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
    ) -> Option<RenderBufferId> {
        if let Some(index) = self
            .buffers
            .iter()
            .position(|&(_, w, h)| w == width && h == height)
        {
            let (id, w, h) = self.buffers.remove(index);
            self.size -= w as usize * h as usize;
            return Some(id);
        }
        match device.create_render_buffer(width, height) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!("failed to allocate a {}x{} stencil buffer: {}", width, height, err);
                None
            }
        }
    }

    pub fn put(
        &mut self,
        buffer: RenderBufferId,
        width: u32,
        height: u32,
    ) -> Result<(), RenderBufferId> {
        let bytes = width as usize * height as usize;
        if self.size + bytes > self.max_size {
            return Err(buffer);
        }
        self.buffers.push((buffer, width, height));
        self.size += bytes;
        Ok(())
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for (id, _, _) in self.buffers.drain(..) {
            device.delete_render_buffer(id);
        }
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::SoftwareDevice;

    #[test]
    fn test_round_layer_size() {
        assert_eq!(round_layer_size(1), 64);
        assert_eq!(round_layer_size(64), 64);
        assert_eq!(round_layer_size(65), 128);
        assert_eq!(round_layer_size(0), 64);
    }

    #[test]
    fn test_put_then_get_reuses_layer() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut pool = LayerPool::new(1024 * 1024);

        let layer = pool.get(&mut device, &mut state, 40, 50).unwrap();
        let id = layer.texture().id;
        assert_eq!((layer.width(), layer.height()), (64, 64));
        assert!(pool.put(&mut device, &mut state, layer).is_ok());
        assert_eq!(pool.size(), 64 * 64 * 4);

        let again = pool.get(&mut device, &mut state, 10, 10).unwrap();
        assert_eq!(again.texture().id, id);
        assert_eq!(pool.stats().hits, 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_put_rejects_oversized_layer() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut pool = LayerPool::new(1000);

        let layer = pool.get(&mut device, &mut state, 64, 64).unwrap();
        let rejected = pool.put(&mut device, &mut state, layer);
        assert!(rejected.is_err());
        assert_eq!(pool.stats().rejections, 1);
    }

    #[test]
    fn test_put_evicts_smallest_first() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut pool = LayerPool::new(64 * 128 * 4 + 64 * 64 * 4);

        let small = pool.get(&mut device, &mut state, 64, 64).unwrap();
        let large = pool.get(&mut device, &mut state, 64, 128).unwrap();
        let other = pool.get(&mut device, &mut state, 128, 64).unwrap();
        pool.put(&mut device, &mut state, small).unwrap();
        pool.put(&mut device, &mut state, large).unwrap();
        pool.put(&mut device, &mut state, other).unwrap();

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().evictions, 2);
    }

    #[test]
    fn test_resize_rounds_and_checks_limits() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut pool = LayerPool::new(1024 * 1024);

        let mut layer = pool.get(&mut device, &mut state, 10, 10).unwrap();
        assert!(layer.resize(&mut device, 100, 20));
        assert_eq!((layer.width(), layer.height()), (128, 64));
        assert!(!layer.resize(&mut device, 5000, 20));
        assert_eq!(layer.width(), 128);
    }

    #[test]
    fn test_fbo_pool_bounded() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut pool = FboPool::new(1);
        let a = pool.get(&mut device);
        let b = pool.get(&mut device);
        assert_ne!(a, b);
        assert!(pool.put(a).is_ok());
        assert_eq!(pool.put(b), Err(b));
        assert_eq!(pool.get(&mut device), a);
    }
}
