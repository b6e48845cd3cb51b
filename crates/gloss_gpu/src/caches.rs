//! Resource caches owned by a renderer
//!
//! [`Caches`] groups the state cache, the program cache and every get/put
//! resource cache. Resources that lose their owner on another thread are
//! queued with [`Caches::defer_delete`] and released at the start of the
//! next frame.

use std::fmt::Write as _;

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::device::{DeviceLimits, GpuDevice};
use crate::font::FontRenderer;
use crate::gradient_cache::GradientCache;
use crate::layer::{FboPool, Layer, LayerPool, RenderBufferPool};
use crate::patch_cache::PatchCache;
use crate::program::ProgramCache;
use crate::shadow_cache::DropShadowCache;
use crate::shape_cache::ShapeCache;
use crate::state::StateCache;
use crate::texture::TextureCache;

/// A resource waiting to be released on the rendering thread
#[derive(Debug)]
pub enum Garbage {
    Layer(Layer),
    /// Texture cached for the bitmap with this id
    Bitmap(u64),
}

pub struct Caches {
    pub state: StateCache,
    pub programs: ProgramCache,
    pub textures: TextureCache,
    pub layers: LayerPool,
    pub fbos: FboPool,
    pub render_buffers: RenderBufferPool,
    pub shapes: ShapeCache,
    pub patches: PatchCache,
    pub gradients: GradientCache,
    pub shadows: DropShadowCache,
    pub font: Option<Box<dyn FontRenderer>>,
    pub limits: DeviceLimits,
    garbage: Mutex<Vec<Garbage>>,
}

impl Caches {
    pub fn new(config: &CacheConfig, limits: DeviceLimits) -> Self {
        Self {
            state: StateCache::new(),
            programs: ProgramCache::new(),
            textures: TextureCache::new(config.texture_cache_bytes),
            layers: LayerPool::new(config.layer_cache_bytes),
            fbos: FboPool::new(config.fbo_cache_size),
            render_buffers: RenderBufferPool::new(config.render_buffer_cache_bytes),
            shapes: ShapeCache::new(config.path_cache_bytes),
            patches: PatchCache::new(config.patch_cache_entries),
            gradients: GradientCache::new(config.gradient_cache_bytes),
            shadows: DropShadowCache::new(config.drop_shadow_cache_bytes),
            font: None,
            limits,
            garbage: Mutex::new(Vec::new()),
        }
    }

    /// Queue a resource for release. Callable from any thread holding a
    /// shared reference.
    pub fn defer_delete(&self, garbage: Garbage) {
        self.garbage.lock().push(garbage);
    }

    pub fn pending_garbage(&self) -> usize {
        self.garbage.lock().len()
    }

    /// Release everything queued with [`Self::defer_delete`]
    pub fn clear_garbage<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        let garbage = std::mem::take(&mut *self.garbage.lock());
        if garbage.is_empty() {
            return;
        }
        tracing::trace!("releasing {} deferred resources", garbage.len());
        for item in garbage {
            match item {
                Garbage::Layer(layer) => layer.release(device, &mut self.state),
                Garbage::Bitmap(id) => self.textures.remove(device, &mut self.state, id),
            }
        }
    }

    /// Release a layer the pool refused
    pub fn release_layer<D: GpuDevice + ?Sized>(&mut self, device: &mut D, layer: Layer) {
        tracing::warn!(
            "layer {}x{} rejected by the pool, releasing it",
            layer.width(),
            layer.height()
        );
        layer.release(device, &mut self.state);
    }

    /// Human readable usage of every cache
    pub fn memory_usage(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Current memory usage / total memory usage (bytes):");
        let _ = writeln!(
            out,
            "  TextureCache       {:8} / {:8}",
            self.textures.size(),
            self.textures.max_size()
        );
        let _ = writeln!(
            out,
            "  LayerPool          {:8} / {:8}",
            self.layers.size(),
            self.layers.max_size()
        );
        let _ = writeln!(out, "  RenderBufferPool   {:8}", self.render_buffers.size());
        let _ = writeln!(
            out,
            "  ShapeCache         {:8} / {:8}",
            self.shapes.size(),
            self.shapes.max_size()
        );
        let _ = writeln!(out, "  GradientCache      {:8}", self.gradients.size());
        let _ = writeln!(out, "  DropShadowCache    {:8}", self.shadows.size());
        let _ = writeln!(out, "  PatchCache         {:8} meshes", self.patches.len());
        let _ = writeln!(out, "  FboPool            {:8} framebuffers", self.fbos.len());
        let _ = write!(out, "  ProgramCache       {:8} programs", self.programs.len());
        out
    }

    /// Delete every cached device resource
    pub fn terminate<D: GpuDevice>(&mut self, device: &mut D) {
        self.clear_garbage(device);
        self.textures.clear(device, &mut self.state);
        self.layers.clear(device, &mut self.state);
        self.fbos.clear(device);
        self.render_buffers.clear(device);
        self.shapes.clear(device, &mut self.state);
        self.patches.clear();
        self.gradients.clear(device, &mut self.state);
        self.shadows.clear(device, &mut self.state);
        if let Some(font) = self.font.as_mut() {
            font.clear(device, &mut self.state);
        }
        self.programs.clear(device);
        self.state.invalidate();
    }
}
