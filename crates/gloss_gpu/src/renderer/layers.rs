//! Layers
//!
//! `save_layer` redirects drawing until the matching restore. Without
//! `CLIP_TO_LAYER` the target under the bounds is copied into a texture,
//! drawing carries on in the target and the copy is put back underneath at
//! restore. With `CLIP_TO_LAYER` drawing goes into a framebuffer of its own
//! and only the dirty region is composited back.
//!
//! Hardware layers outlive frames as [`SharedLayer`]s. They are refreshed
//! from their display list before the frame, or lazily when drawn.

use std::sync::Arc;

use gloss_paint::{Color, IRect, Matrix4, Rect, RegionOp, TransferMode};
use parking_lot::Mutex;

use crate::device::{GpuDevice, TextureFilter, TextureFormat, TextureWrap, Topology, VertexData};
use crate::display_list::DeferredDisplayList;
use crate::layer::{DeferredUpdate, Layer, LayerRef, SharedLayer};
use crate::snapshot::{SaveFlags, Snapshot, SnapshotFlags};
use crate::status::{DrawStatus, ReplayFlags};
use crate::texture::Texture;
use crate::vertex::{quad, quad_indices, Vertex, MAX_QUADS_PER_DRAW};

use super::draw::TextureDraw;
use super::Renderer;

/// Tint drawn over a hardware layer after it was updated
const LAYER_UPDATE_DEBUG_COLOR: u32 = 0x7f00ff00;

/// Texture coordinates of a render target holding `width` by `height` pixels
/// of `layer`, flipped vertically
fn render_target_coords(layer: &Layer, width: f32, height: f32) -> Rect {
    Rect::new(
        0.0,
        height / layer.height() as f32,
        width / layer.width() as f32,
        0.0,
    )
}

impl<D: GpuDevice> Renderer<D> {
    /// Push a snapshot drawing into an offscreen layer that is composited
    /// with `alpha` and `mode` at restore. Returns the count before the push.
    #[allow(clippy::too_many_arguments)]
    pub fn save_layer(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        alpha: u8,
        mode: TransferMode,
        flags: SaveFlags,
    ) -> i32 {
        let count = self.save_count();
        self.snapshots.push(flags);
        if !self.snapshots.is_ignored() {
            self.begin_layer(left, top, right, bottom, alpha, mode, flags);
        }
        count
    }

    pub fn save_layer_alpha(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        alpha: u8,
        flags: SaveFlags,
    ) -> i32 {
        self.save_layer(left, top, right, bottom, alpha, TransferMode::SrcOver, flags)
    }

    #[allow(clippy::too_many_arguments)]
    fn begin_layer(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        alpha: u8,
        mode: TransferMode,
        flags: SaveFlags,
    ) -> bool {
        let fbo_layer = flags.contains(SaveFlags::CLIP_TO_LAYER);
        let untransformed = Rect::new(left, top, right, bottom);
        let mut bounds = self.snapshots.transform().mapped_rect(untransformed);
        let mut clip = Rect::EMPTY;

        if bounds.intersect(self.snapshots.clip_rect()) {
            bounds.snap_to_pixel_boundaries();
            let viewport = self.snapshots.current().viewport;
            if !bounds.intersect(&viewport) {
                bounds.set_empty();
            } else if fbo_layer {
                // Layer-space clip, for framebuffer layers drawn untransformed
                let mut inverse = Matrix4::IDENTITY;
                inverse.load_inverse(self.snapshots.transform());
                clip = inverse.mapped_rect(bounds).snapped();
                if clip.intersect(&untransformed) {
                    clip.translate(-left, -top);
                    bounds = untransformed;
                } else {
                    clip.set_empty();
                }
            }
        } else {
            bounds.set_empty();
        }

        let max = self.caches.limits.max_texture_size as f32;
        let too_large = bounds.width() > max || bounds.height() > max;
        if too_large {
            tracing::warn!(
                "layer too large ({}x{}, max={})",
                bounds.width(),
                bounds.height(),
                max
            );
        }
        let snapshot = self.snapshots.current_mut();
        if bounds.is_empty() || too_large || (fbo_layer && clip.is_empty()) {
            snapshot.empty = fbo_layer;
            return false;
        }
        snapshot.invisible = snapshot.invisible || (alpha == 0 && fbo_layer);
        if snapshot.is_ignored() {
            return false;
        }

        let (width, height) = (bounds.width() as u32, bounds.height() as u32);
        let Some(mut layer) =
            self.caches
                .layers
                .get(&mut self.device, &mut self.caches.state, width, height)
        else {
            return false;
        };
        layer.alpha = alpha;
        layer.mode = mode;
        layer.bounds = bounds;
        layer.tex_coords = render_target_coords(&layer, bounds.width(), bounds.height());
        layer.color_filter = self.modifiers.color_filter.clone();
        layer.blend = true;
        layer.region.set_empty();

        tracing::trace!(
            "save layer {:?}, {}",
            bounds,
            if fbo_layer { "framebuffer" } else { "copy" }
        );
        if fbo_layer {
            self.begin_fbo_layer(layer, bounds, clip)
        } else {
            self.begin_copy_layer(layer, bounds)
        }
    }

    fn begin_copy_layer(&mut self, mut layer: Layer, bounds: Rect) -> bool {
        let texture = layer.texture();
        self.caches.state.bind_texture(&mut self.device, 0, Some(texture.id));
        if layer.empty {
            let allocated = self.device.allocate_texture(
                texture.id,
                TextureFormat::Rgba,
                texture.width,
                texture.height,
                None,
            );
            if let Err(err) = allocated {
                tracing::warn!("failed to allocate layer texture: {}", err);
                self.recycle_layer(layer);
                return false;
            }
            layer.empty = false;
        }

        let target_height = self.snapshots.current().height;
        let copied = self.device.copy_framebuffer_to_texture(
            texture.id,
            0,
            0,
            bounds.left as i32,
            target_height - bounds.bottom as i32,
            bounds.width() as i32,
            bounds.height() as i32,
        );
        if let Err(err) = copied {
            tracing::warn!("failed to copy the target into a layer: {}", err);
            self.recycle_layer(layer);
            return false;
        }

        // The copied area is cleared before the next draw
        self.layers_to_clear.push(bounds);

        let index = self.snapshots.top_index();
        let snapshot = self.snapshots.current_mut();
        snapshot.flags |= SnapshotFlags::IS_LAYER;
        snapshot.owned_layer = Some(layer);
        snapshot.layer = Some(LayerRef::Owned(index));
        true
    }

    fn begin_fbo_layer(&mut self, mut layer: Layer, bounds: Rect, clip: Rect) -> bool {
        let texture = layer.texture();
        let fbo = self.caches.fbos.get(&mut self.device);
        layer.fbo = Some(fbo);
        layer.clip_rect = clip;

        self.caches.state.bind_texture(&mut self.device, 0, Some(texture.id));
        if layer.empty {
            let allocated = self.device.allocate_texture(
                texture.id,
                TextureFormat::Rgba,
                texture.width,
                texture.height,
                None,
            );
            if let Err(err) = allocated {
                tracing::warn!("failed to allocate layer texture: {}", err);
                self.recycle_layer(layer);
                self.snapshots.current_mut().empty = true;
                return false;
            }
            layer.empty = false;
        }
        if let Err(err) = self.device.attach_texture(fbo, Some(texture.id)) {
            tracing::warn!("framebuffer incomplete for layer {:?}: {}", bounds, err);
            self.recycle_layer(layer);
            self.snapshots.current_mut().empty = true;
            return false;
        }

        let (width, height) = (bounds.width(), bounds.height());
        let index = self.snapshots.top_index();
        let ortho = self.ortho;
        {
            let snapshot = self.snapshots.current_mut();
            snapshot.flags |= SnapshotFlags::IS_LAYER
                | SnapshotFlags::FBO_TARGET
                | SnapshotFlags::IS_FBO_LAYER
                | SnapshotFlags::DIRTY_ORTHO;
            snapshot.fbo = fbo;
            snapshot.viewport = Rect::new(0.0, 0.0, width, height);
            snapshot.height = height as i32;
            snapshot.ortho_matrix = ortho;
            snapshot.owned_layer = Some(layer);
            snapshot.layer = Some(LayerRef::Owned(index));
            snapshot.target_layer = Some(LayerRef::Owned(index));
        }
        self.snapshots.reset_transform(-bounds.left, -bounds.top);
        self.snapshots.reset_clip(clip.left, clip.top, clip.right, clip.bottom);

        self.end_tiling();
        self.debug_overdraw(false, false);
        self.caches.state.bind_framebuffer(&mut self.device, fbo);
        self.start_tiling(clip, true);

        // One extra pixel around the clip keeps filtered edges clean
        self.caches.state.set_scissor_enabled(&mut self.device, true);
        self.caches.state.set_scissor(
            &mut self.device,
            clip.left as i32 - 1,
            height as i32 - clip.bottom as i32 - 1,
            clip.width() as i32 + 2,
            clip.height() as i32 + 2,
        );
        self.device.clear_color([0.0; 4]);
        self.dirty_clip = true;

        self.caches
            .state
            .set_viewport(&mut self.device, width as i32, height as i32);
        self.ortho = Matrix4::ortho(0.0, width, height, 0.0, -1.0, 1.0);
        true
    }

    /// Draw the layer owned by a popped snapshot into the new current target
    pub(super) fn compose_layer(&mut self, mut popped: Snapshot) {
        let Some(mut layer) = popped.owned_layer.take() else {
            tracing::warn!("layer snapshot restored without a layer");
            return;
        };
        let fbo_layer = popped.flags.contains(SnapshotFlags::IS_FBO_LAYER);
        let rect = layer.bounds;

        let target_bounds = if fbo_layer {
            self.snapshots.transform().mapped_rect(rect).snapped()
        } else {
            rect
        };
        let clip = self.snapshots.clip_rect().snapped();
        let scissor = self.config.scissor_optimization_disabled || !clip.contains(&target_bounds);
        self.caches.state.set_scissor_enabled(&mut self.device, scissor);

        if fbo_layer {
            self.end_tiling();
            self.return_render_target(&mut layer);
            let fbo = self.snapshots.current().fbo;
            self.caches.state.bind_framebuffer(&mut self.device, fbo);
            self.debug_overdraw(true, false);
            let clip = *self.snapshots.clip_rect();
            self.start_tiling(clip, false);
        }

        if !fbo_layer && layer.alpha < 255 {
            // Fade what was drawn over the copy before putting it back under
            let fade = Color::BLACK.with_alpha(layer.alpha as f32 / 255.0);
            self.draw_color_rect(
                rect.left,
                rect.top,
                rect.right,
                rect.bottom,
                fade,
                TransferMode::DstIn,
                true,
            );
            layer.alpha = 255;
        }

        if fbo_layer {
            let transform = *self.snapshots.transform();
            self.dirty_layer(rect.left, rect.top, rect.right, rect.bottom, Some(&transform));

            let filter = layer.color_filter.clone();
            let previous = std::mem::replace(&mut self.modifiers.color_filter, filter);
            let alpha = layer.alpha as f32 / 255.0;
            self.compose_layer_region(&mut layer, rect, alpha);
            self.modifiers.color_filter = previous;
            layer.region.set_empty();
        } else if !rect.is_empty() {
            self.dirty_layer(rect.left, rect.top, rect.right, rect.bottom, None);
            self.compose_layer_rect(&mut layer, rect, 1.0, true);
        }

        self.dirty_clip = true;
        self.recycle_layer(layer);
    }

    /// Draw the whole layer texture over `rect`
    fn compose_layer_rect(&mut self, layer: &mut Layer, rect: Rect, alpha: f32, swap_src_dst: bool) {
        if layer.is_texture_layer() {
            self.draw_texture_layer(layer, rect, alpha);
            return;
        }
        let texture = layer.texture();
        let transform = *self.snapshots.transform();
        let simple = transform.is_pure_translate()
            && texture.width == rect.width() as u32
            && texture.height == rect.height() as u32;

        let (mut x, mut y) = (rect.left, rect.top);
        let filter = if simple {
            if !swap_src_dst {
                x = (rect.left + transform.translate_x() + 0.5).floor();
                y = (rect.top + transform.translate_y() + 0.5).floor();
            }
            TextureFilter::Nearest
        } else {
            TextureFilter::Linear
        };
        self.caches
            .state
            .set_texture_filter(&mut self.device, texture.id, filter, true);

        let tc = layer.tex_coords;
        let vertices = quad(0.0, 0.0, 1.0, 1.0, tc.left, tc.top, tc.right, tc.bottom);
        self.draw_texture_mesh(TextureDraw {
            rect: Rect::new(x, y, x + rect.width(), y + rect.height()),
            texture,
            alpha,
            mode: layer.mode,
            blend: layer.blend,
            vertices: &vertices,
            indices: None,
            topology: Topology::TriangleStrip,
            swap_src_dst,
            ignore_transform: swap_src_dst || simple,
            ignore_scale: false,
            dirty: true,
        });
    }

    /// Draw only the dirty region of a framebuffer layer placed at `rect`
    fn compose_layer_region(&mut self, layer: &mut Layer, rect: Rect, alpha: f32) {
        if layer.region.is_empty() {
            return;
        }
        if layer.region.is_rect() {
            let mut region_rect = layer.set_region_as_rect();
            region_rect.translate(rect.left - layer.bounds.left, rect.top - layer.bounds.top);
            self.compose_layer_rect(layer, region_rect, alpha, false);
            return;
        }

        let texture = layer.texture();
        let tex_x = 1.0 / texture.width as f32;
        let tex_y = 1.0 / texture.height as f32;
        let height = layer.bounds.height();

        self.setup_draw(true);
        self.setup_draw_with_texture(false);
        self.setup_draw_alpha(alpha);
        self.setup_draw_color_filter();
        self.setup_draw_blending(layer.blend || alpha < 1.0, layer.mode, false);
        self.setup_draw_program();
        self.setup_draw_dirty_regions_disabled();
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.setup_draw_texture(texture.id);

        let transform = *self.snapshots.transform();
        if transform.is_pure_translate() {
            let x = (rect.left + transform.translate_x() + 0.5).floor();
            let y = (rect.top + transform.translate_y() + 0.5).floor();
            self.caches
                .state
                .set_texture_filter(&mut self.device, texture.id, TextureFilter::Nearest, true);
            self.setup_draw_model_view_translate(x, y, x + rect.width(), y + rect.height(), true);
        } else {
            self.caches
                .state
                .set_texture_filter(&mut self.device, texture.id, TextureFilter::Linear, true);
            self.setup_draw_model_view_translate(rect.left, rect.top, rect.right, rect.bottom, false);
        }

        let mut vertices = std::mem::take(&mut self.scratch.textures);
        for batch in layer.region.rects().chunks(MAX_QUADS_PER_DRAW) {
            vertices.clear();
            for r in batch {
                let (l, t, r, b) = (r.left as f32, r.top as f32, r.right as f32, r.bottom as f32);
                vertices.extend_from_slice(&quad(
                    l,
                    t,
                    r,
                    b,
                    l * tex_x,
                    (height - t) * tex_y,
                    r * tex_x,
                    (height - b) * tex_y,
                ));
            }
            let indices = quad_indices(batch.len());
            self.issue(Topology::Triangles, VertexData::Texture(&vertices), Some(indices.as_slice()));
        }
        self.scratch.textures = vertices;
    }

    fn draw_texture_layer(&mut self, layer: &Layer, rect: Rect, alpha: f32) {
        let texture = layer.texture();
        self.setup_draw(true);
        if layer.external {
            self.setup_draw_with_external_texture();
        } else {
            self.setup_draw_with_texture(false);
        }
        self.setup_draw_texture_transform(&layer.texture_transform);
        self.setup_draw_alpha(alpha);
        self.setup_draw_color_filter();
        self.setup_draw_blending(layer.blend || alpha < 1.0, layer.mode, false);
        self.setup_draw_program();
        self.setup_draw_texture(texture.id);

        let transform = *self.snapshots.transform();
        let simple = transform.is_pure_translate()
            && texture.width == rect.width() as u32
            && texture.height == rect.height() as u32;
        if simple {
            let x = (rect.left + transform.translate_x() + 0.5).floor();
            let y = (rect.top + transform.translate_y() + 0.5).floor();
            self.caches
                .state
                .set_texture_filter(&mut self.device, texture.id, TextureFilter::Nearest, true);
            self.setup_draw_model_view(x, y, x + rect.width(), y + rect.height(), true, false);
        } else {
            self.caches
                .state
                .set_texture_filter(&mut self.device, texture.id, TextureFilter::Linear, true);
            self.setup_draw_model_view(rect.left, rect.top, rect.right, rect.bottom, false, false);
        }
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_color_filter_uniforms();

        let vertices = quad(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0);
        self.issue(Topology::TriangleStrip, VertexData::Texture(&vertices), None);
    }

    /// Clear the target areas copied into layers since the last draw
    pub(super) fn clear_layer_regions(&mut self) {
        if self.layers_to_clear.is_empty() {
            return;
        }
        if self.snapshots.is_ignored() {
            self.layers_to_clear.clear();
            return;
        }

        let scissor = self.caches.state.scissor_enabled();
        self.caches.state.set_scissor_enabled(&mut self.device, false);

        let mut vertices = std::mem::take(&mut self.scratch.positions);
        vertices.clear();
        for bounds in self.layers_to_clear.drain(..) {
            let (l, t, r, b) = (bounds.left, bounds.top, bounds.right, bounds.bottom);
            vertices.extend_from_slice(&[
                Vertex::new(l, t),
                Vertex::new(r, t),
                Vertex::new(l, b),
                Vertex::new(l, b),
                Vertex::new(r, t),
                Vertex::new(r, b),
            ]);
        }

        self.setup_draw(false);
        self.setup_draw_color_premultiplied([0.0, 0.0, 0.0, 1.0]);
        self.setup_draw_blending(true, TransferMode::Clear, false);
        self.setup_draw_program();
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_model_view_translate(0.0, 0.0, 0.0, 0.0, true);
        self.issue(Topology::Triangles, VertexData::Position(&vertices), None);
        self.scratch.positions = vertices;

        if scissor {
            self.caches.state.set_scissor_enabled(&mut self.device, true);
        }
    }

    /// Detach the framebuffer and stencil of a layer and pool them
    fn return_render_target(&mut self, layer: &mut Layer) {
        let Some(fbo) = layer.fbo.take() else {
            return;
        };
        if let Err(err) = self.device.attach_texture(fbo, None) {
            tracing::warn!("failed to detach layer texture: {}", err);
        }
        if let Some((buffer, width, height)) = layer.stencil.take() {
            self.device.attach_stencil(fbo, None);
            if let Err(buffer) = self.caches.render_buffers.put(buffer, width, height) {
                self.device.delete_render_buffer(buffer);
            }
        }
        if let Err(fbo) = self.caches.fbos.put(fbo) {
            self.device.delete_framebuffer(fbo);
        }
    }

    /// Give a layer back to the pool, or delete it
    pub(super) fn recycle_layer(&mut self, mut layer: Layer) {
        self.return_render_target(&mut layer);
        if !layer.cacheable {
            layer.release(&mut self.device, &mut self.caches.state);
            return;
        }
        if let Err(layer) = self
            .caches
            .layers
            .put(&mut self.device, &mut self.caches.state, layer)
        {
            self.caches.release_layer(&mut self.device, layer);
        }
    }

    // Hardware layers

    /// Allocate a layer that keeps its contents across frames. `None` when
    /// the device cannot hold it.
    pub fn create_layer(&mut self, width: u32, height: u32, opaque: bool) -> Option<SharedLayer> {
        let max = self.caches.limits.max_texture_size;
        if width == 0 || height == 0 || width > max || height > max {
            tracing::warn!("cannot create a {}x{} layer (max={})", width, height, max);
            return None;
        }
        let mut layer = self
            .caches
            .layers
            .get(&mut self.device, &mut self.caches.state, width, height)?;
        let fbo = self.caches.fbos.get(&mut self.device);

        let (w, h) = (width as f32, height as f32);
        layer.fbo = Some(fbo);
        layer.bounds = Rect::new(0.0, 0.0, w, h);
        layer.tex_coords = render_target_coords(&layer, w, h);
        layer.alpha = 255;
        layer.mode = TransferMode::SrcOver;
        layer.blend = !opaque;
        layer.color_filter = None;
        layer.region.set_empty();

        let texture = layer.texture();
        self.caches.state.bind_texture(&mut self.device, 0, Some(texture.id));
        if layer.empty {
            let allocated = self.device.allocate_texture(
                texture.id,
                TextureFormat::Rgba,
                texture.width,
                texture.height,
                None,
            );
            if let Err(err) = allocated {
                tracing::warn!("failed to allocate hardware layer: {}", err);
                self.recycle_layer(layer);
                return None;
            }
            layer.empty = false;
        }
        if let Err(err) = self.device.attach_texture(fbo, Some(texture.id)) {
            tracing::warn!("framebuffer incomplete for hardware layer: {}", err);
            self.recycle_layer(layer);
            return None;
        }

        self.caches.state.bind_framebuffer(&mut self.device, fbo);
        let scissor = self.caches.state.scissor_enabled();
        self.caches.state.set_scissor_enabled(&mut self.device, false);
        self.device.clear_color([0.0; 4]);
        self.caches.state.set_scissor_enabled(&mut self.device, scissor);
        let previous = self.snapshots.current().fbo;
        self.caches.state.bind_framebuffer(&mut self.device, previous);

        tracing::debug!("created {}x{} hardware layer", width, height);
        Some(Arc::new(Mutex::new(layer)))
    }

    /// Change the size of a hardware layer. Returns false when the new size
    /// cannot be held, leaving the layer as it was.
    pub fn resize_layer(&mut self, shared: &SharedLayer, width: u32, height: u32) -> bool {
        let mut layer = shared.lock();
        if !layer.resize(&mut self.device, width, height) {
            return false;
        }
        if let (Some((buffer, sw, sh)), Some(fbo)) = (layer.stencil, layer.fbo) {
            if (sw, sh) != (layer.width(), layer.height()) {
                self.device.attach_stencil(fbo, None);
                layer.stencil = None;
                if let Err(buffer) = self.caches.render_buffers.put(buffer, sw, sh) {
                    self.device.delete_render_buffer(buffer);
                }
            }
        }
        let (w, h) = (width as f32, height as f32);
        layer.bounds = Rect::new(0.0, 0.0, w, h);
        layer.tex_coords = render_target_coords(&layer, w, h);
        true
    }

    /// Recycle a hardware layer. Hands the handle back when other owners
    /// still hold it.
    pub fn destroy_layer(&mut self, shared: SharedLayer) -> Result<(), SharedLayer> {
        self.layer_updates.retain(|pending| !Arc::ptr_eq(pending, &shared));
        let layer = Arc::try_unwrap(shared)?.into_inner();
        self.recycle_layer(layer);
        Ok(())
    }

    /// A layer showing a texture filled outside of the renderer
    pub fn create_texture_layer(&mut self) -> SharedLayer {
        let id = self.device.create_texture();
        let mut layer = Layer::new(Texture {
            id,
            width: 0,
            height: 0,
            format: TextureFormat::Rgba,
            blend: true,
            cleanup: false,
        });
        layer.texture_layer = true;
        layer.cacheable = false;
        layer.empty = false;
        Arc::new(Mutex::new(layer))
    }

    /// Describe what was last written into a texture layer
    pub fn update_texture_layer(
        &mut self,
        shared: &SharedLayer,
        width: u32,
        height: u32,
        opaque: bool,
        external: bool,
        texture_transform: &Matrix4,
    ) {
        let mut layer = shared.lock();
        layer.set_texture_size(width, height);
        layer.bounds = Rect::new(0.0, 0.0, width as f32, height as f32);
        layer.region.set_rect(IRect::new(0, 0, width as i32, height as i32));
        layer.blend = !opaque;
        layer.external = external;
        layer.texture_transform = *texture_transform;

        let id = layer.texture().id;
        let state = &mut self.caches.state;
        state.bind_texture(&mut self.device, 0, Some(id));
        state.set_texture_filter(&mut self.device, id, TextureFilter::Linear, true);
        state.set_texture_wrap(&mut self.device, id, TextureWrap::Clamp, TextureWrap::Clamp);
    }

    /// Queue a hardware layer for update at the start of the next frame
    pub fn push_layer_update(&mut self, layer: &SharedLayer) {
        if !self.layer_updates.iter().any(|pending| Arc::ptr_eq(pending, layer)) {
            self.layer_updates.push(layer.clone());
        }
    }

    pub fn clear_layer_updates(&mut self) {
        self.layer_updates.clear();
    }

    pub fn pending_layer_updates(&self) -> usize {
        self.layer_updates.len()
    }

    /// Render every queued layer update, most recent first
    pub(super) fn update_layers(&mut self) {
        if self.layer_updates.is_empty() {
            return;
        }
        tracing::trace!("updating {} layers", self.layer_updates.len());
        let updates = std::mem::take(&mut self.layer_updates);
        for layer in updates.iter().rev() {
            self.update_layer(layer, false);
        }
        self.caches.state.bind_framebuffer(&mut self.device, self.target_fbo);
    }

    /// Render the pending display list of a hardware layer. Returns false
    /// when there was nothing to render.
    fn update_layer(&mut self, shared: &SharedLayer, in_frame: bool) -> bool {
        let update = {
            let mut layer = shared.lock();
            if layer.fbo.is_none() {
                return false;
            }
            match layer.deferred_update.take() {
                Some(update) if update.display_list.is_renderable() => update,
                _ => return false,
            }
        };

        if in_frame {
            self.end_tiling();
            self.debug_overdraw(false, false);
        }
        self.render_layer(shared, &update, in_frame);
        if in_frame {
            self.resume_after_layer();
            let clip = *self.snapshots.clip_rect();
            self.start_tiling(clip, false);
        }

        shared.lock().debug_draw_update = self.config.debug.layers_updates;
        true
    }

    fn render_layer(&mut self, shared: &SharedLayer, update: &DeferredUpdate, in_frame: bool) {
        let (fbo, width, height, blend, dirty) = {
            let mut layer = shared.lock();
            let Some(fbo) = layer.fbo else {
                return;
            };
            let (w, h) = (layer.bounds.width(), layer.bounds.height());
            let full = Rect::new(0.0, 0.0, w, h);
            let mut dirty = update.dirty;
            if dirty.is_empty() || dirty.contains(&full) {
                layer.region.set_empty();
                dirty = full;
            } else if dirty.intersect(&full) {
                dirty.snap_to_pixel_boundaries();
                layer.region.op_rect(dirty.round_out(), RegionOp::Difference);
            } else {
                dirty.set_empty();
            }
            layer.clip_rect = dirty;
            (fbo, w, h, layer.blend, dirty)
        };
        if dirty.is_empty() {
            return;
        }
        tracing::trace!("rendering {}x{} layer, dirty {:?}", width, height, dirty);

        let count = self.save(SaveFlags::MATRIX_CLIP);
        let ortho = self.ortho;
        {
            let snapshot = self.snapshots.current_mut();
            snapshot.flags |= SnapshotFlags::FBO_TARGET | SnapshotFlags::DIRTY_ORTHO;
            snapshot.fbo = fbo;
            snapshot.viewport = Rect::new(0.0, 0.0, width, height);
            snapshot.height = height as i32;
            snapshot.ortho_matrix = ortho;
            snapshot.alpha = 1.0;
            snapshot.invisible = false;
            snapshot.empty = false;
            snapshot.layer = Some(LayerRef::Shared(shared.clone()));
            snapshot.target_layer = Some(LayerRef::Shared(shared.clone()));
        }
        self.snapshots.reset_transform(0.0, 0.0);
        self.snapshots.reset_clip(dirty.left, dirty.top, dirty.right, dirty.bottom);

        self.caches.state.bind_framebuffer(&mut self.device, fbo);
        self.caches
            .state
            .set_viewport(&mut self.device, width as i32, height as i32);
        self.ortho = Matrix4::ortho(0.0, width, height, 0.0, -1.0, 1.0);

        if blend {
            self.caches.state.set_scissor_enabled(&mut self.device, true);
            self.caches.state.set_scissor(
                &mut self.device,
                dirty.left as i32,
                height as i32 - dirty.bottom as i32,
                dirty.width() as i32,
                dirty.height() as i32,
            );
            self.device.clear_color([0.0; 4]);
        }
        self.dirty_clip = true;

        let modifiers = std::mem::take(&mut self.modifiers);
        let mut replay_dirty = dirty;
        let list = update.display_list.clone();
        if self.config.draw_defer_disabled || in_frame {
            list.replay(&mut *self, &mut replay_dirty, ReplayFlags::CLIP_CHILDREN, 0, None);
        } else {
            let mut deferred = DeferredDisplayList::new();
            list.replay(
                &mut *self,
                &mut replay_dirty,
                ReplayFlags::CLIP_CHILDREN,
                0,
                Some(&mut deferred),
            );
            deferred.flush(&mut *self);
        }
        self.modifiers = modifiers;

        self.restore_to_count(count);
    }

    /// Draw a hardware or texture layer at `(x, y)`
    pub fn draw_layer(&mut self, shared: &SharedLayer, x: f32, y: f32) -> DrawStatus {
        let (transform, width, height) = {
            let layer = shared.lock();
            let transform = if layer.is_texture_layer() && !layer.transform.is_identity() {
                Some(layer.transform)
            } else {
                None
            };
            (transform, layer.bounds.width(), layer.bounds.height())
        };

        let count = self.save_count();
        if let Some(transform) = &transform {
            self.save(SaveFlags::MATRIX);
            self.concat_matrix(transform);
        }
        let status = self.draw_layer_at(shared, x, y, width, height);
        self.restore_to_count(count);
        status
    }

    fn draw_layer_at(&mut self, shared: &SharedLayer, x: f32, y: f32, width: f32, height: f32) -> DrawStatus {
        let rect = Rect::new(x, y, x + width, y + height);
        if self.quick_reject_no_scissor(rect.left, rect.top, rect.right, rect.bottom) {
            return DrawStatus::DONE;
        }
        self.update_layer(shared, true);

        let bounds = self.snapshots.transform().mapped_rect(rect).snapped();
        let clip = self.snapshots.clip_rect().snapped();
        let scissor = self.config.scissor_optimization_disabled || !clip.contains(&bounds);
        self.caches.state.set_scissor_enabled(&mut self.device, scissor);

        let mut layer = shared.lock();
        let alpha = layer.alpha as f32 / 255.0 * self.snapshots.current().alpha;
        if layer.is_texture_layer() || !layer.region.is_empty() {
            let filter = layer.color_filter.clone();
            let previous = std::mem::replace(&mut self.modifiers.color_filter, filter);
            if layer.is_texture_layer() {
                self.draw_texture_layer(&layer, rect, alpha);
            } else {
                self.compose_layer_region(&mut layer, rect, alpha);
            }
            self.modifiers.color_filter = previous;
        }

        if layer.debug_draw_update {
            layer.debug_draw_update = false;
            drop(layer);
            self.draw_color_rect(
                rect.left,
                rect.top,
                rect.right,
                rect.bottom,
                Color::from_argb(LAYER_UPDATE_DEBUG_COLOR),
                TransferMode::SrcOver,
                false,
            );
        }
        DrawStatus::DREW
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::display_list::DisplayListBuilder;
    use crate::headless::SoftwareDevice;
    use gloss_paint::Paint;

    fn renderer() -> Renderer<SoftwareDevice> {
        let mut renderer = Renderer::new(SoftwareDevice::new(100, 100), RendererConfig::default());
        renderer.set_viewport(100, 100);
        renderer.prepare(false);
        renderer
    }

    #[test]
    fn test_save_layer_returns_previous_count() {
        let mut r = renderer();
        let count = r.save_layer_alpha(10.0, 10.0, 50.0, 50.0, 128, SaveFlags::CLIP_TO_LAYER);
        assert_eq!(count, 1);
        assert_eq!(r.save_count(), 2);
        assert!(r.snapshot().flags.contains(SnapshotFlags::IS_FBO_LAYER));
        r.restore_to_count(count);
        assert_eq!(r.save_count(), 1);
    }

    #[test]
    fn test_fbo_layer_resets_transform_and_clip() {
        let mut r = renderer();
        r.save_layer_alpha(10.0, 20.0, 60.0, 50.0, 255, SaveFlags::CLIP_TO_LAYER);
        assert_eq!(r.matrix(), Matrix4::from_translate(-10.0, -20.0));
        assert_eq!(r.clip_rect_target(), Rect::new(0.0, 0.0, 50.0, 30.0));
        assert_eq!(r.snapshot().height, 30);
    }

    #[test]
    fn test_layer_outside_clip_is_empty() {
        let mut r = renderer();
        r.save_layer_alpha(200.0, 200.0, 300.0, 300.0, 255, SaveFlags::CLIP_TO_LAYER);
        assert!(r.snapshot().empty);
        assert!(r.snapshot().owned_layer.is_none());
        r.restore();
    }

    #[test]
    fn test_zero_alpha_fbo_layer_is_invisible() {
        let mut r = renderer();
        r.save_layer_alpha(0.0, 0.0, 50.0, 50.0, 0, SaveFlags::CLIP_TO_LAYER);
        assert!(r.snapshot().invisible);
        assert!(r.quick_reject(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_copy_layer_queues_clear() {
        let mut r = renderer();
        r.save_layer_alpha(0.0, 0.0, 40.0, 40.0, 255, SaveFlags::MATRIX_CLIP);
        assert_eq!(r.layers_to_clear, vec![Rect::new(0.0, 0.0, 40.0, 40.0)]);
        assert!(r.snapshot().flags.contains(SnapshotFlags::IS_LAYER));
        assert!(!r.snapshot().flags.contains(SnapshotFlags::FBO_TARGET));
        r.restore();
        assert!(r.layers_to_clear.is_empty());
    }

    #[test]
    fn test_restore_returns_layer_to_pool() {
        let mut r = renderer();
        r.save_layer_alpha(0.0, 0.0, 50.0, 50.0, 255, SaveFlags::CLIP_TO_LAYER);
        r.draw_rect(0.0, 0.0, 10.0, 10.0, &Paint::default());
        r.restore();
        assert_eq!(r.caches().layers.len(), 1);
        assert_eq!(r.caches().fbos.len(), 1);
        assert_eq!(r.snapshot().fbo, r.target_framebuffer());
    }

    #[test]
    fn test_hardware_layer_lifecycle() {
        let mut r = renderer();
        let layer = r.create_layer(30, 20, false).expect("layer");
        {
            let layer = layer.lock();
            assert_eq!(layer.bounds, Rect::new(0.0, 0.0, 30.0, 20.0));
            assert!(layer.fbo.is_some());
            assert!(layer.blend);
        }
        assert!(r.resize_layer(&layer, 100, 10));
        assert_eq!(layer.lock().bounds, Rect::new(0.0, 0.0, 100.0, 10.0));

        r.push_layer_update(&layer);
        r.push_layer_update(&layer);
        assert_eq!(r.pending_layer_updates(), 1);

        let extra = layer.clone();
        let layer = r.destroy_layer(layer).expect_err("still shared");
        drop(extra);
        assert!(r.destroy_layer(layer).is_ok());
        assert_eq!(r.pending_layer_updates(), 0);
    }

    #[test]
    fn test_oversized_hardware_layer_is_refused() {
        let mut r = renderer();
        let max = r.caches().limits.max_texture_size;
        assert!(r.create_layer(max + 1, 10, true).is_none());
    }

    #[test]
    fn test_update_layer_consumes_deferred_update() {
        let mut r = renderer();
        let layer = r.create_layer(20, 20, false).expect("layer");
        let list = DisplayListBuilder::new()
            .draw_rect(Rect::new(0.0, 0.0, 20.0, 20.0), Paint::default())
            .build()
            .into_shared();
        layer.lock().set_deferred_update(list, Rect::EMPTY);
        r.push_layer_update(&layer);

        r.prepare(false);
        assert_eq!(r.pending_layer_updates(), 0);
        let layer = layer.lock();
        assert!(layer.deferred_update.is_none());
        assert!(!layer.region.is_empty());
    }

    #[test]
    fn test_draw_rejected_layer_is_done() {
        let mut r = renderer();
        let layer = r.create_layer(20, 20, true).expect("layer");
        assert_eq!(r.draw_layer(&layer, 500.0, 500.0), DrawStatus::DONE);
        assert_eq!(r.draw_layer(&layer, 10.0, 10.0), DrawStatus::DREW);
    }
}
