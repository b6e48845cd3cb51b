//! Stateful 2D renderer
//!
//! [`Renderer`] turns canvas calls into draws against a [`GpuDevice`]. It
//! owns the save/restore stack, applies clips lazily through the scissor and
//! the stencil, redirects drawing into layers and routes every state change
//! through the [`StateCache`](crate::state::StateCache).
//!
//! The implementation is split by concern:
//!
//! - `setup`: the ordered per-draw pipeline
//! - `clip`: quick rejection, clip operations, scissor and stencil
//! - `layers`: save layers, composition and hardware layers
//! - `draw`: shapes, bitmaps, patches and meshes
//! - `text`: text runs and their shadows
//! - `functors`: foreign drawing callbacks
//! - `debug`: overdraw and layer update overlays
//! - `canvas`: the [`Canvas`](crate::display_list::Canvas) implementation

mod canvas;
mod clip;
mod debug;
mod draw;
mod functors;
mod layers;
mod setup;
mod text;

use gloss_paint::{ColorFilter, Matrix4, Paint, Rect, Shader};
use smallvec::SmallVec;

use crate::caches::Caches;
use crate::config::RendererConfig;
use crate::device::{FramebufferId, GpuDevice, Uniforms};
use crate::font::FontRenderer;
use crate::functor::FunctorRegistry;
use crate::layer::{Layer, LayerRef, SharedLayer};
use crate::modifiers::{DrawModifiers, DropShadow, PaintFilter};
use crate::program::ProgramDescription;
use crate::snapshot::{SaveFlags, Snapshot, SnapshotFlags, SnapshotStack};
use crate::status::DrawStatus;
use crate::texture::Texture;
use crate::vertex::{ColorTextureVertex, TextureVertex, Vertex};

/// State accumulated by the setup pipeline for the draw in progress
#[derive(Debug)]
struct DrawState {
    description: ProgramDescription,
    uniforms: Uniforms,
    /// Premultiplied draw color
    color: [f32; 4],
    color_set: bool,
    /// The color must reach the program even though a shader is active
    set_shader_color: bool,
    /// Model-view steps mark the target layer dirty
    track_dirty: bool,
    program_ready: bool,
    model_view: Matrix4,
    /// Transient shader textures released before the next draw
    shader_textures: SmallVec<[Texture; 2]>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            description: ProgramDescription::default(),
            uniforms: Uniforms::default(),
            color: [0.0; 4],
            color_set: false,
            set_shader_color: false,
            track_dirty: true,
            program_ready: false,
            model_view: Matrix4::IDENTITY,
            shader_textures: SmallVec::new(),
        }
    }
}

/// Reusable vertex storage, taken with `mem::take` for the length of a draw
#[derive(Debug, Default)]
struct Scratch {
    positions: Vec<Vertex>,
    textures: Vec<TextureVertex>,
    color_textures: Vec<ColorTextureVertex>,
    indices: Vec<u16>,
}

/// Run `f` on the layer `target` points at
fn with_layer<R>(
    snapshots: &mut SnapshotStack,
    target: &LayerRef,
    f: impl FnOnce(&mut Layer) -> R,
) -> Option<R> {
    match target {
        LayerRef::Owned(index) => snapshots.get_mut(*index)?.owned_layer.as_mut().map(f),
        LayerRef::Shared(shared) => Some(f(&mut shared.lock())),
    }
}

/// A canvas drawing through a [`GpuDevice`]
pub struct Renderer<D: GpuDevice> {
    device: D,
    caches: Caches,
    config: RendererConfig,
    snapshots: SnapshotStack,
    width: i32,
    height: i32,
    /// Framebuffer the frame is rendered into
    target_fbo: FramebufferId,
    ortho: Matrix4,
    /// The scissor and stencil no longer match the current clip
    dirty_clip: bool,
    /// Recording for later replay, quick rejection leaves the scissor alone
    deferred: bool,
    modifiers: DrawModifiers,
    functors: FunctorRegistry,
    /// Target rects copied into layers, cleared before the next draw
    layers_to_clear: Vec<Rect>,
    /// Hardware layers to render at the start of the next frame
    layer_updates: Vec<SharedLayer>,
    draw: DrawState,
    scratch: Scratch,
    /// Area handed to the tiling hint of the current target
    tiling_clip: Rect,
    suppress_tiling: bool,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D, config: RendererConfig) -> Self {
        let limits = device.limits();
        tracing::debug!(
            "creating renderer, max texture size {}, framebuffer fetch {}",
            limits.max_texture_size,
            limits.framebuffer_fetch
        );
        Self {
            caches: Caches::new(&config.caches, limits),
            device,
            config,
            snapshots: SnapshotStack::new(0, 0, FramebufferId::DEFAULT),
            width: 0,
            height: 0,
            target_fbo: FramebufferId::DEFAULT,
            ortho: Matrix4::IDENTITY,
            dirty_clip: false,
            deferred: false,
            modifiers: DrawModifiers::default(),
            functors: FunctorRegistry::new(),
            layers_to_clear: Vec::new(),
            layer_updates: Vec::new(),
            draw: DrawState::default(),
            scratch: Scratch::default(),
            tiling_clip: Rect::EMPTY,
            suppress_tiling: false,
        }
    }

    /// Install the glyph source used by text draws
    pub fn with_font_renderer(mut self, font: Box<dyn FontRenderer>) -> Self {
        self.caches.font = Some(font);
        self
    }

    pub fn set_font_renderer(&mut self, font: Option<Box<dyn FontRenderer>>) {
        if let Some(mut previous) = std::mem::replace(&mut self.caches.font, font) {
            previous.clear(&mut self.device, &mut self.caches.state);
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn caches_mut(&mut self) -> &mut Caches {
        &mut self.caches
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// The record on top of the stack
    pub fn snapshot(&self) -> &Snapshot {
        self.snapshots.current()
    }

    pub fn snapshots(&self) -> &SnapshotStack {
        &self.snapshots
    }

    /// Render into `fbo` instead of the default framebuffer. Takes effect at
    /// the next [`Self::set_viewport`].
    pub fn set_target_framebuffer(&mut self, fbo: FramebufferId) {
        self.target_fbo = fbo;
    }

    pub fn target_framebuffer(&self) -> FramebufferId {
        self.target_fbo
    }

    /// Delete every cached resource and hand the device back
    pub fn into_device(mut self) -> D {
        self.discard_snapshots();
        self.caches.terminate(&mut self.device);
        self.device
    }

    // Frame lifecycle

    /// Size the target and rebuild the stack root
    pub fn set_viewport(&mut self, width: i32, height: i32) {
        tracing::trace!("viewport {}x{}", width, height);
        self.discard_snapshots();
        self.width = width;
        self.height = height;
        self.ortho = Matrix4::ortho(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
        self.snapshots = SnapshotStack::new(width, height, self.target_fbo);
        self.dirty_clip = true;
    }

    /// Start a frame covering the whole target
    pub fn prepare(&mut self, opaque: bool) -> DrawStatus {
        self.prepare_dirty(0.0, 0.0, self.width as f32, self.height as f32, opaque)
    }

    /// Start a frame limited to a dirty rect
    pub fn prepare_dirty(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        opaque: bool,
    ) -> DrawStatus {
        self.caches.clear_garbage(&mut self.device);
        self.discard_snapshots();

        self.snapshots.push(SaveFlags::MATRIX_CLIP);
        self.snapshots.current_mut().fbo = self.target_fbo;
        self.snapshots.set_clip(left, top, right, bottom);
        self.dirty_clip = true;
        self.tiling_clip = Rect::new(left, top, right, bottom);

        self.update_layers();

        if self.caches.limits.discard_framebuffer {
            self.device.discard_framebuffer();
        }
        self.sync_state();

        // Functors issue their own commands, which tiling hints cannot survive
        self.suppress_tiling = !self.functors.is_empty();
        self.start_tiling(self.tiling_clip, true);

        self.debug_overdraw(true, true);
        self.clear(left, top, right, bottom, opaque)
    }

    fn clear(&mut self, left: f32, top: f32, right: f32, bottom: f32, opaque: bool) -> DrawStatus {
        if opaque {
            self.caches.state.reset_scissor();
            return DrawStatus::DONE;
        }
        self.caches.state.set_scissor_enabled(&mut self.device, true);
        let height = self.snapshots.current().height;
        self.caches.state.set_scissor(
            &mut self.device,
            left as i32,
            height - bottom as i32,
            (right - left) as i32,
            (bottom - top) as i32,
        );
        self.device.clear_color([0.0; 4]);
        DrawStatus::DREW
    }

    fn sync_state(&mut self) {
        let (width, height) = (self.width, self.height);
        self.caches.state.bind_framebuffer(&mut self.device, self.target_fbo);
        self.caches.state.set_viewport(&mut self.device, width, height);
        self.caches.state.sync_blend(&mut self.device);
    }

    /// End the frame
    pub fn finish(&mut self) {
        self.render_overdraw();
        self.end_tiling();
        self.release_shader_textures();

        if self.config.debug.check_errors {
            while let Some(err) = self.device.poll_error() {
                tracing::warn!("device error: {}", err);
            }
        }
        if self.config.debug.memory {
            tracing::debug!("{}", self.caches.memory_usage());
        }
    }

    /// Hand the device to foreign code
    pub fn interrupt(&mut self) {
        self.caches.state.use_program(&mut self.device, None);
        self.debug_overdraw(false, false);
        self.caches.state.invalidate();
    }

    /// Take the device back after [`Self::interrupt`]
    pub fn resume(&mut self) {
        let (fbo, viewport) = {
            let snapshot = self.snapshots.current();
            (snapshot.fbo, snapshot.viewport)
        };
        self.caches
            .state
            .set_viewport(&mut self.device, viewport.width() as i32, viewport.height() as i32);
        self.caches.state.bind_framebuffer(&mut self.device, fbo);
        self.debug_overdraw(true, false);

        self.caches.state.reload_scissor_enabled(&self.device);
        self.caches.state.set_scissor_enabled(&mut self.device, true);
        self.caches.state.reset_scissor();
        self.dirty_clip = true;

        self.caches.state.bind_texture(&mut self.device, 0, None);
        self.caches.state.reassert_blend(&mut self.device);
    }

    /// Return to the current target after a layer was rendered elsewhere
    pub fn resume_after_layer(&mut self) {
        let (fbo, viewport) = {
            let snapshot = self.snapshots.current();
            (snapshot.fbo, snapshot.viewport)
        };
        self.caches
            .state
            .set_viewport(&mut self.device, viewport.width() as i32, viewport.height() as i32);
        self.caches.state.bind_framebuffer(&mut self.device, fbo);
        self.debug_overdraw(true, false);

        self.caches.state.reset_scissor();
        self.dirty_clip = true;
    }

    fn start_tiling(&mut self, clip: Rect, opaque: bool) {
        if self.suppress_tiling || !self.caches.limits.tiling {
            return;
        }
        let height = self.snapshots.current().height;
        self.device.start_tiling(
            clip.left as i32,
            height - clip.bottom as i32,
            clip.width() as i32,
            clip.height() as i32,
            opaque,
        );
    }

    fn end_tiling(&mut self) {
        if !self.suppress_tiling && self.caches.limits.tiling {
            self.device.end_tiling();
        }
    }

    /// Pop every record above the root, recycling the layers they own
    fn discard_snapshots(&mut self) {
        while let Some(snapshot) = self.snapshots.pop() {
            if let Some(layer) = snapshot.owned_layer {
                self.recycle_layer(layer);
            }
        }
        self.layers_to_clear.clear();
    }

    // Save and restore

    /// Number of saved states, 1 at the start of a frame
    pub fn save_count(&self) -> i32 {
        (self.snapshots.len() as i32 - 1).max(0)
    }

    /// Push a snapshot. Returns the count before the push.
    pub fn save(&mut self, flags: SaveFlags) -> i32 {
        let count = self.save_count();
        self.snapshots.push(flags);
        count
    }

    pub fn restore(&mut self) {
        if self.save_count() > 1 {
            self.restore_snapshot();
        }
    }

    /// Pop until `count` states remain. Counts below 1 are treated as 1.
    pub fn restore_to_count(&mut self, count: i32) {
        let count = count.max(1);
        while self.save_count() > count {
            self.restore_snapshot();
        }
    }

    fn restore_snapshot(&mut self) -> bool {
        let Some(popped) = self.snapshots.pop() else {
            return false;
        };
        let restore_clip = popped.flags.contains(SnapshotFlags::CLIP_SET);

        if popped.flags.contains(SnapshotFlags::DIRTY_ORTHO) {
            let viewport = self.snapshots.current().viewport;
            self.caches.state.set_viewport(
                &mut self.device,
                viewport.width() as i32,
                viewport.height() as i32,
            );
            self.ortho = popped.ortho_matrix;
        }
        if restore_clip {
            self.dirty_clip = true;
        }
        if popped.flags.contains(SnapshotFlags::IS_LAYER) {
            self.compose_layer(popped);
        } else if let Some(layer) = popped.owned_layer {
            self.recycle_layer(layer);
        }
        restore_clip
    }

    // Transform

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.snapshots.transform_mut().translate(dx, dy);
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.snapshots.transform_mut().scale(sx, sy);
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.snapshots.transform_mut().rotate(degrees);
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.snapshots.transform_mut().skew(sx, sy);
    }

    /// Replace the transform; `None` loads the identity
    pub fn set_matrix(&mut self, matrix: Option<&Matrix4>) {
        *self.snapshots.transform_mut() = matrix.copied().unwrap_or(Matrix4::IDENTITY);
    }

    pub fn matrix(&self) -> Matrix4 {
        *self.snapshots.transform()
    }

    pub fn concat_matrix(&mut self, matrix: &Matrix4) {
        self.snapshots.transform_mut().multiply(matrix);
    }

    /// Multiply the alpha of the current snapshot
    pub fn scale_alpha(&mut self, alpha: f32) {
        self.snapshots.current_mut().alpha *= alpha;
    }

    // Modifiers

    pub fn set_shader(&mut self, shader: Option<Shader>) {
        self.modifiers.shader = shader;
    }

    pub fn set_color_filter(&mut self, filter: Option<ColorFilter>) {
        self.modifiers.color_filter = filter;
    }

    pub fn set_shadow(&mut self, shadow: Option<DropShadow>) {
        self.modifiers.shadow = shadow;
    }

    pub fn setup_paint_filter(&mut self, filter: PaintFilter) {
        self.modifiers.paint_filter = Some(filter);
    }

    pub fn reset_paint_filter(&mut self) {
        self.modifiers.paint_filter = None;
    }

    pub fn modifiers(&self) -> &DrawModifiers {
        &self.modifiers
    }

    pub fn set_modifiers(&mut self, modifiers: DrawModifiers) {
        self.modifiers = modifiers;
    }

    /// Run `f` under `modifiers`, then put the previous ones back
    pub fn with_modifiers<R>(&mut self, modifiers: DrawModifiers, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.modifiers, modifiers);
        let result = f(self);
        self.modifiers = previous;
        result
    }

    fn filtered<'p>(&self, paint: &'p Paint) -> std::borrow::Cow<'p, Paint> {
        self.modifiers.filter_paint(paint)
    }

    /// Quick rejection no longer touches the scissor while set
    pub fn set_deferred(&mut self, deferred: bool) {
        self.deferred = deferred;
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Clip bounds in local coordinates
    pub fn clip_bounds(&self) -> Rect {
        self.snapshots.local_clip()
    }

    /// Current clip in target coordinates
    pub fn clip_rect_target(&self) -> Rect {
        *self.snapshots.clip_rect()
    }

    /// Draws currently record dirty rects into a layer
    fn has_layer(&self) -> bool {
        let snapshot = self.snapshots.current();
        snapshot.flags.contains(SnapshotFlags::FBO_TARGET) && snapshot.target_layer.is_some()
    }

    /// Mark a local rect dirty in the target layer, mapped by `transform`
    fn dirty_layer(&mut self, left: f32, top: f32, right: f32, bottom: f32, transform: Option<&Matrix4>) {
        if !self.has_layer() {
            return;
        }
        let mut bounds = Rect::new(left, top, right, bottom);
        if let Some(transform) = transform {
            transform.map_rect(&mut bounds);
        }
        self.dirty_layer_unchecked(bounds);
    }

    /// Mark a target rect dirty, clipped to the current clip
    fn dirty_layer_unchecked(&mut self, mut bounds: Rect) {
        let Some(target) = self.snapshots.current().target_layer.clone() else {
            return;
        };
        if !bounds.intersect(self.snapshots.clip_rect()) {
            return;
        }
        bounds.snap_to_pixel_boundaries();
        let dirty = gloss_paint::IRect::new(
            bounds.left as i32,
            bounds.top as i32,
            bounds.right as i32,
            bounds.bottom as i32,
        );
        if !dirty.is_empty() {
            with_layer(&mut self.snapshots, &target, |layer| layer.dirty(dirty));
        }
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::headless::SoftwareDevice;

    fn renderer() -> Renderer<SoftwareDevice> {
        let mut renderer = Renderer::new(SoftwareDevice::new(64, 64), RendererConfig::default());
        renderer.set_viewport(64, 64);
        renderer.prepare(false);
        renderer
    }

    #[test]
    fn test_save_count_after_prepare() {
        let mut r = renderer();
        assert_eq!(r.save_count(), 1);
        assert_eq!(r.save(SaveFlags::MATRIX_CLIP), 1);
        assert_eq!(r.save(SaveFlags::MATRIX), 2);
        assert_eq!(r.save_count(), 3);
        r.restore_to_count(1);
        assert_eq!(r.save_count(), 1);
    }

    #[test]
    fn test_restore_never_pops_frame_snapshot() {
        let mut r = renderer();
        r.restore();
        r.restore();
        assert_eq!(r.save_count(), 1);
        r.restore_to_count(-4);
        assert_eq!(r.save_count(), 1);
    }

    #[test]
    fn test_matrix_save_restores_transform() {
        let mut r = renderer();
        r.translate(5.0, 6.0);
        let count = r.save(SaveFlags::MATRIX);
        r.scale(2.0, 2.0);
        r.restore_to_count(count);
        assert_eq!(r.matrix(), Matrix4::from_translate(5.0, 6.0));
    }

    #[test]
    fn test_unsaved_transform_survives_restore() {
        let mut r = renderer();
        let count = r.save(SaveFlags::CLIP);
        r.translate(3.0, 0.0);
        r.restore_to_count(count);
        assert_eq!(r.matrix(), Matrix4::from_translate(3.0, 0.0));
    }

    #[test]
    fn test_with_modifiers_restores_previous() {
        let mut r = renderer();
        r.set_color_filter(Some(ColorFilter::Lighting {
            mul: gloss_paint::Color::WHITE,
            add: gloss_paint::Color::BLACK,
        }));
        let before = r.modifiers().clone();
        r.with_modifiers(DrawModifiers::default(), |r| {
            assert!(r.modifiers().color_filter.is_none());
        });
        assert_eq!(r.modifiers(), &before);
    }

    #[test]
    fn test_set_matrix_none_loads_identity() {
        let mut r = renderer();
        r.rotate(30.0);
        r.set_matrix(None);
        assert!(r.matrix().is_identity());
    }
}
