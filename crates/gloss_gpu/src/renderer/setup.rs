//! Per-draw setup pipeline
//!
//! Every primitive runs the same ordered steps: pending layer clears and clip
//! state, a fresh program description, color, shader and color filter,
//! blending, program selection, model-view and uniforms, then the draw call.
//! Each step only records what it decided; [`Renderer::issue`] sends the
//! accumulated uniforms with the draw.

use gloss_paint::{Color, Matrix4, Shader, TransferMode};

use crate::blend::blend_factors;
use crate::caches::Caches;
use crate::config::StencilClipDebug;
use crate::device::{
    DrawCall, GpuDevice, ShaderUniforms, StencilMode, TextureFilter, TextureId, TextureWrap,
    Topology, VertexData,
};
use crate::program::{ColorOp, ComposeStage, ShaderStage};

use super::{DrawState, Renderer};

/// Texture unit used by shader stages, after the primary texture
const SHADER_UNIT: u32 = 1;
/// Texture unit of the second stage of a compose shader
const COMPOSE_UNIT: u32 = 2;

/// Colors at or above this are treated as fully opaque white
const COLOR_THRESHOLD: f32 = 0.999;

fn is_opaque_white(color: &[f32; 4]) -> bool {
    color.iter().all(|&c| c >= COLOR_THRESHOLD)
}

/// Maps shader space into the unit domain of the shader stage
fn shader_domain(shader: &Shader) -> Matrix4 {
    match shader {
        Shader::LinearGradient { start, end, .. } => {
            let (dx, dy) = (end.x - start.x, end.y - start.y);
            let length_sq = dx * dx + dy * dy;
            if length_sq <= f32::EPSILON {
                return Matrix4::from_scale(0.0, 0.0);
            }
            let offset = -(start.x * dx + start.y * dy) / length_sq;
            Matrix4::from_affine([
                dx / length_sq,
                dy / length_sq,
                offset,
                0.0,
                1.0,
                0.0,
                0.0,
                0.0,
                1.0,
            ])
        }
        Shader::RadialGradient { center, radius, .. } => {
            if *radius <= f32::EPSILON {
                return Matrix4::from_scale(0.0, 0.0);
            }
            let mut domain = Matrix4::from_scale(1.0 / radius, 1.0 / radius);
            domain.translate(-center.x, -center.y);
            domain
        }
        Shader::SweepGradient { center, .. } => Matrix4::from_translate(-center.x, -center.y),
        Shader::Bitmap { bitmap, .. } => {
            let (w, h) = (bitmap.width().max(1) as f32, bitmap.height().max(1) as f32);
            Matrix4::from_scale(1.0 / w, 1.0 / h)
        }
        // Each side is mapped on its own
        Shader::Compose { .. } => Matrix4::IDENTITY,
    }
}

/// Uniforms of one stage; `tail` maps draw positions into the shader's
/// parent space
fn stage_uniforms(shader: &Shader, tail: &Matrix4, unit: u32) -> ShaderUniforms {
    let mut screen_space = shader_domain(shader);
    let mut local = Matrix4::IDENTITY;
    local.load_inverse(shader.local_matrix());
    screen_space.multiply(&local);
    screen_space.multiply(tail);
    let (tile_x, tile_y) = shader.tile_modes();
    ShaderUniforms {
        unit,
        screen_space,
        tile_x,
        tile_y,
    }
}

/// Bind the texture of a single shader stage to `unit`
fn bind_shader_stage<D: GpuDevice>(
    device: &mut D,
    caches: &mut Caches,
    draw: &mut DrawState,
    shader: &Shader,
    unit: u32,
) -> Option<ShaderStage> {
    let (stage, texture) = match shader {
        Shader::LinearGradient { stops, .. } => (
            ShaderStage::Gradient,
            caches.gradients.get(device, &mut caches.state, stops),
        ),
        Shader::RadialGradient { stops, .. } => (
            ShaderStage::RadialGradient,
            caches.gradients.get(device, &mut caches.state, stops),
        ),
        Shader::SweepGradient { stops, .. } => (
            ShaderStage::SweepGradient,
            caches.gradients.get(device, &mut caches.state, stops),
        ),
        Shader::Bitmap { bitmap, .. } => (
            ShaderStage::Bitmap,
            caches.textures.get(device, &mut caches.state, bitmap),
        ),
        Shader::Compose { .. } => return None,
    };
    let texture = texture?;

    // Ramps are tiled in the program, bitmaps by the sampler
    let (wrap_s, wrap_t) = match shader {
        Shader::Bitmap { tile_x, tile_y, .. } => ((*tile_x).into(), (*tile_y).into()),
        _ => (TextureWrap::Clamp, TextureWrap::Clamp),
    };
    let state = &mut caches.state;
    state.bind_texture(device, unit, Some(texture.id));
    state.set_texture_filter(device, texture.id, TextureFilter::Linear, false);
    state.set_texture_wrap(device, texture.id, wrap_s, wrap_t);
    if texture.cleanup {
        draw.shader_textures.push(texture);
    }
    Some(stage)
}

impl DrawState {
    fn reset(&mut self) {
        self.description.reset();
        self.uniforms = Default::default();
        self.color = [0.0; 4];
        self.color_set = false;
        self.set_shader_color = false;
        self.track_dirty = true;
        self.program_ready = false;
        self.model_view = Matrix4::IDENTITY;
    }

    fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
        self.color_set = true;
        self.set_shader_color = !is_opaque_white(&color);
        self.description.modulate = self.set_shader_color;
    }
}

impl<D: GpuDevice> Renderer<D> {
    /// First step of every draw
    pub(super) fn setup_draw(&mut self, clear_layers: bool) {
        self.release_shader_textures();
        if clear_layers {
            self.clear_layer_regions();
        }
        // Scissor and stencil are brought up to date before anything else
        if self.dirty_clip {
            if self.caches.state.scissor_enabled() {
                self.set_scissor_from_clip();
            }
            self.set_stencil_from_clip();
        }
        self.draw.reset();
        self.draw.description.has_debug_highlight = !self.config.debug.overdraw
            && self.config.debug.stencil_clip == StencilClipDebug::Highlight
            && self.caches.state.stencil_mode() == StencilMode::Test;
    }

    pub(super) fn release_shader_textures(&mut self) {
        for texture in self.draw.shader_textures.drain(..) {
            texture.release(&mut self.device, &mut self.caches.state);
        }
    }

    pub(super) fn setup_draw_with_texture(&mut self, alpha8: bool) {
        self.draw.description.has_texture = true;
        self.draw.description.has_alpha8_texture = alpha8;
    }

    pub(super) fn setup_draw_with_external_texture(&mut self) {
        self.draw.description.has_external_texture = true;
    }

    pub(super) fn setup_draw_with_texture_and_color(&mut self) {
        self.draw.description.has_texture = true;
        self.draw.description.has_colors = true;
    }

    pub(super) fn setup_draw_aa(&mut self) {
        self.draw.description.has_vertex_alpha = true;
    }

    pub(super) fn setup_draw_point(&mut self, size: f32, round: bool) {
        self.draw.description.is_point = round;
        self.draw.uniforms.point_size = size;
    }

    /// Solid color, multiplied by the snapshot alpha and premultiplied
    pub(super) fn setup_draw_color(&mut self, color: Color) {
        self.draw.set_color(color.premultiplied(self.snapshots.current().alpha));
    }

    /// A premultiplied color used as is
    pub(super) fn setup_draw_color_premultiplied(&mut self, color: [f32; 4]) {
        self.draw.set_color(color);
    }

    /// Texture modulation by a plain alpha
    pub(super) fn setup_draw_alpha(&mut self, alpha: f32) {
        self.draw.set_color([alpha; 4]);
    }

    /// Color applied to the coverage of an alpha texture. `alpha` is final.
    pub(super) fn setup_draw_alpha8_color(&mut self, color: Color, alpha: f32) {
        self.draw.color = color.with_alpha(1.0).premultiplied(alpha);
        self.draw.color_set = true;
        self.draw.set_shader_color = true;
        self.draw.description.modulate = true;
    }

    /// Describe the shader stages and bind their textures
    pub(super) fn setup_draw_shader(&mut self) {
        let Some(shader) = self.modifiers.shader.as_ref() else {
            return;
        };
        let (first, second) = match shader {
            Shader::Compose { first, second, mode, .. } => (first.as_ref(), Some((second.as_ref(), *mode))),
            other => (other, None),
        };
        let Some(stage) = bind_shader_stage(&mut self.device, &mut self.caches, &mut self.draw, first, SHADER_UNIT)
        else {
            tracing::warn!("shader texture unavailable, drawing without shader");
            return;
        };
        self.draw.description.shader = Some(stage);

        if let Some((second, mode)) = second {
            match bind_shader_stage(&mut self.device, &mut self.caches, &mut self.draw, second, COMPOSE_UNIT) {
                Some(stage) => self.draw.description.compose = Some(ComposeStage { stage, mode }),
                None => tracing::warn!("compose shader texture unavailable, drawing first shader only"),
            }
        }
    }

    pub(super) fn setup_draw_color_filter(&mut self) {
        let Some(filter) = self.modifiers.color_filter.as_ref() else {
            return;
        };
        self.draw.description.color_op = match filter {
            gloss_paint::ColorFilter::Matrix(_) => ColorOp::Matrix,
            gloss_paint::ColorFilter::Lighting { .. } => ColorOp::Lighting,
            gloss_paint::ColorFilter::Blend { .. } => ColorOp::Blend,
        };
    }

    /// Blending implied by the color and the modifiers only
    pub(super) fn setup_draw_blending_mode(&mut self, mode: TransferMode) {
        let blend = (self.draw.color_set && self.draw.color[3] < 1.0)
            || self.shader_blends();
        self.choose_blending(blend, mode, false);
    }

    pub(super) fn setup_draw_blending(&mut self, blend: bool, mode: TransferMode, swap_src_dst: bool) {
        let blend = blend
            || (self.draw.color_set && self.draw.color[3] < 1.0)
            || self.shader_blends()
            || self
                .modifiers
                .color_filter
                .as_ref()
                .is_some_and(|f| f.blend());
        self.choose_blending(blend, mode, swap_src_dst);
    }

    fn shader_blends(&self) -> bool {
        self.draw.description.shader.is_some()
            && self.modifiers.shader.as_ref().is_some_and(|s| s.blend())
    }

    fn choose_blending(&mut self, blend: bool, mut mode: TransferMode, swap_src_dst: bool) {
        if mode == TransferMode::Clear && self.draw.color_set {
            self.draw.color = [0.0, 0.0, 0.0, 1.0];
            self.draw.set_shader_color = true;
            self.draw.description.modulate = true;
        }
        let blend = blend || mode != TransferMode::SrcOver;
        if !blend {
            self.caches.state.set_blend(&mut self.device, false);
            return;
        }

        if !mode.is_native() {
            if self.caches.limits.framebuffer_fetch {
                // The program blends by reading the destination itself
                self.draw.description.framebuffer_mode = Some(mode);
                self.draw.description.swap_src_dst = swap_src_dst;
                self.caches.state.set_blend(&mut self.device, false);
                return;
            }
            tracing::trace!("{:?} needs framebuffer fetch, falling back to SrcOver", mode);
            mode = TransferMode::SrcOver;
        }

        self.caches.state.set_blend(&mut self.device, true);
        if let Some((src, dst)) = blend_factors(mode, swap_src_dst) {
            self.caches.state.set_blend_func(&mut self.device, src, dst);
        }
    }

    /// Resolve the program for the description built so far
    pub(super) fn setup_draw_program(&mut self) {
        match self.caches.programs.get(&mut self.device, &self.draw.description) {
            Ok(program) => {
                self.caches.state.use_program(&mut self.device, Some(program));
                self.draw.program_ready = true;
            }
            Err(err) => {
                tracing::warn!("unable to create program: {}", err);
                self.draw.program_ready = false;
            }
        }
    }

    pub(super) fn setup_draw_dirty_regions_disabled(&mut self) {
        self.draw.track_dirty = false;
    }

    fn load_transform(&mut self, transform: &Matrix4, offset: bool) {
        let mut combined = self.ortho;
        if offset {
            combined.translate(0.375, 0.375);
        }
        combined.multiply(transform);
        combined.multiply(&self.draw.model_view);
        self.draw.uniforms.transform = combined;
    }

    /// Model-view translating local geometry to `(left, top)`
    pub(super) fn setup_draw_model_view_translate(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        ignore_transform: bool,
    ) {
        self.draw.model_view = Matrix4::from_translate(left, top);
        if ignore_transform {
            self.load_transform(&Matrix4::IDENTITY, false);
            if self.draw.track_dirty {
                self.dirty_layer(left, top, right, bottom, None);
            }
        } else {
            let transform = *self.snapshots.transform();
            self.load_transform(&transform, false);
            if self.draw.track_dirty {
                self.dirty_layer(left, top, right, bottom, Some(&transform));
            }
        }
    }

    /// Model-view stretching the unit square over the rect
    pub(super) fn setup_draw_model_view(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        ignore_transform: bool,
        ignore_model_view: bool,
    ) {
        self.draw.model_view = if ignore_model_view {
            Matrix4::IDENTITY
        } else {
            let mut model_view = Matrix4::from_translate(left, top);
            model_view.scale(right - left, bottom - top);
            model_view
        };
        let dirty = right - left > 0.0 && bottom - top > 0.0;
        if ignore_transform {
            self.load_transform(&Matrix4::IDENTITY, false);
            if self.draw.track_dirty && dirty {
                self.dirty_layer(left, top, right, bottom, None);
            }
        } else {
            let transform = *self.snapshots.transform();
            self.load_transform(&transform, false);
            if self.draw.track_dirty && dirty {
                self.dirty_layer(left, top, right, bottom, Some(&transform));
            }
        }
    }

    /// Geometry already in local coordinates
    pub(super) fn setup_draw_model_view_identity(&mut self, offset: bool) {
        self.draw.model_view = Matrix4::IDENTITY;
        let transform = *self.snapshots.transform();
        self.load_transform(&transform, offset);
    }

    pub(super) fn setup_draw_texture(&mut self, texture: TextureId) {
        self.caches.state.bind_texture(&mut self.device, 0, Some(texture));
    }

    pub(super) fn setup_draw_texture_transform(&mut self, matrix: &Matrix4) {
        self.draw.description.has_texture_transform = true;
        self.draw.uniforms.texture_transform = *matrix;
    }

    /// Color uniform for draws whose color is the paint color
    pub(super) fn setup_draw_color_uniforms(&mut self) {
        let has_shader = self.draw.description.shader.is_some();
        if (self.draw.color_set && !has_shader) || (has_shader && self.draw.set_shader_color) {
            self.draw.uniforms.color = self.draw.color;
        }
    }

    /// Color uniform for texture draws, only needed when it modulates
    pub(super) fn setup_draw_pure_color_uniforms(&mut self) {
        if self.draw.set_shader_color {
            self.draw.uniforms.color = self.draw.color;
        }
    }

    /// Shader mapping. With `ignore_transform`, positions are in target
    /// space and are brought back to local space first.
    pub(super) fn setup_draw_shader_uniforms(&mut self, ignore_transform: bool) {
        if self.draw.description.shader.is_none() {
            return;
        }
        let Some(shader) = self.modifiers.shader.as_ref() else {
            return;
        };
        let mut tail = Matrix4::IDENTITY;
        if ignore_transform {
            tail.load_inverse(self.snapshots.transform());
        }
        tail.multiply(&self.draw.model_view);

        match shader {
            Shader::Compose { first, second, local_matrix, .. } => {
                let mut outer = Matrix4::IDENTITY;
                outer.load_inverse(local_matrix);
                outer.multiply(&tail);
                self.draw.uniforms.shader = Some(stage_uniforms(first, &outer, SHADER_UNIT));
                if self.draw.description.compose.is_some() {
                    self.draw.uniforms.compose_shader = Some(stage_uniforms(second, &outer, COMPOSE_UNIT));
                }
            }
            _ => self.draw.uniforms.shader = Some(stage_uniforms(shader, &tail, SHADER_UNIT)),
        }
    }

    pub(super) fn setup_draw_color_filter_uniforms(&mut self) {
        if self.draw.description.color_op != ColorOp::None {
            self.draw.uniforms.color_filter = self.modifiers.color_filter.clone();
        }
    }

    /// Send the uniforms and the draw. Skipped when no program is bound.
    pub(super) fn issue(&mut self, topology: Topology, vertices: VertexData<'_>, indices: Option<&[u16]>) {
        if !self.draw.program_ready || vertices.is_empty() {
            return;
        }
        self.device.set_uniforms(&self.draw.uniforms);
        self.device.draw(&DrawCall {
            topology,
            vertices,
            indices,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gloss_paint::Point;

    #[test]
    fn test_gradient_domain_maps_endpoints() {
        let shader = Shader::linear(
            Point::new(10.0, 0.0),
            Point::new(30.0, 0.0),
            Color::RED,
            Color::BLUE,
        );
        let domain = shader_domain(&shader);
        assert!((domain.map_point(10.0, 5.0).x - 0.0).abs() < 1e-5);
        assert!((domain.map_point(20.0, 9.0).x - 0.5).abs() < 1e-5);
        assert!((domain.map_point(30.0, 0.0).x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_radial_domain_is_unit_circle_at_center() {
        let shader = Shader::radial(Point::new(20.0, 10.0), 5.0, Color::RED, Color::BLUE);
        let domain = shader_domain(&shader);
        let center = domain.map_point(20.0, 10.0);
        assert!(center.x.abs() < 1e-5 && center.y.abs() < 1e-5);
        let edge = domain.map_point(20.0, 15.0);
        assert!(edge.x.abs() < 1e-5 && (edge.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_compose_sides_keep_their_own_domain() {
        let first = Shader::linear(Point::ZERO, Point::new(10.0, 0.0), Color::RED, Color::BLUE);
        let second = Shader::radial(Point::new(5.0, 5.0), 5.0, Color::WHITE, Color::BLACK);
        let Some(Shader::Compose { first, second, .. }) =
            Shader::compose(first, second, TransferMode::Multiply)
        else {
            panic!("compose shader");
        };
        let tail = Matrix4::from_translate(2.0, 0.0);
        let a = stage_uniforms(&first, &tail, SHADER_UNIT);
        let b = stage_uniforms(&second, &tail, COMPOSE_UNIT);
        assert!((a.screen_space.map_point(3.0, 0.0).x - 0.5).abs() < 1e-5);
        let p = b.screen_space.map_point(3.0, 5.0);
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
        assert_eq!(b.unit, COMPOSE_UNIT);
    }

    #[test]
    fn test_opaque_white_does_not_modulate() {
        let mut state = DrawState::default();
        state.set_color([1.0; 4]);
        assert!(!state.description.modulate);
        state.set_color([0.5, 0.5, 0.5, 0.5]);
        assert!(state.description.modulate);
    }
}
