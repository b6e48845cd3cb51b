//! CPU implementation of the device boundary
//!
//! [`SoftwareDevice`] keeps every surface in memory as premultiplied floats
//! and rasterizes draws on the CPU. It follows GL semantics where the
//! renderer depends on them: window coordinates start at the bottom left,
//! the scissor restricts clears, a framebuffer without a stencil attachment
//! passes every stencil test, and fixed-function blending combines the
//! program output with the target. Programs are interpreted from their
//! [`ProgramDescription`] instead of being compiled.
//!
//! Tests read results back with [`CapturedFrame`] and count device calls
//! through [`CallLedger`].

mod font;
mod frame;
mod raster;

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::device::{
    BlendFactor, DeviceLimits, DrawCall, FramebufferId, GpuDevice, ProgramId, RenderBufferId, ShaderUniforms,
    StencilMode, TextureFilter, TextureFormat, TextureId, TextureWrap, Topology, Uniforms, VertexData,
};
use crate::error::{GpuError, Result};
use crate::program::{ColorOp, ProgramDescription, ShaderStage};

pub use font::BlockFont;
pub use frame::CapturedFrame;

use raster::{Surface, Varyings, WindowVertex};

/// Counts of device calls, for tests asserting on redundant state changes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallLedger {
    pub draws: usize,
    pub clears: usize,
    pub stencil_clears: usize,
    pub uploads: usize,
    pub copies: usize,
    pub texture_binds: usize,
    pub framebuffer_binds: usize,
    pub program_uses: usize,
    pub programs_created: usize,
    pub blend_changes: usize,
    pub scissor_changes: usize,
    pub stencil_changes: usize,
}

struct SoftTexture {
    format: TextureFormat,
    surface: Surface,
    filter: TextureFilter,
    wrap_s: TextureWrap,
    wrap_t: TextureWrap,
}

impl Default for SoftTexture {
    fn default() -> Self {
        Self {
            format: TextureFormat::Rgba,
            surface: Surface::default(),
            filter: TextureFilter::Nearest,
            wrap_s: TextureWrap::Clamp,
            wrap_t: TextureWrap::Clamp,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SoftFramebuffer {
    color: Option<TextureId>,
    stencil: Option<RenderBufferId>,
}

#[derive(Clone, Debug, Default)]
struct StencilBuffer {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl StencilBuffer {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0; width as usize * height as usize],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

/// Surfaces of the bound framebuffer, moved out of the device while a draw
/// or clear runs
struct Target {
    color: Surface,
    stencil: Option<StencilBuffer>,
}

/// In-memory GL-style device
pub struct SoftwareDevice {
    limits: DeviceLimits,
    width: u32,
    height: u32,
    window: Surface,
    window_stencil: StencilBuffer,

    next_id: u32,
    textures: FxHashMap<u32, SoftTexture>,
    framebuffers: FxHashMap<u32, SoftFramebuffer>,
    render_buffers: FxHashMap<u32, StencilBuffer>,
    programs: FxHashMap<u32, ProgramDescription>,

    framebuffer: FramebufferId,
    units: FxHashMap<u32, TextureId>,
    viewport: (i32, i32),
    blend: bool,
    blend_func: (BlendFactor, BlendFactor),
    scissor_enabled: bool,
    scissor: (i32, i32, i32, i32),
    stencil_mode: StencilMode,
    program: Option<ProgramId>,
    uniforms: Uniforms,

    errors: VecDeque<GpuError>,
    calls: CallLedger,
}

impl SoftwareDevice {
    /// Device with a `width` x `height` window target
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_limits(width, height, DeviceLimits::default())
    }

    pub fn with_limits(width: u32, height: u32, limits: DeviceLimits) -> Self {
        Self {
            limits,
            width,
            height,
            window: Surface::new(width, height),
            window_stencil: StencilBuffer::new(width, height),
            next_id: 1,
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            render_buffers: FxHashMap::default(),
            programs: FxHashMap::default(),
            framebuffer: FramebufferId::DEFAULT,
            units: FxHashMap::default(),
            viewport: (width as i32, height as i32),
            blend: false,
            blend_func: (BlendFactor::One, BlendFactor::Zero),
            scissor_enabled: false,
            scissor: (0, 0, width as i32, height as i32),
            stencil_mode: StencilMode::Disabled,
            program: None,
            uniforms: Uniforms::default(),
            errors: VecDeque::new(),
            calls: CallLedger::default(),
        }
    }

    /// Size of the window target
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn calls(&self) -> &CallLedger {
        &self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = CallLedger::default();
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn render_buffer_count(&self) -> usize {
        self.render_buffers.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn bound_framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn blend_enabled(&self) -> bool {
        self.blend
    }

    /// Scissor box in window coordinates, `None` while disabled
    pub fn scissor(&self) -> Option<(i32, i32, i32, i32)> {
        self.scissor_enabled.then_some(self.scissor)
    }

    pub fn stencil_mode(&self) -> StencilMode {
        self.stencil_mode
    }

    /// Size of a live texture
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures
            .get(&texture.0)
            .map(|t| (t.surface.width, t.surface.height))
    }

    /// Premultiplied texel of a texture, `y` counted from the first uploaded row
    pub fn texel(&self, texture: TextureId, x: i32, y: i32) -> Option<[f32; 4]> {
        let texture = self.textures.get(&texture.0)?;
        texture.surface.index(x, y).map(|i| texture.surface.pixels[i])
    }

    /// Window pixel in GL coordinates
    pub(crate) fn window_pixel(&self, x: i32, y: i32) -> [f32; 4] {
        self.window.get(x, y)
    }

    /// Window stencil value at `(x, y)` counted from the top left
    pub fn stencil_value(&self, x: u32, y: u32) -> u8 {
        if y >= self.height {
            return 0;
        }
        let y = (self.height - 1 - y) as i32;
        self.window_stencil
            .index(x as i32, y)
            .map_or(0, |i| self.window_stencil.values[i])
    }

    fn fail(&mut self, error: GpuError) {
        tracing::debug!("software device error: {}", error);
        self.errors.push_back(error);
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_target(&mut self) -> Option<Target> {
        if self.framebuffer.is_default() {
            return Some(Target {
                color: std::mem::take(&mut self.window),
                stencil: Some(std::mem::take(&mut self.window_stencil)),
            });
        }
        let fb = *self.framebuffers.get(&self.framebuffer.0)?;
        let color = fb.color?;
        let color = std::mem::take(&mut self.textures.get_mut(&color.0)?.surface);
        let stencil = fb
            .stencil
            .and_then(|id| self.render_buffers.get_mut(&id.0))
            .map(std::mem::take);
        Some(Target { color, stencil })
    }

    fn put_target(&mut self, target: Target) {
        if self.framebuffer.is_default() {
            self.window = target.color;
            if let Some(stencil) = target.stencil {
                self.window_stencil = stencil;
            }
            return;
        }
        let Some(fb) = self.framebuffers.get(&self.framebuffer.0).copied() else {
            return;
        };
        if let Some(texture) = fb.color.and_then(|id| self.textures.get_mut(&id.0)) {
            texture.surface = target.color;
        }
        if let (Some(buffer), Some(stencil)) = (
            fb.stencil.and_then(|id| self.render_buffers.get_mut(&id.0)),
            target.stencil,
        ) {
            *buffer = stencil;
        }
    }

    fn bound_target(&mut self) -> Option<Target> {
        let target = self.take_target();
        if target.is_none() {
            self.fail(GpuError::IncompleteFramebuffer(format!(
                "framebuffer {} has no color attachment",
                self.framebuffer.0
            )));
        }
        target
    }

    fn in_scissor(&self, x: i32, y: i32) -> bool {
        if !self.scissor_enabled {
            return true;
        }
        let (sx, sy, sw, sh) = self.scissor;
        x >= sx && x < sx + sw && y >= sy && y < sy + sh
    }

    /// Pixel rectangle a clear touches
    fn clear_bounds(&self, width: u32, height: u32) -> (i32, i32, i32, i32) {
        let (w, h) = (width as i32, height as i32);
        if !self.scissor_enabled {
            return (0, 0, w, h);
        }
        let (sx, sy, sw, sh) = self.scissor;
        (sx.max(0), sy.max(0), (sx + sw).min(w), (sy + sh).min(h))
    }

    fn sample_unit(&self, unit: u32, s: f32, t: f32) -> [f32; 4] {
        let Some(texture) = self.units.get(&unit).and_then(|id| self.textures.get(&id.0)) else {
            return [0.0; 4];
        };
        let texel = texture
            .surface
            .sample(s, t, texture.filter, texture.wrap_s, texture.wrap_t);
        match texture.format {
            TextureFormat::Rgba => texel,
            TextureFormat::Alpha => [0.0, 0.0, 0.0, texel[3]],
        }
    }

    fn sample_stage(&self, stage: ShaderStage, shader: &ShaderUniforms, local: [f32; 2]) -> [f32; 4] {
        let [x, y, _, w] = shader.screen_space.map_point4(local[0], local[1]);
        let (x, y) = if w != 0.0 { (x / w, y / w) } else { (x, y) };
        match stage {
            ShaderStage::Gradient => self.sample_unit(shader.unit, shader.tile_x.apply(x), 0.5),
            ShaderStage::RadialGradient => {
                self.sample_unit(shader.unit, shader.tile_x.apply(x.hypot(y)), 0.5)
            }
            ShaderStage::SweepGradient => {
                let t = y.atan2(x) / std::f32::consts::TAU;
                self.sample_unit(shader.unit, t - t.floor(), 0.5)
            }
            ShaderStage::Bitmap => self.sample_unit(shader.unit, shader.tile_x.apply(x), shader.tile_y.apply(y)),
        }
    }

    /// Shader output, with the compose stage blended over the first stage
    fn sample_shader(&self, desc: &ProgramDescription, local: [f32; 2]) -> Option<[f32; 4]> {
        let stage = desc.shader?;
        let Some(uniforms) = self.uniforms.shader.as_ref() else {
            return Some([0.0; 4]);
        };
        let first = self.sample_stage(stage, uniforms, local);
        match (desc.compose, self.uniforms.compose_shader.as_ref()) {
            (Some(compose), Some(uniforms)) => {
                let second = self.sample_stage(compose.stage, uniforms, local);
                Some(compose.mode.apply(second, first))
            }
            _ => Some(first),
        }
    }

    /// Program output for one fragment
    fn shade(&self, desc: &ProgramDescription, v: &Varyings) -> [f32; 4] {
        let color = self.uniforms.color;
        let texel = (desc.has_texture || desc.has_external_texture).then(|| {
            let (mut s, mut t) = (v.uv[0], v.uv[1]);
            if desc.has_texture_transform {
                let p = self.uniforms.texture_transform.map_point4(s, t);
                (s, t) = (p[0], p[1]);
            }
            self.sample_unit(0, s, t)
        });
        let shaded = self.sample_shader(desc, v.local);

        let mut out = match (texel, shaded) {
            (Some(texel), Some(shaded)) if desc.has_alpha8_texture => {
                let a = if desc.modulate { color[3] } else { 1.0 };
                scale(shaded, texel[3] * a)
            }
            (Some(texel), _) if desc.has_alpha8_texture => scale(color, texel[3]),
            (Some(texel), _) => {
                let mut c = texel;
                if desc.has_colors {
                    c = multiply(c, v.color);
                }
                if desc.modulate {
                    c = multiply(c, color);
                }
                c
            }
            (None, Some(shaded)) if desc.modulate => scale(shaded, color[3]),
            (None, Some(shaded)) => shaded,
            (None, None) => color,
        };
        if desc.has_vertex_alpha {
            out = scale(out, v.alpha);
        }
        if desc.color_op != ColorOp::None {
            if let Some(filter) = &self.uniforms.color_filter {
                out = filter.apply(out);
            }
        }
        if desc.has_debug_highlight {
            out = [0.0, out[3], 0.0, out[3]];
        }
        out
    }

    fn blend(&self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let (sf, df) = self.blend_func;
        let s = factor(sf, src, dst);
        let d = factor(df, src, dst);
        std::array::from_fn(|i| (src[i] * s[i] + dst[i] * d[i]).clamp(0.0, 1.0))
    }

    /// Scissor, stencil, shading and blending for one covered pixel
    fn fragment(&self, desc: &ProgramDescription, target: &mut Target, x: i32, y: i32, v: Varyings) {
        if !self.in_scissor(x, y) {
            return;
        }
        let stencil = match target.stencil.as_mut() {
            Some(s) => match s.index(x, y) {
                Some(i) => Some(&mut s.values[i]),
                None => None,
            },
            None => None,
        };
        let (pass, write_color) = match (self.stencil_mode, stencil) {
            (StencilMode::Disabled, _) => (true, true),
            (StencilMode::Write, Some(value)) => {
                *value = 1;
                (true, false)
            }
            (StencilMode::Write, None) => (true, false),
            (StencilMode::DebugWrite, Some(value)) => {
                *value = 1;
                (true, true)
            }
            (StencilMode::Increment, Some(value)) => {
                *value = value.saturating_add(1);
                (true, true)
            }
            (StencilMode::Test, Some(value)) => (*value == 1, true),
            (StencilMode::DebugTest { level, greater }, Some(value)) => {
                (if greater { *value >= level } else { *value == level }, true)
            }
            (_, None) => (true, true),
        };
        if !pass || !write_color {
            return;
        }
        let Some(i) = target.color.index(x, y) else {
            return;
        };

        let src = self.shade(desc, &v);
        let dst = target.color.pixels[i];
        target.color.pixels[i] = match desc.framebuffer_mode {
            Some(mode) if desc.swap_src_dst => mode.apply(dst, src),
            Some(mode) => mode.apply(src, dst),
            None if self.blend => self.blend(src, dst),
            None => src.map(|c| c.clamp(0.0, 1.0)),
        };
    }

    fn project(&self, position: [f32; 2], varyings: Varyings) -> Option<WindowVertex> {
        let [x, y, _, w] = self.uniforms.transform.map_point4(position[0], position[1]);
        if w <= 0.0 {
            return None;
        }
        let (vw, vh) = (self.viewport.0 as f32, self.viewport.1 as f32);
        Some(WindowVertex {
            x: (x / w + 1.0) * 0.5 * vw,
            y: (y / w + 1.0) * 0.5 * vh,
            inv_w: 1.0 / w,
            varyings,
        })
    }

    fn window_vertices(&self, data: &VertexData<'_>) -> Vec<Option<WindowVertex>> {
        let base = Varyings {
            color: [1.0; 4],
            alpha: 1.0,
            ..Varyings::default()
        };
        match data {
            VertexData::Position(vertices) => vertices
                .iter()
                .map(|v| {
                    let varyings = Varyings {
                        local: v.position,
                        ..base
                    };
                    self.project(v.position, varyings)
                })
                .collect(),
            VertexData::Texture(vertices) => vertices
                .iter()
                .map(|v| {
                    let varyings = Varyings {
                        local: v.position,
                        uv: v.texture,
                        ..base
                    };
                    self.project(v.position, varyings)
                })
                .collect(),
            VertexData::ColorTexture(vertices) => vertices
                .iter()
                .map(|v| {
                    let varyings = Varyings {
                        local: v.position,
                        uv: v.texture,
                        color: v.color,
                        ..base
                    };
                    self.project(v.position, varyings)
                })
                .collect(),
            VertexData::Alpha(vertices) => vertices
                .iter()
                .map(|v| {
                    let varyings = Varyings {
                        local: v.position,
                        alpha: v.alpha,
                        ..base
                    };
                    self.project(v.position, varyings)
                })
                .collect(),
        }
    }
}

fn scale(c: [f32; 4], k: f32) -> [f32; 4] {
    c.map(|v| v * k)
}

fn multiply(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    std::array::from_fn(|i| a[i] * b[i])
}

fn factor(f: BlendFactor, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    match f {
        BlendFactor::Zero => [0.0; 4],
        BlendFactor::One => [1.0; 4],
        BlendFactor::SrcColor => src,
        BlendFactor::OneMinusSrcColor => src.map(|c| 1.0 - c),
        BlendFactor::SrcAlpha => [src[3]; 4],
        BlendFactor::OneMinusSrcAlpha => [1.0 - src[3]; 4],
        BlendFactor::DstAlpha => [dst[3]; 4],
        BlendFactor::OneMinusDstAlpha => [1.0 - dst[3]; 4],
        BlendFactor::DstColor => dst,
        BlendFactor::OneMinusDstColor => dst.map(|c| 1.0 - c),
    }
}

fn unpack(format: TextureFormat, pixels: &[u8]) -> Vec<[f32; 4]> {
    match format {
        TextureFormat::Rgba => pixels
            .chunks_exact(4)
            .map(|p| std::array::from_fn(|i| p[i] as f32 / 255.0))
            .collect(),
        TextureFormat::Alpha => pixels.iter().map(|a| [0.0, 0.0, 0.0, *a as f32 / 255.0]).collect(),
    }
}

impl GpuDevice for SoftwareDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_texture(&mut self) -> TextureId {
        let id = self.allocate_id();
        self.textures.insert(id, SoftTexture::default());
        TextureId(id)
    }

    fn allocate_texture(
        &mut self,
        texture: TextureId,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<()> {
        let max = self.limits.max_texture_size;
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.is_some_and(|p| p.len() < expected) {
            return Err(GpuError::InvalidValue(format!(
                "{} bytes for a {}x{} texture",
                pixels.map_or(0, |p| p.len()),
                width,
                height
            )));
        }
        let Some(entry) = self.textures.get_mut(&texture.0) else {
            return Err(GpuError::UnknownResource(format!("texture {}", texture.0)));
        };
        entry.format = format;
        entry.surface = match pixels {
            Some(pixels) => Surface {
                width,
                height,
                pixels: unpack(format, &pixels[..expected]),
            },
            None => Surface::new(width, height),
        };
        self.calls.uploads += 1;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
        self.units.retain(|_, bound| *bound != texture);
        for fb in self.framebuffers.values_mut() {
            if fb.color == Some(texture) {
                fb.color = None;
            }
        }
    }

    fn set_texture_filter(&mut self, texture: TextureId, filter: TextureFilter) {
        match self.textures.get_mut(&texture.0) {
            Some(entry) => entry.filter = filter,
            None => self.fail(GpuError::UnknownResource(format!("texture {}", texture.0))),
        }
    }

    fn set_texture_wrap(&mut self, texture: TextureId, wrap_s: TextureWrap, wrap_t: TextureWrap) {
        match self.textures.get_mut(&texture.0) {
            Some(entry) => {
                entry.wrap_s = wrap_s;
                entry.wrap_t = wrap_t;
            }
            None => self.fail(GpuError::UnknownResource(format!("texture {}", texture.0))),
        }
    }

    fn copy_framebuffer_to_texture(
        &mut self,
        texture: TextureId,
        dst_x: i32,
        dst_y: i32,
        src_x: i32,
        src_y: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(GpuError::UnknownResource(format!("texture {}", texture.0)));
        }
        let Some(target) = self.take_target() else {
            return Err(GpuError::IncompleteFramebuffer(format!(
                "framebuffer {} has no color attachment",
                self.framebuffer.0
            )));
        };
        let mut block = Vec::with_capacity(width.max(0) as usize * height.max(0) as usize);
        for y in 0..height {
            for x in 0..width {
                block.push((x, y, target.color.get(src_x + x, src_y + y)));
            }
        }
        self.put_target(target);

        let Some(entry) = self.textures.get_mut(&texture.0) else {
            return Err(GpuError::UnknownResource(format!("texture {}", texture.0)));
        };
        for (x, y, pixel) in block {
            if let Some(i) = entry.surface.index(dst_x + x, dst_y + y) {
                entry.surface.pixels[i] = pixel;
            }
        }
        self.calls.copies += 1;
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.texture_binds += 1;
        match texture {
            Some(texture) => {
                self.units.insert(unit, texture);
            }
            None => {
                self.units.remove(&unit);
            }
        }
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let id = self.allocate_id();
        self.framebuffers.insert(id, SoftFramebuffer::default());
        FramebufferId(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if framebuffer.is_default() {
            return;
        }
        self.framebuffers.remove(&framebuffer.0);
        if self.framebuffer == framebuffer {
            self.framebuffer = FramebufferId::DEFAULT;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        if !framebuffer.is_default() && !self.framebuffers.contains_key(&framebuffer.0) {
            self.fail(GpuError::InvalidOperation(format!(
                "binding unknown framebuffer {}",
                framebuffer.0
            )));
            return;
        }
        self.calls.framebuffer_binds += 1;
        self.framebuffer = framebuffer;
    }

    fn attach_texture(&mut self, framebuffer: FramebufferId, texture: Option<TextureId>) -> Result<()> {
        if let Some(texture) = texture {
            if !self.textures.contains_key(&texture.0) {
                return Err(GpuError::UnknownResource(format!("texture {}", texture.0)));
            }
        }
        let Some(fb) = self.framebuffers.get_mut(&framebuffer.0) else {
            return Err(GpuError::InvalidOperation(format!(
                "attaching to framebuffer {}",
                framebuffer.0
            )));
        };
        fb.color = texture;
        Ok(())
    }

    fn create_render_buffer(&mut self, width: u32, height: u32) -> Result<RenderBufferId> {
        let max = self.limits.max_texture_size;
        if width > max || height > max {
            return Err(GpuError::InvalidValue(format!(
                "{}x{} render buffer exceeds {}",
                width, height, max
            )));
        }
        let id = self.allocate_id();
        self.render_buffers.insert(id, StencilBuffer::new(width, height));
        Ok(RenderBufferId(id))
    }

    fn delete_render_buffer(&mut self, buffer: RenderBufferId) {
        self.render_buffers.remove(&buffer.0);
        for fb in self.framebuffers.values_mut() {
            if fb.stencil == Some(buffer) {
                fb.stencil = None;
            }
        }
    }

    fn attach_stencil(&mut self, framebuffer: FramebufferId, buffer: Option<RenderBufferId>) {
        match self.framebuffers.get_mut(&framebuffer.0) {
            Some(fb) => fb.stencil = buffer,
            None => self.fail(GpuError::InvalidOperation(format!(
                "attaching a stencil to framebuffer {}",
                framebuffer.0
            ))),
        }
    }

    fn set_viewport(&mut self, width: i32, height: i32) {
        self.viewport = (width, height);
    }

    fn set_blend_enabled(&mut self, enabled: bool) {
        self.calls.blend_changes += 1;
        self.blend = enabled;
    }

    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.calls.blend_changes += 1;
        self.blend_func = (src, dst);
    }

    fn set_scissor_enabled(&mut self, enabled: bool) {
        self.scissor_enabled = enabled;
    }

    fn is_scissor_enabled(&self) -> bool {
        self.scissor_enabled
    }

    fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.scissor_changes += 1;
        self.scissor = (x, y, width.max(0), height.max(0));
    }

    fn set_stencil_mode(&mut self, mode: StencilMode) {
        self.calls.stencil_changes += 1;
        self.stencil_mode = mode;
    }

    fn clear_stencil(&mut self) {
        self.calls.stencil_clears += 1;
        let Some(mut target) = self.bound_target() else {
            return;
        };
        if let Some(stencil) = target.stencil.as_mut() {
            let (l, b, r, t) = self.clear_bounds(stencil.width, stencil.height);
            for y in b..t {
                for x in l..r {
                    if let Some(i) = stencil.index(x, y) {
                        stencil.values[i] = 0;
                    }
                }
            }
        }
        self.put_target(target);
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.calls.clears += 1;
        let Some(mut target) = self.bound_target() else {
            return;
        };
        let (l, b, r, t) = self.clear_bounds(target.color.width, target.color.height);
        for y in b..t {
            for x in l..r {
                if let Some(i) = target.color.index(x, y) {
                    target.color.pixels[i] = color;
                }
            }
        }
        self.put_target(target);
    }

    fn create_program(&mut self, description: &ProgramDescription) -> Result<ProgramId> {
        if description.framebuffer_mode.is_some() && !self.limits.framebuffer_fetch {
            return Err(GpuError::InvalidOperation(
                "framebuffer fetch is not supported".to_string(),
            ));
        }
        let id = self.allocate_id();
        self.programs.insert(id, *description);
        self.calls.programs_created += 1;
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.calls.program_uses += 1;
        self.program = program;
    }

    fn set_uniforms(&mut self, uniforms: &Uniforms) {
        self.uniforms = uniforms.clone();
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        self.calls.draws += 1;
        let Some(desc) = self.program.and_then(|p| self.programs.get(&p.0)).copied() else {
            self.fail(GpuError::InvalidOperation("draw without a program".to_string()));
            return;
        };

        let vertices = self.window_vertices(&call.vertices);
        let order: Vec<usize> = match call.indices {
            Some(indices) => indices.iter().map(|i| *i as usize).collect(),
            None => (0..vertices.len()).collect(),
        };
        if order.iter().any(|i| *i >= vertices.len()) {
            self.fail(GpuError::InvalidValue("index out of range".to_string()));
            return;
        }

        let Some(mut target) = self.bound_target() else {
            return;
        };
        let width = target.color.width.min(self.viewport.0.max(0) as u32);
        let height = target.color.height.min(self.viewport.1.max(0) as u32);
        {
            let this = &*self;
            let mut emit = |x: i32, y: i32, v: Varyings| this.fragment(&desc, &mut target, x, y, v);
            match call.topology {
                Topology::Triangles => {
                    for tri in order.chunks_exact(3) {
                        if let (Some(a), Some(b), Some(c)) = (vertices[tri[0]], vertices[tri[1]], vertices[tri[2]]) {
                            raster::triangle([a, b, c], width, height, &mut emit);
                        }
                    }
                }
                Topology::TriangleStrip => {
                    for i in 0..order.len().saturating_sub(2) {
                        let (a, b, c) = (vertices[order[i]], vertices[order[i + 1]], vertices[order[i + 2]]);
                        if let (Some(a), Some(b), Some(c)) = (a, b, c) {
                            raster::triangle([a, b, c], width, height, &mut emit);
                        }
                    }
                }
                Topology::Points => {
                    let size = this.uniforms.point_size;
                    for v in order.iter().filter_map(|i| vertices[*i]) {
                        raster::point(v, size, desc.is_point, width, height, &mut emit);
                    }
                }
            }
        }
        self.put_target(target);
    }

    fn poll_error(&mut self) -> Option<GpuError> {
        self.errors.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{Vertex, UNIT_QUAD};
    use gloss_paint::Matrix4;

    fn ortho(width: f32, height: f32) -> Matrix4 {
        Matrix4::ortho(0.0, width, height, 0.0, -1.0, 1.0)
    }

    fn solid(device: &mut SoftwareDevice, color: [f32; 4]) {
        let program = device.create_program(&ProgramDescription::default()).unwrap();
        device.use_program(Some(program));
        device.set_uniforms(&Uniforms {
            transform: ortho(8.0, 8.0),
            color,
            ..Uniforms::default()
        });
    }

    fn quad(l: f32, t: f32, r: f32, b: f32) -> [Vertex; 4] {
        [Vertex::new(l, t), Vertex::new(r, t), Vertex::new(l, b), Vertex::new(r, b)]
    }

    fn fill(device: &mut SoftwareDevice, rect: [Vertex; 4]) {
        device.draw(&DrawCall {
            topology: Topology::TriangleStrip,
            vertices: VertexData::Position(&rect),
            indices: None,
        });
    }

    #[test]
    fn test_strip_fills_exact_pixels() {
        let mut device = SoftwareDevice::new(8, 8);
        solid(&mut device, [1.0, 0.0, 0.0, 1.0]);
        fill(&mut device, quad(2.0, 2.0, 4.0, 4.0));
        let frame = CapturedFrame::capture(&device);
        assert_eq!(frame.count([255, 0, 0, 255]), 4);
        assert_eq!(frame.pixel(2, 2), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(4, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn test_scissor_uses_window_coordinates() {
        let mut device = SoftwareDevice::new(8, 8);
        solid(&mut device, [0.0, 1.0, 0.0, 1.0]);
        device.set_scissor_enabled(true);
        // Bottom left 8x2 block of the window, top-down rows 6 and 7
        device.set_scissor(0, 0, 8, 2);
        fill(&mut device, quad(0.0, 0.0, 8.0, 8.0));
        let frame = CapturedFrame::capture(&device);
        assert_eq!(frame.pixel(0, 7), [0, 255, 0, 255]);
        assert_eq!(frame.pixel(0, 5), [0, 0, 0, 0]);
        assert_eq!(frame.count([0, 255, 0, 255]), 16);
    }

    #[test]
    fn test_src_over_blending() {
        let mut device = SoftwareDevice::new(8, 8);
        device.clear_color([0.0, 0.0, 1.0, 1.0]);
        solid(&mut device, [0.5, 0.0, 0.0, 0.5]);
        device.set_blend_enabled(true);
        device.set_blend_func(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
        fill(&mut device, quad(0.0, 0.0, 8.0, 8.0));
        let frame = CapturedFrame::capture(&device);
        assert_eq!(frame.pixel(3, 3), [128, 0, 128, 255]);
    }

    #[test]
    fn test_stencil_write_then_test() {
        let mut device = SoftwareDevice::new(8, 8);
        solid(&mut device, [1.0, 1.0, 1.0, 1.0]);
        device.set_stencil_mode(StencilMode::Write);
        fill(&mut device, quad(0.0, 0.0, 4.0, 8.0));
        assert_eq!(CapturedFrame::capture(&device).count([255; 4]), 0);
        assert_eq!(device.stencil_value(1, 1), 1);
        assert_eq!(device.stencil_value(6, 1), 0);

        device.set_stencil_mode(StencilMode::Test);
        fill(&mut device, quad(0.0, 0.0, 8.0, 8.0));
        let frame = CapturedFrame::capture(&device);
        assert_eq!(frame.count([255; 4]), 32);
        assert_eq!(frame.pixel(6, 1), [0; 4]);
    }

    #[test]
    fn test_render_to_texture_and_sample() {
        let mut device = SoftwareDevice::new(8, 8);
        let texture = device.create_texture();
        device
            .allocate_texture(texture, TextureFormat::Rgba, 8, 8, None)
            .unwrap();
        let fbo = device.create_framebuffer();
        device.attach_texture(fbo, Some(texture)).unwrap();
        device.bind_framebuffer(fbo);
        device.clear_color([0.0, 1.0, 0.0, 1.0]);
        device.bind_framebuffer(FramebufferId::DEFAULT);
        assert_eq!(device.texel(texture, 3, 3), Some([0.0, 1.0, 0.0, 1.0]));

        let program = device
            .create_program(&ProgramDescription {
                has_texture: true,
                ..ProgramDescription::default()
            })
            .unwrap();
        device.use_program(Some(program));
        device.bind_texture(0, Some(texture));
        let mut transform = ortho(8.0, 8.0);
        transform.scale(8.0, 8.0);
        device.set_uniforms(&Uniforms {
            transform,
            ..Uniforms::default()
        });
        device.draw(&DrawCall {
            topology: Topology::TriangleStrip,
            vertices: VertexData::Texture(&UNIT_QUAD),
            indices: None,
        });
        assert_eq!(CapturedFrame::capture(&device).count([0, 255, 0, 255]), 64);
    }

    #[test]
    fn test_errors_are_queued() {
        let mut device = SoftwareDevice::new(8, 8);
        let texture = device.create_texture();
        assert!(matches!(
            device.allocate_texture(texture, TextureFormat::Rgba, 4096, 1, None),
            Err(GpuError::TextureTooLarge { .. })
        ));
        device.bind_framebuffer(FramebufferId(999));
        assert!(matches!(device.poll_error(), Some(GpuError::InvalidOperation(_))));
        assert!(device.poll_error().is_none());
        assert!(device.bound_framebuffer().is_default());
    }

    #[test]
    fn test_alpha_upload_is_coverage() {
        let mut device = SoftwareDevice::new(4, 4);
        let texture = device.create_texture();
        device
            .allocate_texture(texture, TextureFormat::Alpha, 2, 1, Some(&[255, 0]))
            .unwrap();
        assert_eq!(device.texel(texture, 0, 0), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(device.texel(texture, 1, 0), Some([0.0; 4]));
    }
}
