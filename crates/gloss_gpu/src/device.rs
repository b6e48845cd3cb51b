//! Device boundary
//!
//! [`GpuDevice`] is the low-level binding surface the renderer drives. It is
//! shaped after a GL ES 2 context: integer handles, a bound framebuffer,
//! scissor and stencil state, blend factors, and programs selected by a
//! [`ProgramDescription`]. Scissor rectangles, viewport and copy origins use
//! GL window coordinates (origin at the bottom left of the target).
//!
//! The trait is object safe. Functors receive `&mut dyn GpuDevice`.

use gloss_paint::{ColorFilter, Matrix4, TileMode};

use crate::error::{GpuError, Result};
use crate::program::ProgramDescription;
use crate::vertex::{AlphaVertex, ColorTextureVertex, TextureVertex, Vertex};

/// Texture handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Framebuffer handle, `0` is the window target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub u32);

impl FramebufferId {
    pub const DEFAULT: FramebufferId = FramebufferId(0);

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

/// Stencil render buffer handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderBufferId(pub u32);

/// Compiled program handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    #[default]
    Rgba,
    Alpha,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba => 4,
            TextureFormat::Alpha => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

impl From<TileMode> for TextureWrap {
    fn from(mode: TileMode) -> Self {
        match mode {
            TileMode::Clamp => TextureWrap::Clamp,
            TileMode::Repeat => TextureWrap::Repeat,
            TileMode::Mirror => TextureWrap::Mirror,
        }
    }
}

/// Fixed-function blend factor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
}

/// Stencil configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilMode {
    #[default]
    Disabled,
    /// Write 1 wherever a fragment lands, color writes off
    Write,
    /// Write 1 and keep color writes, used to visualize the clip
    DebugWrite,
    /// Pass where the stencil value is 1
    Test,
    /// Increment the stencil value for every fragment, used for overdraw
    Increment,
    /// Pass where the stencil value equals `level`, or is at least `level`
    /// when `greater` is set
    DebugTest { level: u8, greater: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    TriangleStrip,
    /// Squares of `Uniforms::point_size` pixels centered on each vertex
    Points,
}

/// Vertex stream of a draw
#[derive(Clone, Copy, Debug)]
pub enum VertexData<'a> {
    Position(&'a [Vertex]),
    Texture(&'a [TextureVertex]),
    ColorTexture(&'a [ColorTextureVertex]),
    Alpha(&'a [AlphaVertex]),
}

impl VertexData<'_> {
    pub fn len(&self) -> usize {
        match self {
            VertexData::Position(v) => v.len(),
            VertexData::Texture(v) => v.len(),
            VertexData::ColorTexture(v) => v.len(),
            VertexData::Alpha(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One draw command
#[derive(Clone, Copy, Debug)]
pub struct DrawCall<'a> {
    pub topology: Topology,
    pub vertices: VertexData<'a>,
    pub indices: Option<&'a [u16]>,
}

/// Shader stage uniforms
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderUniforms {
    /// Texture unit holding the gradient ramp or the bitmap
    pub unit: u32,
    /// Maps the vertex position attribute into the shader domain
    /// (`x` is the linear gradient parameter, `xy` the radial or sweep
    /// offset from the center, or the normalized bitmap coordinate)
    pub screen_space: Matrix4,
    pub tile_x: TileMode,
    pub tile_y: TileMode,
}

/// Uniform values for the bound program
#[derive(Clone, Debug, PartialEq)]
pub struct Uniforms {
    /// `projection * offset * transform * model_view`
    pub transform: Matrix4,
    /// Premultiplied color
    pub color: [f32; 4],
    pub point_size: f32,
    pub texture_transform: Matrix4,
    pub shader: Option<ShaderUniforms>,
    /// Second stage of a compose shader
    pub compose_shader: Option<ShaderUniforms>,
    pub color_filter: Option<ColorFilter>,
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            transform: Matrix4::IDENTITY,
            color: [1.0; 4],
            point_size: 1.0,
            texture_transform: Matrix4::IDENTITY,
            shader: None,
            compose_shader: None,
            color_filter: None,
        }
    }
}

/// Device capabilities
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_texture_size: u32,
    /// Fragment programs can read the destination pixel
    pub framebuffer_fetch: bool,
    pub discard_framebuffer: bool,
    pub tiling: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 2048,
            framebuffer_fetch: false,
            discard_framebuffer: false,
            tiling: false,
        }
    }
}

/// GL-style binding surface
pub trait GpuDevice {
    fn limits(&self) -> DeviceLimits;

    // Textures

    fn create_texture(&mut self) -> TextureId;

    /// (Re)allocate storage. `pixels` is tightly packed, top row first.
    fn allocate_texture(
        &mut self,
        texture: TextureId,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<()>;

    fn delete_texture(&mut self, texture: TextureId);

    fn set_texture_filter(&mut self, texture: TextureId, filter: TextureFilter);

    fn set_texture_wrap(&mut self, texture: TextureId, wrap_s: TextureWrap, wrap_t: TextureWrap);

    /// Copy a block of the bound framebuffer into a texture. Both origins are
    /// in GL coordinates of their own surface.
    #[allow(clippy::too_many_arguments)]
    fn copy_framebuffer_to_texture(
        &mut self,
        texture: TextureId,
        dst_x: i32,
        dst_y: i32,
        src_x: i32,
        src_y: i32,
        width: i32,
        height: i32,
    ) -> Result<()>;

    /// Bind `texture` to `unit`
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    // Framebuffers

    fn create_framebuffer(&mut self) -> FramebufferId;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId);

    fn attach_texture(&mut self, framebuffer: FramebufferId, texture: Option<TextureId>) -> Result<()>;

    fn create_render_buffer(&mut self, width: u32, height: u32) -> Result<RenderBufferId>;

    fn delete_render_buffer(&mut self, buffer: RenderBufferId);

    fn attach_stencil(&mut self, framebuffer: FramebufferId, buffer: Option<RenderBufferId>);

    // Fixed function state

    fn set_viewport(&mut self, width: i32, height: i32);

    fn set_blend_enabled(&mut self, enabled: bool);

    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor);

    fn set_scissor_enabled(&mut self, enabled: bool);

    fn is_scissor_enabled(&self) -> bool;

    fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32);

    fn set_stencil_mode(&mut self, mode: StencilMode);

    fn clear_stencil(&mut self);

    /// Clear the color buffer, restricted by the scissor when enabled
    fn clear_color(&mut self, color: [f32; 4]);

    // Programs

    fn create_program(&mut self, description: &ProgramDescription) -> Result<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: Option<ProgramId>);

    fn set_uniforms(&mut self, uniforms: &Uniforms);

    fn draw(&mut self, call: &DrawCall<'_>);

    // Optional

    fn discard_framebuffer(&mut self) {}

    fn start_tiling(&mut self, _x: i32, _y: i32, _width: i32, _height: i32, _opaque: bool) {}

    fn end_tiling(&mut self) {}

    /// Next queued error, if any
    fn poll_error(&mut self) -> Option<GpuError> {
        None
    }
}
