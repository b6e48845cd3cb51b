//! Program descriptions and the program cache
//!
//! A [`ProgramDescription`] is rebuilt for every draw and names the pipeline
//! variant the draw needs. The cache compiles each variant once through the
//! device.

use gloss_paint::TransferMode;
use rustc_hash::FxHashMap;

use crate::device::{GpuDevice, ProgramId};
use crate::error::Result;

/// Color filter stage of a program
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorOp {
    #[default]
    None,
    Matrix,
    Lighting,
    Blend,
}

/// Shader stage of a program
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Ramp parameter is the domain's x
    Gradient,
    /// Ramp parameter is the distance from the domain origin
    RadialGradient,
    /// Ramp parameter is the angle around the domain origin
    SweepGradient,
    Bitmap,
}

/// Second shader stage of a compose shader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComposeStage {
    pub stage: ShaderStage,
    pub mode: TransferMode,
}

/// Key selecting a pipeline variant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramDescription {
    pub has_texture: bool,
    pub has_alpha8_texture: bool,
    pub has_external_texture: bool,
    pub has_texture_transform: bool,
    /// Per-vertex color attribute
    pub has_colors: bool,
    /// Per-vertex coverage attribute (anti-aliased tessellation)
    pub has_vertex_alpha: bool,
    pub is_point: bool,
    /// Multiply texture or shader output by the uniform color
    pub modulate: bool,
    pub shader: Option<ShaderStage>,
    /// Blended onto the output of `shader`
    pub compose: Option<ComposeStage>,
    pub color_op: ColorOp,
    /// Advanced transfer mode evaluated by reading the framebuffer
    pub framebuffer_mode: Option<TransferMode>,
    pub swap_src_dst: bool,
    pub has_debug_highlight: bool,
}

impl ProgramDescription {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Compiled programs keyed by description
#[derive(Default)]
pub struct ProgramCache {
    programs: FxHashMap<ProgramDescription, ProgramId>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program for `description`, compiling it on first use
    pub fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        description: &ProgramDescription,
    ) -> Result<ProgramId> {
        if let Some(id) = self.programs.get(description) {
            return Ok(*id);
        }
        let id = device.create_program(description)?;
        tracing::trace!("compiled program {:?} for {:?}", id, description);
        self.programs.insert(*description, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for (_, id) in self.programs.drain() {
            device.delete_program(id);
        }
    }
}
