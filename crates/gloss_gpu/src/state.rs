//! State cache facade
//!
//! Every state change the renderer makes goes through [`StateCache`], which
//! forwards to the device only when the value differs from the last one it
//! saw. `None` means "unknown", which forces the next call through.

use rustc_hash::FxHashMap;

use crate::device::{
    BlendFactor, FramebufferId, GpuDevice, ProgramId, StencilMode, TextureFilter, TextureId,
    TextureWrap,
};

/// Texture units the renderer uses
pub const TEXTURE_UNITS: usize = 3;

/// Counters for issued and elided device calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateStats {
    pub issued: u64,
    pub skipped: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct TextureParams {
    filter: Option<TextureFilter>,
    wrap: Option<(TextureWrap, TextureWrap)>,
}

/// Last known device state
#[derive(Debug, Default)]
pub struct StateCache {
    program: Option<Option<ProgramId>>,
    textures: [Option<Option<TextureId>>; TEXTURE_UNITS],
    blend: Option<bool>,
    blend_func: Option<(BlendFactor, BlendFactor)>,
    /// Last factors passed to the device, kept across invalidation
    last_blend_func: Option<(BlendFactor, BlendFactor)>,
    scissor_enabled: Option<bool>,
    scissor: Option<(i32, i32, i32, i32)>,
    stencil: Option<StencilMode>,
    framebuffer: Option<FramebufferId>,
    viewport: Option<(i32, i32)>,
    texture_params: FxHashMap<TextureId, TextureParams>,
    stats: StateStats,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, issued: bool) -> bool {
        if issued {
            self.stats.issued += 1;
        } else {
            self.stats.skipped += 1;
        }
        issued
    }

    pub fn stats(&self) -> StateStats {
        self.stats
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.program.flatten()
    }

    /// Bind a program. Returns true when the device was called.
    pub fn use_program<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: Option<ProgramId>,
    ) -> bool {
        let changed = self.program != Some(program);
        if changed {
            device.use_program(program);
            self.program = Some(program);
        }
        self.record(changed)
    }

    pub fn bind_texture<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        unit: u32,
        texture: Option<TextureId>,
    ) -> bool {
        let slot = (unit as usize).min(TEXTURE_UNITS - 1);
        let changed = self.textures[slot] != Some(texture);
        if changed {
            device.bind_texture(unit, texture);
            self.textures[slot] = Some(texture);
        }
        self.record(changed)
    }

    /// Forget everything about a texture that is being deleted
    pub fn forget_texture(&mut self, texture: TextureId) {
        for slot in &mut self.textures {
            if *slot == Some(Some(texture)) {
                *slot = None;
            }
        }
        self.texture_params.remove(&texture);
    }

    pub fn set_texture_filter<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        texture: TextureId,
        filter: TextureFilter,
        force: bool,
    ) -> bool {
        let params = self.texture_params.entry(texture).or_default();
        let changed = force || params.filter != Some(filter);
        if changed {
            device.set_texture_filter(texture, filter);
            params.filter = Some(filter);
        }
        self.record(changed)
    }

    pub fn set_texture_wrap<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        texture: TextureId,
        wrap_s: TextureWrap,
        wrap_t: TextureWrap,
    ) -> bool {
        let params = self.texture_params.entry(texture).or_default();
        let changed = params.wrap != Some((wrap_s, wrap_t));
        if changed {
            device.set_texture_wrap(texture, wrap_s, wrap_t);
            params.wrap = Some((wrap_s, wrap_t));
        }
        self.record(changed)
    }

    pub fn blend_enabled(&self) -> bool {
        self.blend.unwrap_or(false)
    }

    pub fn set_blend<D: GpuDevice + ?Sized>(&mut self, device: &mut D, enabled: bool) -> bool {
        let changed = self.blend != Some(enabled);
        if changed {
            device.set_blend_enabled(enabled);
            self.blend = Some(enabled);
        }
        self.record(changed)
    }

    pub fn set_blend_func<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        src: BlendFactor,
        dst: BlendFactor,
    ) -> bool {
        let changed = self.blend_func != Some((src, dst));
        if changed {
            device.set_blend_func(src, dst);
            self.blend_func = Some((src, dst));
            self.last_blend_func = Some((src, dst));
        }
        self.record(changed)
    }

    /// Re-issue blending on with the last factors, used after foreign code ran
    pub fn reassert_blend<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        device.set_blend_enabled(true);
        self.blend = Some(true);
        let (src, dst) = self
            .last_blend_func
            .unwrap_or((BlendFactor::One, BlendFactor::OneMinusSrcAlpha));
        device.set_blend_func(src, dst);
        self.blend_func = Some((src, dst));
        self.record(true);
    }

    /// Push the cached blend enable bit to the device
    pub fn sync_blend<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        let enabled = self.blend_enabled();
        device.set_blend_enabled(enabled);
        self.blend = Some(enabled);
        self.record(true);
    }

    pub fn scissor_enabled(&self) -> bool {
        self.scissor_enabled.unwrap_or(false)
    }

    pub fn set_scissor_enabled<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        enabled: bool,
    ) -> bool {
        let changed = self.scissor_enabled != Some(enabled);
        if changed {
            device.set_scissor_enabled(enabled);
            self.scissor_enabled = Some(enabled);
            self.scissor = None;
        }
        self.record(changed)
    }

    /// Re-read the scissor enable bit from the device
    pub fn reload_scissor_enabled<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        self.scissor_enabled = Some(device.is_scissor_enabled());
    }

    /// Set the scissor box. Returns true when the device was called.
    pub fn set_scissor<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> bool {
        let (x, width) = if x < 0 { (0, width + x) } else { (x, width) };
        let (y, height) = if y < 0 { (0, height + y) } else { (y, height) };
        let (width, height) = (width.max(0), height.max(0));
        let changed = self.scissor_enabled() && self.scissor != Some((x, y, width, height));
        if changed {
            device.set_scissor(x, y, width, height);
            self.scissor = Some((x, y, width, height));
        }
        self.record(changed)
    }

    /// Forget the scissor box so the next [`Self::set_scissor`] is issued
    pub fn reset_scissor(&mut self) {
        self.scissor = None;
    }

    pub fn stencil_mode(&self) -> StencilMode {
        self.stencil.unwrap_or_default()
    }

    pub fn set_stencil<D: GpuDevice + ?Sized>(&mut self, device: &mut D, mode: StencilMode) -> bool {
        let changed = self.stencil != Some(mode);
        if changed {
            device.set_stencil_mode(mode);
            self.stencil = Some(mode);
        }
        self.record(changed)
    }

    pub fn bind_framebuffer<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        framebuffer: FramebufferId,
    ) -> bool {
        let changed = self.framebuffer != Some(framebuffer);
        if changed {
            device.bind_framebuffer(framebuffer);
            self.framebuffer = Some(framebuffer);
        }
        self.record(changed)
    }

    pub fn set_viewport<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        width: i32,
        height: i32,
    ) -> bool {
        let changed = self.viewport != Some((width, height));
        if changed {
            device.set_viewport(width, height);
            self.viewport = Some((width, height));
        }
        self.record(changed)
    }

    /// Mark the bound program unknown without touching the device
    pub fn forget_program(&mut self) {
        self.program = None;
    }

    /// Forget everything, e.g. after foreign code touched the device
    pub fn invalidate(&mut self) {
        let stats = self.stats;
        let last_blend_func = self.last_blend_func;
        let texture_params = std::mem::take(&mut self.texture_params);
        *self = Self::default();
        self.stats = stats;
        self.last_blend_func = last_blend_func;
        self.texture_params = texture_params;
    }
}
