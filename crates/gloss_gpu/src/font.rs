//! Font boundary
//!
//! Glyph rasterization is an external collaborator. A [`FontRenderer`]
//! supplies glyph metrics, a texture holding the glyphs of a run, and coverage
//! masks for shadows. Layout along a baseline, positioned text and text on a
//! path are done by the renderer.

use gloss_paint::{Paint, Point, Rect};

use crate::device::GpuDevice;
use crate::state::StateCache;
use crate::tessellator::AlphaMask;
use crate::texture::Texture;

/// Vertical extent of a line of text relative to the baseline
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FontMetrics {
    /// Negative, above the baseline
    pub top: f32,
    /// Positive, below the baseline
    pub bottom: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub advance: f32,
    /// Quad relative to the pen position on the baseline. Empty for glyphs
    /// that draw nothing.
    pub rect: Rect,
    /// Normalized texture coordinates of the glyph in the run texture
    pub uv: Rect,
}

/// Glyphs of a string and the alpha texture that holds them
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphRun {
    pub texture: Texture,
    pub glyphs: Vec<Glyph>,
}

/// Coverage of a whole string, positioned relative to the origin pen
#[derive(Clone, Debug, PartialEq)]
pub struct TextMask {
    pub mask: AlphaMask,
    pub left: f32,
    pub top: f32,
}

pub trait FontRenderer: Send {
    fn metrics(&self, paint: &Paint) -> FontMetrics;

    /// Sum of the advances of `text`
    fn measure(&self, text: &str, paint: &Paint) -> f32;

    /// One glyph per character of `text`. `None` when the glyph texture
    /// cannot be made.
    fn glyphs(
        &mut self,
        device: &mut dyn GpuDevice,
        state: &mut StateCache,
        text: &str,
        paint: &Paint,
    ) -> Option<GlyphRun>;

    /// Coverage of `text`, laid out by advance or at `positions`
    fn rasterize(&self, text: &str, paint: &Paint, positions: Option<&[Point]>) -> Option<TextMask>;

    /// Delete device resources
    fn clear(&mut self, _device: &mut dyn GpuDevice, _state: &mut StateCache) {}
}
