//! Paint description

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::color::Color;
use crate::transfer::TransferMode;

/// Fill/stroke selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PaintStyle {
    #[default]
    Fill,
    Stroke,
    StrokeAndFill,
}

/// Line cap style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StrokeCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// Line join style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StrokeJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Horizontal text alignment relative to the draw position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

bitflags! {
    /// Paint behavior bits
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PaintFlags: u32 {
        const ANTI_ALIAS = 1 << 0;
        const FILTER_BITMAP = 1 << 1;
        const DITHER = 1 << 2;
        const UNDERLINE_TEXT = 1 << 3;
        const STRIKE_THRU_TEXT = 1 << 4;
        const FAKE_BOLD_TEXT = 1 << 5;
        const LINEAR_TEXT = 1 << 6;
    }
}

/// Stroke decoration
#[derive(Clone, Debug, PartialEq)]
pub enum PathEffect {
    /// Alternating on/off lengths, starting `phase` into the pattern
    Dash {
        intervals: SmallVec<[f32; 4]>,
        phase: f32,
    },
}

/// Describes how to draw a primitive
#[derive(Clone, Debug, PartialEq)]
pub struct Paint {
    pub color: Color,
    pub style: PaintStyle,
    /// Zero means hairline
    pub stroke_width: f32,
    pub stroke_cap: StrokeCap,
    pub stroke_join: StrokeJoin,
    pub stroke_miter: f32,
    pub flags: PaintFlags,
    pub transfer_mode: TransferMode,
    pub path_effect: Option<PathEffect>,
    pub text_size: f32,
    pub text_align: TextAlign,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            style: PaintStyle::Fill,
            stroke_width: 0.0,
            stroke_cap: StrokeCap::Butt,
            stroke_join: StrokeJoin::Miter,
            stroke_miter: 4.0,
            flags: PaintFlags::empty(),
            transfer_mode: TransferMode::SrcOver,
            path_effect: None,
            text_size: 12.0,
            text_align: TextAlign::Left,
        }
    }
}

impl Paint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            color,
            style: PaintStyle::Stroke,
            stroke_width: width,
            ..Self::default()
        }
    }

    pub fn with_anti_alias(mut self, aa: bool) -> Self {
        self.flags.set(PaintFlags::ANTI_ALIAS, aa);
        self
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    pub fn with_flags(mut self, flags: PaintFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_anti_alias(&self) -> bool {
        self.flags.contains(PaintFlags::ANTI_ALIAS)
    }

    pub fn is_filter_bitmap(&self) -> bool {
        self.flags.contains(PaintFlags::FILTER_BITMAP)
    }

    pub fn alpha(&self) -> u8 {
        self.color.alpha8()
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        self.color.a = alpha as f32 / 255.0;
    }

    /// Stroke outset to apply to geometry bounds, half the stroke width
    /// (a hairline still touches one pixel)
    pub fn stroke_outset(&self) -> f32 {
        match self.style {
            PaintStyle::Fill => 0.0,
            _ => self.stroke_width.max(1.0) * 0.5,
        }
    }

    /// True when a stroke needs the rasterized shape path instead of a
    /// tessellated outline
    pub fn needs_shape_texture(&self) -> bool {
        self.path_effect.is_some()
            || self.stroke_join != StrokeJoin::Miter
            || self.stroke_miter != 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let paint = Paint::default();
        assert_eq!(paint.alpha(), 255);
        assert_eq!(paint.stroke_miter, 4.0);
        assert!(!paint.is_anti_alias());
        assert!(!paint.needs_shape_texture());
    }

    #[test]
    fn test_round_join_needs_shape_texture() {
        let mut paint = Paint::stroke(Color::BLACK, 3.0);
        paint.stroke_join = StrokeJoin::Round;
        assert!(paint.needs_shape_texture());
        assert_eq!(paint.stroke_outset(), 1.5);
    }
}
