//! Draw modifiers
//!
//! Shader, color filter, drop shadow and paint filter apply to every draw
//! until they are reset. They live outside the save/restore stack.

use gloss_paint::{Color, ColorFilter, Paint, PaintFlags, Shader};

/// Shadow drawn under text
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropShadow {
    pub radius: f32,
    pub dx: f32,
    pub dy: f32,
    pub color: Color,
}

/// Rewrites the flags of every paint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PaintFilter {
    pub clear_bits: PaintFlags,
    pub set_bits: PaintFlags,
}

impl PaintFilter {
    pub fn apply(&self, paint: &Paint) -> Paint {
        let mut filtered = paint.clone();
        filtered.flags = (paint.flags & !self.clear_bits) | self.set_bits;
        filtered
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawModifiers {
    pub shader: Option<Shader>,
    pub color_filter: Option<ColorFilter>,
    pub shadow: Option<DropShadow>,
    pub paint_filter: Option<PaintFilter>,
}

impl DrawModifiers {
    /// `paint` with the paint filter applied, borrowed when there is none
    pub fn filter_paint<'a>(&self, paint: &'a Paint) -> std::borrow::Cow<'a, Paint> {
        match &self.paint_filter {
            Some(filter) => std::borrow::Cow::Owned(filter.apply(paint)),
            None => std::borrow::Cow::Borrowed(paint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_filter_rewrites_flags() {
        let modifiers = DrawModifiers {
            paint_filter: Some(PaintFilter {
                clear_bits: PaintFlags::ANTI_ALIAS,
                set_bits: PaintFlags::FILTER_BITMAP,
            }),
            ..Default::default()
        };
        let paint = Paint::fill(Color::RED).with_anti_alias(true);
        let filtered = modifiers.filter_paint(&paint);
        assert!(!filtered.is_anti_alias());
        assert!(filtered.is_filter_bitmap());
        assert!(paint.is_anti_alias());
    }

    #[test]
    fn test_no_filter_borrows() {
        let modifiers = DrawModifiers::default();
        let paint = Paint::default();
        assert!(matches!(
            modifiers.filter_paint(&paint),
            std::borrow::Cow::Borrowed(_)
        ));
    }
}
