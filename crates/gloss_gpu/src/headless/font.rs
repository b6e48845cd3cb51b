//! Block glyph font
//!
//! Every visible character is a solid block from the cap height down to the
//! baseline. Good enough to exercise text layout, decorations and shadows
//! without a real rasterizer.

use gloss_paint::{IRect, Paint, Point, Rect};

use crate::device::{GpuDevice, TextureFormat};
use crate::font::{FontMetrics, FontRenderer, Glyph, GlyphRun, TextMask};
use crate::state::StateCache;
use crate::tessellator::AlphaMask;
use crate::texture::{upload_pixels, Texture};

const ADVANCE: f32 = 0.6;
const CAP_HEIGHT: f32 = 0.7;
const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.2;

/// Side of the shared glyph texture
const ATLAS_SIZE: u32 = 4;

#[derive(Default)]
pub struct BlockFont {
    atlas: Option<Texture>,
}

impl BlockFont {
    pub fn new() -> Self {
        Self::default()
    }

    fn glyph(&self, c: char, size: f32) -> Glyph {
        let advance = size * ADVANCE;
        let rect = if c.is_whitespace() {
            Rect::EMPTY
        } else {
            Rect::new(0.0, -size * CAP_HEIGHT, advance, 0.0)
        };
        Glyph {
            advance,
            rect,
            uv: Rect::new(0.0, 0.0, 1.0, 1.0),
        }
    }
}

impl FontRenderer for BlockFont {
    fn metrics(&self, paint: &Paint) -> FontMetrics {
        FontMetrics {
            top: -paint.text_size * ASCENT,
            bottom: paint.text_size * DESCENT,
        }
    }

    fn measure(&self, text: &str, paint: &Paint) -> f32 {
        text.chars().count() as f32 * paint.text_size * ADVANCE
    }

    fn glyphs(
        &mut self,
        device: &mut dyn GpuDevice,
        state: &mut StateCache,
        text: &str,
        paint: &Paint,
    ) -> Option<GlyphRun> {
        let texture = match self.atlas {
            Some(texture) => texture,
            None => {
                let pixels = vec![255u8; (ATLAS_SIZE * ATLAS_SIZE) as usize];
                let texture =
                    upload_pixels(device, state, TextureFormat::Alpha, ATLAS_SIZE, ATLAS_SIZE, &pixels)?;
                self.atlas = Some(texture);
                texture
            }
        };
        let glyphs = text.chars().map(|c| self.glyph(c, paint.text_size)).collect();
        Some(GlyphRun { texture, glyphs })
    }

    fn rasterize(&self, text: &str, paint: &Paint, positions: Option<&[Point]>) -> Option<TextMask> {
        let mut rects = Vec::new();
        let mut pen = 0.0;
        for (i, c) in text.chars().enumerate() {
            let glyph = self.glyph(c, paint.text_size);
            let origin = match positions {
                Some(positions) => *positions.get(i)?,
                None => Point::new(pen, 0.0),
            };
            pen += glyph.advance;
            if !glyph.rect.is_empty() {
                let mut r = glyph.rect;
                r.translate(origin.x, origin.y);
                rects.push(r);
            }
        }
        if rects.is_empty() {
            return None;
        }

        let mut bounds = Rect::inverted();
        for r in &rects {
            bounds.expand_to_cover(r.left, r.top);
            bounds.expand_to_cover(r.right, r.bottom);
        }
        let (left, top) = (bounds.left.floor(), bounds.top.floor());
        let width = (bounds.right.ceil() - left) as u32;
        let height = (bounds.bottom.ceil() - top) as u32;

        let mut mask = AlphaMask::new(width, height);
        for r in rects {
            mask.fill_rect(IRect::new(
                (r.left - left).round() as i32,
                (r.top - top).round() as i32,
                (r.right - left).round() as i32,
                (r.bottom - top).round() as i32,
            ));
        }
        Some(TextMask { mask, left, top })
    }

    fn clear(&mut self, device: &mut dyn GpuDevice, state: &mut StateCache) {
        if let Some(texture) = self.atlas.take() {
            texture.release(device, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gloss_paint::Color;

    fn paint() -> Paint {
        Paint {
            text_size: 10.0,
            ..Paint::fill(Color::BLACK)
        }
    }

    #[test]
    fn test_measure_counts_chars() {
        assert_eq!(BlockFont::new().measure("abc", &paint()), 18.0);
    }

    #[test]
    fn test_rasterize_run() {
        let text = BlockFont::new().rasterize("a b", &paint(), None).unwrap();
        assert_eq!((text.left, text.top), (0.0, -7.0));
        assert_eq!((text.mask.width, text.mask.height), (18, 7));
        assert_eq!(text.mask.get(1, 1), 255);
        assert_eq!(text.mask.get(8, 1), 0);
    }

    #[test]
    fn test_rasterize_blank_is_none() {
        assert!(BlockFont::new().rasterize("  ", &paint(), None).is_none());
    }
}
