//! Text runs and their shadows
//!
//! Glyph images come from the [`FontRenderer`](crate::font::FontRenderer);
//! the renderer places one quad per glyph and draws a run with a single
//! alpha texture, in batches of [`MAX_QUADS_PER_DRAW`] quads.

use gloss_paint::{Color, Paint, PaintFlags, PaintStyle, Path, Point, Rect, TextAlign, TransferMode};

use crate::device::{GpuDevice, TextureFilter, Topology, VertexData};
use crate::status::DrawStatus;
use crate::tessellator::{flatten, Contour};
use crate::vertex::{quad, quad_indices, TextureVertex, MAX_QUADS_PER_DRAW, UNIT_QUAD};

use super::draw::TextureDraw;
use super::Renderer;

const UNDERLINE_THICKNESS: f32 = 1.0 / 18.0;
const UNDERLINE_OFFSET: f32 = 1.0 / 9.0;
const STRIKE_THRU_OFFSET: f32 = -6.0 / 21.0;

const PATH_TOLERANCE: f32 = 0.25;

/// Where each glyph of a run goes
enum GlyphLayout<'a> {
    /// Along the baseline from a pen position
    Run { x: f32, y: f32 },
    /// One baseline position per glyph
    Positioned(&'a [Point]),
    /// Centered on the path at the advance distance, rotated to its tangent
    OnPath {
        contour: &'a Contour,
        h_offset: f32,
        v_offset: f32,
    },
}

/// Point and unit tangent at `distance` along a polyline
fn point_at(contour: &Contour, distance: f32) -> Option<(Point, f32, f32)> {
    if distance < 0.0 {
        return None;
    }
    let points = &contour.points;
    let closing = contour.closed.then(|| (points.last().copied(), points.first().copied()));
    let segments = points
        .windows(2)
        .map(|w| (w[0], w[1]))
        .chain(closing.into_iter().filter_map(|(a, b)| Some((a?, b?))));

    let mut walked = 0.0;
    for (a, b) in segments {
        let length = a.distance(b);
        if length <= f32::EPSILON {
            continue;
        }
        if walked + length >= distance {
            let t = (distance - walked) / length;
            let (cos, sin) = ((b.x - a.x) / length, (b.y - a.y) / length);
            return Some((Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t), cos, sin));
        }
        walked += length;
    }
    None
}

fn aligned(x: f32, length: f32, align: TextAlign) -> f32 {
    match align {
        TextAlign::Left => x,
        TextAlign::Center => x - length * 0.5,
        TextAlign::Right => x - length,
    }
}

impl<D: GpuDevice> Renderer<D> {
    /// Fully transparent text without a shadow draws nothing
    fn skip_text(&self, paint: &Paint) -> bool {
        let alpha = if self.modifiers.shadow.is_some() {
            1.0
        } else {
            paint.color.a
        } * self.snapshots.current().alpha;
        alpha == 0.0 && paint.transfer_mode == TransferMode::SrcOver
    }

    /// Draw `text` with its pen at `(x, y)` on the baseline. `length` is the
    /// advance of the whole run when the caller already measured it.
    pub fn draw_text(&mut self, text: &str, x: f32, y: f32, paint: &Paint, length: Option<f32>) -> DrawStatus {
        if text.is_empty() || self.snapshots.is_ignored() || self.skip_text(paint) {
            return DrawStatus::DONE;
        }
        let paint = self.filtered(paint);
        let Some(font) = self.caches.font.as_deref() else {
            tracing::debug!("no font renderer, dropping text");
            return DrawStatus::DONE;
        };
        let length = length
            .filter(|l| *l >= 0.0)
            .unwrap_or_else(|| font.measure(text, &paint));
        let metrics = font.metrics(&paint);

        let x = aligned(x, length, paint.text_align);
        if self.quick_reject(x, y + metrics.top, x + length, y + metrics.bottom) {
            return DrawStatus::DONE;
        }

        self.draw_text_shadow(text, x, y, &paint, None);

        let transform = *self.snapshots.transform();
        let pure = transform.is_pure_translate();
        let (pen_x, pen_y) = if pure {
            (
                (x + transform.translate_x() + 0.5).floor(),
                (y + transform.translate_y() + 0.5).floor(),
            )
        } else {
            (x, y)
        };
        let status = self.draw_glyphs(text, GlyphLayout::Run { x: pen_x, y: pen_y }, &paint, pure, false);
        self.draw_text_decorations(x, y, length, &paint);
        status
    }

    /// Draw one glyph of `text` at each of `positions`
    pub fn draw_pos_text(&mut self, text: &str, positions: &[Point], paint: &Paint) -> DrawStatus {
        if text.is_empty() || positions.is_empty() || self.snapshots.is_ignored() || self.skip_text(paint) {
            return DrawStatus::DONE;
        }
        // Glyph quads cannot be projected
        if self.snapshots.transform().is_perspective() {
            return DrawStatus::DONE;
        }
        let paint = self.filtered(paint);
        self.draw_text_shadow(text, 0.0, 0.0, &paint, Some(positions));
        self.draw_glyphs(text, GlyphLayout::Positioned(positions), &paint, false, true)
    }

    /// Draw `text` along the first contour of `path`
    pub fn draw_text_on_path(
        &mut self,
        text: &str,
        path: &Path,
        h_offset: f32,
        v_offset: f32,
        paint: &Paint,
    ) -> DrawStatus {
        if text.is_empty() || self.snapshots.is_ignored() || self.skip_text(paint) {
            return DrawStatus::DONE;
        }
        let paint = self.filtered(paint);
        let Some(font) = self.caches.font.as_deref() else {
            return DrawStatus::DONE;
        };
        let contours = flatten(path, PATH_TOLERANCE);
        let Some(contour) = contours.iter().find(|c| c.points.len() > 1) else {
            return DrawStatus::DONE;
        };
        let h_offset = aligned(h_offset, font.measure(text, &paint), paint.text_align);
        let layout = GlyphLayout::OnPath {
            contour,
            h_offset,
            v_offset,
        };
        self.draw_glyphs(text, layout, &paint, false, true)
    }

    fn draw_text_shadow(&mut self, text: &str, x: f32, y: f32, paint: &Paint, positions: Option<&[Point]>) {
        let Some(shadow) = self.modifiers.shadow else {
            return;
        };
        let Some(font) = self.caches.font.as_deref() else {
            return;
        };
        let Some(texture) = self.caches.shadows.get(
            &mut self.device,
            &mut self.caches.state,
            font,
            text,
            paint,
            shadow.radius,
            positions,
        ) else {
            return;
        };

        let sx = x - texture.left + shadow.dx;
        let sy = y - texture.top + shadow.dy;
        let rect = Rect::new(
            sx,
            sy,
            sx + texture.texture.width as f32,
            sy + texture.texture.height as f32,
        );
        let snapshot_alpha = self.snapshots.current().alpha;
        let alpha = if shadow.color.a < 1.0 {
            shadow.color.a * snapshot_alpha
        } else {
            paint.color.a * snapshot_alpha
        };
        let color = if self.modifiers.shader.is_some() {
            Color::WHITE
        } else {
            shadow.color
        };

        let id = texture.texture.id;
        self.caches.state.bind_texture(&mut self.device, 0, Some(id));
        self.caches
            .state
            .set_texture_filter(&mut self.device, id, TextureFilter::Linear, false);
        self.draw_alpha8_texture_mesh(
            TextureDraw::quad(rect, texture.texture, alpha, paint.transfer_mode, &UNIT_QUAD),
            color,
        );
    }

    /// Build and draw the glyph quads of a run. With `reject`, the run is
    /// dropped when its bounds fall outside the clip.
    fn draw_glyphs(
        &mut self,
        text: &str,
        layout: GlyphLayout<'_>,
        paint: &Paint,
        ignore_transform: bool,
        reject: bool,
    ) -> DrawStatus {
        let Some(font) = self.caches.font.as_mut() else {
            return DrawStatus::DONE;
        };
        let Some(run) = font.glyphs(&mut self.device, &mut self.caches.state, text, paint) else {
            return DrawStatus::DONE;
        };

        let mut vertices = std::mem::take(&mut self.scratch.textures);
        vertices.clear();
        let mut bounds = Rect::inverted();
        let mut pen = 0.0;
        for (i, glyph) in run.glyphs.iter().enumerate() {
            let advance = glyph.advance;
            let start = pen;
            pen += advance;
            let (r, uv) = (glyph.rect, glyph.uv);
            if r.is_empty() {
                continue;
            }

            let corners = match &layout {
                GlyphLayout::Run { x, y } => {
                    [(x + start + r.left, y + r.top), (x + start + r.right, y + r.bottom)]
                }
                GlyphLayout::Positioned(positions) => {
                    let Some(p) = positions.get(i) else {
                        break;
                    };
                    [(p.x + r.left, p.y + r.top), (p.x + r.right, p.y + r.bottom)]
                }
                GlyphLayout::OnPath {
                    contour,
                    h_offset,
                    v_offset,
                } => {
                    let half = advance * 0.5;
                    let Some((origin, cos, sin)) = point_at(contour, h_offset + start + half) else {
                        break;
                    };
                    let (l, t, rr, b) = (r.left - half, r.top + v_offset, r.right - half, r.bottom + v_offset);
                    let place = |gx: f32, gy: f32| {
                        (origin.x + gx * cos - gy * sin, origin.y + gx * sin + gy * cos)
                    };
                    for (gx, gy, u, v) in [
                        (l, t, uv.left, uv.top),
                        (rr, t, uv.right, uv.top),
                        (l, b, uv.left, uv.bottom),
                        (rr, b, uv.right, uv.bottom),
                    ] {
                        let (px, py) = place(gx, gy);
                        vertices.push(TextureVertex::new(px, py, u, v));
                        bounds.expand_to_cover(px, py);
                    }
                    continue;
                }
            };
            let [(l, t), (rr, b)] = corners;
            vertices.extend_from_slice(&quad(l, t, rr, b, uv.left, uv.top, uv.right, uv.bottom));
            bounds.expand_to_cover(l, t);
            bounds.expand_to_cover(rr, b);
        }

        let texture = run.texture;
        let status = if vertices.is_empty()
            || (reject && self.quick_reject(bounds.left, bounds.top, bounds.right, bounds.bottom))
        {
            DrawStatus::DONE
        } else {
            self.issue_glyphs(&vertices, texture, bounds, paint, ignore_transform);
            DrawStatus::DREW
        };
        self.scratch.textures = vertices;
        if texture.cleanup {
            texture.release(&mut self.device, &mut self.caches.state);
        }
        status
    }

    fn issue_glyphs(
        &mut self,
        vertices: &[TextureVertex],
        texture: crate::texture::Texture,
        bounds: Rect,
        paint: &Paint,
        ignore_transform: bool,
    ) {
        let transform = *self.snapshots.transform();
        let filter = if ignore_transform || transform.is_pure_translate() {
            TextureFilter::Nearest
        } else {
            TextureFilter::Linear
        };
        self.caches.state.bind_texture(&mut self.device, 0, Some(texture.id));
        self.caches
            .state
            .set_texture_filter(&mut self.device, texture.id, filter, false);

        let (alpha, mode) = self.alpha_and_mode(paint);
        self.setup_draw(true);
        self.setup_draw_with_texture(true);
        self.setup_draw_alpha8_color(paint.color, alpha);
        self.setup_draw_color_filter();
        self.setup_draw_shader();
        self.setup_draw_blending(true, mode, false);
        self.setup_draw_program();
        self.setup_draw_dirty_regions_disabled();
        self.setup_draw_model_view(0.0, 0.0, 1.0, 1.0, ignore_transform, true);
        self.setup_draw_texture(texture.id);
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.setup_draw_shader_uniforms(ignore_transform);
        for batch in vertices.chunks(MAX_QUADS_PER_DRAW * 4) {
            let indices = quad_indices(batch.len() / 4);
            self.issue(Topology::Triangles, VertexData::Texture(batch), Some(indices.as_slice()));
        }

        let transform = (!ignore_transform).then_some(&transform);
        self.dirty_layer(bounds.left, bounds.top, bounds.right, bounds.bottom, transform);
    }

    /// Underline and strike-through bars under a run starting at `x`
    fn draw_text_decorations(&mut self, x: f32, y: f32, length: f32, paint: &Paint) {
        let decorations = PaintFlags::UNDERLINE_TEXT | PaintFlags::STRIKE_THRU_TEXT;
        if length <= 0.0 || !paint.flags.intersects(decorations) {
            return;
        }
        let size = paint.text_size;
        let thickness = (size * UNDERLINE_THICKNESS).max(1.0);
        let right = x + length;

        let mut rects = Vec::with_capacity(8);
        if paint.flags.contains(PaintFlags::UNDERLINE_TEXT) {
            let top = y + size * UNDERLINE_OFFSET;
            rects.extend_from_slice(&[x, top, right, top + thickness]);
        }
        if paint.flags.contains(PaintFlags::STRIKE_THRU_TEXT) {
            let top = y + size * STRIKE_THRU_OFFSET;
            rects.extend_from_slice(&[x, top, right, top + thickness]);
        }

        let bars = Paint {
            style: PaintStyle::Fill,
            path_effect: None,
            ..paint.clone()
        };
        self.draw_rects(&rects, &bars);
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::headless::{BlockFont, CapturedFrame, SoftwareDevice};
    use crate::modifiers::DropShadow;

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn renderer() -> Renderer<SoftwareDevice> {
        let mut renderer = Renderer::new(SoftwareDevice::new(64, 64), RendererConfig::default())
            .with_font_renderer(Box::new(BlockFont::new()));
        renderer.set_viewport(64, 64);
        renderer.prepare(false);
        renderer
    }

    fn text_paint() -> Paint {
        Paint {
            text_size: 10.0,
            ..Paint::fill(Color::RED)
        }
    }

    #[test]
    fn test_point_at_walks_segments() {
        let contour = Contour {
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)],
            closed: false,
        };
        let (p, cos, sin) = point_at(&contour, 15.0).unwrap();
        assert_eq!((p.x, p.y), (10.0, 5.0));
        assert_eq!((cos, sin), (0.0, 1.0));
        assert!(point_at(&contour, 25.0).is_none());
    }

    #[test]
    fn test_alignment() {
        assert_eq!(aligned(10.0, 4.0, TextAlign::Left), 10.0);
        assert_eq!(aligned(10.0, 4.0, TextAlign::Center), 8.0);
        assert_eq!(aligned(10.0, 4.0, TextAlign::Right), 6.0);
    }

    #[test]
    fn test_text_draws_glyph_blocks() {
        let mut r = renderer();
        assert_eq!(r.draw_text("ab", 10.0, 30.0, &text_paint(), None), DrawStatus::DREW);
        let frame = CapturedFrame::capture(r.device());
        // Glyphs are solid blocks from the ascent to the baseline
        assert_eq!(frame.pixel(11, 28), RED);
        assert_eq!(frame.pixel(11, 32), [0, 0, 0, 0]);
    }

    #[test]
    fn test_text_without_font_is_done() {
        let mut r = Renderer::new(SoftwareDevice::new(32, 32), RendererConfig::default());
        r.set_viewport(32, 32);
        r.prepare(false);
        assert_eq!(r.draw_text("x", 0.0, 10.0, &text_paint(), None), DrawStatus::DONE);
    }

    #[test]
    fn test_transparent_text_is_skipped() {
        let mut r = renderer();
        let mut paint = text_paint();
        paint.color = Color::TRANSPARENT;
        let before = r.device().calls().draws;
        assert_eq!(r.draw_text("ab", 10.0, 30.0, &paint, None), DrawStatus::DONE);
        assert_eq!(r.device().calls().draws, before);
    }

    #[test]
    fn test_text_outside_clip_is_rejected() {
        let mut r = renderer();
        assert_eq!(r.draw_text("ab", 100.0, 100.0, &text_paint(), None), DrawStatus::DONE);
    }

    #[test]
    fn test_positioned_text_skipped_under_perspective() {
        let mut r = renderer();
        let perspective =
            gloss_paint::Matrix4::from_affine([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.001, 0.0, 1.0]);
        r.concat_matrix(&perspective);
        let positions = [Point::new(5.0, 20.0)];
        assert_eq!(r.draw_pos_text("a", &positions, &text_paint()), DrawStatus::DONE);
    }

    #[test]
    fn test_positioned_text_draws() {
        let mut r = renderer();
        let positions = [Point::new(5.0, 20.0), Point::new(40.0, 20.0)];
        assert_eq!(r.draw_pos_text("ab", &positions, &text_paint()), DrawStatus::DREW);
        let frame = CapturedFrame::capture(r.device());
        assert_eq!(frame.pixel(41, 18), RED);
    }

    #[test]
    fn test_text_on_path_draws() {
        let mut r = renderer();
        let mut path = Path::new();
        path.move_to(0.0, 30.0);
        path.line_to(60.0, 30.0);
        assert_eq!(r.draw_text_on_path("abc", &path, 0.0, 0.0, &text_paint()), DrawStatus::DREW);
    }

    #[test]
    fn test_shadow_uses_cache() {
        let mut r = renderer();
        r.set_shadow(Some(DropShadow {
            radius: 2.0,
            dx: 1.0,
            dy: 1.0,
            color: Color::BLACK,
        }));
        r.draw_text("ab", 10.0, 30.0, &text_paint(), None);
        r.draw_text("ab", 10.0, 30.0, &text_paint(), None);
        assert_eq!(r.caches().shadows.len(), 1);
    }

    #[test]
    fn test_underline_draws_below_baseline() {
        let mut r = renderer();
        let mut paint = text_paint();
        paint.flags |= PaintFlags::UNDERLINE_TEXT;
        r.draw_text("ab", 10.0, 30.0, &paint, None);
        let frame = CapturedFrame::capture(r.device());
        // Offset 10/9 below the baseline, one pixel thick
        assert_eq!(frame.pixel(12, 31), RED);
    }
}
