//! Quick rejection and clipping
//!
//! Clip operations only edit the snapshot stack and mark the clip dirty. The
//! scissor and the stencil are brought in line at the next draw: rectangular
//! clips go through the scissor, anything else is written into the stencil
//! buffer of the current target and tested against.

use gloss_paint::{Color, IRect, Paint, PaintStyle, Path, Rect, Region, RegionOp, TransferMode};

use crate::config::StencilClipDebug;
use crate::device::{GpuDevice, StencilMode, Topology, VertexData};
use crate::status::DrawStatus;
use crate::tessellator::path_to_region;
use crate::vertex::Vertex;

use super::{with_layer, Renderer};

/// Overlay drawn over the stencil clip region when debugging it
const STENCIL_REGION_DEBUG_COLOR: u32 = 0x7f00ff00;

impl<D: GpuDevice> Renderer<D> {
    /// Load the snapped clip into the scissor box
    pub(super) fn set_scissor_from_clip(&mut self) {
        let clip = self.snapshots.clip_rect().snapped();
        let height = self.snapshots.current().height;
        if self.caches.state.set_scissor(
            &mut self.device,
            clip.left as i32,
            height - clip.bottom as i32,
            clip.width() as i32,
            clip.height() as i32,
        ) {
            self.dirty_clip = false;
        }
    }

    /// Write a non-rectangular clip into the stencil buffer, or turn the
    /// stencil test off for a rectangular one
    pub(super) fn set_stencil_from_clip(&mut self) {
        if self.config.debug.overdraw {
            return;
        }
        let region = match self.snapshots.clip_region() {
            Some(region) if !region.is_empty() => region.clone(),
            _ => {
                self.caches.state.set_stencil(&mut self.device, StencilMode::Disabled);
                return;
            }
        };

        self.dirty_clip = false;
        self.ensure_stencil_buffer();
        self.caches.state.set_stencil(&mut self.device, StencilMode::Write);

        // The stencil clear must not leak outside the clip
        let scissor_enabled = self.caches.state.scissor_enabled();
        if !scissor_enabled {
            self.caches.state.set_scissor_enabled(&mut self.device, true);
            self.set_scissor_from_clip();
        }
        self.device.clear_stencil();
        if !scissor_enabled {
            self.caches.state.set_scissor_enabled(&mut self.device, false);
        }

        self.draw_region_rects(&region, Color::BLACK, TransferMode::Src, false);
        self.caches.state.set_stencil(&mut self.device, StencilMode::Test);

        if self.config.debug.stencil_clip == StencilClipDebug::Region {
            self.draw_region_rects(
                &region,
                Color::from_argb(STENCIL_REGION_DEBUG_COLOR),
                TransferMode::SrcOver,
                false,
            );
        }
    }

    /// Attach a stencil buffer to the layer being drawn into
    fn ensure_stencil_buffer(&mut self) {
        let Some(target) = self.snapshots.current().target_layer.clone() else {
            return;
        };
        let needed = with_layer(&mut self.snapshots, &target, |layer| {
            match (layer.stencil, layer.fbo) {
                (None, Some(fbo)) => Some((fbo, layer.width(), layer.height())),
                _ => None,
            }
        });
        let Some(Some((fbo, width, height))) = needed else {
            return;
        };

        self.end_tiling();
        if let Some(buffer) = self.caches.render_buffers.get(&mut self.device, width, height) {
            self.device.attach_stencil(fbo, Some(buffer));
            with_layer(&mut self.snapshots, &target, |layer| {
                layer.stencil = Some((buffer, width, height));
            });
        }
        let clip = *self.snapshots.clip_rect();
        self.start_tiling(clip, false);
    }

    /// True when a local rect cannot touch the clip. When it can, turns the
    /// scissor on only if the clip cuts the rect.
    pub fn quick_reject(&mut self, left: f32, top: f32, right: f32, bottom: f32) -> bool {
        let Some((bounds, clip)) = self.reject_bounds(left, top, right, bottom) else {
            return true;
        };
        let rejected = !clip.intersects(&bounds);
        if !self.deferred && !rejected {
            let enable = self.config.scissor_optimization_disabled || !clip.contains(&bounds);
            self.caches.state.set_scissor_enabled(&mut self.device, enable);
        }
        rejected
    }

    /// Same as [`Self::quick_reject`] without touching the scissor
    pub fn quick_reject_no_scissor(&self, left: f32, top: f32, right: f32, bottom: f32) -> bool {
        match self.reject_bounds(left, top, right, bottom) {
            Some((bounds, clip)) => !clip.intersects(&bounds),
            None => true,
        }
    }

    /// Quick rejection of geometry that `paint` strokes
    pub fn quick_reject_pre_stroke(
        &mut self,
        mut left: f32,
        mut top: f32,
        mut right: f32,
        mut bottom: f32,
        paint: &Paint,
    ) -> bool {
        if paint.style != PaintStyle::Fill {
            let outset = paint.stroke_outset();
            left -= outset;
            top -= outset;
            right += outset;
            bottom += outset;
        }
        self.quick_reject(left, top, right, bottom)
    }

    /// Snapped target bounds of a local rect and the snapped clip
    fn reject_bounds(&self, left: f32, top: f32, right: f32, bottom: f32) -> Option<(Rect, Rect)> {
        if self.snapshots.is_ignored() || left >= right || top >= bottom {
            return None;
        }
        let bounds = self
            .snapshots
            .transform()
            .mapped_rect(Rect::new(left, top, right, bottom))
            .snapped();
        let clip = self.snapshots.clip_rect().snapped();
        Some((bounds, clip))
    }

    /// Combine the clip with a local rect. Returns false once the clip is
    /// empty.
    pub fn clip_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, op: RegionOp) -> bool {
        if self.snapshots.transform().rect_to_rect() {
            if self.snapshots.clip(left, top, right, bottom, op) {
                self.dirty_clip = true;
            }
            return !self.snapshots.clip_rect().is_empty();
        }
        let mut path = Path::new();
        path.add_rect(&Rect::new(left, top, right, bottom));
        self.clip_path(&path, op)
    }

    /// Combine the clip with the pixels a local path covers
    pub fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool {
        let transformed = path.transformed(self.snapshots.transform());
        let bounds = match self.snapshots.clip_region() {
            Some(region) if !region.is_empty() => region.clone(),
            _ => Region::from_rect(self.snapshots.clip_rect().round()),
        };
        let region = path_to_region(&transformed, &bounds);
        if self.snapshots.clip_region_transformed(&region, op) {
            self.dirty_clip = true;
        }
        !self.snapshots.clip_rect().is_empty()
    }

    /// Combine the clip with a local region
    pub fn clip_region(&mut self, region: &Region, op: RegionOp) -> bool {
        let transform = *self.snapshots.transform();
        if transform.is_pure_translate() {
            let mut moved = region.clone();
            moved.translate(
                transform.translate_x().round() as i32,
                transform.translate_y().round() as i32,
            );
            if self.snapshots.clip_region_transformed(&moved, op) {
                self.dirty_clip = true;
            }
            return !self.snapshots.clip_rect().is_empty();
        }
        let mut path = Path::new();
        for rect in region.rects() {
            path.add_rect(&rect.to_rect());
        }
        self.clip_path(&path, op)
    }

    /// The clip is held in a region rather than a rect
    pub fn has_complex_clip(&self) -> bool {
        self.snapshots.clip_region().is_some()
    }

    /// Fill the rects of a target-space region
    pub(super) fn draw_region_rects(&mut self, region: &Region, color: Color, mode: TransferMode, dirty: bool) {
        let rects: Vec<Rect> = region.rects().iter().map(IRect::to_rect).collect();
        self.draw_color_rects(&rects, color, mode, true, dirty, false);
    }

    /// Fill a batch of rects with one color in a single draw
    pub(super) fn draw_color_rects(
        &mut self,
        rects: &[Rect],
        color: Color,
        mode: TransferMode,
        ignore_transform: bool,
        dirty: bool,
        clip: bool,
    ) -> DrawStatus {
        let mut vertices = std::mem::take(&mut self.scratch.positions);
        vertices.clear();
        let mut bounds = Rect::inverted();
        for rect in rects {
            if rect.is_empty()
                || (!ignore_transform
                    && self.quick_reject_no_scissor(rect.left, rect.top, rect.right, rect.bottom))
            {
                continue;
            }
            let (l, t, r, b) = (rect.left, rect.top, rect.right, rect.bottom);
            vertices.extend_from_slice(&[
                Vertex::new(l, t),
                Vertex::new(r, t),
                Vertex::new(l, b),
                Vertex::new(l, b),
                Vertex::new(r, t),
                Vertex::new(r, b),
            ]);
            bounds.expand_to_cover(l, t);
            bounds.expand_to_cover(r, b);
        }

        if vertices.is_empty()
            || (clip && self.quick_reject(bounds.left, bounds.top, bounds.right, bounds.bottom))
        {
            self.scratch.positions = vertices;
            return DrawStatus::DONE;
        }

        self.setup_draw(true);
        self.setup_draw_color(color);
        self.setup_draw_shader();
        self.setup_draw_color_filter();
        self.setup_draw_blending_mode(mode);
        self.setup_draw_program();
        self.setup_draw_dirty_regions_disabled();
        self.setup_draw_model_view(0.0, 0.0, 1.0, 1.0, ignore_transform, true);
        self.setup_draw_color_uniforms();
        self.setup_draw_shader_uniforms(ignore_transform);
        self.setup_draw_color_filter_uniforms();
        self.issue(Topology::Triangles, VertexData::Position(&vertices), None);

        if dirty {
            let transform = *self.snapshots.transform();
            let transform = (!ignore_transform).then_some(&transform);
            self.dirty_layer(bounds.left, bounds.top, bounds.right, bounds.bottom, transform);
        }
        self.scratch.positions = vertices;
        DrawStatus::DREW
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::headless::SoftwareDevice;
    use crate::snapshot::SaveFlags;

    fn renderer() -> Renderer<SoftwareDevice> {
        let mut renderer = Renderer::new(SoftwareDevice::new(100, 100), RendererConfig::default());
        renderer.set_viewport(100, 100);
        renderer.prepare(false);
        renderer
    }

    #[test]
    fn test_reject_outside_clip() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.clip_rect(0.0, 0.0, 50.0, 50.0, RegionOp::Intersect);
        assert!(r.quick_reject(60.0, 60.0, 70.0, 70.0));
        assert!(!r.quick_reject(40.0, 40.0, 70.0, 70.0));
        assert!(r.quick_reject(10.0, 10.0, 10.0, 20.0));
    }

    #[test]
    fn test_scissor_only_when_clip_cuts() {
        let mut r = renderer();
        assert!(!r.quick_reject(10.0, 10.0, 20.0, 20.0));
        assert!(!r.caches().state.scissor_enabled());
        assert!(!r.quick_reject(-10.0, 10.0, 20.0, 20.0));
        assert!(r.caches().state.scissor_enabled());
    }

    #[test]
    fn test_deferred_leaves_scissor_alone() {
        let mut r = renderer();
        r.set_deferred(true);
        assert!(!r.quick_reject(-10.0, 10.0, 20.0, 20.0));
        r.set_deferred(false);
        assert!(!r.quick_reject(10.0, 10.0, 20.0, 20.0));
        assert!(!r.caches().state.scissor_enabled());
    }

    #[test]
    fn test_pre_stroke_outset() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.clip_rect(0.0, 0.0, 50.0, 50.0, RegionOp::Intersect);
        let stroke = Paint::stroke(Color::RED, 8.0);
        assert!(!r.quick_reject_pre_stroke(52.0, 10.0, 60.0, 20.0, &stroke));
        assert!(r.quick_reject(52.0, 10.0, 60.0, 20.0));
    }

    #[test]
    fn test_rotated_clip_becomes_region() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.translate(50.0, 50.0);
        r.rotate(45.0);
        assert!(r.clip_rect(-10.0, -10.0, 10.0, 10.0, RegionOp::Intersect));
        assert!(r.has_complex_clip());
        let clip = r.clip_rect_target();
        assert!(clip.left >= 35.0 && clip.right <= 65.0);
    }

    #[test]
    fn test_difference_then_restore() {
        let mut r = renderer();
        let count = r.save(SaveFlags::MATRIX_CLIP);
        r.clip_rect(0.0, 0.0, 50.0, 50.0, RegionOp::Difference);
        assert!(r.has_complex_clip());
        assert!(r.quick_reject_no_scissor(200.0, 0.0, 300.0, 10.0));
        r.restore_to_count(count);
        assert!(!r.has_complex_clip());
        assert_eq!(r.clip_rect_target(), Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_translated_region_clip() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.translate(10.0, 10.0);
        let region = Region::from_rect(IRect::new(0, 0, 20, 20));
        assert!(r.clip_region(&region, RegionOp::Intersect));
        assert_eq!(r.clip_rect_target(), Rect::new(10.0, 10.0, 30.0, 30.0));
    }

    #[test]
    fn test_path_union_is_bounded_by_current_clip() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.clip_rect(0.0, 0.0, 20.0, 20.0, RegionOp::Intersect);
        let mut path = Path::new();
        path.add_rect(&Rect::new(10.0, 10.0, 40.0, 40.0));
        assert!(r.clip_path(&path, RegionOp::Union));
        assert_eq!(r.clip_rect_target(), Rect::new(0.0, 0.0, 20.0, 20.0));
    }
}
