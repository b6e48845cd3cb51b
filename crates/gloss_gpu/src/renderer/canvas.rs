//! [`Canvas`] implementation and display list entry point

use gloss_paint::{Bitmap, Color, ColorFilter, Matrix4, Paint, Path, Rect, RegionOp, Shader, TransferMode};

use crate::device::GpuDevice;
use crate::display_list::{Canvas, DeferredDisplayList, DeferredDisplayState, DisplayList};
use crate::modifiers::{DrawModifiers, DropShadow};
use crate::snapshot::SaveFlags;
use crate::status::{DrawStatus, ReplayFlags};

use super::Renderer;

impl<D: GpuDevice> Renderer<D> {
    /// Replay a display list into the current target. Draws are batched
    /// through a deferred list unless deferral is disabled in the config.
    pub fn draw_display_list(&mut self, list: &dyn DisplayList, dirty: &mut Rect, flags: ReplayFlags) -> DrawStatus {
        if !list.is_renderable() {
            return DrawStatus::DONE;
        }
        if self.config.draw_defer_disabled {
            return list.replay(self, dirty, flags, 0, None);
        }
        let mut deferred = DeferredDisplayList::new();
        let mut status = list.replay(&mut *self, dirty, flags, 0, Some(&mut deferred));
        status |= deferred.flush(self);
        status
    }
}

impl<D: GpuDevice> Canvas for Renderer<D> {
    fn save(&mut self, flags: SaveFlags) -> i32 {
        Renderer::save(self, flags)
    }

    fn restore(&mut self) {
        Renderer::restore(self)
    }

    fn restore_to_count(&mut self, count: i32) {
        Renderer::restore_to_count(self, count)
    }

    fn save_count(&self) -> i32 {
        Renderer::save_count(self)
    }

    fn save_layer(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        alpha: u8,
        mode: TransferMode,
        flags: SaveFlags,
    ) -> i32 {
        Renderer::save_layer(self, left, top, right, bottom, alpha, mode, flags)
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        Renderer::translate(self, dx, dy)
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        Renderer::scale(self, sx, sy)
    }

    fn rotate(&mut self, degrees: f32) {
        Renderer::rotate(self, degrees)
    }

    fn concat_matrix(&mut self, matrix: &Matrix4) {
        Renderer::concat_matrix(self, matrix)
    }

    fn clip_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, op: RegionOp) -> bool {
        Renderer::clip_rect(self, left, top, right, bottom, op)
    }

    fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool {
        Renderer::clip_path(self, path, op)
    }

    fn set_shader(&mut self, shader: Option<Shader>) {
        Renderer::set_shader(self, shader)
    }

    fn set_color_filter(&mut self, filter: Option<ColorFilter>) {
        Renderer::set_color_filter(self, filter)
    }

    fn set_shadow(&mut self, shadow: Option<DropShadow>) {
        Renderer::set_shadow(self, shadow)
    }

    fn modifiers(&self) -> DrawModifiers {
        self.modifiers.clone()
    }

    fn set_modifiers(&mut self, modifiers: DrawModifiers) {
        Renderer::set_modifiers(self, modifiers)
    }

    fn draw_color(&mut self, color: Color, mode: TransferMode) -> DrawStatus {
        Renderer::draw_color(self, color, mode)
    }

    fn draw_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, paint: &Paint) -> DrawStatus {
        Renderer::draw_rect(self, left, top, right, bottom, paint)
    }

    fn draw_round_rect(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        rx: f32,
        ry: f32,
        paint: &Paint,
    ) -> DrawStatus {
        Renderer::draw_round_rect(self, left, top, right, bottom, rx, ry, paint)
    }

    fn draw_circle(&mut self, x: f32, y: f32, radius: f32, paint: &Paint) -> DrawStatus {
        Renderer::draw_circle(self, x, y, radius, paint)
    }

    fn draw_oval(&mut self, left: f32, top: f32, right: f32, bottom: f32, paint: &Paint) -> DrawStatus {
        Renderer::draw_oval(self, left, top, right, bottom, paint)
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawStatus {
        Renderer::draw_path(self, path, paint)
    }

    fn draw_lines(&mut self, points: &[f32], paint: &Paint) -> DrawStatus {
        Renderer::draw_lines(self, points, paint)
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f32, y: f32, paint: &Paint) -> DrawStatus {
        Renderer::draw_bitmap(self, bitmap, x, y, paint)
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, paint: &Paint, length: Option<f32>) -> DrawStatus {
        Renderer::draw_text(self, text, x, y, paint, length)
    }

    fn has_complex_clip(&self) -> bool {
        Renderer::has_complex_clip(self)
    }

    fn store_display_state(&mut self, state: &mut DeferredDisplayState) -> bool {
        let clip = *self.snapshots.clip_rect();
        if state.bounds.is_empty() {
            state.bounds = clip;
        } else {
            self.snapshots.transform().map_rect(&mut state.bounds);
            if !state.bounds.intersect(&clip) {
                state.bounds.set_empty();
            }
        }
        state.clip = clip;
        state.matrix = *self.snapshots.transform();
        state.alpha = self.snapshots.current().alpha;
        state.modifiers = self.modifiers.clone();
        state.bounds.is_empty()
    }

    fn restore_display_state(&mut self, state: &DeferredDisplayState) {
        *self.snapshots.transform_mut() = state.matrix;
        self.snapshots.current_mut().alpha = state.alpha;
        self.modifiers = state.modifiers.clone();
        if *self.snapshots.clip_rect() != state.clip || self.snapshots.clip_region().is_some() {
            let c = state.clip;
            self.snapshots.set_clip(c.left, c.top, c.right, c.bottom);
            self.dirty_clip = true;
        }
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::display_list::DisplayListBuilder;
    use crate::headless::{CapturedFrame, SoftwareDevice};

    fn renderer(defer: bool) -> Renderer<SoftwareDevice> {
        let config = RendererConfig {
            draw_defer_disabled: !defer,
            ..RendererConfig::default()
        };
        let mut renderer = Renderer::new(SoftwareDevice::new(32, 32), config);
        renderer.set_viewport(32, 32);
        renderer.prepare(false);
        renderer
    }

    fn scene() -> crate::display_list::RecordedDisplayList {
        DisplayListBuilder::new()
            .save(SaveFlags::MATRIX_CLIP)
            .translate(4.0, 4.0)
            .clip_rect(Rect::new(0.0, 0.0, 10.0, 10.0), RegionOp::Intersect)
            .draw_rect(Rect::new(0.0, 0.0, 20.0, 20.0), Paint::fill(Color::RED))
            .restore()
            .draw_rect(Rect::new(20.0, 20.0, 24.0, 24.0), Paint::fill(Color::BLUE))
            .build()
    }

    #[test]
    fn test_deferred_and_immediate_replay_match() {
        let mut immediate = renderer(false);
        let mut deferred = renderer(true);
        let list = scene();
        let mut dirty = Rect::EMPTY;
        assert!(immediate
            .draw_display_list(&list, &mut dirty, ReplayFlags::empty())
            .contains(DrawStatus::DREW));
        assert!(deferred
            .draw_display_list(&list, &mut dirty, ReplayFlags::empty())
            .contains(DrawStatus::DREW));

        let a = CapturedFrame::capture(immediate.device());
        let b = CapturedFrame::capture(deferred.device());
        assert_eq!(a.pixel(5, 5), [255, 0, 0, 255]);
        assert_eq!(a.pixel(15, 15), [0, 0, 0, 0]);
        assert_eq!(a.pixel(21, 21), [0, 0, 255, 255]);
        assert_eq!(a, b);
        assert_eq!(deferred.save_count(), 1);
    }

    #[test]
    fn test_empty_list_is_done() {
        let mut r = renderer(true);
        let list = DisplayListBuilder::new().build();
        let mut dirty = Rect::EMPTY;
        assert_eq!(
            r.draw_display_list(&list, &mut dirty, ReplayFlags::empty()),
            DrawStatus::DONE
        );
    }

    #[test]
    fn test_store_state_rejects_outside_clip() {
        let mut r = renderer(true);
        let mut state = DeferredDisplayState::with_bounds(Rect::new(40.0, 40.0, 50.0, 50.0));
        assert!(r.store_display_state(&mut state));

        r.translate(2.0, 3.0);
        let mut state = DeferredDisplayState::with_bounds(Rect::new(0.0, 0.0, 4.0, 4.0));
        assert!(!r.store_display_state(&mut state));
        assert_eq!(state.bounds, Rect::new(2.0, 3.0, 6.0, 7.0));
        assert_eq!(state.clip, Rect::new(0.0, 0.0, 32.0, 32.0));
        assert_eq!(state.matrix.translate_x(), 2.0);
    }

    #[test]
    fn test_restore_state_reloads_matrix_and_clip() {
        let mut r = renderer(true);
        let state = DeferredDisplayState {
            bounds: Rect::new(0.0, 0.0, 4.0, 4.0),
            clip: Rect::new(0.0, 0.0, 8.0, 8.0),
            matrix: Matrix4::from_translate(1.0, 1.0),
            alpha: 0.5,
            modifiers: DrawModifiers::default(),
        };
        r.save(SaveFlags::MATRIX_CLIP);
        r.restore_display_state(&state);
        assert_eq!(*r.snapshots().clip_rect(), Rect::new(0.0, 0.0, 8.0, 8.0));
        assert_eq!(r.matrix().translate_x(), 1.0);
        assert_eq!(r.snapshot().alpha, 0.5);
        r.restore();
        assert_eq!(*r.snapshots().clip_rect(), Rect::new(0.0, 0.0, 32.0, 32.0));
    }
}
