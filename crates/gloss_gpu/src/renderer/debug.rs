//! Overdraw visualization
//!
//! While enabled, every fragment drawn to the default target increments the
//! stencil. At the end of the frame the counts are shown as tints: blue for
//! one extra pass, green for two, light red for three and red beyond.

use gloss_paint::{Color, TransferMode};

use crate::device::{GpuDevice, StencilMode};

use super::Renderer;

/// `(stencil level, at least the level, tint)` per overdraw pass
const OVERDRAW_PASSES: [(u8, bool, u32); 4] = [
    (2, false, 0x2f00_00ff),
    (3, false, 0x2f00_ff00),
    (4, false, 0x3fff_0000),
    (5, true, 0x7fff_0000),
];

impl<D: GpuDevice> Renderer<D> {
    /// Count fragments into the stencil. Only the default target is tracked.
    pub(super) fn debug_overdraw(&mut self, enable: bool, clear: bool) {
        if !self.config.debug.overdraw || !self.snapshots.current().fbo.is_default() {
            return;
        }
        if clear {
            self.caches.state.set_scissor_enabled(&mut self.device, false);
            self.device.clear_stencil();
        }
        let mode = if enable {
            StencilMode::Increment
        } else {
            StencilMode::Disabled
        };
        self.caches.state.set_stencil(&mut self.device, mode);
    }

    /// Tint the frame by overdraw count
    pub(super) fn render_overdraw(&mut self) {
        if !self.config.debug.overdraw || !self.snapshots.current().fbo.is_default() {
            return;
        }
        let clip = self.tiling_clip;
        let height = self.snapshots.current().height;
        self.caches.state.set_scissor_enabled(&mut self.device, true);
        self.caches.state.set_scissor(
            &mut self.device,
            clip.left as i32,
            height - clip.bottom as i32,
            clip.width() as i32,
            clip.height() as i32,
        );
        // The scissor no longer follows the clip
        self.dirty_clip = true;

        for (level, greater, tint) in OVERDRAW_PASSES {
            self.caches
                .state
                .set_stencil(&mut self.device, StencilMode::DebugTest { level, greater });
            self.draw_color_rect(
                clip.left,
                clip.top,
                clip.right,
                clip.bottom,
                Color::from_argb(tint),
                TransferMode::SrcOver,
                true,
            );
        }
        self.caches.state.set_stencil(&mut self.device, StencilMode::Disabled);
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::headless::{CapturedFrame, SoftwareDevice};
    use gloss_paint::Paint;

    fn renderer(overdraw: bool) -> Renderer<SoftwareDevice> {
        let mut config = RendererConfig::default();
        config.debug.overdraw = overdraw;
        let mut renderer = Renderer::new(SoftwareDevice::new(32, 32), config);
        renderer.set_viewport(32, 32);
        renderer.prepare(false);
        renderer
    }

    #[test]
    fn test_disabled_overdraw_leaves_stencil_alone() {
        let mut r = renderer(false);
        r.draw_rect(0.0, 0.0, 8.0, 8.0, &Paint::fill(Color::WHITE));
        r.finish();
        assert_eq!(r.caches().state.stencil_mode(), StencilMode::Disabled);
        assert_eq!(r.device().calls().stencil_clears, 0);
    }

    #[test]
    fn test_overdraw_counts_fragments() {
        let mut r = renderer(true);
        assert_eq!(r.caches().state.stencil_mode(), StencilMode::Increment);
        let paint = Paint::fill(Color::WHITE);
        r.draw_rect(0.0, 0.0, 8.0, 8.0, &paint);
        r.draw_rect(0.0, 0.0, 8.0, 8.0, &paint);
        assert_eq!(r.device().stencil_value(2, 2), 2);
        assert_eq!(r.device().stencil_value(20, 20), 0);
        r.finish();
        assert_eq!(r.caches().state.stencil_mode(), StencilMode::Disabled);
    }

    #[test]
    fn test_overdraw_tints_twice_drawn_pixels() {
        let mut r = renderer(true);
        let paint = Paint::fill(Color::BLACK);
        r.draw_rect(0.0, 0.0, 8.0, 8.0, &paint);
        r.draw_rect(0.0, 0.0, 8.0, 8.0, &paint);
        r.finish();
        let frame = CapturedFrame::capture(r.device());
        let tinted = frame.pixel(2, 2);
        // Blue tint over black
        assert!(tinted[2] > 0);
        assert_eq!(tinted[0], 0);
        assert_eq!(frame.pixel(20, 20), [0, 0, 0, 0]);
    }
}
