//! Display list replay
//!
//! A [`DisplayList`] replays recorded commands into a [`Canvas`]. The
//! renderer implements `Canvas`; the recording format belongs to the list.
//! [`RecordedDisplayList`] is a small command list built with
//! [`DisplayListBuilder`], able to defer its draws through a
//! [`DeferredDisplayList`].

use std::sync::Arc;

use gloss_paint::{Bitmap, Color, ColorFilter, Matrix4, Paint, Path, Rect, RegionOp, Shader, TransferMode};

use crate::modifiers::{DrawModifiers, DropShadow};
use crate::snapshot::SaveFlags;
use crate::status::{DrawStatus, ReplayFlags};

/// Drawing surface a display list replays into
pub trait Canvas {
    fn save(&mut self, flags: SaveFlags) -> i32;

    fn restore(&mut self);

    fn restore_to_count(&mut self, count: i32);

    fn save_count(&self) -> i32;

    #[allow(clippy::too_many_arguments)]
    fn save_layer(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        alpha: u8,
        mode: TransferMode,
        flags: SaveFlags,
    ) -> i32;

    fn translate(&mut self, dx: f32, dy: f32);

    fn scale(&mut self, sx: f32, sy: f32);

    fn rotate(&mut self, degrees: f32);

    fn concat_matrix(&mut self, matrix: &Matrix4);

    fn clip_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, op: RegionOp) -> bool;

    fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool;

    fn set_shader(&mut self, shader: Option<Shader>);

    fn set_color_filter(&mut self, filter: Option<ColorFilter>);

    fn set_shadow(&mut self, shadow: Option<DropShadow>);

    fn modifiers(&self) -> DrawModifiers;

    fn set_modifiers(&mut self, modifiers: DrawModifiers);

    fn draw_color(&mut self, color: Color, mode: TransferMode) -> DrawStatus;

    fn draw_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, paint: &Paint) -> DrawStatus;

    #[allow(clippy::too_many_arguments)]
    fn draw_round_rect(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        rx: f32,
        ry: f32,
        paint: &Paint,
    ) -> DrawStatus;

    fn draw_circle(&mut self, x: f32, y: f32, radius: f32, paint: &Paint) -> DrawStatus;

    fn draw_oval(&mut self, left: f32, top: f32, right: f32, bottom: f32, paint: &Paint) -> DrawStatus;

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawStatus;

    fn draw_lines(&mut self, points: &[f32], paint: &Paint) -> DrawStatus;

    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f32, y: f32, paint: &Paint) -> DrawStatus;

    fn draw_text(&mut self, text: &str, x: f32, y: f32, paint: &Paint, length: Option<f32>) -> DrawStatus;

    /// The clip is not a rectangle, deferred state cannot capture it
    fn has_complex_clip(&self) -> bool;

    /// Capture the state a deferred draw needs. Returns true when a draw
    /// with `state.bounds` would be rejected.
    fn store_display_state(&mut self, state: &mut DeferredDisplayState) -> bool;

    fn restore_display_state(&mut self, state: &DeferredDisplayState);
}

/// A replayable command stream
pub trait DisplayList: Send + Sync {
    fn is_renderable(&self) -> bool;

    /// Replay into `canvas`. With a deferred list, draws are queued there
    /// and run when it is flushed.
    fn replay(
        &self,
        canvas: &mut dyn Canvas,
        dirty: &mut Rect,
        flags: ReplayFlags,
        level: u32,
        deferred: Option<&mut DeferredDisplayList>,
    ) -> DrawStatus;
}

/// Canvas state captured for a deferred draw
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeferredDisplayState {
    /// Local bounds on input, clipped target bounds once stored
    pub bounds: Rect,
    pub clip: Rect,
    pub matrix: Matrix4,
    pub alpha: f32,
    pub modifiers: DrawModifiers,
}

impl DeferredDisplayState {
    pub fn with_bounds(bounds: Rect) -> Self {
        Self {
            bounds,
            ..Default::default()
        }
    }
}

/// Recorded command
#[derive(Clone, Debug)]
pub enum DisplayOp {
    Save(SaveFlags),
    Restore,
    RestoreToCount(i32),
    SaveLayer {
        bounds: Rect,
        alpha: u8,
        mode: TransferMode,
        flags: SaveFlags,
    },
    Translate(f32, f32),
    Scale(f32, f32),
    Rotate(f32),
    ConcatMatrix(Matrix4),
    ClipRect(Rect, RegionOp),
    ClipPath(Path, RegionOp),
    SetShader(Option<Shader>),
    SetColorFilter(Option<ColorFilter>),
    SetShadow(Option<DropShadow>),
    DrawColor(Color, TransferMode),
    DrawRect(Rect, Paint),
    DrawRoundRect(Rect, f32, f32, Paint),
    DrawCircle(f32, f32, f32, Paint),
    DrawOval(Rect, Paint),
    DrawPath(Path, Paint),
    DrawLines(Vec<f32>, Paint),
    DrawBitmap(Bitmap, f32, f32, Paint),
    DrawText(String, f32, f32, Paint),
}

impl DisplayOp {
    fn is_draw(&self) -> bool {
        matches!(
            self,
            DisplayOp::DrawColor(..)
                | DisplayOp::DrawRect(..)
                | DisplayOp::DrawRoundRect(..)
                | DisplayOp::DrawCircle(..)
                | DisplayOp::DrawOval(..)
                | DisplayOp::DrawPath(..)
                | DisplayOp::DrawLines(..)
                | DisplayOp::DrawBitmap(..)
                | DisplayOp::DrawText(..)
        )
    }

    /// Local bounds of a draw, empty when unknown
    fn local_bounds(&self) -> Rect {
        let outset = |mut rect: Rect, paint: &Paint| {
            rect.outset(paint.stroke_outset());
            rect
        };
        match self {
            DisplayOp::DrawRect(rect, paint)
            | DisplayOp::DrawRoundRect(rect, _, _, paint)
            | DisplayOp::DrawOval(rect, paint) => outset(*rect, paint),
            DisplayOp::DrawCircle(x, y, r, paint) => {
                outset(Rect::new(x - r, y - r, x + r, y + r), paint)
            }
            DisplayOp::DrawPath(path, paint) => outset(path.bounds(), paint),
            DisplayOp::DrawBitmap(bitmap, x, y, _) => {
                Rect::from_xywh(*x, *y, bitmap.width() as f32, bitmap.height() as f32)
            }
            _ => Rect::EMPTY,
        }
    }

    /// Run the command against `canvas`
    pub fn apply(&self, canvas: &mut dyn Canvas) -> DrawStatus {
        match self {
            DisplayOp::Save(flags) => {
                canvas.save(*flags);
            }
            DisplayOp::Restore => canvas.restore(),
            DisplayOp::RestoreToCount(count) => canvas.restore_to_count(*count),
            DisplayOp::SaveLayer {
                bounds,
                alpha,
                mode,
                flags,
            } => {
                canvas.save_layer(
                    bounds.left,
                    bounds.top,
                    bounds.right,
                    bounds.bottom,
                    *alpha,
                    *mode,
                    *flags,
                );
            }
            DisplayOp::Translate(dx, dy) => canvas.translate(*dx, *dy),
            DisplayOp::Scale(sx, sy) => canvas.scale(*sx, *sy),
            DisplayOp::Rotate(degrees) => canvas.rotate(*degrees),
            DisplayOp::ConcatMatrix(matrix) => canvas.concat_matrix(matrix),
            DisplayOp::ClipRect(rect, op) => {
                canvas.clip_rect(rect.left, rect.top, rect.right, rect.bottom, *op);
            }
            DisplayOp::ClipPath(path, op) => {
                canvas.clip_path(path, *op);
            }
            DisplayOp::SetShader(shader) => canvas.set_shader(shader.clone()),
            DisplayOp::SetColorFilter(filter) => canvas.set_color_filter(filter.clone()),
            DisplayOp::SetShadow(shadow) => canvas.set_shadow(*shadow),
            DisplayOp::DrawColor(color, mode) => return canvas.draw_color(*color, *mode),
            DisplayOp::DrawRect(r, paint) => {
                return canvas.draw_rect(r.left, r.top, r.right, r.bottom, paint)
            }
            DisplayOp::DrawRoundRect(r, rx, ry, paint) => {
                return canvas.draw_round_rect(r.left, r.top, r.right, r.bottom, *rx, *ry, paint)
            }
            DisplayOp::DrawCircle(x, y, radius, paint) => {
                return canvas.draw_circle(*x, *y, *radius, paint)
            }
            DisplayOp::DrawOval(r, paint) => {
                return canvas.draw_oval(r.left, r.top, r.right, r.bottom, paint)
            }
            DisplayOp::DrawPath(path, paint) => return canvas.draw_path(path, paint),
            DisplayOp::DrawLines(points, paint) => return canvas.draw_lines(points, paint),
            DisplayOp::DrawBitmap(bitmap, x, y, paint) => {
                return canvas.draw_bitmap(bitmap, *x, *y, paint)
            }
            DisplayOp::DrawText(text, x, y, paint) => {
                return canvas.draw_text(text, *x, *y, paint, None)
            }
        }
        DrawStatus::DONE
    }
}

/// Draws queued with the state they were recorded under. Flushed in
/// recording order.
#[derive(Debug, Default)]
pub struct DeferredDisplayList {
    ops: Vec<(DeferredDisplayState, DisplayOp)>,
}

impl DeferredDisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queue `op` unless its bounds are rejected. Returns false when the op
    /// was dropped.
    pub fn add(&mut self, canvas: &mut dyn Canvas, op: DisplayOp) -> bool {
        let mut state = DeferredDisplayState::with_bounds(op.local_bounds());
        if canvas.store_display_state(&mut state) {
            return false;
        }
        self.ops.push((state, op));
        true
    }

    /// Run every queued draw, leaving the canvas state as it was
    pub fn flush(&mut self, canvas: &mut dyn Canvas) -> DrawStatus {
        if self.ops.is_empty() {
            return DrawStatus::DONE;
        }
        tracing::trace!("flushing {} deferred draws", self.ops.len());
        let modifiers = canvas.modifiers();
        let count = canvas.save(SaveFlags::MATRIX_CLIP);
        let mut status = DrawStatus::DONE;
        for (state, op) in self.ops.drain(..) {
            canvas.restore_display_state(&state);
            status |= op.apply(canvas);
        }
        canvas.restore_to_count(count);
        canvas.set_modifiers(modifiers);
        status
    }
}

/// A display list stored as a vector of commands
#[derive(Clone, Debug, Default)]
pub struct RecordedDisplayList {
    ops: Vec<DisplayOp>,
}

impl RecordedDisplayList {
    pub fn ops(&self) -> &[DisplayOp] {
        &self.ops
    }

    pub fn into_shared(self) -> Arc<dyn DisplayList> {
        Arc::new(self)
    }
}

impl DisplayList for RecordedDisplayList {
    fn is_renderable(&self) -> bool {
        !self.ops.is_empty()
    }

    fn replay(
        &self,
        canvas: &mut dyn Canvas,
        _dirty: &mut Rect,
        flags: ReplayFlags,
        level: u32,
        mut deferred: Option<&mut DeferredDisplayList>,
    ) -> DrawStatus {
        tracing::trace!("replaying {} ops at level {}", self.ops.len(), level);
        let restore_to = canvas.save(SaveFlags::MATRIX_CLIP);
        let mut status = DrawStatus::DONE;
        // Save counts of open layers; draws inside a layer are not deferred
        let mut layers: Vec<i32> = Vec::new();

        if flags.contains(ReplayFlags::CLIP_CHILDREN) {
            if let Some(bounds) = self.bounds() {
                canvas.clip_rect(bounds.left, bounds.top, bounds.right, bounds.bottom, RegionOp::Intersect);
            }
        }

        for op in &self.ops {
            match (deferred.as_deref_mut(), op) {
                (Some(list), DisplayOp::SaveLayer { .. }) => {
                    status |= list.flush(canvas);
                    layers.push(canvas.save_count());
                    op.apply(canvas);
                }
                (Some(list), op) if op.is_draw() => {
                    if layers.is_empty() && !canvas.has_complex_clip() {
                        list.add(canvas, op.clone());
                    } else {
                        status |= list.flush(canvas);
                        status |= op.apply(canvas);
                    }
                }
                _ => {
                    status |= op.apply(canvas);
                }
            }
            let count = canvas.save_count();
            layers.retain(|&saved| saved < count);
        }

        canvas.restore_to_count(restore_to);
        status
    }
}

impl RecordedDisplayList {
    /// Union of the bounds of every draw, when all are known
    fn bounds(&self) -> Option<Rect> {
        let mut bounds = Rect::EMPTY;
        for op in self.ops.iter().filter(|op| op.is_draw()) {
            let local = op.local_bounds();
            if local.is_empty() {
                return None;
            }
            bounds.union_with(&local);
        }
        Some(bounds)
    }
}

/// Records commands into a [`RecordedDisplayList`]
#[derive(Debug, Default)]
pub struct DisplayListBuilder {
    ops: Vec<DisplayOp>,
}

impl DisplayListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: DisplayOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn save(self, flags: SaveFlags) -> Self {
        self.push(DisplayOp::Save(flags))
    }

    pub fn restore(self) -> Self {
        self.push(DisplayOp::Restore)
    }

    pub fn save_layer_alpha(self, bounds: Rect, alpha: u8, flags: SaveFlags) -> Self {
        self.push(DisplayOp::SaveLayer {
            bounds,
            alpha,
            mode: TransferMode::SrcOver,
            flags,
        })
    }

    pub fn translate(self, dx: f32, dy: f32) -> Self {
        self.push(DisplayOp::Translate(dx, dy))
    }

    pub fn clip_rect(self, rect: Rect, op: RegionOp) -> Self {
        self.push(DisplayOp::ClipRect(rect, op))
    }

    pub fn draw_color(self, color: Color, mode: TransferMode) -> Self {
        self.push(DisplayOp::DrawColor(color, mode))
    }

    pub fn draw_rect(self, rect: Rect, paint: Paint) -> Self {
        self.push(DisplayOp::DrawRect(rect, paint))
    }

    pub fn draw_circle(self, x: f32, y: f32, radius: f32, paint: Paint) -> Self {
        self.push(DisplayOp::DrawCircle(x, y, radius, paint))
    }

    pub fn draw_bitmap(self, bitmap: Bitmap, x: f32, y: f32, paint: Paint) -> Self {
        self.push(DisplayOp::DrawBitmap(bitmap, x, y, paint))
    }

    pub fn build(self) -> RecordedDisplayList {
        RecordedDisplayList { ops: self.ops }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_in_order() {
        let list = DisplayListBuilder::new()
            .save(SaveFlags::MATRIX_CLIP)
            .translate(5.0, 5.0)
            .draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::fill(Color::RED))
            .restore()
            .build();
        assert!(list.is_renderable());
        assert_eq!(list.ops().len(), 4);
        assert!(matches!(list.ops()[1], DisplayOp::Translate(..)));
    }

    #[test]
    fn test_bounds_include_stroke_outset() {
        let list = DisplayListBuilder::new()
            .draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::stroke(Color::RED, 4.0))
            .draw_circle(20.0, 20.0, 5.0, Paint::fill(Color::BLUE))
            .build();
        assert_eq!(list.bounds(), Some(Rect::new(-2.0, -2.0, 25.0, 25.0)));

        let unknown = DisplayListBuilder::new()
            .draw_color(Color::RED, TransferMode::SrcOver)
            .build();
        assert_eq!(unknown.bounds(), None);
    }

    #[test]
    fn test_empty_list_is_not_renderable() {
        assert!(!DisplayListBuilder::new().build().is_renderable());
    }
}
