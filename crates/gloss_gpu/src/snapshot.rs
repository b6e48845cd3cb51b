//! Save/restore stack
//!
//! The stack is an arena of [`Snapshot`] records. Index 0 is the root
//! snapshot built by `set_viewport`; every `save` pushes a record whose
//! `parent` is the previous top and every `restore` pops it.
//!
//! A snapshot saved without `MATRIX` (or `CLIP`) does not get its own
//! transform (or clip). It records the index of the ancestor that owns the
//! storage and edits it in place, so those edits survive the restore, like a
//! canvas.

use bitflags::bitflags;
use gloss_paint::{IRect, Matrix4, Rect, Region, RegionOp};

use crate::device::FramebufferId;
use crate::layer::{Layer, LayerRef};

bitflags! {
    /// What a `save` copies, and how a layer is created
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SaveFlags: u32 {
        const MATRIX = 0x01;
        const CLIP = 0x02;
        const HAS_ALPHA_LAYER = 0x04;
        const FULL_COLOR_LAYER = 0x08;
        /// Render the layer into its own framebuffer
        const CLIP_TO_LAYER = 0x10;
        const MATRIX_CLIP = Self::MATRIX.bits() | Self::CLIP.bits();
        const ALL = 0x1f;
    }
}

bitflags! {
    /// State of a snapshot record
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SnapshotFlags: u32 {
        /// The clip was changed while this snapshot was on top
        const CLIP_SET = 0x01;
        /// This snapshot created a layer
        const IS_LAYER = 0x02;
        /// The layer renders into its own framebuffer
        const IS_FBO_LAYER = 0x04;
        /// Draws record dirty rects into `target_layer`
        const FBO_TARGET = 0x08;
        /// Viewport and projection must be restored on pop
        const DIRTY_ORTHO = 0x10;
    }
}

/// Clip storage: a rectangle, plus a region when the clip is not rectangular
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Clip {
    pub rect: Rect,
    pub region: Option<Region>,
}

/// One record of the stack
#[derive(Debug)]
pub struct Snapshot {
    pub flags: SnapshotFlags,
    parent: Option<usize>,
    transform_owner: usize,
    clip_owner: usize,
    transform: Matrix4,
    clip: Clip,
    /// Product of the alphas of every ancestor
    pub alpha: f32,
    /// Framebuffer draws go to
    pub fbo: FramebufferId,
    /// An ancestor layer has nothing visible to composite
    pub invisible: bool,
    /// The layer of this snapshot was rejected
    pub empty: bool,
    pub viewport: Rect,
    /// Height of the target, used to flip into GL coordinates
    pub height: i32,
    /// Innermost layer draws belong to
    pub layer: Option<LayerRef>,
    /// Layer whose region accumulates dirty rects
    pub target_layer: Option<LayerRef>,
    /// Layer created by this snapshot
    pub owned_layer: Option<Layer>,
    /// Projection in effect before this snapshot redirected rendering
    pub ortho_matrix: Matrix4,
}

impl Snapshot {
    fn root(width: i32, height: i32, fbo: FramebufferId) -> Self {
        let viewport = Rect::new(0.0, 0.0, width as f32, height as f32);
        Self {
            flags: SnapshotFlags::empty(),
            parent: None,
            transform_owner: 0,
            clip_owner: 0,
            transform: Matrix4::IDENTITY,
            clip: Clip {
                rect: viewport,
                region: None,
            },
            alpha: 1.0,
            fbo,
            invisible: false,
            empty: false,
            viewport,
            height,
            layer: None,
            target_layer: None,
            owned_layer: None,
            ortho_matrix: Matrix4::IDENTITY,
        }
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn is_ignored(&self) -> bool {
        self.invisible || self.empty
    }
}

/// Arena of snapshot records
#[derive(Debug)]
pub struct SnapshotStack {
    records: Vec<Snapshot>,
}

impl SnapshotStack {
    /// A stack holding only the root for a `width` by `height` target
    pub fn new(width: i32, height: i32, fbo: FramebufferId) -> Self {
        Self {
            records: vec![Snapshot::root(width, height, fbo)],
        }
    }

    /// Number of records, root included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn top_index(&self) -> usize {
        self.records.len() - 1
    }

    pub fn current(&self) -> &Snapshot {
        &self.records[self.top_index()]
    }

    pub fn current_mut(&mut self) -> &mut Snapshot {
        let top = self.top_index();
        &mut self.records[top]
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Snapshot> {
        self.records.get_mut(index)
    }

    pub fn first(&self) -> &Snapshot {
        &self.records[0]
    }

    /// Push a record copying what `flags` asks for. Returns its index.
    pub fn push(&mut self, flags: SaveFlags) -> usize {
        let index = self.records.len();
        let parent_index = self.top_index();
        let parent = &self.records[parent_index];

        let (transform_owner, transform) = if flags.contains(SaveFlags::MATRIX) {
            (index, *self.transform())
        } else {
            (parent.transform_owner, Matrix4::IDENTITY)
        };
        let (clip_owner, clip) = if flags.contains(SaveFlags::CLIP) {
            (index, self.clip_state().clone())
        } else {
            (parent.clip_owner, Clip::default())
        };

        let fbo_target = parent.flags.contains(SnapshotFlags::FBO_TARGET);
        let record = Snapshot {
            flags: if fbo_target {
                SnapshotFlags::FBO_TARGET
            } else {
                SnapshotFlags::empty()
            },
            parent: Some(parent_index),
            transform_owner,
            clip_owner,
            transform,
            clip,
            alpha: parent.alpha,
            fbo: parent.fbo,
            invisible: parent.invisible,
            empty: false,
            viewport: parent.viewport,
            height: parent.height,
            layer: parent.layer.clone(),
            target_layer: if fbo_target {
                parent.target_layer.clone()
            } else {
                None
            },
            owned_layer: None,
            ortho_matrix: parent.ortho_matrix,
        };
        self.records.push(record);
        index
    }

    /// Pop the top record. The root is never popped.
    pub fn pop(&mut self) -> Option<Snapshot> {
        if self.records.len() <= 1 {
            return None;
        }
        self.records.pop()
    }

    /// Drop everything above the root
    pub fn truncate_to_root(&mut self) {
        self.records.truncate(1);
    }

    pub fn transform(&self) -> &Matrix4 {
        let owner = self.current().transform_owner;
        &self.records[owner].transform
    }

    pub fn transform_mut(&mut self) -> &mut Matrix4 {
        let owner = self.current().transform_owner;
        &mut self.records[owner].transform
    }

    /// Transform of the record at `index`
    pub fn transform_at(&self, index: usize) -> &Matrix4 {
        let owner = self.records[index].transform_owner;
        &self.records[owner].transform
    }

    pub fn clip_state(&self) -> &Clip {
        let owner = self.current().clip_owner;
        &self.records[owner].clip
    }

    fn clip_mut(&mut self) -> &mut Clip {
        let owner = self.current().clip_owner;
        &mut self.records[owner].clip
    }

    pub fn clip_rect(&self) -> &Rect {
        &self.clip_state().rect
    }

    /// Non-rectangular clip, if any
    pub fn clip_region(&self) -> Option<&Region> {
        self.clip_state().region.as_ref()
    }

    /// Clip rect of the record at `index`
    pub fn clip_rect_at(&self, index: usize) -> &Rect {
        let owner = self.records[index].clip_owner;
        &self.records[owner].clip.rect
    }

    pub fn is_ignored(&self) -> bool {
        self.current().is_ignored()
    }

    /// The current record takes its own transform, loaded with a translation
    pub fn reset_transform(&mut self, x: f32, y: f32) {
        let top = self.top_index();
        let record = &mut self.records[top];
        record.transform_owner = top;
        record.transform = Matrix4::from_translate(x, y);
    }

    /// The current record takes its own clip, set to the given rect
    pub fn reset_clip(&mut self, left: f32, top: f32, right: f32, bottom: f32) {
        let index = self.top_index();
        let record = &mut self.records[index];
        record.clip_owner = index;
        record.clip = Clip::default();
        self.set_clip(left, top, right, bottom);
    }

    /// Replace the clip with a rect in target coordinates
    pub fn set_clip(&mut self, left: f32, top: f32, right: f32, bottom: f32) {
        let clip = self.clip_mut();
        clip.rect = Rect::new(left, top, right, bottom);
        clip.region = None;
        self.current_mut().flags |= SnapshotFlags::CLIP_SET;
    }

    /// Clip with a local rect. Returns true when the clip changed.
    pub fn clip(&mut self, left: f32, top: f32, right: f32, bottom: f32, op: RegionOp) -> bool {
        let rect = self.transform().mapped_rect(Rect::new(left, top, right, bottom));
        self.clip_transformed(&rect, op)
    }

    /// Clip with a rect already in target coordinates
    pub fn clip_transformed(&mut self, rect: &Rect, op: RegionOp) -> bool {
        let previous = *self.clip_rect();
        match op {
            RegionOp::Intersect => {
                let clip = self.clip_mut();
                if clip.region.is_some() {
                    let region = clip.region.get_or_insert_with(Region::new);
                    region.op_rect(truncate(rect), RegionOp::Intersect);
                    Self::copy_clip_rect_from_region(clip);
                    Self::restrict(clip, &previous);
                } else if !clip.rect.intersect(rect) {
                    clip.rect.set_empty();
                }
            }
            RegionOp::Replace => {
                self.set_clip(rect.left, rect.top, rect.right, rect.bottom);
            }
            _ => {
                let clip = self.clip_mut();
                Self::ensure_clip_region(clip);
                if let Some(region) = clip.region.as_mut() {
                    region.op_rect(truncate(rect), op);
                }
                Self::copy_clip_rect_from_region(clip);
            }
        }
        self.current_mut().flags |= SnapshotFlags::CLIP_SET;
        true
    }

    /// Combine the clip with a region in target coordinates
    pub fn clip_region_transformed(&mut self, region: &Region, op: RegionOp) -> bool {
        let previous = *self.clip_rect();
        let clip = self.clip_mut();
        Self::ensure_clip_region(clip);
        if let Some(current) = clip.region.as_mut() {
            current.op(region, op);
        }
        Self::copy_clip_rect_from_region(clip);
        if op == RegionOp::Intersect {
            Self::restrict(clip, &previous);
        }
        self.current_mut().flags |= SnapshotFlags::CLIP_SET;
        true
    }

    /// Current clip in local coordinates
    pub fn local_clip(&self) -> Rect {
        let mut inverse = Matrix4::IDENTITY;
        inverse.load_inverse(self.transform());
        inverse.mapped_rect(*self.clip_rect())
    }

    fn ensure_clip_region(clip: &mut Clip) {
        if clip.region.is_none() {
            clip.region = Some(Region::from_rect(truncate(&clip.rect)));
        }
    }

    fn copy_clip_rect_from_region(clip: &mut Clip) {
        match &clip.region {
            Some(region) if !region.is_empty() => {
                clip.rect = region.bounds().to_rect();
                if region.is_rect() {
                    clip.region = None;
                }
            }
            _ => {
                clip.rect.set_empty();
                clip.region = None;
            }
        }
    }

    /// Keep an intersection inside the previous clip rect
    fn restrict(clip: &mut Clip, previous: &Rect) {
        if clip.rect.is_empty() {
            return;
        }
        if !clip.rect.intersect(previous) {
            clip.rect.set_empty();
            clip.region = None;
            return;
        }
        if let Some(region) = clip.region.as_mut() {
            region.op_rect(previous.round_out(), RegionOp::Intersect);
            Self::copy_clip_rect_from_region(clip);
        }
    }
}

fn truncate(rect: &Rect) -> IRect {
    IRect::new(
        rect.left as i32,
        rect.top as i32,
        rect.right as i32,
        rect.bottom as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> SnapshotStack {
        SnapshotStack::new(100, 100, FramebufferId::DEFAULT)
    }

    #[test]
    fn test_root_clip_is_viewport() {
        let mut stack = stack();
        assert_eq!(*stack.clip_rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(stack.transform().is_identity());
        assert!(stack.pop().is_none());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_matrix_save_isolates_transform() {
        let mut stack = stack();
        stack.push(SaveFlags::MATRIX_CLIP);
        stack.transform_mut().translate(10.0, 5.0);
        assert_eq!(stack.transform().translate_x(), 10.0);
        stack.pop();
        assert!(stack.transform().is_identity());
    }

    #[test]
    fn test_shared_transform_survives_pop() {
        let mut stack = stack();
        stack.push(SaveFlags::CLIP);
        stack.transform_mut().translate(3.0, 4.0);
        stack.pop();
        assert_eq!(stack.transform().translate_x(), 3.0);
    }

    #[test]
    fn test_intersect_only_shrinks() {
        let mut stack = stack();
        stack.push(SaveFlags::MATRIX_CLIP);
        assert!(stack.clip(10.0, 10.0, 200.0, 50.0, RegionOp::Intersect));
        assert_eq!(*stack.clip_rect(), Rect::new(10.0, 10.0, 100.0, 50.0));
        stack.clip(500.0, 500.0, 600.0, 600.0, RegionOp::Intersect);
        assert!(stack.clip_rect().is_empty());
        assert!(stack.current().flags.contains(SnapshotFlags::CLIP_SET));
        stack.pop();
        assert_eq!(*stack.clip_rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_difference_builds_region() {
        let mut stack = stack();
        stack.push(SaveFlags::MATRIX_CLIP);
        stack.clip(0.0, 0.0, 50.0, 50.0, RegionOp::Difference);
        let region = stack.clip_region().unwrap();
        assert!(!region.is_rect());
        assert!(!region.contains_point(10, 10));
        assert!(region.contains_point(60, 10));
        assert_eq!(*stack.clip_rect(), Rect::new(0.0, 0.0, 100.0, 100.0));

        // Back to a rectangle once the region collapses
        stack.clip(50.0, 0.0, 100.0, 100.0, RegionOp::Intersect);
        assert!(stack.clip_region().is_none());
        assert_eq!(*stack.clip_rect(), Rect::new(50.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_region_intersect_stays_inside_fractional_clip() {
        let mut stack = stack();
        stack.push(SaveFlags::MATRIX_CLIP);
        stack.clip(10.5, 10.5, 60.5, 60.5, RegionOp::Intersect);
        let before = *stack.clip_rect();
        let region = Region::from_rect(IRect::new(0, 0, 100, 100));
        stack.clip_region_transformed(&region, RegionOp::Intersect);
        assert!(before.contains(stack.clip_rect()));
    }

    #[test]
    fn test_child_inherits_fbo_target() {
        let mut stack = stack();
        stack.current_mut().flags |= SnapshotFlags::FBO_TARGET;
        stack.current_mut().target_layer = Some(LayerRef::Owned(0));
        stack.push(SaveFlags::MATRIX_CLIP);
        assert!(stack.current().flags.contains(SnapshotFlags::FBO_TARGET));
        assert_eq!(stack.current().target_layer, Some(LayerRef::Owned(0)));
        assert!(!stack.current().flags.contains(SnapshotFlags::CLIP_SET));
    }

    #[test]
    fn test_local_clip_inverts_transform() {
        let mut stack = stack();
        stack.push(SaveFlags::MATRIX_CLIP);
        stack.transform_mut().translate(10.0, 20.0);
        stack.transform_mut().scale(2.0, 2.0);
        let local = stack.local_clip();
        assert_eq!(local, Rect::new(-5.0, -10.0, 45.0, 40.0));
    }

    #[test]
    fn test_clip_state_follows_clip_op() {
        let mut stack = stack();
        assert!(stack.clip(0.0, 0.0, 40.0, 40.0, RegionOp::Difference));
        assert!(stack.clip_state().region.is_some());
        assert_eq!(stack.clip_state().rect, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(stack.clip(50.0, 50.0, 60.0, 60.0, RegionOp::Intersect));
        assert!(stack.clip_state().region.is_none());
        assert_eq!(*stack.clip_rect(), Rect::new(50.0, 50.0, 60.0, 60.0));
    }

    #[test]
    fn test_reset_clip_does_not_touch_parent() {
        let mut stack = stack();
        stack.push(SaveFlags::empty());
        stack.reset_clip(0.0, 0.0, 10.0, 10.0);
        stack.reset_transform(-5.0, -5.0);
        stack.pop();
        assert_eq!(*stack.clip_rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(stack.transform().is_identity());
    }
}
