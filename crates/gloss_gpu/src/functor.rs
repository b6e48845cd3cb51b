//! Foreign drawing callbacks
//!
//! A [`Functor`] issues its own device calls in the middle of a frame. The
//! renderer hands it a [`FunctorContext`] describing the target and brackets
//! every invocation with `interrupt`/`resume`, so whatever state the functor
//! leaves behind is discarded.

use gloss_paint::{Matrix4, Rect};
use slotmap::{new_key_type, SlotMap};

use crate::device::GpuDevice;
use crate::status::DrawStatus;

new_key_type! {
    /// Handle of a registered functor
    pub struct FunctorId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctorMode {
    /// Draw into the current target
    Draw,
    /// Do pending work outside of drawing
    Process,
}

/// Target description given to a functor
#[derive(Clone, Debug, PartialEq)]
pub struct FunctorInfo {
    /// Clip in target coordinates
    pub clip: Rect,
    pub width: i32,
    pub height: i32,
    pub is_layer: bool,
    pub transform: Matrix4,
    /// Set by the functor: area it wants redrawn when it returns `DRAW`
    pub dirty: Rect,
}

impl Default for FunctorInfo {
    fn default() -> Self {
        Self {
            clip: Rect::EMPTY,
            width: 0,
            height: 0,
            is_layer: false,
            transform: Matrix4::IDENTITY,
            dirty: Rect::EMPTY,
        }
    }
}

pub struct FunctorContext<'a> {
    pub info: &'a mut FunctorInfo,
    pub device: &'a mut dyn GpuDevice,
}

pub trait Functor: Send {
    fn invoke(&mut self, mode: FunctorMode, context: &mut FunctorContext<'_>) -> DrawStatus;
}

/// Registered functors and the ones waiting to be invoked
#[derive(Default)]
pub struct FunctorRegistry {
    functors: SlotMap<FunctorId, Box<dyn Functor>>,
    attached: Vec<FunctorId>,
}

impl FunctorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, functor: Box<dyn Functor>) -> FunctorId {
        self.functors.insert(functor)
    }

    pub fn unregister(&mut self, id: FunctorId) -> Option<Box<dyn Functor>> {
        self.attached.retain(|&a| a != id);
        self.functors.remove(id)
    }

    pub fn len(&self) -> usize {
        self.functors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functors.is_empty()
    }

    pub fn contains(&self, id: FunctorId) -> bool {
        self.functors.contains_key(id)
    }

    /// Queue `id` for the next batch. Attaching twice has no effect.
    pub fn attach(&mut self, id: FunctorId) {
        if self.functors.contains_key(id) && !self.attached.contains(&id) {
            self.attached.push(id);
        }
    }

    pub fn detach(&mut self, id: FunctorId) {
        self.attached.retain(|&a| a != id);
    }

    pub fn has_attached(&self) -> bool {
        !self.attached.is_empty()
    }

    pub fn attached(&self) -> &[FunctorId] {
        &self.attached
    }

    /// Take the current batch, leaving the queue empty for re-attachment
    pub fn take_attached(&mut self) -> Vec<FunctorId> {
        std::mem::take(&mut self.attached)
    }

    pub fn get_mut(&mut self, id: FunctorId) -> Option<&mut (dyn Functor + 'static)> {
        self.functors.get_mut(id).map(|f| f.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Functor for Noop {
        fn invoke(&mut self, _mode: FunctorMode, _context: &mut FunctorContext<'_>) -> DrawStatus {
            DrawStatus::DONE
        }
    }

    fn noop() -> Box<dyn Functor> {
        Box::new(Noop)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut registry = FunctorRegistry::new();
        let id = registry.register(noop());
        registry.attach(id);
        registry.attach(id);
        assert_eq!(registry.attached(), &[id]);
        registry.detach(id);
        assert!(!registry.has_attached());
    }

    #[test]
    fn test_take_attached_clears_queue() {
        let mut registry = FunctorRegistry::new();
        let a = registry.register(noop());
        let b = registry.register(noop());
        registry.attach(a);
        registry.attach(b);
        let batch = registry.take_attached();
        assert_eq!(batch, vec![a, b]);
        assert!(!registry.has_attached());
        registry.attach(a);
        assert_eq!(registry.attached(), &[a]);
    }

    #[test]
    fn test_unregister_detaches() {
        let mut registry = FunctorRegistry::new();
        let id = registry.register(noop());
        registry.attach(id);
        assert!(registry.unregister(id).is_some());
        assert!(!registry.has_attached());
        registry.attach(id);
        assert!(!registry.has_attached());
    }
}
