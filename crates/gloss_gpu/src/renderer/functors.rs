//! Foreign drawing callbacks

use gloss_paint::Rect;

use crate::device::GpuDevice;
use crate::functor::{Functor, FunctorContext, FunctorId, FunctorInfo, FunctorMode};
use crate::status::DrawStatus;

use super::Renderer;

impl<D: GpuDevice> Renderer<D> {
    pub fn register_functor(&mut self, functor: Box<dyn Functor>) -> FunctorId {
        self.functors.register(functor)
    }

    pub fn unregister_functor(&mut self, id: FunctorId) -> Option<Box<dyn Functor>> {
        self.functors.unregister(id)
    }

    /// Queue a functor for the next [`Self::invoke_functors`]
    pub fn attach_functor(&mut self, id: FunctorId) {
        self.functors.attach(id);
    }

    pub fn detach_functor(&mut self, id: FunctorId) {
        self.functors.detach(id);
    }

    /// Functors are waiting to be invoked
    pub fn has_functors(&self) -> bool {
        self.functors.has_attached()
    }

    /// Run every attached functor in process mode. Functors asking to be
    /// invoked again stay attached, those asking for a redraw grow `dirty`.
    pub fn invoke_functors(&mut self, dirty: &mut Rect) -> DrawStatus {
        let batch = self.functors.take_attached();
        if batch.is_empty() {
            return DrawStatus::DONE;
        }
        tracing::trace!("invoking {} functors", batch.len());

        self.interrupt();
        let mut result = DrawStatus::DONE;
        for id in batch {
            let mut info = FunctorInfo::default();
            let Some(functor) = self.functors.get_mut(id) else {
                continue;
            };
            let status = functor.invoke(
                FunctorMode::Process,
                &mut FunctorContext {
                    info: &mut info,
                    device: &mut self.device,
                },
            );
            if status.contains(DrawStatus::DRAW) {
                dirty.union_with(&info.dirty);
            }
            if status.contains(DrawStatus::INVOKE) {
                self.functors.attach(id);
            }
            result |= status;
        }
        self.resume();
        result
    }

    /// Let a functor draw into the current target with the current clip and
    /// transform
    pub fn call_draw_functor(&mut self, id: FunctorId, dirty: &mut Rect) -> DrawStatus {
        if self.snapshots.is_ignored() || !self.functors.contains(id) {
            return DrawStatus::DONE;
        }
        self.functors.detach(id);

        self.caches.state.set_scissor_enabled(&mut self.device, true);
        if self.dirty_clip {
            self.set_scissor_from_clip();
            self.set_stencil_from_clip();
        }
        self.interrupt();

        let clip = self.snapshots.clip_rect().snapped();
        if self.has_layer() {
            self.dirty_layer_unchecked(clip);
        }
        let snapshot = self.snapshots.current();
        let mut info = FunctorInfo {
            clip,
            width: snapshot.viewport.width() as i32,
            height: snapshot.viewport.height() as i32,
            is_layer: snapshot.flags.contains(crate::snapshot::SnapshotFlags::FBO_TARGET),
            transform: *self.snapshots.transform(),
            dirty: Rect::EMPTY,
        };

        let mut result = DrawStatus::DREW;
        if let Some(functor) = self.functors.get_mut(id) {
            let status = functor.invoke(
                FunctorMode::Draw,
                &mut FunctorContext {
                    info: &mut info,
                    device: &mut self.device,
                },
            );
            if status.contains(DrawStatus::DRAW) {
                dirty.union_with(&info.dirty);
            }
            if status.contains(DrawStatus::INVOKE) {
                self.functors.attach(id);
            }
            result |= status;
        }
        self.resume();
        result
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::config::RendererConfig;
    use crate::headless::SoftwareDevice;
    use crate::snapshot::SaveFlags;
    use gloss_paint::RegionOp;

    /// Records the clip it was given and answers with a fixed status
    struct Recorder {
        calls: Arc<AtomicUsize>,
        status: DrawStatus,
        seen: Arc<parking_lot::Mutex<Option<FunctorInfo>>>,
    }

    impl Functor for Recorder {
        fn invoke(&mut self, _mode: FunctorMode, context: &mut FunctorContext<'_>) -> DrawStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock() = Some(context.info.clone());
            context.info.dirty = Rect::new(1.0, 2.0, 3.0, 4.0);
            self.status
        }
    }

    fn recorder(status: DrawStatus) -> (Recorder, Arc<AtomicUsize>, Arc<parking_lot::Mutex<Option<FunctorInfo>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let functor = Recorder {
            calls: calls.clone(),
            status,
            seen: seen.clone(),
        };
        (functor, calls, seen)
    }

    fn renderer() -> Renderer<SoftwareDevice> {
        let mut renderer = Renderer::new(SoftwareDevice::new(64, 64), RendererConfig::default());
        renderer.set_viewport(64, 64);
        renderer.prepare(false);
        renderer
    }

    #[test]
    fn test_draw_functor_sees_clip_and_transform() {
        let mut r = renderer();
        let (functor, calls, seen) = recorder(DrawStatus::DONE);
        let id = r.register_functor(Box::new(functor));
        r.save(SaveFlags::MATRIX_CLIP);
        r.translate(5.0, 5.0);
        r.clip_rect(0.0, 0.0, 10.0, 10.0, RegionOp::Intersect);

        let mut dirty = Rect::EMPTY;
        let status = r.call_draw_functor(id, &mut dirty);
        assert_eq!(status, DrawStatus::DREW);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let info = seen.lock().clone().unwrap();
        assert_eq!(info.clip, Rect::new(5.0, 5.0, 15.0, 15.0));
        assert_eq!(info.transform.translate_x(), 5.0);
        assert_eq!((info.width, info.height), (64, 64));
        assert!(!info.is_layer);
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_draw_functor_requests_redraw_and_invoke() {
        let mut r = renderer();
        let (functor, _, _) = recorder(DrawStatus::DRAW | DrawStatus::INVOKE);
        let id = r.register_functor(Box::new(functor));
        let mut dirty = Rect::EMPTY;
        let status = r.call_draw_functor(id, &mut dirty);
        assert!(status.contains(DrawStatus::DREW | DrawStatus::DRAW | DrawStatus::INVOKE));
        assert_eq!(dirty, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert!(r.has_functors());
    }

    #[test]
    fn test_unknown_functor_is_done() {
        let mut r = renderer();
        let (functor, calls, _) = recorder(DrawStatus::DONE);
        let id = r.register_functor(Box::new(functor));
        r.unregister_functor(id);
        let mut dirty = Rect::EMPTY;
        assert_eq!(r.call_draw_functor(id, &mut dirty), DrawStatus::DONE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invoke_keeps_only_reinvoking_functors() {
        let mut r = renderer();
        let (once, once_calls, _) = recorder(DrawStatus::DONE);
        let (again, again_calls, _) = recorder(DrawStatus::INVOKE);
        let once = r.register_functor(Box::new(once));
        let again = r.register_functor(Box::new(again));
        r.attach_functor(once);
        r.attach_functor(again);

        let mut dirty = Rect::EMPTY;
        let status = r.invoke_functors(&mut dirty);
        assert_eq!(status, DrawStatus::INVOKE);
        assert_eq!(once_calls.load(Ordering::SeqCst), 1);
        assert_eq!(again_calls.load(Ordering::SeqCst), 1);

        r.invoke_functors(&mut dirty);
        assert_eq!(once_calls.load(Ordering::SeqCst), 1);
        assert_eq!(again_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invoke_without_functors_is_done() {
        let mut r = renderer();
        let mut dirty = Rect::EMPTY;
        assert_eq!(r.invoke_functors(&mut dirty), DrawStatus::DONE);
    }
}
