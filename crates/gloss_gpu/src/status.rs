//! Draw status and replay flags

use bitflags::bitflags;

bitflags! {
    /// Outcome of a draw operation, OR-combined across a batch
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DrawStatus: u32 {
        /// Something reached the target
        const DREW = 1 << 0;
        /// A functor asked to be invoked again outside of drawing
        const INVOKE = 1 << 1;
        /// A functor asked for a redraw of its dirty rect
        const DRAW = 1 << 2;
    }
}

impl DrawStatus {
    /// Nothing was drawn
    pub const DONE: DrawStatus = DrawStatus::empty();

    pub fn is_done(self) -> bool {
        self.is_empty()
    }
}

bitflags! {
    /// Flags passed to a display list replay
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ReplayFlags: u32 {
        /// Clip children to the list's own bounds
        const CLIP_CHILDREN = 1 << 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_is_empty() {
        assert!(DrawStatus::DONE.is_done());
        let status = DrawStatus::DONE | DrawStatus::DREW;
        assert!(!status.is_done());
        assert!(status.contains(DrawStatus::DREW));
        assert!(!status.contains(DrawStatus::INVOKE));
    }
}
