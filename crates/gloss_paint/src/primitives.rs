//! Geometric primitives

use crate::path::Point;

/// A rectangle stored as edges. Empty when `right <= left` or `bottom <= top`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn from_points(p1: Point, p2: Point) -> Self {
        Self::new(p1.x.min(p2.x), p1.y.min(p2.y), p1.x.max(p2.x), p1.y.max(p2.y))
    }

    /// Starting value for incremental bounds accumulation
    pub const fn inverted() -> Self {
        Self::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN)
    }

    pub fn set(&mut self, left: f32, top: f32, right: f32, bottom: f32) {
        *self = Self::new(left, top, right, bottom);
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) * 0.5,
            (self.top + self.bottom) * 0.5,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn set_empty(&mut self) {
        *self = Self::EMPTY;
    }

    /// True when both rects are non-empty and overlap
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
            && !self.is_empty()
            && !other.is_empty()
    }

    /// Intersect in place. Leaves `self` untouched and returns false when the
    /// intersection is empty.
    pub fn intersect(&mut self, other: &Rect) -> bool {
        let tmp = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if tmp.is_empty() {
            return false;
        }
        *self = tmp;
        true
    }

    /// Grow to cover `other`. Empty inputs are ignored.
    pub fn union_with(&mut self, other: &Rect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    /// Grow to cover a point, used with [`Rect::inverted`]
    pub fn expand_to_cover(&mut self, x: f32, y: f32) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }

    pub fn outset(&mut self, delta: f32) {
        self.left -= delta;
        self.top -= delta;
        self.right += delta;
        self.bottom += delta;
    }

    /// Round every edge to the nearest pixel boundary (`floor(x + 0.5)`)
    pub fn snap_to_pixel_boundaries(&mut self) {
        self.left = (self.left + 0.5).floor();
        self.top = (self.top + 0.5).floor();
        self.right = (self.right + 0.5).floor();
        self.bottom = (self.bottom + 0.5).floor();
    }

    pub fn snapped(mut self) -> Self {
        self.snap_to_pixel_boundaries();
        self
    }

    /// Integer rect covering every pixel this rect touches
    pub fn round_out(&self) -> IRect {
        IRect::new(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }

    /// Integer rect using the same rounding as pixel snapping
    pub fn round(&self) -> IRect {
        let snapped = self.snapped();
        IRect::new(
            snapped.left as i32,
            snapped.top as i32,
            snapped.right as i32,
            snapped.bottom as i32,
        )
    }
}

/// An integer rectangle, used by regions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.left as f32,
            self.top as f32,
            self.right as f32,
            self.bottom as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_keeps_self_when_disjoint() {
        let mut a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!a.intersect(&Rect::new(20.0, 20.0, 30.0, 30.0)));
        assert_eq!(a, Rect::new(0.0, 0.0, 10.0, 10.0));

        assert!(a.intersect(&Rect::new(5.0, -5.0, 15.0, 5.0)));
        assert_eq!(a, Rect::new(5.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn test_union_ignores_empty() {
        let mut a = Rect::EMPTY;
        a.union_with(&Rect::EMPTY);
        assert!(a.is_empty());
        a.union_with(&Rect::new(1.0, 2.0, 3.0, 4.0));
        a.union_with(&Rect::new(-1.0, 0.0, 2.0, 8.0));
        assert_eq!(a, Rect::new(-1.0, 0.0, 3.0, 8.0));
    }

    #[test]
    fn test_snap_rounds_half_up() {
        let r = Rect::new(0.4, 0.5, 10.49, 10.5).snapped();
        assert_eq!(r, Rect::new(0.0, 1.0, 10.0, 11.0));
    }

    #[test]
    fn test_intersects_requires_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 20.0, 20.0)));
    }
}
