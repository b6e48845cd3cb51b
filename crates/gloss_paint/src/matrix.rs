//! 4x4 transform matrix
//!
//! Column-major storage so the array can be uploaded to a shader as is.
//! Only the x/y/w rows take part in 2D mapping; z is carried for the
//! projection matrix.

use crate::path::Point;
use crate::primitives::Rect;

/// A column-major 4x4 matrix
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Matrix4 {
    pub data: [f32; 16],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    pub const SCALE_X: usize = 0;
    pub const SKEW_Y: usize = 1;
    pub const PERSPECTIVE_0: usize = 3;
    pub const SKEW_X: usize = 4;
    pub const SCALE_Y: usize = 5;
    pub const PERSPECTIVE_1: usize = 7;
    pub const SCALE_Z: usize = 10;
    pub const TRANSLATE_X: usize = 12;
    pub const TRANSLATE_Y: usize = 13;
    pub const TRANSLATE_Z: usize = 14;
    pub const PERSPECTIVE_2: usize = 15;

    pub const IDENTITY: Matrix4 = Matrix4 {
        data: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn from_translate(x: f32, y: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.data[Self::TRANSLATE_X] = x;
        m.data[Self::TRANSLATE_Y] = y;
        m
    }

    pub fn from_scale(sx: f32, sy: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.data[Self::SCALE_X] = sx;
        m.data[Self::SCALE_Y] = sy;
        m
    }

    pub fn from_skew(sx: f32, sy: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.data[Self::SKEW_X] = sx;
        m.data[Self::SKEW_Y] = sy;
        m
    }

    /// Rotation around the z axis, in degrees
    pub fn from_rotate(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let mut m = Self::IDENTITY;
        m.data[Self::SCALE_X] = c;
        m.data[Self::SKEW_Y] = s;
        m.data[Self::SKEW_X] = -s;
        m.data[Self::SCALE_Y] = c;
        m
    }

    /// Build from a 3x3 row-major 2D matrix `[sx, kx, tx, ky, sy, ty, p0, p1, p2]`
    pub fn from_affine(m: [f32; 9]) -> Self {
        let mut out = Self::IDENTITY;
        out.data[Self::SCALE_X] = m[0];
        out.data[Self::SKEW_X] = m[1];
        out.data[Self::TRANSLATE_X] = m[2];
        out.data[Self::SKEW_Y] = m[3];
        out.data[Self::SCALE_Y] = m[4];
        out.data[Self::TRANSLATE_Y] = m[5];
        out.data[Self::PERSPECTIVE_0] = m[6];
        out.data[Self::PERSPECTIVE_1] = m[7];
        out.data[Self::PERSPECTIVE_2] = m[8];
        out
    }

    /// The 3x3 row-major 2D view of this matrix
    pub fn to_affine(&self) -> [f32; 9] {
        let d = &self.data;
        [
            d[Self::SCALE_X],
            d[Self::SKEW_X],
            d[Self::TRANSLATE_X],
            d[Self::SKEW_Y],
            d[Self::SCALE_Y],
            d[Self::TRANSLATE_Y],
            d[Self::PERSPECTIVE_0],
            d[Self::PERSPECTIVE_1],
            d[Self::PERSPECTIVE_2],
        ]
    }

    /// Orthographic projection
    pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.data[Self::SCALE_X] = 2.0 / (right - left);
        m.data[Self::SCALE_Y] = 2.0 / (top - bottom);
        m.data[Self::SCALE_Z] = -2.0 / (far - near);
        m.data[Self::TRANSLATE_X] = -(right + left) / (right - left);
        m.data[Self::TRANSLATE_Y] = -(top + bottom) / (top - bottom);
        m.data[Self::TRANSLATE_Z] = -(far + near) / (far - near);
        m
    }

    /// `a * b`: points are mapped by `b` first
    pub fn multiplied(a: &Matrix4, b: &Matrix4) -> Matrix4 {
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a.data[k * 4 + row] * b.data[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }
        Matrix4 { data: out }
    }

    /// `self = self * other`
    pub fn multiply(&mut self, other: &Matrix4) {
        *self = Self::multiplied(self, other);
    }

    pub fn load_identity(&mut self) {
        *self = Self::IDENTITY;
    }

    pub fn load_translate(&mut self, x: f32, y: f32) {
        *self = Self::from_translate(x, y);
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.multiply(&Self::from_translate(x, y));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.multiply(&Self::from_scale(sx, sy));
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.multiply(&Self::from_skew(sx, sy));
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.multiply(&Self::from_rotate(degrees));
    }

    pub fn translate_x(&self) -> f32 {
        self.data[Self::TRANSLATE_X]
    }

    pub fn translate_y(&self) -> f32 {
        self.data[Self::TRANSLATE_Y]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn is_perspective(&self) -> bool {
        let d = &self.data;
        d[Self::PERSPECTIVE_0] != 0.0 || d[Self::PERSPECTIVE_1] != 0.0 || d[Self::PERSPECTIVE_2] != 1.0
    }

    /// Scale and translate only
    pub fn is_simple(&self) -> bool {
        let d = &self.data;
        d[Self::SKEW_X] == 0.0 && d[Self::SKEW_Y] == 0.0 && !self.is_perspective()
    }

    pub fn is_pure_translate(&self) -> bool {
        let d = &self.data;
        self.is_simple() && d[Self::SCALE_X] == 1.0 && d[Self::SCALE_Y] == 1.0
    }

    /// True when axis-aligned rectangles map to axis-aligned rectangles
    pub fn rect_to_rect(&self) -> bool {
        if self.is_perspective() {
            return false;
        }
        let d = &self.data;
        let (m00, m01, m10, m11) = (
            d[Self::SCALE_X],
            d[Self::SKEW_X],
            d[Self::SKEW_Y],
            d[Self::SCALE_Y],
        );
        (m01 == 0.0 && m10 == 0.0 && m00 != 0.0 && m11 != 0.0)
            || (m00 == 0.0 && m11 == 0.0 && m01 != 0.0 && m10 != 0.0)
    }

    pub fn changes_bounds(&self) -> bool {
        !self.is_pure_translate()
    }

    /// Length of the mapped unit x and y axes
    pub fn scale_factors(&self) -> (f32, f32) {
        let d = &self.data;
        (
            (d[Self::SCALE_X] * d[Self::SCALE_X] + d[Self::SKEW_Y] * d[Self::SKEW_Y]).sqrt(),
            (d[Self::SKEW_X] * d[Self::SKEW_X] + d[Self::SCALE_Y] * d[Self::SCALE_Y]).sqrt(),
        )
    }

    /// Homogeneous mapping of `(x, y, 0, 1)`
    pub fn map_point4(&self, x: f32, y: f32) -> [f32; 4] {
        let d = &self.data;
        [
            d[0] * x + d[4] * y + d[12],
            d[1] * x + d[5] * y + d[13],
            d[2] * x + d[6] * y + d[14],
            d[3] * x + d[7] * y + d[15],
        ]
    }

    pub fn map_point(&self, x: f32, y: f32) -> Point {
        let [px, py, _, w] = self.map_point4(x, y);
        if w != 1.0 && w != 0.0 {
            Point::new(px / w, py / w)
        } else {
            Point::new(px, py)
        }
    }

    /// Map a rect and replace it with the bounds of the result
    pub fn map_rect(&self, rect: &mut Rect) {
        if self.is_simple() {
            let d = &self.data;
            let l = rect.left * d[Self::SCALE_X] + d[Self::TRANSLATE_X];
            let r = rect.right * d[Self::SCALE_X] + d[Self::TRANSLATE_X];
            let t = rect.top * d[Self::SCALE_Y] + d[Self::TRANSLATE_Y];
            let b = rect.bottom * d[Self::SCALE_Y] + d[Self::TRANSLATE_Y];
            *rect = Rect::new(l.min(r), t.min(b), l.max(r), t.max(b));
            return;
        }

        let corners = [
            self.map_point(rect.left, rect.top),
            self.map_point(rect.right, rect.top),
            self.map_point(rect.left, rect.bottom),
            self.map_point(rect.right, rect.bottom),
        ];
        let mut out = Rect::inverted();
        for p in corners {
            out.expand_to_cover(p.x, p.y);
        }
        *rect = out;
    }

    pub fn mapped_rect(&self, mut rect: Rect) -> Rect {
        self.map_rect(&mut rect);
        rect
    }

    /// Inverse of the 2D projective part. `None` when singular.
    pub fn inverse(&self) -> Option<Matrix4> {
        let [a, b, c, d, e, f, g, h, i] = self.to_affine();
        let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let s = 1.0 / det;
        Some(Self::from_affine([
            (e * i - f * h) * s,
            (c * h - b * i) * s,
            (b * f - c * e) * s,
            (f * g - d * i) * s,
            (a * i - c * g) * s,
            (c * d - a * f) * s,
            (d * h - e * g) * s,
            (b * g - a * h) * s,
            (a * e - b * d) * s,
        ]))
    }

    /// Load the inverse of `other`, falling back to identity when singular
    pub fn load_inverse(&mut self, other: &Matrix4) {
        *self = other.inverse().unwrap_or(Self::IDENTITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_then_scale_order() {
        let mut m = Matrix4::identity();
        m.translate(10.0, 20.0);
        m.scale(2.0, 3.0);
        let p = m.map_point(1.0, 1.0);
        assert_eq!(p, Point::new(12.0, 23.0));
        assert!(m.is_simple());
        assert!(!m.is_pure_translate());
    }

    #[test]
    fn test_rotation_classification() {
        let mut m = Matrix4::identity();
        m.rotate(45.0);
        assert!(!m.rect_to_rect());
        assert!(!m.is_simple());

        let mut quarter = Matrix4::identity();
        quarter.rotate(90.0);
        // sin/cos of 90 degrees are not exact in f32
        quarter.data[Matrix4::SCALE_X] = 0.0;
        quarter.data[Matrix4::SCALE_Y] = 0.0;
        assert!(quarter.rect_to_rect());
    }

    #[test]
    fn test_map_rect_rotated_returns_bounds() {
        let mut m = Matrix4::identity();
        m.rotate(45.0);
        let r = m.mapped_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let diag = 10.0 * std::f32::consts::SQRT_2;
        assert!((r.width() - diag).abs() < 1e-3);
        assert!((r.height() - diag).abs() < 1e-3);
    }

    #[test]
    fn test_inverse_round_trips() {
        let mut m = Matrix4::identity();
        m.translate(5.0, -3.0);
        m.rotate(30.0);
        m.scale(2.0, 0.5);
        let inv = m.inverse().unwrap();
        let p = m.map_point(7.0, 11.0);
        let back = inv.map_point(p.x, p.y);
        assert!((back.x - 7.0).abs() < 1e-3);
        assert!((back.y - 11.0).abs() < 1e-3);
    }

    #[test]
    fn test_ortho_flips_y() {
        let m = Matrix4::ortho(0.0, 100.0, 50.0, 0.0, -1.0, 1.0);
        let top_left = m.map_point4(0.0, 0.0);
        assert_eq!((top_left[0], top_left[1]), (-1.0, 1.0));
        let bottom_right = m.map_point4(100.0, 50.0);
        assert_eq!((bottom_right[0], bottom_right[1]), (1.0, -1.0));
    }
}
