//! Path building and representation

use smallvec::SmallVec;

use crate::matrix::Matrix4;
use crate::primitives::Rect;

/// Cubic control distance for a quarter circle of radius 1
const KAPPA: f32 = 0.552_284_8;

/// A 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Path command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo {
        control: Point,
        end: Point,
    },
    CubicTo {
        control1: Point,
        control2: Point,
        end: Point,
    },
    Close,
}

/// Rule deciding which points are inside a self-intersecting path
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillType {
    #[default]
    Winding,
    EvenOdd,
}

/// A 2D path composed of commands
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    commands: SmallVec<[PathCommand; 16]>,
    fill_type: FillType,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn fill_type(&self) -> FillType {
        self.fill_type
    }

    pub fn set_fill_type(&mut self, fill_type: FillType) {
        self.fill_type = fill_type;
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.commands.push(PathCommand::MoveTo(Point::new(x, y)));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.commands.push(PathCommand::LineTo(Point::new(x, y)));
    }

    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        self.commands.push(PathCommand::QuadTo {
            control: Point::new(cx, cy),
            end: Point::new(x, y),
        });
    }

    pub fn cubic_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) {
        self.commands.push(PathCommand::CubicTo {
            control1: Point::new(c1x, c1y),
            control2: Point::new(c2x, c2y),
            end: Point::new(x, y),
        });
    }

    pub fn close(&mut self) {
        self.commands.push(PathCommand::Close);
    }

    /// Clockwise closed rectangle
    pub fn add_rect(&mut self, rect: &Rect) {
        self.move_to(rect.left, rect.top);
        self.line_to(rect.right, rect.top);
        self.line_to(rect.right, rect.bottom);
        self.line_to(rect.left, rect.bottom);
        self.close();
    }

    /// Ellipse inscribed in `rect`, four cubic segments
    pub fn add_oval(&mut self, rect: &Rect) {
        let c = rect.center();
        let rx = rect.width() * 0.5;
        let ry = rect.height() * 0.5;
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;

        self.move_to(rect.right, c.y);
        self.cubic_to(rect.right, c.y + ky, c.x + kx, rect.bottom, c.x, rect.bottom);
        self.cubic_to(c.x - kx, rect.bottom, rect.left, c.y + ky, rect.left, c.y);
        self.cubic_to(rect.left, c.y - ky, c.x - kx, rect.top, c.x, rect.top);
        self.cubic_to(c.x + kx, rect.top, rect.right, c.y - ky, rect.right, c.y);
        self.close();
    }

    pub fn add_circle(&mut self, x: f32, y: f32, radius: f32) {
        self.add_oval(&Rect::new(x - radius, y - radius, x + radius, y + radius));
    }

    /// Rectangle with elliptical corners. Radii are clamped to half the size.
    pub fn add_round_rect(&mut self, rect: &Rect, rx: f32, ry: f32) {
        let rx = rx.clamp(0.0, rect.width() * 0.5);
        let ry = ry.clamp(0.0, rect.height() * 0.5);
        if rx == 0.0 || ry == 0.0 {
            self.add_rect(rect);
            return;
        }
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;
        let Rect {
            left: l,
            top: t,
            right: r,
            bottom: b,
        } = *rect;

        self.move_to(l + rx, t);
        self.line_to(r - rx, t);
        self.cubic_to(r - rx + kx, t, r, t + ry - ky, r, t + ry);
        self.line_to(r, b - ry);
        self.cubic_to(r, b - ry + ky, r - rx + kx, b, r - rx, b);
        self.line_to(l + rx, b);
        self.cubic_to(l + rx - kx, b, l, b - ry + ky, l, b - ry);
        self.line_to(l, t + ry);
        self.cubic_to(l, t + ry - ky, l + rx - kx, t, l + rx, t);
        self.close();
    }

    /// Elliptical arc on the oval bounded by `oval`. Angles are in degrees,
    /// clockwise from the positive x axis. The arc starts a new contour.
    pub fn add_arc(&mut self, oval: &Rect, start_angle: f32, sweep_angle: f32) {
        let c = oval.center();
        let rx = oval.width() * 0.5;
        let ry = oval.height() * 0.5;
        let point_at = |angle: f32| {
            let (s, co) = angle.sin_cos();
            Point::new(c.x + rx * co, c.y + ry * s)
        };

        let start = start_angle.to_radians();
        let sweep = sweep_angle.clamp(-360.0, 360.0).to_radians();
        let first = point_at(start);
        self.move_to(first.x, first.y);
        if sweep == 0.0 {
            return;
        }

        let segments = (sweep.abs() / std::f32::consts::FRAC_PI_2).ceil().max(1.0) as usize;
        let step = sweep / segments as f32;
        let k = 4.0 / 3.0 * (step / 4.0).tan();
        let mut angle = start;
        for _ in 0..segments {
            let next = angle + step;
            let (s0, c0) = angle.sin_cos();
            let (s1, c1) = next.sin_cos();
            let end = point_at(next);
            self.cubic_to(
                c.x + rx * (c0 - k * s0),
                c.y + ry * (s0 + k * c0),
                c.x + rx * (c1 + k * s1),
                c.y + ry * (s1 - k * c1),
                end.x,
                end.y,
            );
            angle = next;
        }
    }

    /// Bounds of every point and control point
    pub fn bounds(&self) -> Rect {
        let mut bounds = Rect::inverted();
        let mut any = false;
        for cmd in &self.commands {
            let mut cover = |p: &Point| {
                bounds.expand_to_cover(p.x, p.y);
                any = true;
            };
            match cmd {
                PathCommand::MoveTo(p) | PathCommand::LineTo(p) => cover(p),
                PathCommand::QuadTo { control, end } => {
                    cover(control);
                    cover(end);
                }
                PathCommand::CubicTo {
                    control1,
                    control2,
                    end,
                } => {
                    cover(control1);
                    cover(control2);
                    cover(end);
                }
                PathCommand::Close => {}
            }
        }
        if any {
            bounds
        } else {
            Rect::EMPTY
        }
    }

    /// Copy of this path with every point mapped through `matrix`
    pub fn transformed(&self, matrix: &Matrix4) -> Path {
        let map = |p: &Point| matrix.map_point(p.x, p.y);
        let commands = self
            .commands
            .iter()
            .map(|cmd| match cmd {
                PathCommand::MoveTo(p) => PathCommand::MoveTo(map(p)),
                PathCommand::LineTo(p) => PathCommand::LineTo(map(p)),
                PathCommand::QuadTo { control, end } => PathCommand::QuadTo {
                    control: map(control),
                    end: map(end),
                },
                PathCommand::CubicTo {
                    control1,
                    control2,
                    end,
                } => PathCommand::CubicTo {
                    control1: map(control1),
                    control2: map(control2),
                    end: map(end),
                },
                PathCommand::Close => PathCommand::Close,
            })
            .collect();
        Path {
            commands,
            fill_type: self.fill_type,
        }
    }

    /// The rectangle this path describes, when it is a single closed
    /// axis-aligned rectangle
    pub fn as_rect(&self) -> Option<Rect> {
        let mut points: SmallVec<[Point; 5]> = SmallVec::new();
        for (i, cmd) in self.commands.iter().enumerate() {
            match (i, cmd) {
                (0, PathCommand::MoveTo(p)) => points.push(*p),
                (1..=4, PathCommand::LineTo(p)) => points.push(*p),
                (_, PathCommand::Close) if i == self.commands.len() - 1 => {}
                _ => return None,
            }
        }
        if points.len() == 5 && points[4] == points[0] {
            points.pop();
        }
        if points.len() != 4 {
            return None;
        }
        let bounds = Rect::from_points(points[0], points[2]);
        let axis_aligned = points.iter().all(|p| {
            (p.x == bounds.left || p.x == bounds.right) && (p.y == bounds.top || p.y == bounds.bottom)
        });
        let distinct_corners = points[0] != points[1] && points[1] != points[2];
        (axis_aligned && distinct_corners && !bounds.is_empty()).then_some(bounds)
    }
}

/// Builder for constructing paths
pub struct PathBuilder {
    path: Path,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self { path: Path::new() }
    }

    pub fn fill_type(mut self, fill_type: FillType) -> Self {
        self.path.fill_type = fill_type;
        self
    }

    pub fn move_to(mut self, x: f32, y: f32) -> Self {
        self.path.move_to(x, y);
        self
    }

    pub fn line_to(mut self, x: f32, y: f32) -> Self {
        self.path.line_to(x, y);
        self
    }

    pub fn quad_to(mut self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        self.path.quad_to(cx, cy, x, y);
        self
    }

    pub fn cubic_to(mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) -> Self {
        self.path.cubic_to(c1x, c1y, c2x, c2y, x, y);
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.path.add_rect(&rect);
        self
    }

    pub fn oval(mut self, rect: Rect) -> Self {
        self.path.add_oval(&rect);
        self
    }

    pub fn close(mut self) -> Self {
        self.path.close();
        self
    }

    pub fn build(self) -> Path {
        self.path
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oval_bounds_match_rect() {
        let mut path = Path::new();
        path.add_oval(&Rect::new(10.0, 20.0, 50.0, 40.0));
        assert_eq!(path.bounds(), Rect::new(10.0, 20.0, 50.0, 40.0));
    }

    #[test]
    fn test_arc_quarter_is_one_cubic() {
        let mut path = Path::new();
        path.add_arc(&Rect::new(-1.0, -1.0, 1.0, 1.0), 0.0, 90.0);
        assert_eq!(path.commands().len(), 2);
        match path.commands()[1] {
            PathCommand::CubicTo { end, .. } => {
                assert!(end.x.abs() < 1e-6);
                assert!((end.y - 1.0).abs() < 1e-6);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_as_rect_detects_rectangles_only() {
        let rect_path = PathBuilder::new()
            .rect(Rect::new(1.0, 2.0, 3.0, 4.0))
            .build();
        assert_eq!(rect_path.as_rect(), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));

        let tri = PathBuilder::new()
            .move_to(0.0, 0.0)
            .line_to(10.0, 0.0)
            .line_to(0.0, 10.0)
            .close()
            .build();
        assert_eq!(tri.as_rect(), None);
    }

    #[test]
    fn test_transformed_maps_points() {
        let path = PathBuilder::new().move_to(1.0, 1.0).line_to(2.0, 3.0).build();
        let moved = path.transformed(&Matrix4::from_translate(10.0, 0.0));
        assert_eq!(moved.bounds(), Rect::new(11.0, 1.0, 12.0, 3.0));
    }
}
