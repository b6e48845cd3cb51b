//! Geometry generation
//!
//! Convex shapes and line segments become indexed triangle meshes in local
//! coordinates. Anti-aliased meshes carry a coverage ramp one device pixel
//! wide centered on each edge; the ramp width is derived from the scale of
//! the current transform so it stays one pixel under zoom.
//!
//! Everything that is not a convex outline (self-intersecting fills, dashes,
//! round or bevel joins) goes through lyon into an alpha coverage mask, and
//! clip paths are scan converted into pixel regions.

use gloss_paint::{
    FillType, IRect, Matrix4, Paint, PaintStyle, Path, PathCommand, PathEffect, Point, Rect,
    Region, RegionOp, StrokeCap, StrokeJoin,
};
use lyon::math::point;
use lyon::path::iterator::PathIterator;
use lyon::path::{Path as LyonPath, PathEvent};
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, LineCap, LineJoin,
    StrokeOptions, StrokeTessellator, StrokeVertex, VertexBuffers,
};

use crate::vertex::{AlphaVertex, Vertex};

/// Flattening tolerance in device pixels
const TOLERANCE: f32 = 0.25;

/// Half the width of the anti-aliasing ramp, in device pixels
const AA_HALF_WIDTH: f32 = 0.5;

/// Vertex storage of a [`VertexBuffer`]
#[derive(Clone, Debug, PartialEq)]
pub enum Vertices {
    Plain(Vec<Vertex>),
    /// Carries per-vertex coverage
    Alpha(Vec<AlphaVertex>),
}

impl Default for Vertices {
    fn default() -> Self {
        Vertices::Plain(Vec::new())
    }
}

impl Vertices {
    pub fn len(&self) -> usize {
        match self {
            Vertices::Plain(v) => v.len(),
            Vertices::Alpha(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_alpha(&self) -> bool {
        matches!(self, Vertices::Alpha(_))
    }
}

/// Triangle list produced by the tessellator
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexBuffer {
    pub vertices: Vertices,
    pub indices: Vec<u16>,
    /// Local bounds of every vertex
    pub bounds: Rect,
}

impl VertexBuffer {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A flattened sub-path
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contour {
    pub points: Vec<Point>,
    pub closed: bool,
}

/// Convert to a lyon path. A line after a close starts from the last move.
pub fn to_lyon(path: &Path) -> LyonPath {
    let mut builder = LyonPath::builder();
    let mut open = false;
    let mut start = Point::ZERO;
    for cmd in path.commands() {
        match *cmd {
            PathCommand::MoveTo(p) => {
                if open {
                    builder.end(false);
                }
                builder.begin(point(p.x, p.y));
                start = p;
                open = true;
            }
            PathCommand::LineTo(p) => {
                if !open {
                    builder.begin(point(start.x, start.y));
                    open = true;
                }
                builder.line_to(point(p.x, p.y));
            }
            PathCommand::QuadTo { control, end } => {
                if !open {
                    builder.begin(point(start.x, start.y));
                    open = true;
                }
                builder.quadratic_bezier_to(point(control.x, control.y), point(end.x, end.y));
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => {
                if !open {
                    builder.begin(point(start.x, start.y));
                    open = true;
                }
                builder.cubic_bezier_to(
                    point(control1.x, control1.y),
                    point(control2.x, control2.y),
                    point(end.x, end.y),
                );
            }
            PathCommand::Close => {
                if open {
                    builder.end(true);
                    open = false;
                }
            }
        }
    }
    if open {
        builder.end(false);
    }
    builder.build()
}

/// Flatten `path` into polylines within `tolerance` local units
pub fn flatten(path: &Path, tolerance: f32) -> Vec<Contour> {
    let lyon_path = to_lyon(path);
    let mut contours = Vec::new();
    let mut current = Contour::default();
    for event in lyon_path.iter().flattened(tolerance.max(1e-3)) {
        match event {
            PathEvent::Begin { at } => {
                current = Contour {
                    points: vec![Point::new(at.x, at.y)],
                    closed: false,
                };
            }
            PathEvent::Line { to, .. } => {
                let p = Point::new(to.x, to.y);
                if current.points.last() != Some(&p) {
                    current.points.push(p);
                }
            }
            PathEvent::End { close, .. } => {
                current.closed = close;
                if current.points.len() > 1 && current.points.first() == current.points.last() {
                    current.points.pop();
                    current.closed = true;
                }
                contours.push(std::mem::take(&mut current));
            }
            PathEvent::Quadratic { .. } | PathEvent::Cubic { .. } => {}
        }
    }
    contours
}

/// Local flattening tolerance that lands within [`TOLERANCE`] device pixels
fn local_tolerance(transform: &Matrix4) -> f32 {
    let (sx, sy) = transform.scale_factors();
    TOLERANCE / sx.max(sy).max(1e-3)
}

/// Average of the transform's axis scales, never zero
fn average_scale(transform: &Matrix4) -> (f32, f32) {
    let (sx, sy) = transform.scale_factors();
    (sx.max(1e-3), sy.max(1e-3))
}

fn sub(a: Point, b: Point) -> Point {
    Point::new(a.x - b.x, a.y - b.y)
}

fn normalize(p: Point) -> Point {
    let len = (p.x * p.x + p.y * p.y).sqrt();
    if len > 0.0 {
        Point::new(p.x / len, p.y / len)
    } else {
        Point::ZERO
    }
}

fn signed_area(points: &[Point]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f32>()
        * 0.5
}

/// Per-vertex offset directions of a polyline
///
/// Each entry is the miter vector whose projection on both adjacent edge
/// normals is 1, so moving a vertex by `d * miter` moves both edges by `d`.
/// Directions point outward for closed contours and to the left of the
/// travel direction for open ones.
fn miters(points: &[Point], closed: bool, outward_sign: f32) -> Vec<Point> {
    let n = points.len();
    let edge_normal = |i: usize| {
        let d = normalize(sub(points[(i + 1) % n], points[i]));
        Point::new(d.y * outward_sign, -d.x * outward_sign)
    };
    (0..n)
        .map(|i| {
            let prev = if i > 0 {
                Some(edge_normal(i - 1))
            } else if closed {
                Some(edge_normal(n - 1))
            } else {
                None
            };
            let next = if i + 1 < n || closed { Some(edge_normal(i)) } else { None };
            match (prev, next) {
                (Some(a), Some(b)) => {
                    let dot = a.x * b.x + a.y * b.y;
                    if dot <= -0.999 {
                        a
                    } else {
                        let k = 1.0 / (1.0 + dot);
                        Point::new((a.x + b.x) * k, (a.y + b.y) * k)
                    }
                }
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => Point::ZERO,
            }
        })
        .collect()
}

/// Miters measured in device pixels, expressed back in local units
fn pixel_miters(points: &[Point], closed: bool, outward_sign: f32, scale: (f32, f32)) -> Vec<Point> {
    let scaled: Vec<Point> = points
        .iter()
        .map(|p| Point::new(p.x * scale.0, p.y * scale.1))
        .collect();
    miters(&scaled, closed, outward_sign)
        .into_iter()
        .map(|m| Point::new(m.x / scale.0, m.y / scale.1))
        .collect()
}

/// One offset copy of a polyline
#[derive(Clone, Copy)]
struct Ring {
    local: f32,
    pixels: f32,
    alpha: f32,
}

/// Rings of offset vertices plus optional fan over the first ring
struct RingMesh<'a> {
    points: &'a [Point],
    local_miters: Vec<Point>,
    pixel_miters: Vec<Point>,
    closed: bool,
}

impl RingMesh<'_> {
    fn build(&self, rings: &[Ring], fan: bool, aa: bool) -> VertexBuffer {
        let n = self.points.len();
        let total = n * rings.len();
        if n == 0 || total > u16::MAX as usize {
            if total > u16::MAX as usize {
                tracing::warn!("tessellation skipped, {} vertices exceed the index range", total);
            }
            return VertexBuffer::default();
        }

        let mut bounds = Rect::inverted();
        let mut plain = Vec::new();
        let mut alpha = Vec::new();
        for ring in rings {
            for i in 0..n {
                let (p, ml, mp) = (self.points[i], self.local_miters[i], self.pixel_miters[i]);
                let x = p.x + ml.x * ring.local + mp.x * ring.pixels;
                let y = p.y + ml.y * ring.local + mp.y * ring.pixels;
                bounds.expand_to_cover(x, y);
                if aa {
                    alpha.push(AlphaVertex::new(x, y, ring.alpha));
                } else {
                    plain.push(Vertex::new(x, y));
                }
            }
        }

        let mut indices = Vec::new();
        if fan {
            for i in 1..n.saturating_sub(1) {
                indices.extend_from_slice(&[0, i as u16, (i + 1) as u16]);
            }
        }
        let edges = if self.closed { n } else { n.saturating_sub(1) };
        for r in 0..rings.len().saturating_sub(1) {
            let (a, b) = (r * n, (r + 1) * n);
            for i in 0..edges {
                let j = (i + 1) % n;
                let (a0, a1, b0, b1) = ((a + i) as u16, (a + j) as u16, (b + i) as u16, (b + j) as u16);
                indices.extend_from_slice(&[a0, a1, b0, b0, a1, b1]);
            }
        }

        VertexBuffer {
            vertices: if aa {
                Vertices::Alpha(alpha)
            } else {
                Vertices::Plain(plain)
            },
            indices,
            bounds,
        }
    }
}

fn ring_mesh(points: &[Point], closed: bool, scale: (f32, f32)) -> RingMesh<'_> {
    let sign = if closed && signed_area(points) < 0.0 { -1.0 } else { 1.0 };
    RingMesh {
        points,
        local_miters: miters(points, closed, sign),
        pixel_miters: pixel_miters(points, closed, sign, scale),
        closed,
    }
}

/// Fill a convex polygon
pub fn fill_polygon(points: &[Point], anti_alias: bool, transform: &Matrix4) -> VertexBuffer {
    if points.len() < 3 {
        return VertexBuffer::default();
    }
    let mesh = ring_mesh(points, true, average_scale(transform));
    if anti_alias {
        let rings = [
            Ring { local: 0.0, pixels: -AA_HALF_WIDTH, alpha: 1.0 },
            Ring { local: 0.0, pixels: AA_HALF_WIDTH, alpha: 0.0 },
        ];
        mesh.build(&rings, true, true)
    } else {
        mesh.build(&[Ring { local: 0.0, pixels: 0.0, alpha: 1.0 }], true, false)
    }
}

/// Stroke a polyline with miter joins and butt ends. A zero `width` is a
/// one pixel hairline.
pub fn stroke_polyline(
    points: &[Point],
    closed: bool,
    width: f32,
    anti_alias: bool,
    transform: &Matrix4,
) -> VertexBuffer {
    if points.len() < 2 {
        return VertexBuffer::default();
    }
    let scale = average_scale(transform);
    let mesh = ring_mesh(points, closed, scale);

    let hairline = width <= 0.0;
    let (half, half_px, extra) = if hairline {
        (0.0, AA_HALF_WIDTH, AA_HALF_WIDTH)
    } else {
        (width * 0.5, width * 0.5 * (scale.0 + scale.1) * 0.5, 0.0)
    };

    if !anti_alias {
        let rings = [
            Ring { local: half, pixels: extra, alpha: 1.0 },
            Ring { local: -half, pixels: -extra, alpha: 1.0 },
        ];
        return mesh.build(&rings, false, false);
    }

    let outer = Ring { local: half, pixels: extra + AA_HALF_WIDTH, alpha: 0.0 };
    let inner = if half_px > AA_HALF_WIDTH {
        Ring { local: half, pixels: extra - AA_HALF_WIDTH, alpha: 1.0 }
    } else {
        Ring { local: 0.0, pixels: 0.0, alpha: (half_px / AA_HALF_WIDTH).min(1.0) }
    };
    let rings = [
        outer,
        inner,
        Ring { local: -inner.local, pixels: -inner.pixels, alpha: inner.alpha },
        Ring { local: -outer.local, pixels: -outer.pixels, alpha: 0.0 },
    ];
    mesh.build(&rings, false, true)
}

/// Tessellate a convex path. Stroke-and-fill is treated as a fill; callers
/// outset the geometry by half the stroke width beforehand.
pub fn tessellate_convex_path(path: &Path, paint: &Paint, transform: &Matrix4) -> VertexBuffer {
    let contours = flatten(path, local_tolerance(transform));
    let Some(contour) = contours.into_iter().find(|c| c.points.len() >= 2) else {
        return VertexBuffer::default();
    };
    let aa = paint.is_anti_alias();
    match paint.style {
        PaintStyle::Stroke => {
            stroke_polyline(&contour.points, contour.closed, paint.stroke_width, aa, transform)
        }
        PaintStyle::Fill | PaintStyle::StrokeAndFill => fill_polygon(&contour.points, aa, transform),
    }
}

/// Outset `bounds` by half the stroke width (or the anti-aliasing ramp)
pub fn expand_bounds_for_stroke(bounds: &mut Rect, paint: &Paint, force_expand: bool) {
    let mut outset = if paint.style == PaintStyle::Fill {
        0.0
    } else {
        paint.stroke_width * 0.5
    };
    if force_expand || paint.is_anti_alias() || paint.stroke_width == 0.0 {
        outset += 1.0;
    }
    bounds.outset(outset);
}

/// Tessellate independent line segments `[x0, y0, x1, y1, ...]`. Trailing
/// values that do not form a full segment are ignored.
pub fn tessellate_lines(points: &[f32], paint: &Paint, transform: &Matrix4) -> VertexBuffer {
    let scale = average_scale(transform);
    let aa = paint.is_anti_alias();
    let hairline = paint.stroke_width <= 0.0;
    let half = paint.stroke_width * 0.5;

    let mut out = VertexBuffer {
        vertices: if aa {
            Vertices::Alpha(Vec::new())
        } else {
            Vertices::Plain(Vec::new())
        },
        indices: Vec::new(),
        bounds: Rect::inverted(),
    };

    for seg in points.chunks_exact(4) {
        let (p0, p1) = (Point::new(seg[0], seg[1]), Point::new(seg[2], seg[3]));
        let dir = normalize(sub(p1, p0));
        if dir == Point::ZERO {
            continue;
        }
        // Offset perpendicular to the segment, in local units
        let (nx, ny) = if hairline {
            let d = normalize(Point::new(dir.x * scale.0, dir.y * scale.1));
            (d.y * AA_HALF_WIDTH / scale.0, -d.x * AA_HALF_WIDTH / scale.1)
        } else {
            (dir.y * half, -dir.x * half)
        };
        let (mut a, mut b) = (p0, p1);
        if paint.stroke_cap == StrokeCap::Square && !hairline {
            a = Point::new(a.x - dir.x * half, a.y - dir.y * half);
            b = Point::new(b.x + dir.x * half, b.y + dir.y * half);
        }
        let quad = [
            Point::new(a.x + nx, a.y + ny),
            Point::new(b.x + nx, b.y + ny),
            Point::new(b.x - nx, b.y - ny),
            Point::new(a.x - nx, a.y - ny),
        ];
        let piece = fill_polygon(&quad, aa, transform);
        append(&mut out, piece);
    }

    if out.indices.is_empty() {
        out.bounds = Rect::EMPTY;
    }
    out
}

fn append(out: &mut VertexBuffer, piece: VertexBuffer) {
    let base = out.vertices.len();
    if base + piece.vertices.len() > u16::MAX as usize {
        tracing::warn!("line batch truncated, vertex count exceeds the index range");
        return;
    }
    match (&mut out.vertices, piece.vertices) {
        (Vertices::Plain(dst), Vertices::Plain(src)) => dst.extend(src),
        (Vertices::Alpha(dst), Vertices::Alpha(src)) => dst.extend(src),
        _ => return,
    }
    out.indices
        .extend(piece.indices.iter().map(|i| i + base as u16));
    out.bounds.union_with(&piece.bounds);
}

/// Scan convert a device space path into the pixels whose centers it
/// covers, restricted to `clip`
pub fn path_to_region(path: &Path, clip: &Region) -> Region {
    let bounds = clip.bounds();
    if bounds.is_empty() {
        return Region::new();
    }
    let contours = flatten(path, TOLERANCE);
    let mut edges: Vec<(Point, Point)> = Vec::new();
    for contour in &contours {
        let n = contour.points.len();
        if n < 2 {
            continue;
        }
        // Regions fill every contour as if closed
        for i in 0..n {
            edges.push((contour.points[i], contour.points[(i + 1) % n]));
        }
    }
    let even_odd = path.fill_type() == FillType::EvenOdd;

    let mut runs = Vec::new();
    let mut crossings: Vec<(f32, i32)> = Vec::new();
    for y in bounds.top..bounds.bottom {
        let sample = y as f32 + 0.5;
        crossings.clear();
        for (a, b) in &edges {
            if (a.y <= sample && b.y > sample) || (b.y <= sample && a.y > sample) {
                let t = (sample - a.y) / (b.y - a.y);
                let x = a.x + t * (b.x - a.x);
                crossings.push((x, if b.y > a.y { 1 } else { -1 }));
            }
        }
        crossings.sort_by(|l, r| l.0.total_cmp(&r.0));

        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            let inside = if even_odd { winding % 2 != 0 } else { winding != 0 };
            if inside {
                let x0 = (pair[0].0 - 0.5).ceil() as i32;
                let x1 = (pair[1].0 - 0.5).ceil() as i32;
                runs.push((y, x0.max(bounds.left), x1.min(bounds.right)));
            }
        }
    }

    let mut region = Region::from_runs(&runs);
    region.op(clip, RegionOp::Intersect);
    region
}

/// Single channel coverage image
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlphaMask {
    pub width: u32,
    pub height: u32,
    /// Row major, top row first
    pub pixels: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Set every pixel of `rect` to full coverage
    pub fn fill_rect(&mut self, rect: IRect) {
        let (w, h) = (self.width as i32, self.height as i32);
        for y in rect.top.max(0)..rect.bottom.min(h) {
            for x in rect.left.max(0)..rect.right.min(w) {
                self.pixels[(y * w + x) as usize] = 255;
            }
        }
    }
}

/// Supersampling grid per pixel side
const SUBSAMPLES: usize = 4;

/// Rasterize a triangle soup with 4x4 supersampling. Overlapping triangles
/// do not accumulate coverage.
pub fn rasterize_triangles(width: u32, height: u32, vertices: &[[f32; 2]], indices: &[u32]) -> AlphaMask {
    let mut samples = vec![0u16; width as usize * height as usize];
    let edge = |a: [f32; 2], b: [f32; 2], x: f32, y: f32| (b[0] - a[0]) * (y - a[1]) - (b[1] - a[1]) * (x - a[0]);

    for tri in indices.chunks_exact(3) {
        let (Some(&a), Some(&b), Some(&c)) = (
            vertices.get(tri[0] as usize),
            vertices.get(tri[1] as usize),
            vertices.get(tri[2] as usize),
        ) else {
            continue;
        };
        let area = edge(a, b, c[0], c[1]);
        if area == 0.0 {
            continue;
        }
        let x0 = a[0].min(b[0]).min(c[0]).floor().max(0.0) as u32;
        let y0 = a[1].min(b[1]).min(c[1]).floor().max(0.0) as u32;
        let x1 = (a[0].max(b[0]).max(c[0]).ceil().max(0.0) as u32).min(width);
        let y1 = (a[1].max(b[1]).max(c[1]).ceil().max(0.0) as u32).min(height);
        for py in y0..y1 {
            for px in x0..x1 {
                let mut bits = 0u16;
                for s in 0..SUBSAMPLES * SUBSAMPLES {
                    let sx = px as f32 + ((s % SUBSAMPLES) as f32 + 0.5) / SUBSAMPLES as f32;
                    let sy = py as f32 + ((s / SUBSAMPLES) as f32 + 0.5) / SUBSAMPLES as f32;
                    let w0 = edge(b, c, sx, sy) * area;
                    let w1 = edge(c, a, sx, sy) * area;
                    let w2 = edge(a, b, sx, sy) * area;
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        bits |= 1 << s;
                    }
                }
                samples[(py * width + px) as usize] |= bits;
            }
        }
    }

    let total = (SUBSAMPLES * SUBSAMPLES) as u32;
    AlphaMask {
        width,
        height,
        pixels: samples
            .into_iter()
            .map(|bits| ((bits.count_ones() * 255 + total / 2) / total) as u8)
            .collect(),
    }
}

/// Split contours into dash segments
pub fn dash_contours(contours: &[Contour], intervals: &[f32], phase: f32) -> Vec<Contour> {
    let pattern: f32 = intervals.iter().sum();
    if intervals.len() < 2 || pattern <= 0.0 || intervals.iter().any(|i| *i < 0.0) {
        return contours.to_vec();
    }

    let mut out = Vec::new();
    for contour in contours {
        let mut pts = contour.points.clone();
        if contour.closed {
            if let Some(&first) = pts.first() {
                pts.push(first);
            }
        }

        // Position inside the pattern
        let mut index = 0;
        let mut remaining = intervals[0];
        let mut offset = phase.rem_euclid(pattern);
        while offset > 0.0 {
            if offset >= remaining {
                offset -= remaining;
                index = (index + 1) % intervals.len();
                remaining = intervals[index];
            } else {
                remaining -= offset;
                offset = 0.0;
            }
        }

        let mut current: Option<Vec<Point>> = if index % 2 == 0 { pts.first().map(|p| vec![*p]) } else { None };
        for pair in pts.windows(2) {
            let (mut a, b) = (pair[0], pair[1]);
            let mut len = a.distance(b);
            while len > 0.0 {
                let step = remaining.min(len);
                let t = step / len;
                let p = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
                if let Some(dash) = current.as_mut() {
                    dash.push(p);
                }
                len -= step;
                remaining -= step;
                a = p;
                if remaining <= 0.0 {
                    if let Some(dash) = current.take() {
                        if dash.len() > 1 {
                            out.push(Contour { points: dash, closed: false });
                        }
                    }
                    index = (index + 1) % intervals.len();
                    remaining = intervals[index];
                    if index % 2 == 0 {
                        current = Some(vec![a]);
                    }
                }
            }
        }
        if let Some(dash) = current {
            if dash.len() > 1 {
                out.push(Contour { points: dash, closed: false });
            }
        }
    }
    out
}

fn contours_to_lyon(contours: &[Contour]) -> LyonPath {
    let mut builder = LyonPath::builder();
    for contour in contours {
        let mut iter = contour.points.iter();
        let Some(first) = iter.next() else { continue };
        builder.begin(point(first.x, first.y));
        for p in iter {
            builder.line_to(point(p.x, p.y));
        }
        builder.end(contour.closed);
    }
    builder.build()
}

fn stroke_options(paint: &Paint) -> StrokeOptions {
    let join = match paint.stroke_join {
        StrokeJoin::Miter => LineJoin::Miter,
        StrokeJoin::Round => LineJoin::Round,
        StrokeJoin::Bevel => LineJoin::Bevel,
    };
    let cap = match paint.stroke_cap {
        StrokeCap::Butt => LineCap::Butt,
        StrokeCap::Round => LineCap::Round,
        StrokeCap::Square => LineCap::Square,
    };
    StrokeOptions::default()
        .with_line_width(paint.stroke_width.max(1.0))
        .with_line_join(join)
        .with_line_cap(cap)
        .with_miter_limit(paint.stroke_miter.max(StrokeOptions::MINIMUM_MITER_LIMIT))
        .with_tolerance(TOLERANCE)
}

/// Rasterize `path` as `paint` describes into a `width` x `height` mask,
/// after translating it by `(dx, dy)`
pub fn rasterize_path(path: &Path, paint: &Paint, dx: f32, dy: f32, width: u32, height: u32) -> Option<AlphaMask> {
    let moved = path.transformed(&Matrix4::from_translate(dx, dy));
    let mut buffers: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();

    if paint.style != PaintStyle::Stroke {
        let rule = match path.fill_type() {
            FillType::Winding => FillRule::NonZero,
            FillType::EvenOdd => FillRule::EvenOdd,
        };
        let options = FillOptions::default().with_fill_rule(rule).with_tolerance(TOLERANCE);
        let result = FillTessellator::new().tessellate_path(
            &to_lyon(&moved),
            &options,
            &mut BuffersBuilder::new(&mut buffers, |v: FillVertex| v.position().to_array()),
        );
        if let Err(err) = result {
            tracing::warn!("path fill tessellation failed: {:?}", err);
            return None;
        }
    }

    if paint.style != PaintStyle::Fill {
        let stroked = match &paint.path_effect {
            Some(PathEffect::Dash { intervals, phase }) => {
                contours_to_lyon(&dash_contours(&flatten(&moved, TOLERANCE), intervals, *phase))
            }
            None => to_lyon(&moved),
        };
        let result = StrokeTessellator::new().tessellate_path(
            &stroked,
            &stroke_options(paint),
            &mut BuffersBuilder::new(&mut buffers, |v: StrokeVertex| v.position().to_array()),
        );
        if let Err(err) = result {
            tracing::warn!("path stroke tessellation failed: {:?}", err);
            return None;
        }
    }

    Some(rasterize_triangles(width, height, &buffers.vertices, &buffers.indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gloss_paint::Color;

    fn square() -> Path {
        let mut path = Path::new();
        path.add_rect(&Rect::new(0.0, 0.0, 10.0, 10.0));
        path
    }

    #[test]
    fn test_flatten_rect_is_closed() {
        let contours = flatten(&square(), 0.25);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].closed);
        assert_eq!(contours[0].points.len(), 4);
    }

    #[test]
    fn test_fill_polygon_fan() {
        let vb = tessellate_convex_path(&square(), &Paint::fill(Color::RED), &Matrix4::IDENTITY);
        assert_eq!(vb.vertices.len(), 4);
        assert_eq!(vb.indices.len(), 6);
        assert_eq!(vb.bounds, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_aa_fill_fringe_is_one_pixel() {
        let paint = Paint::fill(Color::RED).with_anti_alias(true);
        let vb = tessellate_convex_path(&square(), &paint, &Matrix4::IDENTITY);
        assert!(vb.vertices.is_alpha());
        assert_eq!(vb.bounds, Rect::new(-0.5, -0.5, 10.5, 10.5));

        // Under a 2x scale the fringe is half as wide in local units
        let vb = tessellate_convex_path(&square(), &paint, &Matrix4::from_scale(2.0, 2.0));
        assert_eq!(vb.bounds, Rect::new(-0.25, -0.25, 10.25, 10.25));
    }

    #[test]
    fn test_stroke_ring_bounds() {
        let vb = tessellate_convex_path(&square(), &Paint::stroke(Color::RED, 4.0), &Matrix4::IDENTITY);
        assert_eq!(vb.bounds, Rect::new(-2.0, -2.0, 12.0, 12.0));
        // Two rings of four vertices joined by four quads
        assert_eq!(vb.vertices.len(), 8);
        assert_eq!(vb.indices.len(), 4 * 6);
    }

    #[test]
    fn test_lines_skip_partial_segment() {
        let paint = Paint::stroke(Color::BLACK, 2.0);
        let vb = tessellate_lines(&[0.0, 5.0, 10.0, 5.0, 3.0, 3.0], &paint, &Matrix4::IDENTITY);
        assert_eq!(vb.vertices.len(), 4);
        assert_eq!(vb.bounds, Rect::new(0.0, 4.0, 10.0, 6.0));
    }

    #[test]
    fn test_path_to_region_triangle() {
        let path = gloss_paint::PathBuilder::new()
            .move_to(0.0, 0.0)
            .line_to(8.0, 0.0)
            .line_to(0.0, 8.0)
            .close()
            .build();
        let clip = Region::from_rect(IRect::new(0, 0, 20, 20));
        let region = path_to_region(&path, &clip);
        assert_eq!(region.bounds(), IRect::new(0, 0, 7, 7));
        assert!(region.contains_point(0, 0));
        assert!(!region.contains_point(7, 7));
        assert!(region.is_complex());
    }

    #[test]
    fn test_rasterize_fill_square() {
        let mask = rasterize_path(&square(), &Paint::fill(Color::BLACK), 1.0, 1.0, 12, 12).unwrap();
        assert_eq!(mask.get(0, 0), 0);
        assert_eq!(mask.get(5, 5), 255);
        assert_eq!(mask.get(11, 11), 0);
    }

    #[test]
    fn test_dash_splits_line() {
        let contour = Contour {
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            closed: false,
        };
        let dashes = dash_contours(&[contour], &[2.0, 3.0], 0.0);
        assert_eq!(dashes.len(), 2);
        assert_eq!(dashes[0].points.first(), Some(&Point::new(0.0, 0.0)));
        assert_eq!(dashes[1].points.first(), Some(&Point::new(5.0, 0.0)));
    }
}
