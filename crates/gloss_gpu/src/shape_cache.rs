//! Shape textures
//!
//! Paths and the shapes that cannot be tessellated into a convex outline are
//! rasterized once into alpha textures and drawn as textured quads. Entries
//! are keyed by geometry and stroke parameters, never by position, and kept
//! under a byte budget.

use gloss_paint::{FillType, Paint, PaintStyle, Path, PathCommand, PathEffect, Rect};
use lru::LruCache;

use crate::device::{GpuDevice, TextureFormat};
use crate::state::StateCache;
use crate::tessellator;
use crate::texture::{upload_pixels, Texture};

/// An alpha texture holding a rasterized shape
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathTexture {
    pub texture: Texture,
    /// Local position of the shape bounds
    pub left: f32,
    pub top: f32,
    /// Padding around the bounds on every side
    pub offset: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ShapeKind {
    Path(Vec<u32>),
    RoundRect { width: u32, height: u32, rx: u32, ry: u32 },
    Circle { radius: u32 },
    Oval { width: u32, height: u32 },
    Arc { width: u32, height: u32, start: u32, sweep: u32, use_center: bool },
    Rect { width: u32, height: u32 },
}

/// Geometry plus every paint attribute that changes coverage
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ShapeKey {
    kind: ShapeKind,
    style: u8,
    stroke_width: u32,
    join: u8,
    cap: u8,
    miter: u32,
    dash: Vec<u32>,
}

impl ShapeKey {
    fn new(kind: ShapeKind, paint: &Paint) -> Self {
        let dash = match &paint.path_effect {
            Some(PathEffect::Dash { intervals, phase }) => intervals
                .iter()
                .chain(std::iter::once(phase))
                .map(|v| v.to_bits())
                .collect(),
            None => Vec::new(),
        };
        Self {
            kind,
            style: paint.style as u8,
            stroke_width: paint.stroke_width.to_bits(),
            join: paint.stroke_join as u8,
            cap: paint.stroke_cap as u8,
            miter: paint.stroke_miter.to_bits(),
            dash,
        }
    }
}

fn path_key(path: &Path) -> Vec<u32> {
    let mut key = vec![match path.fill_type() {
        FillType::Winding => 0,
        FillType::EvenOdd => 1,
    }];
    for cmd in path.commands() {
        match cmd {
            PathCommand::MoveTo(p) => key.extend([2, p.x.to_bits(), p.y.to_bits()]),
            PathCommand::LineTo(p) => key.extend([3, p.x.to_bits(), p.y.to_bits()]),
            PathCommand::QuadTo { control, end } => key.extend([
                4,
                control.x.to_bits(),
                control.y.to_bits(),
                end.x.to_bits(),
                end.y.to_bits(),
            ]),
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => key.extend([
                5,
                control1.x.to_bits(),
                control1.y.to_bits(),
                control2.x.to_bits(),
                control2.y.to_bits(),
                end.x.to_bits(),
                end.y.to_bits(),
            ]),
            PathCommand::Close => key.push(6),
        }
    }
    key
}

/// Padding that leaves room for the stroke and anti-aliasing
pub fn texture_offset(paint: &Paint) -> f32 {
    (paint.stroke_width.max(1.0) * 1.5 + 0.5).floor()
}

/// Closed arc path inside `oval`, through the center when `use_center`
pub fn arc_path(oval: &Rect, start: f32, sweep: f32, use_center: bool) -> Path {
    let mut arc = Path::new();
    arc.add_arc(oval, start, sweep);
    if !use_center {
        return arc;
    }

    let center = oval.center();
    let mut path = Path::new();
    path.move_to(center.x, center.y);
    for cmd in arc.commands() {
        match *cmd {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => path.line_to(p.x, p.y),
            PathCommand::QuadTo { control, end } => path.quad_to(control.x, control.y, end.x, end.y),
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => path.cubic_to(control1.x, control1.y, control2.x, control2.y, end.x, end.y),
            PathCommand::Close => {}
        }
    }
    path.close();
    path
}

/// Shape textures bounded by bytes
pub struct ShapeCache {
    entries: LruCache<ShapeKey, PathTexture>,
    size: usize,
    max_size: usize,
}

impl ShapeCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size: 0,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_path<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        path: &Path,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let key = ShapeKey::new(ShapeKind::Path(path_key(path)), paint);
        self.get(device, state, key, paint, || path.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_round_rect<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        width: f32,
        height: f32,
        rx: f32,
        ry: f32,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let kind = ShapeKind::RoundRect {
            width: width.to_bits(),
            height: height.to_bits(),
            rx: rx.to_bits(),
            ry: ry.to_bits(),
        };
        self.get(device, state, ShapeKey::new(kind, paint), paint, || {
            let mut path = Path::new();
            path.add_round_rect(&Rect::new(0.0, 0.0, width, height), rx, ry);
            path
        })
    }

    pub fn get_circle<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        radius: f32,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let kind = ShapeKind::Circle {
            radius: radius.to_bits(),
        };
        self.get(device, state, ShapeKey::new(kind, paint), paint, || {
            let mut path = Path::new();
            path.add_circle(radius, radius, radius);
            path
        })
    }

    pub fn get_oval<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        width: f32,
        height: f32,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let kind = ShapeKind::Oval {
            width: width.to_bits(),
            height: height.to_bits(),
        };
        self.get(device, state, ShapeKey::new(kind, paint), paint, || {
            let mut path = Path::new();
            path.add_oval(&Rect::new(0.0, 0.0, width, height));
            path
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_arc<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        width: f32,
        height: f32,
        start: f32,
        sweep: f32,
        use_center: bool,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let kind = ShapeKind::Arc {
            width: width.to_bits(),
            height: height.to_bits(),
            start: start.to_bits(),
            sweep: sweep.to_bits(),
            use_center,
        };
        self.get(device, state, ShapeKey::new(kind, paint), paint, || {
            arc_path(&Rect::new(0.0, 0.0, width, height), start, sweep, use_center)
        })
    }

    pub fn get_rect<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        width: f32,
        height: f32,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let kind = ShapeKind::Rect {
            width: width.to_bits(),
            height: height.to_bits(),
        };
        self.get(device, state, ShapeKey::new(kind, paint), paint, || {
            let mut path = Path::new();
            path.add_rect(&Rect::new(0.0, 0.0, width, height));
            path
        })
    }

    fn get<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        state: &mut StateCache,
        key: ShapeKey,
        paint: &Paint,
        build: impl FnOnce() -> Path,
    ) -> Option<PathTexture> {
        if let Some(entry) = self.entries.get(&key) {
            return Some(*entry);
        }

        let path = build();
        let mut entry = Self::rasterize(device, state, &path, paint)?;
        let bytes = entry.texture.byte_size();
        if bytes >= self.max_size {
            entry.texture.cleanup = true;
            return Some(entry);
        }
        while self.size + bytes > self.max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.size -= evicted.texture.byte_size();
                    evicted.texture.release(device, state);
                }
                None => break,
            }
        }
        self.size += bytes;
        self.entries.put(key, entry);
        Some(entry)
    }

    fn rasterize<D: GpuDevice + ?Sized>(
        device: &mut D,
        state: &mut StateCache,
        path: &Path,
        paint: &Paint,
    ) -> Option<PathTexture> {
        let bounds = path.bounds();
        if bounds.is_empty() && paint.style == PaintStyle::Fill {
            return None;
        }
        let offset = texture_offset(paint);
        let width = (bounds.width() + offset * 2.0).ceil().max(1.0) as u32;
        let height = (bounds.height() + offset * 2.0).ceil().max(1.0) as u32;
        let max = device.limits().max_texture_size;
        if width > max || height > max {
            tracing::warn!(
                "shape too large to be rendered into a texture ({}x{}, max={})",
                width,
                height,
                max
            );
            return None;
        }

        let mask = tessellator::rasterize_path(
            path,
            paint,
            offset - bounds.left,
            offset - bounds.top,
            width,
            height,
        )?;
        let texture = upload_pixels(device, state, TextureFormat::Alpha, width, height, &mask.pixels)?;
        Some(PathTexture {
            texture,
            left: bounds.left,
            top: bounds.top,
            offset,
        })
    }

    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D, state: &mut StateCache) {
        while let Some((_, entry)) = self.entries.pop_lru() {
            entry.texture.release(device, state);
        }
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::SoftwareDevice;
    use gloss_paint::Color;

    #[test]
    fn test_offset_covers_stroke() {
        assert_eq!(texture_offset(&Paint::fill(Color::RED)), 2.0);
        assert_eq!(texture_offset(&Paint::stroke(Color::RED, 4.0)), 6.0);
    }

    #[test]
    fn test_circle_hit_reuses_texture() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut cache = ShapeCache::new(1024 * 1024);
        let paint = Paint::fill(Color::RED);

        let a = cache.get_circle(&mut device, &mut state, 10.0, &paint).unwrap();
        let b = cache.get_circle(&mut device, &mut state, 10.0, &paint).unwrap();
        assert_eq!(a.texture.id, b.texture.id);
        assert_eq!((a.texture.width, a.texture.height), (24, 24));
        assert_eq!(cache.len(), 1);

        // A different stroke is a different texture
        let stroked = Paint::stroke(Color::RED, 2.0);
        let c = cache.get_circle(&mut device, &mut state, 10.0, &stroked).unwrap();
        assert_ne!(a.texture.id, c.texture.id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_path_texture_keeps_bounds_origin() {
        let mut device = SoftwareDevice::new(16, 16);
        let mut state = StateCache::new();
        let mut cache = ShapeCache::new(1024 * 1024);
        let mut path = Path::new();
        path.add_rect(&Rect::new(30.0, 40.0, 50.0, 45.0));

        let entry = cache
            .get_path(&mut device, &mut state, &path, &Paint::fill(Color::BLACK))
            .unwrap();
        assert_eq!((entry.left, entry.top), (30.0, 40.0));
        assert_eq!((entry.texture.width, entry.texture.height), (24, 9));
    }

    #[test]
    fn test_use_center_arc_is_closed_wedge() {
        let path = arc_path(&Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, 90.0, true);
        assert!(matches!(path.commands()[0], PathCommand::MoveTo(p) if p.x == 5.0 && p.y == 5.0));
        assert!(matches!(path.commands().last(), Some(PathCommand::Close)));
    }
}
