//! Surfaces, sampling and scan conversion

use crate::device::{TextureFilter, TextureWrap};

/// Premultiplied RGBA pixels. Row 0 is the bottom row of a framebuffer and
/// the `v = 0` row of a texture.
#[derive(Clone, Debug, Default)]
pub(crate) struct Surface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: i32, y: i32) -> [f32; 4] {
        self.index(x, y).map_or([0.0; 4], |i| self.pixels[i])
    }

    /// Texel lookup at normalized coordinates
    pub fn sample(&self, s: f32, t: f32, filter: TextureFilter, wrap_s: TextureWrap, wrap_t: TextureWrap) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        let (w, h) = (self.width as i32, self.height as i32);
        let texel = |x: i32, y: i32| self.get(wrap(x, w, wrap_s), wrap(y, h, wrap_t));
        match filter {
            TextureFilter::Nearest => texel((s * w as f32).floor() as i32, (t * h as f32).floor() as i32),
            TextureFilter::Linear => {
                let fx = s * w as f32 - 0.5;
                let fy = t * h as f32 - 0.5;
                let (x0, y0) = (fx.floor(), fy.floor());
                let (ax, ay) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i32, y0 as i32);
                let top = mix(texel(x0, y0), texel(x0 + 1, y0), ax);
                let bottom = mix(texel(x0, y0 + 1), texel(x0 + 1, y0 + 1), ax);
                mix(top, bottom, ay)
            }
        }
    }
}

fn wrap(i: i32, n: i32, mode: TextureWrap) -> i32 {
    match mode {
        TextureWrap::Clamp => i.clamp(0, n - 1),
        TextureWrap::Repeat => i.rem_euclid(n),
        TextureWrap::Mirror => {
            let m = i.rem_euclid(2 * n);
            if m >= n {
                2 * n - 1 - m
            } else {
                m
            }
        }
    }
}

fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

/// Per-vertex attributes carried to the fragments
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Varyings {
    /// Untransformed vertex position, the shader stage input
    pub local: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub alpha: f32,
}

impl Varyings {
    fn scaled(&self, k: f32) -> Varyings {
        Varyings {
            local: self.local.map(|v| v * k),
            uv: self.uv.map(|v| v * k),
            color: self.color.map(|v| v * k),
            alpha: self.alpha * k,
        }
    }

    fn add(&self, other: &Varyings) -> Varyings {
        Varyings {
            local: std::array::from_fn(|i| self.local[i] + other.local[i]),
            uv: std::array::from_fn(|i| self.uv[i] + other.uv[i]),
            color: std::array::from_fn(|i| self.color[i] + other.color[i]),
            alpha: self.alpha + other.alpha,
        }
    }
}

/// A vertex after projection, in window coordinates (y up)
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WindowVertex {
    pub x: f32,
    pub y: f32,
    /// `1 / w` for perspective correct interpolation
    pub inv_w: f32,
    pub varyings: Varyings,
}

fn edge(a: &WindowVertex, b: &WindowVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Pixels on the boundary belong to exactly one of two triangles sharing it
fn owns_edge(a: &WindowVertex, b: &WindowVertex) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dy < 0.0 || (dy == 0.0 && dx < 0.0)
}

/// Emit every pixel whose center lies in the triangle
pub(crate) fn triangle(
    vertices: [WindowVertex; 3],
    width: u32,
    height: u32,
    mut emit: impl FnMut(i32, i32, Varyings),
) {
    let [a, mut b, mut c] = vertices;
    let mut area = edge(&a, &b, c.x, c.y);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
        area = -area;
    }

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as i32;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as i32;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as i32).min(width as i32);
    let max_y = (a.y.max(b.y).max(c.y).ceil() as i32).min(height as i32);

    let inside = |e: f32, owned: bool| e > 0.0 || (e == 0.0 && owned);
    let (own_bc, own_ca, own_ab) = (owns_edge(&b, &c), owns_edge(&c, &a), owns_edge(&a, &b));

    for y in min_y..max_y {
        let py = y as f32 + 0.5;
        for x in min_x..max_x {
            let px = x as f32 + 0.5;
            let w0 = edge(&b, &c, px, py);
            let w1 = edge(&c, &a, px, py);
            let w2 = edge(&a, &b, px, py);
            if !(inside(w0, own_bc) && inside(w1, own_ca) && inside(w2, own_ab)) {
                continue;
            }
            let (w0, w1, w2) = (w0 / area * a.inv_w, w1 / area * b.inv_w, w2 / area * c.inv_w);
            let sum = w0 + w1 + w2;
            if sum == 0.0 {
                continue;
            }
            let varyings = a
                .varyings
                .scaled(w0 / sum)
                .add(&b.varyings.scaled(w1 / sum))
                .add(&c.varyings.scaled(w2 / sum));
            emit(x, y, varyings);
        }
    }
}

/// Emit the pixels of a square point sprite, or of a disc when `round`
pub(crate) fn point(
    vertex: WindowVertex,
    size: f32,
    round: bool,
    width: u32,
    height: u32,
    mut emit: impl FnMut(i32, i32, Varyings),
) {
    let half = size.max(1.0) * 0.5;
    let min_x = (vertex.x - half).floor().max(0.0) as i32;
    let min_y = (vertex.y - half).floor().max(0.0) as i32;
    let max_x = ((vertex.x + half).ceil() as i32).min(width as i32);
    let max_y = ((vertex.y + half).ceil() as i32).min(height as i32);

    for y in min_y..max_y {
        let dy = y as f32 + 0.5 - vertex.y;
        for x in min_x..max_x {
            let dx = x as f32 + 0.5 - vertex.x;
            let inside = if round {
                dx * dx + dy * dy <= half * half
            } else {
                dx >= -half && dx < half && dy >= -half && dy < half
            };
            if inside {
                emit(x, y, vertex.varyings);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32) -> WindowVertex {
        WindowVertex {
            x,
            y,
            inv_w: 1.0,
            varyings: Varyings {
                local: [x, y],
                ..Varyings::default()
            },
        }
    }

    fn covered(vertices: [WindowVertex; 3]) -> Vec<(i32, i32)> {
        let mut pixels = Vec::new();
        triangle(vertices, 16, 16, |x, y, _| pixels.push((x, y)));
        pixels
    }

    #[test]
    fn test_shared_edge_is_drawn_once() {
        let (a, b, c, d) = (vertex(0.0, 0.0), vertex(4.0, 0.0), vertex(0.0, 4.0), vertex(4.0, 4.0));
        let mut pixels = covered([a, b, c]);
        pixels.extend(covered([b, d, c]));
        pixels.sort_unstable();
        let before = pixels.len();
        pixels.dedup();
        assert_eq!(before, pixels.len());
        assert_eq!(pixels.len(), 16);
    }

    #[test]
    fn test_winding_does_not_matter() {
        let (a, b, c) = (vertex(1.0, 1.0), vertex(9.0, 1.0), vertex(1.0, 9.0));
        assert_eq!(covered([a, b, c]).len(), covered([a, c, b]).len());
    }

    #[test]
    fn test_varyings_interpolate() {
        let (a, b, c) = (vertex(0.0, 0.0), vertex(8.0, 0.0), vertex(0.0, 8.0));
        triangle([a, b, c], 16, 16, |x, y, v| {
            assert!((v.local[0] - (x as f32 + 0.5)).abs() < 1e-4);
            assert!((v.local[1] - (y as f32 + 0.5)).abs() < 1e-4);
        });
    }

    #[test]
    fn test_point_square_and_disc() {
        let mut square = 0;
        point(vertex(8.0, 8.0), 4.0, false, 16, 16, |_, _, _| square += 1);
        assert_eq!(square, 16);
        let mut disc = 0;
        point(vertex(8.0, 8.0), 4.0, true, 16, 16, |_, _, _| disc += 1);
        assert!(disc < square);
    }

    #[test]
    fn test_sampling_wraps() {
        let mut surface = Surface::new(2, 1);
        surface.pixels[0] = [1.0, 0.0, 0.0, 1.0];
        surface.pixels[1] = [0.0, 0.0, 1.0, 1.0];
        let at = |s: f32, wrap: TextureWrap| surface.sample(s, 0.5, TextureFilter::Nearest, wrap, wrap);
        assert_eq!(at(1.25, TextureWrap::Clamp), [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(at(1.25, TextureWrap::Repeat), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(at(1.25, TextureWrap::Mirror), [0.0, 0.0, 1.0, 1.0]);
        let mid = surface.sample(0.5, 0.5, TextureFilter::Linear, TextureWrap::Clamp, TextureWrap::Clamp);
        assert_eq!(mid, [0.5, 0.0, 0.5, 1.0]);
    }
}
