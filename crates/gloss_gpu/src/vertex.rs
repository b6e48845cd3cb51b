//! Vertex layouts
//!
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod` so a
//! device can upload them as raw bytes.

use bytemuck::{Pod, Zeroable};

/// Largest number of quads drawn with one shared index buffer
pub const MAX_QUADS_PER_DRAW: usize = 2048;

/// Position only
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
}

impl Vertex {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { position: [x, y] }
    }
}

/// Position and texture coordinate
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TextureVertex {
    pub position: [f32; 2],
    pub texture: [f32; 2],
}

impl TextureVertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y],
            texture: [u, v],
        }
    }
}

/// Position, texture coordinate and premultiplied color
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColorTextureVertex {
    pub position: [f32; 2],
    pub texture: [f32; 2],
    pub color: [f32; 4],
}

impl ColorTextureVertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32, color: [f32; 4]) -> Self {
        Self {
            position: [x, y],
            texture: [u, v],
            color,
        }
    }
}

/// Position and coverage, used by anti-aliased tessellation
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AlphaVertex {
    pub position: [f32; 2],
    pub alpha: f32,
}

impl AlphaVertex {
    pub const fn new(x: f32, y: f32, alpha: f32) -> Self {
        Self {
            position: [x, y],
            alpha,
        }
    }
}

/// Unit quad as a triangle strip, texture coordinates equal positions
pub const UNIT_QUAD: [TextureVertex; 4] = [
    TextureVertex::new(0.0, 0.0, 0.0, 0.0),
    TextureVertex::new(1.0, 0.0, 1.0, 0.0),
    TextureVertex::new(0.0, 1.0, 0.0, 1.0),
    TextureVertex::new(1.0, 1.0, 1.0, 1.0),
];

/// Index list for `quads` quads stored as `(left,top) (right,top) (left,bottom)
/// (right,bottom)` groups of four vertices
pub fn quad_indices(quads: usize) -> Vec<u16> {
    let quads = quads.min(MAX_QUADS_PER_DRAW);
    let mut indices = Vec::with_capacity(quads * 6);
    for q in 0..quads {
        let base = (q * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }
    indices
}

/// Four vertices for an axis-aligned quad, in [`quad_indices`] order
#[allow(clippy::too_many_arguments)]
pub fn quad(
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    u0: f32,
    v0: f32,
    u1: f32,
    v1: f32,
) -> [TextureVertex; 4] {
    [
        TextureVertex::new(left, top, u0, v0),
        TextureVertex::new(right, top, u1, v0),
        TextureVertex::new(left, bottom, u0, v1),
        TextureVertex::new(right, bottom, u1, v1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_sizes() {
        assert_eq!(std::mem::size_of::<TextureVertex>(), 16);
        assert_eq!(std::mem::size_of::<ColorTextureVertex>(), 32);
        assert_eq!(std::mem::size_of::<AlphaVertex>(), 12);
        let bytes: &[u8] = bytemuck::cast_slice(&UNIT_QUAD);
        assert_eq!(bytes.len(), 64);
    }

    #[test]
    fn test_quad_indices_pattern() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]);
        assert_eq!(quad_indices(MAX_QUADS_PER_DRAW + 10).len(), MAX_QUADS_PER_DRAW * 6);
    }
}
