//! Nine-patch meshes
//!
//! A mesh depends on the bitmap size, the destination size and the patch
//! description. Positions are local to the destination rect, so one mesh
//! serves every draw of the same size.

use std::sync::Arc;

use gloss_paint::{NinePatch, Rect};
use rustc_hash::FxHashMap;

use crate::vertex::TextureVertex;

/// Triangle list covering the visible quads of a patch
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchMesh {
    /// Six vertices per quad
    pub vertices: Vec<TextureVertex>,
    /// Local rect of every emitted quad
    pub quads: Vec<Rect>,
    pub has_empty_quads: bool,
}

impl PatchMesh {
    /// Build the mesh stretching a `bitmap_width` x `bitmap_height` bitmap
    /// over `width` x `height`
    pub fn new(bitmap_width: u32, bitmap_height: u32, width: f32, height: f32, patch: &NinePatch) -> Self {
        let mut mesh = PatchMesh {
            has_empty_quads: patch.has_empty_quads(),
            ..Default::default()
        };
        let (bw, bh) = (bitmap_width as f32, bitmap_height as f32);
        let stretch_x = stretch_factor(&patch.x_divs, bw, width);
        let stretch_y = stretch_factor(&patch.y_divs, bh, height);
        let columns = patch.x_divs.len() + 1;

        let rows = segments(&patch.y_divs, bh, height, stretch_y);
        let cols = segments(&patch.x_divs, bw, width, stretch_x);
        for (row, &(y1, y2, v1, v2)) in rows.iter().enumerate() {
            for (col, &(x1, x2, u1, u2)) in cols.iter().enumerate() {
                let color = patch.color(row * columns + col);
                if color == gloss_paint::patch::TRANSPARENT_COLOR || x1 >= x2 || y1 >= y2 {
                    continue;
                }
                mesh.vertices.extend_from_slice(&[
                    TextureVertex::new(x1, y1, u1, v1),
                    TextureVertex::new(x2, y1, u2, v1),
                    TextureVertex::new(x1, y2, u1, v2),
                    TextureVertex::new(x1, y2, u1, v2),
                    TextureVertex::new(x2, y1, u2, v1),
                    TextureVertex::new(x2, y2, u2, v2),
                ]);
                mesh.quads.push(Rect::new(x1, y1, x2, y2));
            }
        }
        mesh
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Scale applied to stretchable segments so the fixed ones keep their size
fn stretch_factor(divs: &[i32], bitmap_size: f32, size: f32) -> f32 {
    let stretchable: f32 = divs
        .chunks_exact(2)
        .map(|pair| (pair[1] - pair[0]).max(0) as f32)
        .sum();
    if stretchable <= 0.0 {
        return 0.0;
    }
    ((size - (bitmap_size - stretchable)) / stretchable).max(0.0)
}

/// `(start, end, tex_start, tex_end)` of every segment along one axis
fn segments(divs: &[i32], bitmap_size: f32, size: f32, stretch: f32) -> Vec<(f32, f32, f32, f32)> {
    let mut out = Vec::with_capacity(divs.len() + 1);
    let (mut pos, mut tex, mut previous) = (0.0f32, 0.0f32, 0i32);
    for (i, &div) in divs.iter().enumerate() {
        let segment = (div - previous).max(0) as f32;
        let end = if i % 2 == 1 {
            pos + (segment * stretch + 0.5).floor()
        } else {
            pos + segment
        };
        let tex_end = div as f32 / bitmap_size;
        out.push((pos, end.min(size), tex, tex_end));
        pos = end.min(size);
        tex = tex_end;
        previous = div;
    }
    out.push((pos, size, tex, 1.0));
    out
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PatchKey {
    bitmap_width: u32,
    bitmap_height: u32,
    width: u32,
    height: u32,
    patch: NinePatch,
}

/// Meshes keyed by sizes and patch description
pub struct PatchCache {
    meshes: FxHashMap<PatchKey, Arc<PatchMesh>>,
    max_entries: usize,
}

impl PatchCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            meshes: FxHashMap::default(),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Mesh for drawing `patch` over `width` x `height`. `None` for an empty
    /// bitmap.
    pub fn get(
        &mut self,
        bitmap_width: u32,
        bitmap_height: u32,
        width: f32,
        height: f32,
        patch: &NinePatch,
    ) -> Option<Arc<PatchMesh>> {
        if bitmap_width == 0 || bitmap_height == 0 {
            return None;
        }
        let key = PatchKey {
            bitmap_width,
            bitmap_height,
            width: width.to_bits(),
            height: height.to_bits(),
            patch: patch.clone(),
        };
        if let Some(mesh) = self.meshes.get(&key) {
            return Some(mesh.clone());
        }

        if self.meshes.len() >= self.max_entries {
            tracing::debug!("patch cache full, dropping {} meshes", self.meshes.len());
            self.meshes.clear();
        }
        let mesh = Arc::new(PatchMesh::new(bitmap_width, bitmap_height, width, height, patch));
        self.meshes.insert(key, mesh.clone());
        Some(mesh)
    }

    pub fn clear(&mut self) {
        self.meshes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gloss_paint::patch::{NO_COLOR, TRANSPARENT_COLOR};

    #[test]
    fn test_nine_quads_keep_fixed_corners() {
        let patch = NinePatch::new(vec![2, 8], vec![2, 8]);
        let mesh = PatchMesh::new(10, 10, 30.0, 20.0, &patch);
        assert_eq!(mesh.quads.len(), 9);
        assert_eq!(mesh.vertices.len(), 54);
        assert_eq!(mesh.quads[0], Rect::new(0.0, 0.0, 2.0, 2.0));
        // Center stretches, right column keeps its two pixels
        assert_eq!(mesh.quads[4], Rect::new(2.0, 2.0, 28.0, 18.0));
        assert_eq!(mesh.quads[8], Rect::new(28.0, 18.0, 30.0, 20.0));
    }

    #[test]
    fn test_transparent_quads_are_skipped() {
        let mut colors = vec![NO_COLOR; 9];
        colors[4] = TRANSPARENT_COLOR;
        let patch = NinePatch::new(vec![2, 8], vec![2, 8]).with_colors(colors);
        let mesh = PatchMesh::new(10, 10, 30.0, 20.0, &patch);
        assert_eq!(mesh.quads.len(), 8);
        assert!(mesh.has_empty_quads);
    }

    #[test]
    fn test_cache_reuses_mesh() {
        let mut cache = PatchCache::new(4);
        let patch = NinePatch::new(vec![2, 8], vec![2, 8]);
        let a = cache.get(10, 10, 30.0, 20.0, &patch).unwrap();
        let b = cache.get(10, 10, 30.0, 20.0, &patch).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        cache.get(10, 10, 40.0, 20.0, &patch).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(0, 10, 40.0, 20.0, &patch).is_none());
    }
}
