//! Shapes, bitmaps, patches and meshes

use gloss_paint::{
    Bitmap, Color, Matrix4, NinePatch, Paint, PaintStyle, Path, Rect, StrokeCap, TransferMode,
};

use crate::device::{GpuDevice, TextureFilter, TextureWrap, Topology, VertexData};
use crate::shape_cache::{arc_path, PathTexture};
use crate::status::DrawStatus;
use crate::tessellator::{tessellate_convex_path, tessellate_lines, VertexBuffer, Vertices};
use crate::texture::Texture;
use crate::vertex::{quad, ColorTextureVertex, TextureVertex, Vertex, UNIT_QUAD};

use super::Renderer;

/// Unit square as a triangle strip
const UNIT_SQUARE: [Vertex; 4] = [
    Vertex::new(0.0, 0.0),
    Vertex::new(1.0, 0.0),
    Vertex::new(0.0, 1.0),
    Vertex::new(1.0, 1.0),
];

/// A textured draw as handed to [`Renderer::draw_texture_mesh`]
pub(super) struct TextureDraw<'a> {
    /// Destination of the unit mesh, or origin of a mesh in local units
    /// when `ignore_scale` is set
    pub(super) rect: Rect,
    pub(super) texture: Texture,
    /// Final modulation alpha
    pub(super) alpha: f32,
    pub(super) mode: TransferMode,
    pub(super) blend: bool,
    pub(super) vertices: &'a [TextureVertex],
    pub(super) indices: Option<&'a [u16]>,
    pub(super) topology: Topology,
    pub(super) swap_src_dst: bool,
    /// `rect` is already in target space
    pub(super) ignore_transform: bool,
    pub(super) ignore_scale: bool,
    /// Mark the destination dirty in the target layer
    pub(super) dirty: bool,
}

impl<'a> TextureDraw<'a> {
    /// Unit quad over `rect` with default flags
    pub(super) fn quad(rect: Rect, texture: Texture, alpha: f32, mode: TransferMode, vertices: &'a [TextureVertex]) -> Self {
        Self {
            rect,
            texture,
            alpha,
            mode,
            blend: texture.blend,
            vertices,
            indices: None,
            topology: Topology::TriangleStrip,
            swap_src_dst: false,
            ignore_transform: false,
            ignore_scale: false,
            dirty: true,
        }
    }
}

impl<D: GpuDevice> Renderer<D> {
    /// Paint alpha multiplied by the snapshot alpha, and the paint mode
    pub(super) fn alpha_and_mode(&self, paint: &Paint) -> (f32, TransferMode) {
        (paint.color.a * self.snapshots.current().alpha, paint.transfer_mode)
    }

    pub(super) fn draw_texture_mesh(&mut self, draw: TextureDraw<'_>) {
        self.setup_draw(true);
        self.setup_draw_with_texture(false);
        self.setup_draw_alpha(draw.alpha);
        self.setup_draw_color_filter();
        self.setup_draw_blending(draw.blend || draw.alpha < 1.0, draw.mode, draw.swap_src_dst);
        self.setup_draw_program();
        if !draw.dirty {
            self.setup_draw_dirty_regions_disabled();
        }
        self.setup_mesh_model_view(&draw);
        self.setup_draw_texture(draw.texture.id);
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.issue(draw.topology, VertexData::Texture(draw.vertices), draw.indices);
    }

    /// Alpha texture tinted with `color`. The shader, when set, supplies
    /// the color instead.
    pub(super) fn draw_alpha8_texture_mesh(&mut self, draw: TextureDraw<'_>, color: Color) {
        self.setup_draw(true);
        self.setup_draw_with_texture(true);
        self.setup_draw_alpha8_color(color, draw.alpha);
        self.setup_draw_color_filter();
        self.setup_draw_shader();
        self.setup_draw_blending(true, draw.mode, false);
        self.setup_draw_program();
        if !draw.dirty {
            self.setup_draw_dirty_regions_disabled();
        }
        self.setup_mesh_model_view(&draw);
        self.setup_draw_texture(draw.texture.id);
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.setup_draw_shader_uniforms(draw.ignore_transform);
        self.issue(draw.topology, VertexData::Texture(draw.vertices), draw.indices);
    }

    fn setup_mesh_model_view(&mut self, draw: &TextureDraw<'_>) {
        let r = draw.rect;
        if draw.ignore_scale {
            self.setup_draw_model_view_translate(r.left, r.top, r.right, r.bottom, draw.ignore_transform);
        } else {
            self.setup_draw_model_view(r.left, r.top, r.right, r.bottom, draw.ignore_transform, false);
        }
    }

    /// Fill a rect with a solid color, through the shader when one is set
    #[allow(clippy::too_many_arguments)]
    pub(super) fn draw_color_rect(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        color: Color,
        mode: TransferMode,
        ignore_transform: bool,
    ) {
        let color = if self.modifiers.shader.is_some() {
            color.opaque_rgb()
        } else {
            color
        };
        self.setup_draw(true);
        self.setup_draw_color(color);
        self.setup_draw_shader();
        self.setup_draw_color_filter();
        self.setup_draw_blending_mode(mode);
        self.setup_draw_program();
        self.setup_draw_model_view(left, top, right, bottom, ignore_transform, false);
        self.setup_draw_color_uniforms();
        self.setup_draw_shader_uniforms(ignore_transform);
        self.setup_draw_color_filter_uniforms();
        self.issue(Topology::TriangleStrip, VertexData::Position(&UNIT_SQUARE), None);
    }

    // Solid geometry

    /// Fill the current clip
    pub fn draw_color(&mut self, color: Color, mode: TransferMode) -> DrawStatus {
        if self.snapshots.is_ignored() {
            return DrawStatus::DONE;
        }
        let clip = self.snapshots.clip_rect().snapped();
        if clip.is_empty() {
            return DrawStatus::DONE;
        }
        self.draw_color_rect(clip.left, clip.top, clip.right, clip.bottom, color, mode, true);
        DrawStatus::DREW
    }

    pub fn draw_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, paint: &Paint) -> DrawStatus {
        let paint = self.filtered(paint);
        if paint.alpha() == 0 && paint.transfer_mode == TransferMode::SrcOver && self.modifiers.shader.is_none() {
            return DrawStatus::DONE;
        }
        if self.quick_reject_pre_stroke(left, top, right, bottom, &paint) {
            return DrawStatus::DONE;
        }

        if paint.style != PaintStyle::Fill {
            if paint.needs_shape_texture() {
                let texture = self.caches.shapes.get_rect(
                    &mut self.device,
                    &mut self.caches.state,
                    right - left,
                    bottom - top,
                    &paint,
                );
                return self.draw_shape(left, top, texture, &paint);
            }
            let mut rect = Rect::new(left, top, right, bottom);
            if paint.style == PaintStyle::StrokeAndFill {
                rect.outset(paint.stroke_width * 0.5);
            }
            let mut path = Path::new();
            path.add_rect(&rect);
            return self.draw_convex(&path, &paint);
        }

        if paint.is_anti_alias() && !self.snapshots.transform().is_simple() {
            let mut path = Path::new();
            path.add_rect(&Rect::new(left, top, right, bottom));
            return self.draw_convex(&path, &paint);
        }
        self.draw_color_rect(left, top, right, bottom, paint.color, paint.transfer_mode, false);
        DrawStatus::DREW
    }

    /// Fill rects given as `[left, top, right, bottom, ...]` in one draw
    pub fn draw_rects(&mut self, rects: &[f32], paint: &Paint) -> DrawStatus {
        if self.snapshots.is_ignored() || rects.len() < 4 {
            return DrawStatus::DONE;
        }
        let paint = self.filtered(paint);
        let rects: Vec<Rect> = rects
            .chunks_exact(4)
            .map(|r| Rect::new(r[0], r[1], r[2], r[3]))
            .collect();
        self.draw_color_rects(&rects, paint.color, paint.transfer_mode, false, true, true)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_round_rect(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        rx: f32,
        ry: f32,
        paint: &Paint,
    ) -> DrawStatus {
        let paint = self.filtered(paint);
        if self.quick_reject_pre_stroke(left, top, right, bottom, &paint) {
            return DrawStatus::DONE;
        }
        if paint.path_effect.is_some() {
            let texture = self.caches.shapes.get_round_rect(
                &mut self.device,
                &mut self.caches.state,
                right - left,
                bottom - top,
                rx,
                ry,
                &paint,
            );
            return self.draw_shape(left, top, texture, &paint);
        }

        let mut rect = Rect::new(left, top, right, bottom);
        let (mut rx, mut ry) = (rx, ry);
        if paint.style == PaintStyle::StrokeAndFill {
            let outset = paint.stroke_width * 0.5;
            rect.outset(outset);
            rx += outset;
            ry += outset;
        }
        let mut path = Path::new();
        path.add_round_rect(&rect, rx, ry);
        self.draw_convex(&path, &paint)
    }

    pub fn draw_circle(&mut self, x: f32, y: f32, radius: f32, paint: &Paint) -> DrawStatus {
        let paint = self.filtered(paint);
        if radius <= 0.0
            || self.quick_reject_pre_stroke(x - radius, y - radius, x + radius, y + radius, &paint)
        {
            return DrawStatus::DONE;
        }
        if paint.path_effect.is_some() {
            let texture =
                self.caches
                    .shapes
                    .get_circle(&mut self.device, &mut self.caches.state, radius, &paint);
            return self.draw_shape(x - radius, y - radius, texture, &paint);
        }

        let mut radius = radius;
        if paint.style == PaintStyle::StrokeAndFill {
            radius += paint.stroke_width * 0.5;
        }
        let mut path = Path::new();
        path.add_circle(x, y, radius);
        self.draw_convex(&path, &paint)
    }

    pub fn draw_oval(&mut self, left: f32, top: f32, right: f32, bottom: f32, paint: &Paint) -> DrawStatus {
        let paint = self.filtered(paint);
        if self.quick_reject_pre_stroke(left, top, right, bottom, &paint) {
            return DrawStatus::DONE;
        }
        if paint.path_effect.is_some() {
            let texture = self.caches.shapes.get_oval(
                &mut self.device,
                &mut self.caches.state,
                right - left,
                bottom - top,
                &paint,
            );
            return self.draw_shape(left, top, texture, &paint);
        }

        let mut rect = Rect::new(left, top, right, bottom);
        if paint.style == PaintStyle::StrokeAndFill {
            rect.outset(paint.stroke_width * 0.5);
        }
        let mut path = Path::new();
        path.add_oval(&rect);
        self.draw_convex(&path, &paint)
    }

    /// Arc of the oval in `left..right` x `top..bottom`, angles in degrees
    /// clockwise from the positive x axis
    #[allow(clippy::too_many_arguments)]
    pub fn draw_arc(
        &mut self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        start: f32,
        sweep: f32,
        use_center: bool,
        paint: &Paint,
    ) -> DrawStatus {
        if sweep.abs() >= 360.0 {
            return self.draw_oval(left, top, right, bottom, paint);
        }
        let paint = self.filtered(paint);
        if self.quick_reject_pre_stroke(left, top, right, bottom, &paint) {
            return DrawStatus::DONE;
        }
        let (start, sweep) = if sweep < 0.0 { (start + sweep, -sweep) } else { (start, sweep) };

        if paint.style != PaintStyle::Stroke || paint.path_effect.is_some() || use_center {
            let texture = self.caches.shapes.get_arc(
                &mut self.device,
                &mut self.caches.state,
                right - left,
                bottom - top,
                start,
                sweep,
                use_center,
                &paint,
            );
            return self.draw_shape(left, top, texture, &paint);
        }

        let path = arc_path(&Rect::new(left, top, right, bottom), start, sweep, false);
        self.draw_convex(&path, &paint)
    }

    /// Any path, through a rasterized shape texture
    pub fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawStatus {
        if self.snapshots.is_ignored() {
            return DrawStatus::DONE;
        }
        let paint = self.filtered(paint);
        let texture = self
            .caches
            .shapes
            .get_path(&mut self.device, &mut self.caches.state, path, &paint);
        self.draw_shape(0.0, 0.0, texture, &paint)
    }

    /// Tessellate and fill a convex path
    pub fn draw_convex_path(&mut self, path: &Path, paint: &Paint) -> DrawStatus {
        let paint = self.filtered(paint);
        self.draw_convex(path, &paint)
    }

    fn draw_convex(&mut self, path: &Path, paint: &Paint) -> DrawStatus {
        let transform = *self.snapshots.transform();
        let buffer = tessellate_convex_path(path, paint, &transform);
        // Aliased hairlines straddle pixel centers without the offset
        let offset = paint.style == PaintStyle::Stroke && paint.stroke_width <= 0.0 && !paint.is_anti_alias();
        self.draw_buffer(&buffer, paint, &transform, offset)
    }

    /// Draw tessellated geometry given in local coordinates
    pub fn draw_vertex_buffer(&mut self, buffer: &VertexBuffer, paint: &Paint) -> DrawStatus {
        let paint = self.filtered(paint);
        let transform = *self.snapshots.transform();
        self.draw_buffer(buffer, &paint, &transform, false)
    }

    fn draw_buffer(&mut self, buffer: &VertexBuffer, paint: &Paint, transform: &Matrix4, offset: bool) -> DrawStatus {
        if buffer.is_empty() || self.snapshots.is_ignored() {
            return DrawStatus::DONE;
        }
        let b = buffer.bounds;
        if self.quick_reject(b.left, b.top, b.right, b.bottom) {
            return DrawStatus::DONE;
        }
        self.dirty_layer(b.left, b.top, b.right, b.bottom, Some(transform));

        let aa = buffer.vertices.is_alpha();
        self.setup_draw(true);
        if aa {
            self.setup_draw_aa();
        }
        self.setup_draw_color(paint.color);
        self.setup_draw_color_filter();
        self.setup_draw_shader();
        self.setup_draw_blending(aa, paint.transfer_mode, false);
        self.setup_draw_program();
        self.setup_draw_model_view_identity(offset);
        self.setup_draw_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.setup_draw_shader_uniforms(false);
        match &buffer.vertices {
            Vertices::Plain(vertices) => self.issue(
                Topology::Triangles,
                VertexData::Position(vertices),
                Some(buffer.indices.as_slice()),
            ),
            Vertices::Alpha(vertices) => self.issue(
                Topology::Triangles,
                VertexData::Alpha(vertices),
                Some(buffer.indices.as_slice()),
            ),
        }
        DrawStatus::DREW
    }

    /// Independent segments `[x0, y0, x1, y1, ...]`
    pub fn draw_lines(&mut self, points: &[f32], paint: &Paint) -> DrawStatus {
        if points.len() < 4 || self.snapshots.is_ignored() {
            return DrawStatus::DONE;
        }
        let count = points.len() / 4 * 4;
        let paint = self.filtered(paint);
        let transform = *self.snapshots.transform();
        let buffer = tessellate_lines(&points[..count], &paint, &transform);
        // Aliased hairlines land on pixel centers with the offset
        self.draw_buffer(&buffer, &paint, &transform, !paint.is_anti_alias())
    }

    /// Points `[x0, y0, x1, y1, ...]` as squares, or discs with a round cap
    pub fn draw_points(&mut self, points: &[f32], paint: &Paint) -> DrawStatus {
        if points.len() < 2 || self.snapshots.is_ignored() {
            return DrawStatus::DONE;
        }
        let paint = self.filtered(paint);
        let size = if paint.stroke_width <= 0.0 { 1.0 } else { paint.stroke_width };
        let half = size * 0.5;

        let mut vertices = std::mem::take(&mut self.scratch.positions);
        vertices.clear();
        let mut bounds = Rect::inverted();
        for p in points.chunks_exact(2) {
            vertices.push(Vertex::new(p[0], p[1]));
            bounds.expand_to_cover(p[0] - half, p[1] - half);
            bounds.expand_to_cover(p[0] + half, p[1] + half);
        }

        // Points are not clipped by their geometry, the scissor does it
        self.caches.state.set_scissor_enabled(&mut self.device, true);
        self.set_scissor_from_clip();

        let round = paint.stroke_cap == StrokeCap::Round;
        self.setup_draw(true);
        self.setup_draw_point(size, round);
        self.setup_draw_color(paint.color);
        self.setup_draw_color_filter();
        self.setup_draw_shader();
        self.setup_draw_blending(round, paint.transfer_mode, false);
        self.setup_draw_program();
        self.setup_draw_model_view_identity(true);
        self.setup_draw_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.setup_draw_shader_uniforms(false);
        self.issue(Topology::Points, VertexData::Position(&vertices), None);
        self.scratch.positions = vertices;

        let transform = *self.snapshots.transform();
        self.dirty_layer(bounds.left, bounds.top, bounds.right, bounds.bottom, Some(&transform));
        DrawStatus::DREW
    }

    /// Draw a rasterized shape whose local bounds start at `(left, top)`
    fn draw_shape(&mut self, left: f32, top: f32, texture: Option<PathTexture>, paint: &Paint) -> DrawStatus {
        let Some(shape) = texture else {
            return DrawStatus::DONE;
        };
        let x = left + shape.left - shape.offset;
        let y = top + shape.top - shape.offset;
        let (width, height) = (shape.texture.width as f32, shape.texture.height as f32);

        let status = if self.quick_reject(x, y, x + width, y + height) {
            DrawStatus::DONE
        } else {
            let (alpha, mode) = self.alpha_and_mode(paint);
            let id = shape.texture.id;
            self.caches.state.bind_texture(&mut self.device, 0, Some(id));
            self.caches
                .state
                .set_texture_filter(&mut self.device, id, TextureFilter::Linear, false);
            let rect = Rect::new(x, y, x + width, y + height);
            self.draw_alpha8_texture_mesh(
                TextureDraw::quad(rect, shape.texture, alpha, mode, &UNIT_QUAD),
                paint.color,
            );
            DrawStatus::DREW
        };
        if shape.texture.cleanup {
            shape.texture.release(&mut self.device, &mut self.caches.state);
        }
        status
    }

    // Bitmaps

    pub fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f32, y: f32, paint: &Paint) -> DrawStatus {
        let (width, height) = (bitmap.width() as f32, bitmap.height() as f32);
        if self.quick_reject(x, y, x + width, y + height) {
            return DrawStatus::DONE;
        }
        let Some(texture) = self
            .caches
            .textures
            .get(&mut self.device, &mut self.caches.state, bitmap)
        else {
            return DrawStatus::DONE;
        };
        let paint = self.filtered(paint);
        self.draw_texture_rect(texture, Rect::new(x, y, x + width, y + height), &paint);
        if texture.cleanup {
            texture.release(&mut self.device, &mut self.caches.state);
        }
        DrawStatus::DREW
    }

    /// Draw a bitmap without keeping its texture around
    pub fn draw_bitmap_data(&mut self, bitmap: &Bitmap, x: f32, y: f32, paint: &Paint) -> DrawStatus {
        let (width, height) = (bitmap.width() as f32, bitmap.height() as f32);
        if self.quick_reject(x, y, x + width, y + height) {
            return DrawStatus::DONE;
        }
        let Some(texture) =
            self.caches
                .textures
                .get_transient(&mut self.device, &mut self.caches.state, bitmap)
        else {
            return DrawStatus::DONE;
        };
        let paint = self.filtered(paint);
        self.draw_texture_rect(texture, Rect::new(x, y, x + width, y + height), &paint);
        texture.release(&mut self.device, &mut self.caches.state);
        DrawStatus::DREW
    }

    pub fn draw_bitmap_matrix(&mut self, bitmap: &Bitmap, matrix: &Matrix4, paint: &Paint) -> DrawStatus {
        let count = self.save(crate::snapshot::SaveFlags::MATRIX);
        self.concat_matrix(matrix);
        let status = self.draw_bitmap(bitmap, 0.0, 0.0, paint);
        self.restore_to_count(count);
        status
    }

    /// Draw the `src` part of a bitmap into `dst`
    pub fn draw_bitmap_rect(&mut self, bitmap: &Bitmap, src: Rect, dst: Rect, paint: &Paint) -> DrawStatus {
        if src.is_empty() || self.quick_reject(dst.left, dst.top, dst.right, dst.bottom) {
            return DrawStatus::DONE;
        }
        let Some(texture) = self
            .caches
            .textures
            .get(&mut self.device, &mut self.caches.state, bitmap)
        else {
            return DrawStatus::DONE;
        };
        let paint = self.filtered(paint);
        let (bw, bh) = (bitmap.width() as f32, bitmap.height() as f32);
        let u0 = (src.left / bw).clamp(0.0, 1.0);
        let v0 = (src.top / bh).clamp(0.0, 1.0);
        let u1 = (src.right / bw).clamp(0.0, 1.0);
        let v1 = (src.bottom / bh).clamp(0.0, 1.0);
        let vertices = quad(0.0, 0.0, 1.0, 1.0, u0, v0, u1, v1);

        let scaled = dst.width() != src.width() || dst.height() != src.height();
        let transform = *self.snapshots.transform();
        let mut rect = dst;
        let simple = !scaled && transform.is_pure_translate();
        let filter = if simple {
            let x = (dst.left + transform.translate_x() + 0.5).floor();
            let y = (dst.top + transform.translate_y() + 0.5).floor();
            rect = Rect::new(x, y, x + dst.width(), y + dst.height());
            TextureFilter::Nearest
        } else if paint.is_filter_bitmap() {
            TextureFilter::Linear
        } else {
            TextureFilter::Nearest
        };
        self.bind_bitmap_texture(&texture, filter);

        let (alpha, mode) = self.alpha_and_mode(&paint);
        let mut draw = TextureDraw::quad(rect, texture, alpha, mode, &vertices);
        draw.ignore_transform = simple;
        if texture.is_alpha8() {
            self.draw_alpha8_texture_mesh(draw, paint.color);
        } else {
            self.draw_texture_mesh(draw);
        }
        if texture.cleanup {
            texture.release(&mut self.device, &mut self.caches.state);
        }
        DrawStatus::DREW
    }

    /// Warp a bitmap over a grid of `mesh_width` x `mesh_height` cells.
    /// `vertices` holds `(mesh_width + 1) * (mesh_height + 1)` points, row by
    /// row, and `colors` one color per point.
    pub fn draw_bitmap_mesh(
        &mut self,
        bitmap: &Bitmap,
        mesh_width: usize,
        mesh_height: usize,
        vertices: &[f32],
        colors: Option<&[Color]>,
        paint: &Paint,
    ) -> DrawStatus {
        if self.snapshots.is_ignored() || mesh_width == 0 || mesh_height == 0 {
            return DrawStatus::DONE;
        }
        let count = (mesh_width + 1) * (mesh_height + 1);
        if vertices.len() < count * 2 || colors.is_some_and(|c| c.len() < count) {
            tracing::warn!(
                "bitmap mesh {}x{} needs {} points, got {}",
                mesh_width,
                mesh_height,
                count,
                vertices.len() / 2
            );
            return DrawStatus::DONE;
        }

        let mut mesh = std::mem::take(&mut self.scratch.color_textures);
        mesh.clear();
        let mut bounds = Rect::inverted();
        let point = |index: usize| {
            let color = colors.map_or([1.0; 4], |c| c[index].premultiplied(1.0));
            (vertices[index * 2], vertices[index * 2 + 1], color)
        };
        for row in 0..mesh_height {
            let (v0, v1) = (row as f32 / mesh_height as f32, (row + 1) as f32 / mesh_height as f32);
            for col in 0..mesh_width {
                let (u0, u1) = (col as f32 / mesh_width as f32, (col + 1) as f32 / mesh_width as f32);
                let a = row * (mesh_width + 1) + col;
                let corners = [
                    (point(a), u0, v0),
                    (point(a + 1), u1, v0),
                    (point(a + mesh_width + 1), u0, v1),
                    (point(a + mesh_width + 2), u1, v1),
                ];
                for &i in &[0usize, 1, 2, 2, 1, 3] {
                    let ((x, y, color), u, v) = corners[i];
                    mesh.push(ColorTextureVertex::new(x, y, u, v, color));
                    bounds.expand_to_cover(x, y);
                }
            }
        }

        if self.quick_reject(bounds.left, bounds.top, bounds.right, bounds.bottom) {
            self.scratch.color_textures = mesh;
            return DrawStatus::DONE;
        }
        let Some(texture) = self
            .caches
            .textures
            .get(&mut self.device, &mut self.caches.state, bitmap)
        else {
            self.scratch.color_textures = mesh;
            return DrawStatus::DONE;
        };
        let paint = self.filtered(paint);
        let filter = if paint.is_filter_bitmap() {
            TextureFilter::Linear
        } else {
            TextureFilter::Nearest
        };
        self.bind_bitmap_texture(&texture, filter);
        let (alpha, mode) = self.alpha_and_mode(&paint);

        self.setup_draw(true);
        self.setup_draw_with_texture_and_color();
        self.setup_draw_alpha(alpha);
        self.setup_draw_color_filter();
        self.setup_draw_blending(true, mode, false);
        self.setup_draw_program();
        self.setup_draw_dirty_regions_disabled();
        self.setup_draw_model_view(0.0, 0.0, 1.0, 1.0, false, true);
        self.setup_draw_texture(texture.id);
        self.setup_draw_pure_color_uniforms();
        self.setup_draw_color_filter_uniforms();
        self.issue(Topology::Triangles, VertexData::ColorTexture(&mesh), None);
        self.scratch.color_textures = mesh;

        let transform = *self.snapshots.transform();
        self.dirty_layer(bounds.left, bounds.top, bounds.right, bounds.bottom, Some(&transform));
        if texture.cleanup {
            texture.release(&mut self.device, &mut self.caches.state);
        }
        DrawStatus::DREW
    }

    /// Stretch a nine-patch bitmap over a rect
    #[allow(clippy::too_many_arguments)]
    pub fn draw_patch(
        &mut self,
        bitmap: &Bitmap,
        patch: &NinePatch,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        paint: &Paint,
    ) -> DrawStatus {
        if self.quick_reject(left, top, right, bottom) {
            return DrawStatus::DONE;
        }
        let Some(mesh) = self.caches.patches.get(
            bitmap.width(),
            bitmap.height(),
            right - left,
            bottom - top,
            patch,
        ) else {
            return DrawStatus::DONE;
        };
        if mesh.is_empty() {
            return DrawStatus::DONE;
        }
        let Some(texture) = self
            .caches
            .textures
            .get(&mut self.device, &mut self.caches.state, bitmap)
        else {
            return DrawStatus::DONE;
        };
        let paint = self.filtered(paint);
        let (alpha, mode) = self.alpha_and_mode(&paint);
        self.bind_bitmap_texture(&texture, TextureFilter::Linear);

        let transform = *self.snapshots.transform();
        let simple = transform.is_pure_translate();
        let (x, y) = if simple {
            (
                (left + transform.translate_x() + 0.5).floor(),
                (top + transform.translate_y() + 0.5).floor(),
            )
        } else {
            (left, top)
        };

        // Transparent quads are skipped, so only the drawn ones are dirty
        if mesh.has_empty_quads && self.has_layer() {
            let transform = (!simple).then_some(&transform);
            for q in &mesh.quads {
                self.dirty_layer(x + q.left, y + q.top, x + q.right, y + q.bottom, transform);
            }
        }

        let mut draw = TextureDraw::quad(
            Rect::new(x, y, x + right - left, y + bottom - top),
            texture,
            alpha,
            mode,
            &mesh.vertices,
        );
        draw.topology = Topology::Triangles;
        draw.ignore_transform = simple;
        draw.ignore_scale = true;
        draw.dirty = !mesh.has_empty_quads;
        self.draw_texture_mesh(draw);

        if texture.cleanup {
            texture.release(&mut self.device, &mut self.caches.state);
        }
        DrawStatus::DREW
    }

    fn bind_bitmap_texture(&mut self, texture: &Texture, filter: TextureFilter) {
        let state = &mut self.caches.state;
        state.bind_texture(&mut self.device, 0, Some(texture.id));
        state.set_texture_filter(&mut self.device, texture.id, filter, false);
        state.set_texture_wrap(&mut self.device, texture.id, TextureWrap::Clamp, TextureWrap::Clamp);
    }

    /// Draw a bitmap texture over `rect`, pixel aligned when the transform
    /// is a translation
    fn draw_texture_rect(&mut self, texture: Texture, rect: Rect, paint: &Paint) {
        let transform = *self.snapshots.transform();
        let simple = transform.is_pure_translate();
        let (rect, filter) = if simple {
            let x = (rect.left + transform.translate_x() + 0.5).floor();
            let y = (rect.top + transform.translate_y() + 0.5).floor();
            (
                Rect::new(x, y, x + rect.width(), y + rect.height()),
                TextureFilter::Nearest,
            )
        } else if paint.is_filter_bitmap() {
            (rect, TextureFilter::Linear)
        } else {
            (rect, TextureFilter::Nearest)
        };
        self.bind_bitmap_texture(&texture, filter);

        let (alpha, mode) = self.alpha_and_mode(paint);
        let mut draw = TextureDraw::quad(rect, texture, alpha, mode, &UNIT_QUAD);
        draw.ignore_transform = simple;
        if texture.is_alpha8() {
            self.draw_alpha8_texture_mesh(draw, paint.color);
        } else {
            self.draw_texture_mesh(draw);
        }
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::headless::{CapturedFrame, SoftwareDevice};
    use crate::snapshot::SaveFlags;
    use gloss_paint::{BitmapConfig, RegionOp};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    fn renderer() -> Renderer<SoftwareDevice> {
        let mut renderer = Renderer::new(SoftwareDevice::new(64, 64), RendererConfig::default());
        renderer.set_viewport(64, 64);
        renderer.prepare(false);
        renderer
    }

    fn frame(r: &Renderer<SoftwareDevice>) -> CapturedFrame {
        CapturedFrame::capture(r.device())
    }

    #[test]
    fn test_fill_rect_covers_its_pixels() {
        let mut r = renderer();
        let status = r.draw_rect(10.0, 10.0, 20.0, 20.0, &Paint::fill(Color::RED));
        assert_eq!(status, DrawStatus::DREW);
        let frame = frame(&r);
        assert_eq!(frame.pixel(10, 10), RED);
        assert_eq!(frame.pixel(19, 19), RED);
        assert_eq!(frame.pixel(20, 20), CLEAR);
        assert_eq!(frame.pixel(9, 15), CLEAR);
    }

    #[test]
    fn test_rejected_rect_issues_nothing() {
        let mut r = renderer();
        let before = r.device().calls().draws;
        assert_eq!(
            r.draw_rect(100.0, 100.0, 120.0, 120.0, &Paint::fill(Color::RED)),
            DrawStatus::DONE
        );
        assert_eq!(r.device().calls().draws, before);
    }

    #[test]
    fn test_draw_color_fills_clip() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.clip_rect(0.0, 0.0, 32.0, 64.0, RegionOp::Intersect);
        r.draw_color(Color::RED, TransferMode::SrcOver);
        let frame = frame(&r);
        assert_eq!(frame.pixel(31, 40), RED);
        assert_eq!(frame.pixel(32, 40), CLEAR);
    }

    #[test]
    fn test_draw_color_snaps_fractional_clip() {
        let mut r = renderer();
        r.save(SaveFlags::MATRIX_CLIP);
        r.clip_rect(0.5, 0.0, 10.0, 64.0, RegionOp::Intersect);
        r.draw_color(Color::RED, TransferMode::SrcOver);
        let frame = frame(&r);
        assert_eq!(frame.pixel(0, 20), CLEAR);
        assert_eq!(frame.pixel(1, 20), RED);
        assert_eq!(frame.pixel(9, 20), RED);
        assert_eq!(frame.pixel(10, 20), CLEAR);
    }

    #[test]
    fn test_hairline_rect_outlines_edge_pixels() {
        let mut r = renderer();
        let status = r.draw_rect(10.0, 10.0, 30.0, 30.0, &Paint::stroke(Color::RED, 0.0));
        assert_eq!(status, DrawStatus::DREW);
        let frame = frame(&r);
        assert_eq!(frame.pixel(10, 20), RED);
        assert_eq!(frame.pixel(20, 10), RED);
        assert_eq!(frame.pixel(30, 20), RED);
        assert_eq!(frame.pixel(20, 30), RED);
        assert_eq!(frame.pixel(20, 20), CLEAR);
        assert_eq!(frame.pixel(9, 20), CLEAR);
        assert_eq!(frame.count(RED), 80);
    }

    #[test]
    fn test_translated_rect() {
        let mut r = renderer();
        r.translate(30.0, 5.0);
        r.draw_rect(0.0, 0.0, 4.0, 4.0, &Paint::fill(Color::RED));
        let frame = frame(&r);
        assert_eq!(frame.pixel(30, 5), RED);
        assert_eq!(frame.pixel(33, 8), RED);
        assert_eq!(frame.pixel(29, 5), CLEAR);
    }

    #[test]
    fn test_short_line_input_is_done() {
        let mut r = renderer();
        assert_eq!(r.draw_lines(&[0.0, 0.0, 1.0], &Paint::default()), DrawStatus::DONE);
        assert_eq!(r.draw_points(&[3.0], &Paint::default()), DrawStatus::DONE);
    }

    #[test]
    fn test_points_draw_squares() {
        let mut r = renderer();
        let paint = Paint::stroke(Color::RED, 4.0);
        assert_eq!(r.draw_points(&[10.0, 10.0], &paint), DrawStatus::DREW);
        let frame = frame(&r);
        assert_eq!(frame.pixel(10, 10), RED);
        assert_eq!(frame.pixel(20, 20), CLEAR);
    }

    #[test]
    fn test_bitmap_draws_at_position() {
        let mut r = renderer();
        let bitmap = Bitmap::from_fn(4, 4, |x, _| if x < 2 { Color::RED } else { Color::BLUE });
        assert_eq!(r.draw_bitmap(&bitmap, 8.0, 8.0, &Paint::default()), DrawStatus::DREW);
        let frame = frame(&r);
        assert_eq!(frame.pixel(8, 8), RED);
        assert_eq!(frame.pixel(11, 11), [0, 0, 255, 255]);
        assert_eq!(frame.pixel(12, 12), CLEAR);
        assert_eq!(r.caches().textures.len(), 1);
    }

    #[test]
    fn test_alpha8_bitmap_takes_paint_color() {
        let mut r = renderer();
        let bitmap = Bitmap::new(2, 2, BitmapConfig::Alpha8, vec![255; 4]);
        r.draw_bitmap(&bitmap, 0.0, 0.0, &Paint::fill(Color::RED));
        assert_eq!(frame(&r).pixel(1, 1), RED);
    }

    #[test]
    fn test_bitmap_mesh_rejects_short_input() {
        let mut r = renderer();
        let bitmap = Bitmap::from_color(2, 2, Color::RED);
        let status = r.draw_bitmap_mesh(&bitmap, 1, 1, &[0.0, 0.0, 1.0, 0.0], None, &Paint::default());
        assert_eq!(status, DrawStatus::DONE);
    }

    #[test]
    fn test_bitmap_mesh_covers_grid() {
        let mut r = renderer();
        let bitmap = Bitmap::from_color(2, 2, Color::RED);
        let vertices = [0.0, 0.0, 16.0, 0.0, 0.0, 16.0, 16.0, 16.0];
        let status = r.draw_bitmap_mesh(&bitmap, 1, 1, &vertices, None, &Paint::default());
        assert_eq!(status, DrawStatus::DREW);
        let frame = frame(&r);
        assert_eq!(frame.pixel(8, 8), RED);
        assert_eq!(frame.pixel(20, 8), CLEAR);
    }

    #[test]
    fn test_zero_alpha_rect_is_skipped() {
        let mut r = renderer();
        let paint = Paint::fill(Color::RED.with_alpha(0.0));
        assert_eq!(r.draw_rect(0.0, 0.0, 10.0, 10.0, &paint), DrawStatus::DONE);
    }
}
