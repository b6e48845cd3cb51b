//! Shaders and color filters
//!
//! Both are descriptions only. The renderer turns them into program bits and
//! uniforms; [`ColorFilter::apply`] and [`TileMode::apply`] give the exact
//! per-pixel math so every backend agrees.

use smallvec::SmallVec;

use crate::bitmap::Bitmap;
use crate::color::Color;
use crate::matrix::Matrix4;
use crate::path::Point;
use crate::transfer::TransferMode;

/// How a shader samples outside its unit domain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

impl TileMode {
    /// Fold `t` into `[0, 1]`
    pub fn apply(self, t: f32) -> f32 {
        match self {
            TileMode::Clamp => t.clamp(0.0, 1.0),
            TileMode::Repeat => t - t.floor(),
            TileMode::Mirror => {
                let m = t.rem_euclid(2.0);
                if m > 1.0 {
                    2.0 - m
                } else {
                    m
                }
            }
        }
    }
}

/// A color stop in a gradient
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    /// Position along the gradient (0.0 to 1.0)
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// Paint source replacing the solid paint color
#[derive(Clone, Debug, PartialEq)]
pub enum Shader {
    LinearGradient {
        start: Point,
        end: Point,
        stops: SmallVec<[GradientStop; 4]>,
        tile_mode: TileMode,
        local_matrix: Matrix4,
    },
    RadialGradient {
        center: Point,
        radius: f32,
        stops: SmallVec<[GradientStop; 4]>,
        tile_mode: TileMode,
        local_matrix: Matrix4,
    },
    /// Angular gradient starting on the positive x axis, clockwise
    SweepGradient {
        center: Point,
        stops: SmallVec<[GradientStop; 4]>,
        local_matrix: Matrix4,
    },
    Bitmap {
        bitmap: Bitmap,
        tile_x: TileMode,
        tile_y: TileMode,
        local_matrix: Matrix4,
    },
    /// `second` composited onto `first` with `mode`. Neither side may itself
    /// be a compose shader.
    Compose {
        first: Box<Shader>,
        second: Box<Shader>,
        mode: TransferMode,
        local_matrix: Matrix4,
    },
}

fn two_stops(from: Color, to: Color) -> SmallVec<[GradientStop; 4]> {
    SmallVec::from_slice(&[GradientStop::new(0.0, from), GradientStop::new(1.0, to)])
}

impl Shader {
    /// Two-stop linear gradient
    pub fn linear(start: Point, end: Point, from: Color, to: Color) -> Self {
        Shader::LinearGradient {
            start,
            end,
            stops: two_stops(from, to),
            tile_mode: TileMode::Clamp,
            local_matrix: Matrix4::IDENTITY,
        }
    }

    /// Two-stop radial gradient, `from` at the center
    pub fn radial(center: Point, radius: f32, from: Color, to: Color) -> Self {
        Shader::RadialGradient {
            center,
            radius,
            stops: two_stops(from, to),
            tile_mode: TileMode::Clamp,
            local_matrix: Matrix4::IDENTITY,
        }
    }

    pub fn sweep(center: Point, stops: &[GradientStop]) -> Self {
        Shader::SweepGradient {
            center,
            stops: SmallVec::from_slice(stops),
            local_matrix: Matrix4::IDENTITY,
        }
    }

    /// Returns `None` when either side is already a compose shader
    pub fn compose(first: Shader, second: Shader, mode: TransferMode) -> Option<Self> {
        if first.is_compose() || second.is_compose() {
            return None;
        }
        Some(Shader::Compose {
            first: Box::new(first),
            second: Box::new(second),
            mode,
            local_matrix: Matrix4::IDENTITY,
        })
    }

    pub fn is_compose(&self) -> bool {
        matches!(self, Shader::Compose { .. })
    }

    pub fn bitmap(bitmap: Bitmap, tile_x: TileMode, tile_y: TileMode) -> Self {
        Shader::Bitmap {
            bitmap,
            tile_x,
            tile_y,
            local_matrix: Matrix4::IDENTITY,
        }
    }

    /// Matrix from the shader's own space into paint space. For a compose
    /// shader it applies on top of each side's own matrix.
    pub fn local_matrix(&self) -> &Matrix4 {
        match self {
            Shader::LinearGradient { local_matrix, .. }
            | Shader::RadialGradient { local_matrix, .. }
            | Shader::SweepGradient { local_matrix, .. }
            | Shader::Bitmap { local_matrix, .. }
            | Shader::Compose { local_matrix, .. } => local_matrix,
        }
    }

    pub fn with_local_matrix(mut self, matrix: Matrix4) -> Self {
        match &mut self {
            Shader::LinearGradient { local_matrix, .. }
            | Shader::RadialGradient { local_matrix, .. }
            | Shader::SweepGradient { local_matrix, .. }
            | Shader::Bitmap { local_matrix, .. }
            | Shader::Compose { local_matrix, .. } => *local_matrix = matrix,
        }
        self
    }

    /// Gradient stops, for the gradient variants
    pub fn stops(&self) -> Option<&[GradientStop]> {
        match self {
            Shader::LinearGradient { stops, .. }
            | Shader::RadialGradient { stops, .. }
            | Shader::SweepGradient { stops, .. } => Some(stops),
            Shader::Bitmap { .. } | Shader::Compose { .. } => None,
        }
    }

    /// Tiling along the shader domain's x and y
    pub fn tile_modes(&self) -> (TileMode, TileMode) {
        match self {
            Shader::LinearGradient { tile_mode, .. } | Shader::RadialGradient { tile_mode, .. } => {
                (*tile_mode, *tile_mode)
            }
            Shader::SweepGradient { .. } | Shader::Compose { .. } => (TileMode::Clamp, TileMode::Clamp),
            Shader::Bitmap { tile_x, tile_y, .. } => (*tile_x, *tile_y),
        }
    }

    /// True when the shader can produce translucent pixels
    pub fn blend(&self) -> bool {
        match self {
            Shader::LinearGradient { stops, .. }
            | Shader::RadialGradient { stops, .. }
            | Shader::SweepGradient { stops, .. } => stops.iter().any(|s| s.color.a < 1.0),
            Shader::Bitmap { bitmap, .. } => !bitmap.is_opaque(),
            Shader::Compose { first, second, mode, .. } => {
                first.blend() || second.blend() || *mode != TransferMode::SrcOver
            }
        }
    }
}

/// Color transform applied after shading
#[derive(Clone, Debug, PartialEq)]
pub enum ColorFilter {
    /// 4x5 row-major matrix; the fifth column is an offset in 0..255 units
    Matrix([f32; 20]),
    /// `color * mul + add` on rgb
    Lighting { mul: Color, add: Color },
    /// Blend a constant color onto the source with a transfer mode
    Blend { color: Color, mode: TransferMode },
}

impl ColorFilter {
    /// True when the filter can make opaque pixels translucent
    pub fn blend(&self) -> bool {
        match self {
            ColorFilter::Matrix(m) => {
                m[15] != 0.0 || m[16] != 0.0 || m[17] != 0.0 || m[18] != 1.0 || m[19] != 0.0
            }
            ColorFilter::Lighting { .. } => false,
            ColorFilter::Blend { .. } => true,
        }
    }

    /// Filter a premultiplied color
    pub fn apply(&self, premul: [f32; 4]) -> [f32; 4] {
        match self {
            ColorFilter::Matrix(m) => {
                let a = premul[3];
                let un = if a > 0.0 {
                    [premul[0] / a, premul[1] / a, premul[2] / a, a]
                } else {
                    [0.0; 4]
                };
                let mut out = [0.0f32; 4];
                for (row, o) in out.iter_mut().enumerate() {
                    let r = &m[row * 5..row * 5 + 5];
                    *o = (r[0] * un[0] + r[1] * un[1] + r[2] * un[2] + r[3] * un[3] + r[4] / 255.0)
                        .clamp(0.0, 1.0);
                }
                [out[0] * out[3], out[1] * out[3], out[2] * out[3], out[3]]
            }
            ColorFilter::Lighting { mul, add } => {
                let a = premul[3];
                let ch = |c: f32, m: f32, d: f32| (c * m + d * a).clamp(0.0, a);
                [
                    ch(premul[0], mul.r, add.r),
                    ch(premul[1], mul.g, add.g),
                    ch(premul[2], mul.b, add.b),
                    a,
                ]
            }
            ColorFilter::Blend { color, mode } => mode.apply(color.premultiplied(1.0), premul),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_modes() {
        assert_eq!(TileMode::Clamp.apply(1.5), 1.0);
        assert!((TileMode::Repeat.apply(1.25) - 0.25).abs() < 1e-6);
        assert!((TileMode::Mirror.apply(1.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_blend_follows_stop_alpha() {
        let opaque = Shader::linear(Point::ZERO, Point::new(1.0, 0.0), Color::RED, Color::BLUE);
        assert!(!opaque.blend());
        let translucent = Shader::linear(
            Point::ZERO,
            Point::new(1.0, 0.0),
            Color::RED,
            Color::TRANSPARENT,
        );
        assert!(translucent.blend());
    }

    #[test]
    fn test_compose_rejects_nesting() {
        let gradient = || Shader::radial(Point::ZERO, 4.0, Color::RED, Color::BLUE);
        let composed = Shader::compose(gradient(), gradient(), TransferMode::Multiply)
            .expect("flat compose");
        assert!(composed.blend());
        assert!(Shader::compose(composed, gradient(), TransferMode::SrcOver).is_none());
    }

    #[test]
    fn test_sweep_keeps_its_stops() {
        let stops = [
            GradientStop::new(0.0, Color::RED),
            GradientStop::new(0.5, Color::GREEN),
            GradientStop::new(1.0, Color::RED),
        ];
        let sweep = Shader::sweep(Point::new(8.0, 8.0), &stops);
        assert_eq!(sweep.stops(), Some(&stops[..]));
        assert_eq!(sweep.tile_modes(), (TileMode::Clamp, TileMode::Clamp));
        assert!(!sweep.blend());
    }

    #[test]
    fn test_identity_matrix_filter_is_noop() {
        let mut m = [0.0; 20];
        m[0] = 1.0;
        m[6] = 1.0;
        m[12] = 1.0;
        m[18] = 1.0;
        let filter = ColorFilter::Matrix(m);
        assert!(!filter.blend());
        let out = filter.apply([0.25, 0.5, 0.0, 0.5]);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_blend_filter_src_in_tints() {
        let filter = ColorFilter::Blend {
            color: Color::GREEN,
            mode: TransferMode::SrcIn,
        };
        let out = filter.apply([1.0, 0.0, 0.0, 1.0]);
        assert_eq!(out, [0.0, 1.0, 0.0, 1.0]);
    }
}
