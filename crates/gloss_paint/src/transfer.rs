//! Transfer modes
//!
//! The ordering matches the classic Porter-Duff-then-separable list, so
//! every mode up to and including [`TransferMode::Screen`] can be expressed
//! with fixed-function blend factors.

/// Pixel compositing operator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransferMode {
    Clear = 0,
    Src,
    Dst,
    #[default]
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcATop,
    DstATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
}

impl TransferMode {
    /// Last mode with fixed-function blend factors
    pub const LAST_NATIVE: TransferMode = TransferMode::Screen;

    pub const ALL: [TransferMode; 25] = [
        TransferMode::Clear,
        TransferMode::Src,
        TransferMode::Dst,
        TransferMode::SrcOver,
        TransferMode::DstOver,
        TransferMode::SrcIn,
        TransferMode::DstIn,
        TransferMode::SrcOut,
        TransferMode::DstOut,
        TransferMode::SrcATop,
        TransferMode::DstATop,
        TransferMode::Xor,
        TransferMode::Plus,
        TransferMode::Modulate,
        TransferMode::Screen,
        TransferMode::Overlay,
        TransferMode::Darken,
        TransferMode::Lighten,
        TransferMode::ColorDodge,
        TransferMode::ColorBurn,
        TransferMode::HardLight,
        TransferMode::SoftLight,
        TransferMode::Difference,
        TransferMode::Exclusion,
        TransferMode::Multiply,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// True when the mode maps onto blend factors
    pub fn is_native(self) -> bool {
        self <= Self::LAST_NATIVE
    }

    /// Composite premultiplied `src` over premultiplied `dst`
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let (sa, da) = (src[3], dst[3]);
        let porter_duff = |fs: f32, fd: f32| {
            let mut out = [0.0; 4];
            for i in 0..4 {
                out[i] = (src[i] * fs + dst[i] * fd).min(1.0);
            }
            out
        };
        match self {
            TransferMode::Clear => [0.0; 4],
            TransferMode::Src => src,
            TransferMode::Dst => dst,
            TransferMode::SrcOver => porter_duff(1.0, 1.0 - sa),
            TransferMode::DstOver => porter_duff(1.0 - da, 1.0),
            TransferMode::SrcIn => porter_duff(da, 0.0),
            TransferMode::DstIn => porter_duff(0.0, sa),
            TransferMode::SrcOut => porter_duff(1.0 - da, 0.0),
            TransferMode::DstOut => porter_duff(0.0, 1.0 - sa),
            TransferMode::SrcATop => porter_duff(da, 1.0 - sa),
            TransferMode::DstATop => porter_duff(1.0 - da, sa),
            TransferMode::Xor => porter_duff(1.0 - da, 1.0 - sa),
            TransferMode::Plus => porter_duff(1.0, 1.0),
            TransferMode::Modulate => {
                let mut out = [0.0; 4];
                for i in 0..4 {
                    out[i] = src[i] * dst[i];
                }
                out
            }
            _ => {
                let mut out = [0.0; 4];
                for i in 0..3 {
                    let cs = if sa > 0.0 { src[i] / sa } else { 0.0 };
                    let cd = if da > 0.0 { dst[i] / da } else { 0.0 };
                    out[i] = src[i] * (1.0 - da)
                        + dst[i] * (1.0 - sa)
                        + sa * da * self.separable(cs, cd);
                }
                out[3] = sa + da - sa * da;
                out
            }
        }
    }

    /// Separable blend function on unpremultiplied channels
    fn separable(self, cs: f32, cd: f32) -> f32 {
        let hard_light = |cs: f32, cd: f32| {
            if cs <= 0.5 {
                2.0 * cs * cd
            } else {
                let s = 2.0 * cs - 1.0;
                s + cd - s * cd
            }
        };
        match self {
            TransferMode::Screen => cs + cd - cs * cd,
            TransferMode::Multiply => cs * cd,
            TransferMode::Overlay => hard_light(cd, cs),
            TransferMode::Darken => cs.min(cd),
            TransferMode::Lighten => cs.max(cd),
            TransferMode::ColorDodge => {
                if cd == 0.0 {
                    0.0
                } else if cs >= 1.0 {
                    1.0
                } else {
                    (cd / (1.0 - cs)).min(1.0)
                }
            }
            TransferMode::ColorBurn => {
                if cd >= 1.0 {
                    1.0
                } else if cs <= 0.0 {
                    0.0
                } else {
                    1.0 - ((1.0 - cd) / cs).min(1.0)
                }
            }
            TransferMode::HardLight => hard_light(cs, cd),
            TransferMode::SoftLight => {
                if cs <= 0.5 {
                    cd - (1.0 - 2.0 * cs) * cd * (1.0 - cd)
                } else {
                    let d = if cd <= 0.25 {
                        ((16.0 * cd - 12.0) * cd + 4.0) * cd
                    } else {
                        cd.sqrt()
                    };
                    cd + (2.0 * cs - 1.0) * (d - cd)
                }
            }
            TransferMode::Difference => (cs - cd).abs(),
            TransferMode::Exclusion => cs + cd - 2.0 * cs * cd,
            _ => cs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 4], b: [f32; 4]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_native_boundary() {
        assert!(TransferMode::Screen.is_native());
        assert!(TransferMode::Plus.is_native());
        assert!(!TransferMode::Overlay.is_native());
        assert!(!TransferMode::Multiply.is_native());
        assert_eq!(TransferMode::ALL[TransferMode::Multiply.index()], TransferMode::Multiply);
    }

    #[test]
    fn test_src_over_half_red_on_white() {
        let out = TransferMode::SrcOver.apply([0.5, 0.0, 0.0, 0.5], [1.0, 1.0, 1.0, 1.0]);
        assert!(close(out, [1.0, 0.5, 0.5, 1.0]));
    }

    #[test]
    fn test_multiply_opaque() {
        let out = TransferMode::Multiply.apply([0.5, 1.0, 0.0, 1.0], [0.5, 0.5, 1.0, 1.0]);
        assert!(close(out, [0.25, 0.5, 0.0, 1.0]));
    }

    #[test]
    fn test_screen_matches_separable_formula() {
        let src = [0.2, 0.4, 0.6, 1.0];
        let dst = [0.5, 0.5, 0.5, 1.0];
        let out = TransferMode::Screen.apply(src, dst);
        assert!(close(out, [0.6, 0.7, 0.8, 1.0]));
    }
}
