//! Color types and utilities

/// RGBA color with f32 components (0.0 to 1.0), not premultiplied
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const RED: Color = Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const GREEN: Color = Color {
        r: 0.0,
        g: 1.0,
        b: 0.0,
        a: 1.0,
    };
    pub const BLUE: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Create from u8 components (0-255)
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Create from a packed `0xAARRGGBB` value
    pub fn from_argb(argb: u32) -> Self {
        Self::from_rgba8(
            ((argb >> 16) & 0xFF) as u8,
            ((argb >> 8) & 0xFF) as u8,
            (argb & 0xFF) as u8,
            ((argb >> 24) & 0xFF) as u8,
        )
    }

    /// Pack into `0xAARRGGBB`
    pub fn to_argb(&self) -> u32 {
        let [r, g, b, a] = self.to_rgba8();
        ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
    }

    /// Alpha as an integer in 0..=255
    pub fn alpha8(&self) -> u8 {
        (self.a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
    }

    /// Set alpha and return new color
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { a: alpha, ..self }
    }

    /// Same color with alpha forced to opaque, used when a shader supplies the RGB
    pub fn opaque_rgb(self) -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
            a: self.a,
        }
    }

    /// Premultiplied components scaled by an extra alpha factor
    pub fn premultiplied(&self, alpha: f32) -> [f32; 4] {
        let a = self.a * alpha;
        [self.r * a, self.g * a, self.b * a, a]
    }

    /// Convert to u8 array [r, g, b, a]
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.g.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.b.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_round_trip_of_half_red() {
        let color = Color::from_argb(0x80FF0000);
        assert_eq!(color.alpha8(), 0x80);
        assert_eq!(color.to_argb(), 0x80FF0000);
    }

    #[test]
    fn test_premultiplied_applies_extra_alpha() {
        let color = Color::new(1.0, 0.5, 0.0, 0.5);
        let p = color.premultiplied(0.5);
        assert!((p[0] - 0.25).abs() < 1e-6);
        assert!((p[1] - 0.125).abs() < 1e-6);
        assert!((p[3] - 0.25).abs() < 1e-6);
    }
}
