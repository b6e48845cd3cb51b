//! Nine-patch descriptions

/// Marker in [`NinePatch::colors`] for a quad that must be drawn
pub const NO_COLOR: u32 = 0x0000_0001;
/// Marker in [`NinePatch::colors`] for a fully transparent quad
pub const TRANSPARENT_COLOR: u32 = 0x0000_0000;

/// Stretchable regions of a bitmap
///
/// `x_divs` and `y_divs` hold alternating fixed/stretchable boundaries in
/// bitmap pixels: `[s0, e0, s1, e1, ...]` where each `[s, e)` stretches.
/// `colors` has one entry per quad, row major; quads marked
/// [`TRANSPARENT_COLOR`] are skipped when building the mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NinePatch {
    pub x_divs: Vec<i32>,
    pub y_divs: Vec<i32>,
    pub colors: Vec<u32>,
}

impl NinePatch {
    pub fn new(x_divs: Vec<i32>, y_divs: Vec<i32>) -> Self {
        Self {
            x_divs,
            y_divs,
            colors: Vec::new(),
        }
    }

    pub fn with_colors(mut self, colors: Vec<u32>) -> Self {
        self.colors = colors;
        self
    }

    /// Color marker of quad `index`, [`NO_COLOR`] when unspecified
    pub fn color(&self, index: usize) -> u32 {
        self.colors.get(index).copied().unwrap_or(NO_COLOR)
    }

    pub fn has_empty_quads(&self) -> bool {
        self.colors.iter().any(|&c| c == TRANSPARENT_COLOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_color_defaults_to_drawn() {
        let patch = NinePatch::new(vec![1, 2], vec![1, 2]).with_colors(vec![NO_COLOR, TRANSPARENT_COLOR]);
        assert_eq!(patch.color(0), NO_COLOR);
        assert_eq!(patch.color(1), TRANSPARENT_COLOR);
        assert_eq!(patch.color(8), NO_COLOR);
        assert!(patch.has_empty_quads());
    }
}
