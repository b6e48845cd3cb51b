//! Transfer mode to blend factor tables

use gloss_paint::TransferMode;

use crate::device::BlendFactor::{self, *};

/// Source and destination factors for every native mode, indexed by
/// [`TransferMode::index`]
const BLENDS: [(BlendFactor, BlendFactor); 15] = [
    (Zero, OneMinusSrcAlpha),             // Clear
    (One, Zero),                          // Src
    (Zero, One),                          // Dst
    (One, OneMinusSrcAlpha),              // SrcOver
    (OneMinusDstAlpha, One),              // DstOver
    (DstAlpha, Zero),                     // SrcIn
    (Zero, SrcAlpha),                     // DstIn
    (OneMinusDstAlpha, Zero),             // SrcOut
    (Zero, OneMinusSrcAlpha),             // DstOut
    (DstAlpha, OneMinusSrcAlpha),         // SrcATop
    (OneMinusDstAlpha, SrcAlpha),         // DstATop
    (OneMinusDstAlpha, OneMinusSrcAlpha), // Xor
    (One, One),                           // Plus
    (Zero, SrcColor),                     // Modulate
    (One, OneMinusSrcColor),              // Screen
];

/// Same modes with source and destination exchanged. Used when the incoming
/// pixels are logically the destination, e.g. drawing the background under
/// an existing layer.
const BLENDS_SWAP: [(BlendFactor, BlendFactor); 15] = [
    (OneMinusDstAlpha, Zero),             // Clear
    (Zero, One),                          // Src
    (One, Zero),                          // Dst
    (OneMinusDstAlpha, One),              // SrcOver
    (One, OneMinusSrcAlpha),              // DstOver
    (Zero, SrcAlpha),                     // SrcIn
    (DstAlpha, Zero),                     // DstIn
    (Zero, OneMinusSrcAlpha),             // SrcOut
    (OneMinusDstAlpha, Zero),             // DstOut
    (OneMinusDstAlpha, SrcAlpha),         // SrcATop
    (DstAlpha, OneMinusSrcAlpha),         // DstATop
    (OneMinusDstAlpha, OneMinusSrcAlpha), // Xor
    (One, One),                           // Plus
    (DstColor, Zero),                     // Modulate
    (OneMinusDstColor, One),              // Screen
];

/// Blend factors for a native mode. `None` for modes that need
/// framebuffer reads.
pub fn blend_factors(mode: TransferMode, swap_src_dst: bool) -> Option<(BlendFactor, BlendFactor)> {
    let table = if swap_src_dst { &BLENDS_SWAP } else { &BLENDS };
    table.get(mode.index()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_src_over_and_swap() {
        assert_eq!(
            blend_factors(TransferMode::SrcOver, false),
            Some((One, OneMinusSrcAlpha))
        );
        assert_eq!(
            blend_factors(TransferMode::SrcOver, true),
            Some((OneMinusDstAlpha, One))
        );
    }

    #[test]
    fn test_advanced_modes_have_no_factors() {
        assert_eq!(blend_factors(TransferMode::Screen, false), Some((One, OneMinusSrcColor)));
        assert_eq!(blend_factors(TransferMode::Overlay, false), None);
        assert_eq!(blend_factors(TransferMode::Multiply, true), None);
    }
}
