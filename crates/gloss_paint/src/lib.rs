//! Gloss Paint
//!
//! The drawing vocabulary shared by the renderer and its callers.
//!
//! # Features
//!
//! - Float rectangles with pixel snapping and integer rectangles
//! - 4x4 transforms with rect-to-rect classification
//! - Banded pixel regions with boolean set operations
//! - Paths with rect, oval, round rect and arc helpers
//! - Paints, transfer modes, shaders and color filters
//! - Bitmaps and nine-patch descriptions

pub mod bitmap;
pub mod color;
pub mod matrix;
pub mod paint;
pub mod patch;
pub mod path;
pub mod primitives;
pub mod region;
pub mod shader;
pub mod transfer;

pub use bitmap::{Bitmap, BitmapConfig};
pub use color::Color;
pub use matrix::Matrix4;
pub use paint::{Paint, PaintFlags, PaintStyle, PathEffect, StrokeCap, StrokeJoin, TextAlign};
pub use patch::NinePatch;
pub use path::{FillType, Path, PathBuilder, PathCommand, Point};
pub use primitives::{IRect, Rect};
pub use region::{Region, RegionOp};
pub use shader::{ColorFilter, GradientStop, Shader, TileMode};
pub use transfer::TransferMode;
