//! Gloss GPU Renderer
//!
//! A stateful 2D canvas renderer over a GL-style device.
//!
//! # Features
//!
//! - Save/restore stack of transform, clip, alpha and target
//! - Rectangular clips through the scissor, complex clips through the stencil
//! - Offscreen layers with dirty region tracking and cached hardware layers
//! - Shapes, paths, bitmaps, nine-patches, meshes and text
//! - Shaders, color filters, drop shadows and every transfer mode
//! - Deferred display list replay and foreign draw functors
//! - Texture, path, gradient, patch and shadow caches under byte budgets
//!
//! The [`GpuDevice`] trait is the only thing a host implements. With the
//! `headless` feature, [`headless::SoftwareDevice`] renders on the CPU.

pub mod blend;
pub mod caches;
pub mod config;
pub mod device;
pub mod display_list;
pub mod error;
pub mod font;
pub mod functor;
pub mod gradient_cache;
pub mod layer;
pub mod modifiers;
pub mod patch_cache;
pub mod program;
pub mod shadow_cache;
pub mod shape_cache;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod tessellator;
pub mod texture;
pub mod vertex;

mod renderer;

#[cfg(feature = "headless")]
pub mod headless;

pub use caches::Caches;
pub use config::{CacheConfig, ConfigError, DebugConfig, RendererConfig};
pub use device::{
    BlendFactor, DeviceLimits, DrawCall, FramebufferId, GpuDevice, ProgramId, RenderBufferId, StencilMode,
    TextureFilter, TextureFormat, TextureId, TextureWrap, Topology, Uniforms, VertexData,
};
pub use display_list::{Canvas, DisplayList, DisplayListBuilder, RecordedDisplayList};
pub use error::{GpuError, Result};
pub use font::FontRenderer;
pub use functor::{Functor, FunctorContext, FunctorId, FunctorInfo, FunctorMode};
pub use layer::{Layer, LayerRef, SharedLayer};
pub use modifiers::{DrawModifiers, DropShadow};
pub use renderer::Renderer;
pub use snapshot::SaveFlags;
pub use status::{DrawStatus, ReplayFlags};
