//! Renderer configuration
//!
//! Read from a TOML table, with every field optional:
//!
//! ```toml
//! scissor_optimization_disabled = false
//!
//! [debug]
//! overdraw = true
//! stencil_clip = "highlight"
//!
//! [caches]
//! texture_cache_bytes = 25165824
//! ```
//!
//! Environment switches (`1` or `true` enable) override the file:
//! `GLOSS_DISABLE_SCISSOR_OPTIMIZATION`, `GLOSS_DISABLE_DRAW_DEFER`,
//! `GLOSS_DISABLE_DRAW_REORDER`, `GLOSS_DEBUG_OVERDRAW`,
//! `GLOSS_DEBUG_LAYERS_UPDATES`, `GLOSS_DEBUG_MEMORY`,
//! `GLOSS_DEBUG_CHECK_ERRORS` and `GLOSS_DEBUG_STENCIL_CLIP`
//! (`hide`, `highlight` or `region`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Could not read the file
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How stencil clipping is visualized
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StencilClipDebug {
    #[default]
    Hide,
    /// Tint draws that pass through a stencil clip
    Highlight,
    /// Draw the stencil clip region itself
    Region,
}

/// Debug overlays and diagnostics
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub overdraw: bool,
    #[serde(default)]
    pub stencil_clip: StencilClipDebug,
    #[serde(default)]
    pub layers_updates: bool,
    #[serde(default)]
    pub memory: bool,
    #[serde(default = "default_check_errors")]
    pub check_errors: bool,
}

fn default_check_errors() -> bool {
    cfg!(debug_assertions)
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            overdraw: false,
            stencil_clip: StencilClipDebug::Hide,
            layers_updates: false,
            memory: false,
            check_errors: default_check_errors(),
        }
    }
}

/// Cache budgets
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_texture_cache_bytes")]
    pub texture_cache_bytes: usize,
    #[serde(default = "default_layer_cache_bytes")]
    pub layer_cache_bytes: usize,
    #[serde(default = "default_render_buffer_cache_bytes")]
    pub render_buffer_cache_bytes: usize,
    #[serde(default = "default_fbo_cache_size")]
    pub fbo_cache_size: usize,
    #[serde(default = "default_path_cache_bytes")]
    pub path_cache_bytes: usize,
    #[serde(default = "default_patch_cache_entries")]
    pub patch_cache_entries: usize,
    #[serde(default = "default_drop_shadow_cache_bytes")]
    pub drop_shadow_cache_bytes: usize,
    #[serde(default = "default_gradient_cache_bytes")]
    pub gradient_cache_bytes: usize,
}

const MIB: usize = 1024 * 1024;

fn default_texture_cache_bytes() -> usize {
    24 * MIB
}

fn default_layer_cache_bytes() -> usize {
    16 * MIB
}

fn default_render_buffer_cache_bytes() -> usize {
    2 * MIB
}

fn default_fbo_cache_size() -> usize {
    16
}

fn default_path_cache_bytes() -> usize {
    10 * MIB
}

fn default_patch_cache_entries() -> usize {
    512
}

fn default_drop_shadow_cache_bytes() -> usize {
    2 * MIB
}

fn default_gradient_cache_bytes() -> usize {
    512 * 1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            texture_cache_bytes: default_texture_cache_bytes(),
            layer_cache_bytes: default_layer_cache_bytes(),
            render_buffer_cache_bytes: default_render_buffer_cache_bytes(),
            fbo_cache_size: default_fbo_cache_size(),
            path_cache_bytes: default_path_cache_bytes(),
            patch_cache_entries: default_patch_cache_entries(),
            drop_shadow_cache_bytes: default_drop_shadow_cache_bytes(),
            gradient_cache_bytes: default_gradient_cache_bytes(),
        }
    }
}

/// Top-level renderer configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RendererConfig {
    /// Never skip the scissor test, even when the clip contains the draw
    #[serde(default)]
    pub scissor_optimization_disabled: bool,
    /// Replay display lists immediately instead of through a deferred list
    #[serde(default)]
    pub draw_defer_disabled: bool,
    /// Deferred batching may not reorder draws
    #[serde(default)]
    pub draw_reorder_disabled: bool,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub caches: CacheConfig,
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let v = v.trim();
        v == "1" || v.eq_ignore_ascii_case("true")
    })
}

impl RendererConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Apply `GLOSS_*` environment overrides
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_flag("GLOSS_DISABLE_SCISSOR_OPTIMIZATION") {
            self.scissor_optimization_disabled = v;
        }
        if let Some(v) = env_flag("GLOSS_DISABLE_DRAW_DEFER") {
            self.draw_defer_disabled = v;
        }
        if let Some(v) = env_flag("GLOSS_DISABLE_DRAW_REORDER") {
            self.draw_reorder_disabled = v;
        }
        if let Some(v) = env_flag("GLOSS_DEBUG_OVERDRAW") {
            self.debug.overdraw = v;
        }
        if let Some(v) = env_flag("GLOSS_DEBUG_LAYERS_UPDATES") {
            self.debug.layers_updates = v;
        }
        if let Some(v) = env_flag("GLOSS_DEBUG_MEMORY") {
            self.debug.memory = v;
        }
        if let Some(v) = env_flag("GLOSS_DEBUG_CHECK_ERRORS") {
            self.debug.check_errors = v;
        }
        if let Ok(v) = std::env::var("GLOSS_DEBUG_STENCIL_CLIP") {
            match v.trim() {
                "hide" => self.debug.stencil_clip = StencilClipDebug::Hide,
                "highlight" => self.debug.stencil_clip = StencilClipDebug::Highlight,
                "region" => self.debug.stencil_clip = StencilClipDebug::Region,
                other => tracing::warn!("Ignoring unknown GLOSS_DEBUG_STENCIL_CLIP value {:?}", other),
            }
        }
        tracing::debug!(
            "renderer config: scissor_optimization_disabled={}, draw_defer_disabled={}, overdraw={}",
            self.scissor_optimization_disabled,
            self.draw_defer_disabled,
            self.debug.overdraw
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert!(!config.scissor_optimization_disabled);
        assert_eq!(config.caches.texture_cache_bytes, 24 * MIB);
        assert_eq!(config.caches.fbo_cache_size, 16);
        assert_eq!(config.debug.stencil_clip, StencilClipDebug::Hide);
    }

    #[test]
    fn test_partial_tables() {
        let config = RendererConfig::from_toml_str(
            r#"
            scissor_optimization_disabled = true

            [debug]
            overdraw = true
            stencil_clip = "region"

            [caches]
            layer_cache_bytes = 1024
            "#,
        )
        .unwrap();
        assert!(config.scissor_optimization_disabled);
        assert!(config.debug.overdraw);
        assert_eq!(config.debug.stencil_clip, StencilClipDebug::Region);
        assert_eq!(config.caches.layer_cache_bytes, 1024);
        assert_eq!(config.caches.path_cache_bytes, 10 * MIB);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = RendererConfig::from_toml_str("debug = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
