//! Tileset-wide settings.

use tiles3d_decode::Color;

/// Which scene geometry classification commands apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClassificationType {
    Terrain,
    Cesium3DTile,
    #[default]
    Both,
}

/// Settings shared by every content of a tileset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TilesetOptions {
    /// Draw batched geometry as wireframe.
    pub debug_wireframe: bool,
    /// Classification applied to vector geometry draw commands.
    pub classification_type: ClassificationType,
    /// Color used when debug coloring is enabled.
    pub debug_color: Color,
    /// Maximum number of geometry decodes in flight at once.
    pub maximum_active_decodes: usize,
    /// Number of background decode threads.
    pub decode_workers: usize,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            debug_wireframe: false,
            classification_type: ClassificationType::default(),
            debug_color: Color::RED,
            maximum_active_decodes: 4,
            decode_workers: std::thread::available_parallelism()
                .map_or(1, |n| n.get().saturating_sub(1).max(1)),
        }
    }
}
