//! The capability set every kind of tile content implements.

use std::rc::Rc;

use glam::DVec3;
use serde_json::{Map, Value};
use tiles3d_decode::Color;

use crate::batch_table::{Feature, SharedBatchTable, TileStyle};
use crate::error::Result;
use crate::tileset::{FrameState, Ray, Tileset};

/// Metadata attached to a content by the tileset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentMetadata {
    pub properties: Map<String, Value>,
}

/// Group a content belongs to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentGroup {
    pub name: String,
    pub metadata: ContentMetadata,
}

/// Loaded tile content, dispatched dynamically by the tileset.
///
/// Statistics default to zero. Containers report zero as well and callers
/// query [`TileContent::inner_contents`] instead.
pub trait TileContent {
    /// Short name of the content kind, for logs.
    fn content_type(&self) -> &'static str;

    fn ready(&self) -> bool;

    /// Per-frame work: advance decoding and push draw commands.
    ///
    /// A failed decode is returned by exactly one call.
    fn update(&mut self, tileset: &Tileset, frame_state: &mut FrameState) -> Result<()>;

    fn apply_style(&mut self, style: &dyn TileStyle);

    fn apply_debug_settings(&mut self, enabled: bool, color: Color);

    /// Closest intersection of `ray` with this content.
    fn pick(&self, ray: &Ray, frame_state: &FrameState) -> Option<DVec3>;

    fn has_property(&self, batch_id: u32, name: &str) -> bool;

    fn get_feature(&mut self, batch_id: u32) -> Option<Feature>;

    fn destroy(&mut self);

    fn is_destroyed(&self) -> bool;

    fn metadata(&self) -> Option<&Rc<ContentMetadata>>;

    fn set_metadata(&mut self, metadata: Option<Rc<ContentMetadata>>);

    fn group(&self) -> Option<&Rc<ContentGroup>>;

    fn set_group(&mut self, group: Option<Rc<ContentGroup>>);

    fn inner_contents(&self) -> Option<&[Box<dyn TileContent>]> {
        None
    }

    fn batch_table(&self) -> Option<SharedBatchTable> {
        None
    }

    fn features_length(&self) -> usize {
        0
    }

    fn points_length(&self) -> usize {
        0
    }

    fn triangles_length(&self) -> usize {
        0
    }

    fn geometry_byte_length(&self) -> usize {
        0
    }

    fn textures_byte_length(&self) -> usize {
        0
    }

    fn batch_table_byte_length(&self) -> usize {
        0
    }
}

/// Check a caller precondition.
///
/// Debug builds panic; release builds log and report the violation so the
/// operation can be skipped.
pub(crate) fn precondition(holds: bool, message: &str) -> bool {
    debug_assert!(holds, "{message}");
    if !holds {
        tracing::error!("Precondition violated: {}", message);
    }
    holds
}
