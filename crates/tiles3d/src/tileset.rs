//! Tileset, tile and per-frame state shared with every content.

use std::fmt;
use std::rc::Rc;

use glam::DVec3;
use tiles3d_decode::{BoundingSphere, Color};

use crate::content::TileContent;
use crate::error::Result;
use crate::options::{ClassificationType, TilesetOptions};
use crate::scheduler::DecodeScheduler;
use crate::worker::DecodeWorkerPool;

/// Owner of the settings and decode scheduler used by its contents.
pub struct Tileset {
    options: TilesetOptions,
    scheduler: Rc<dyn DecodeScheduler>,
}

impl Tileset {
    #[must_use]
    pub fn new(options: TilesetOptions, scheduler: Rc<dyn DecodeScheduler>) -> Self {
        Self { options, scheduler }
    }

    /// Create a tileset backed by a fresh [`DecodeWorkerPool`].
    pub fn with_worker_pool(options: TilesetOptions) -> Result<Self> {
        let pool = DecodeWorkerPool::from_options(&options)?;
        Ok(Self::new(options, Rc::new(pool)))
    }

    #[must_use]
    pub fn options(&self) -> &TilesetOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut TilesetOptions {
        &mut self.options
    }

    #[must_use]
    pub fn scheduler(&self) -> &dyn DecodeScheduler {
        self.scheduler.as_ref()
    }

    /// Turn debug coloring of `content` on or off, using
    /// [`TilesetOptions::debug_color`].
    pub fn apply_debug_settings(&self, content: &mut dyn TileContent, enabled: bool) {
        content.apply_debug_settings(enabled, self.options.debug_color);
    }
}

impl fmt::Debug for Tileset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tileset")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// The tile a content was loaded for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tile {
    pub id: u64,
    /// Volume enclosing the tile's content, when the tileset declares one.
    pub content_bounding_volume: Option<BoundingSphere>,
}

impl Tile {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            content_bounding_volume: None,
        }
    }
}

/// Render pass a frame is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pass {
    #[default]
    Render,
    Pick,
}

/// Draw request for one contiguous index range.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub offset: u32,
    pub count: u32,
    pub color: Color,
    pub wireframe: bool,
    pub classification_type: ClassificationType,
    pub bounding_volume: Option<BoundingSphere>,
    /// Feature drawn by this command during a pick pass.
    pub batch_id: Option<u32>,
}

/// Per-frame state contents read from and push commands into.
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    pub frame_number: u64,
    pub pass: Pass,
    pub commands: Vec<DrawCommand>,
}

impl FrameState {
    #[must_use]
    pub fn new(frame_number: u64) -> Self {
        Self {
            frame_number,
            ..Self::default()
        }
    }

    /// Advance to the next frame, dropping last frame's commands.
    pub fn next_frame(&mut self) {
        self.frame_number += 1;
        self.commands.clear();
    }
}

/// Pick ray in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    #[must_use]
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }
}
