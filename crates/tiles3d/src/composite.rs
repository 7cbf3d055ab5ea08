//! Composite content: a container whose inner tiles are decoded by their
//! own factories and presented as one content.

use std::rc::Rc;

use futures_util::future::try_join_all;
use glam::DVec3;
use tiles3d_decode::{Color, CompositeHeader, DecodeError};

use crate::batch_table::{Feature, TileStyle};
use crate::content::{ContentGroup, ContentMetadata, TileContent, precondition};
use crate::error::Result;
use crate::factory::FactoryContext;
use crate::resource::Resource;
use crate::tileset::{FrameState, Ray, Tile, Tileset};

/// Decode the composite container at `ctx.byte_offset`.
///
/// Inner tiles are located one after another, each dispatched to the factory
/// registered for its magic, and the factories run concurrently. The first
/// failure aborts the whole composite.
pub async fn decode_composite(ctx: FactoryContext) -> Result<CompositeContent> {
    let FactoryContext {
        tileset,
        tile,
        resource,
        buffer,
        byte_offset,
        factories,
    } = ctx;

    let header = CompositeHeader::parse(&buffer, byte_offset)?;
    tracing::debug!(
        "Composite at {} offset {}: {} inner tiles, {} bytes",
        resource.cache_key(),
        byte_offset,
        header.tiles_length,
        header.byte_length
    );

    let mut pending = Vec::with_capacity(header.tiles_length as usize);
    for span in header.children(&buffer, byte_offset) {
        let span = span?;
        let factory = factories
            .get(&span.magic)
            .ok_or_else(|| DecodeError::UnknownContentType {
                magic: span.magic_str(),
            })?;
        tracing::trace!(
            "Inner tile {} ({}) at offset {}",
            span.index,
            span.magic_str(),
            span.byte_offset
        );
        pending.push(factory(FactoryContext {
            tileset: Rc::clone(&tileset),
            tile: Rc::clone(&tile),
            resource: resource.composite_child(span.index),
            buffer: Rc::clone(&buffer),
            byte_offset: span.byte_offset,
            factories: Rc::clone(&factories),
        }));
    }

    let contents = try_join_all(pending).await?;
    Ok(CompositeContent::new(tileset, tile, resource, contents))
}

/// Ordered inner contents presented as a single content.
pub struct CompositeContent {
    tileset: Rc<Tileset>,
    tile: Rc<Tile>,
    resource: Resource,
    contents: Vec<Box<dyn TileContent>>,
    metadata: Option<Rc<ContentMetadata>>,
    group: Option<Rc<ContentGroup>>,
    ready: bool,
    destroyed: bool,
}

impl CompositeContent {
    #[must_use]
    pub fn new(
        tileset: Rc<Tileset>,
        tile: Rc<Tile>,
        resource: Resource,
        contents: Vec<Box<dyn TileContent>>,
    ) -> Self {
        Self {
            tileset,
            tile,
            resource,
            contents,
            metadata: None,
            group: None,
            ready: false,
            destroyed: false,
        }
    }

    #[must_use]
    pub fn tileset(&self) -> &Rc<Tileset> {
        &self.tileset
    }

    #[must_use]
    pub fn tile(&self) -> &Rc<Tile> {
        &self.tile
    }

    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    #[must_use]
    pub fn contents(&self) -> &[Box<dyn TileContent>] {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut [Box<dyn TileContent>] {
        &mut self.contents
    }

    fn live(&self, operation: &str) -> bool {
        precondition(
            !self.destroyed,
            &format!("{operation} called on a destroyed composite content"),
        )
    }
}

impl TileContent for CompositeContent {
    fn content_type(&self) -> &'static str {
        "composite"
    }

    fn ready(&self) -> bool {
        self.ready
    }

    fn update(&mut self, tileset: &Tileset, frame_state: &mut FrameState) -> Result<()> {
        if !self.live("update") {
            return Ok(());
        }
        let mut first_error = None;
        for content in &mut self.contents {
            if let Err(e) = content.update(tileset, frame_state) {
                first_error.get_or_insert(e);
            }
        }
        if !self.ready && self.contents.iter().all(|c| c.ready()) {
            tracing::debug!("Composite {} ready", self.resource.cache_key());
            self.ready = true;
        }
        first_error.map_or(Ok(()), Err)
    }

    fn apply_style(&mut self, style: &dyn TileStyle) {
        if !self.live("apply_style") {
            return;
        }
        for content in &mut self.contents {
            content.apply_style(style);
        }
    }

    fn apply_debug_settings(&mut self, enabled: bool, color: Color) {
        if !self.live("apply_debug_settings") {
            return;
        }
        for content in &mut self.contents {
            content.apply_debug_settings(enabled, color);
        }
    }

    fn pick(&self, ray: &Ray, frame_state: &FrameState) -> Option<DVec3> {
        if !self.live("pick") || !self.ready {
            return None;
        }
        let mut closest: Option<(f64, DVec3)> = None;
        for content in &self.contents {
            let Some(hit) = content.pick(ray, frame_state) else {
                continue;
            };
            let distance = hit.distance(ray.origin);
            if closest.is_none_or(|(best, _)| distance < best) {
                closest = Some((distance, hit));
            }
        }
        closest.map(|(_, hit)| hit)
    }

    fn has_property(&self, _batch_id: u32, _name: &str) -> bool {
        false
    }

    fn get_feature(&mut self, _batch_id: u32) -> Option<Feature> {
        None
    }

    fn destroy(&mut self) {
        if !self.live("destroy") {
            return;
        }
        for content in &mut self.contents {
            if !content.is_destroyed() {
                content.destroy();
            }
        }
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn metadata(&self) -> Option<&Rc<ContentMetadata>> {
        self.metadata.as_ref()
    }

    fn set_metadata(&mut self, metadata: Option<Rc<ContentMetadata>>) {
        for content in &mut self.contents {
            content.set_metadata(metadata.clone());
        }
        self.metadata = metadata;
    }

    fn group(&self) -> Option<&Rc<ContentGroup>> {
        self.group.as_ref()
    }

    fn set_group(&mut self, group: Option<Rc<ContentGroup>>) {
        for content in &mut self.contents {
            content.set_group(group.clone());
        }
        self.group = group;
    }

    fn inner_contents(&self) -> Option<&[Box<dyn TileContent>]> {
        Some(&self.contents)
    }
}
