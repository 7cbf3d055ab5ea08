//! Renderable vector geometry built from a finished decode.
//!
//! The primitive owns the decoded buffers exclusively. It turns batched
//! index ranges into draw commands and regroups them whenever feature
//! colors or visibility change.

use std::rc::Rc;

use glam::DVec3;
use tiles3d_decode::{
    BatchedIndices, BoundingSphere, Color, DecodeError, DecodeResult, IndexBuffer,
    group_by_color,
};

use crate::batch_table::{Feature, SharedBatchTable, TileStyle};
use crate::options::TilesetOptions;
use crate::tileset::{DrawCommand, FrameState, Pass, Ray};

/// Decoded buffers handed to [`VectorPrimitive::new`].
#[derive(Debug)]
pub struct PrimitiveOptions {
    pub positions: Vec<f32>,
    pub vertex_batch_ids: Vec<u32>,
    pub indices: IndexBuffer,
    pub index_offsets: Vec<u32>,
    pub index_counts: Vec<u32>,
    pub batched_indices: Vec<BatchedIndices>,
    /// One sphere per shape instance.
    pub bounding_volumes: Vec<BoundingSphere>,
    /// One batch id per shape instance.
    pub batch_ids: Vec<u32>,
    pub center: DVec3,
    pub bounding_volume: Option<BoundingSphere>,
    pub batch_table: SharedBatchTable,
}

impl PrimitiveOptions {
    /// Check that the decoded arrays agree with each other.
    fn validate(&self) -> DecodeResult<()> {
        let shapes = self.batch_ids.len();
        expect_len("index offsets", shapes, self.index_offsets.len())?;
        expect_len("index counts", shapes, self.index_counts.len())?;
        expect_len("bounding volumes", shapes, self.bounding_volumes.len())?;

        let vertex_count = self.positions.len() / 3;
        expect_len("positions", vertex_count * 3, self.positions.len())?;
        expect_len("vertex batch ids", vertex_count, self.vertex_batch_ids.len())?;

        let index_len = self.indices.len();
        for (&offset, &count) in self.index_offsets.iter().zip(&self.index_counts) {
            check_range("shape indices", offset, count, index_len)?;
        }
        for batch in &self.batched_indices {
            check_range("batched indices", batch.offset, batch.count, index_len)?;
        }

        let max_index = match &self.indices {
            IndexBuffer::U16(indices) => indices.iter().max().map(|&i| u32::from(i)),
            IndexBuffer::U32(indices) => indices.iter().max().copied(),
        };
        if let Some(max) = max_index {
            check_range("vertex index", max, 1, vertex_count)?;
        }
        Ok(())
    }
}

fn expect_len(what: &'static str, expected: usize, actual: usize) -> DecodeResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DecodeError::MismatchedLength {
            what,
            expected,
            actual,
        })
    }
}

fn check_range(what: &'static str, offset: u32, count: u32, len: usize) -> DecodeResult<()> {
    let start = u64::from(offset);
    let end = start + u64::from(count);
    if end > len as u64 {
        return Err(DecodeError::OutOfBounds {
            what,
            start,
            end,
            len,
        });
    }
    Ok(())
}

#[derive(Debug)]
pub struct VectorPrimitive {
    positions: Vec<f32>,
    vertex_batch_ids: Vec<u32>,
    indices: IndexBuffer,
    index_offsets: Vec<u32>,
    index_counts: Vec<u32>,
    batched_indices: Vec<BatchedIndices>,
    bounding_volumes: Vec<BoundingSphere>,
    batch_ids: Vec<u32>,
    center: DVec3,
    bounding_volume: Option<BoundingSphere>,
    batch_table: SharedBatchTable,
    features: Vec<Feature>,
    debug_color: Option<Color>,
    dirty: bool,
    destroyed: bool,
}

impl VectorPrimitive {
    /// Take ownership of decoded buffers, rejecting arrays that disagree.
    pub fn new(options: PrimitiveOptions) -> DecodeResult<Self> {
        options.validate()?;
        let PrimitiveOptions {
            positions,
            vertex_batch_ids,
            indices,
            index_offsets,
            index_counts,
            batched_indices,
            bounding_volumes,
            batch_ids,
            center,
            bounding_volume,
            batch_table,
        } = options;
        Ok(Self {
            positions,
            vertex_batch_ids,
            indices,
            index_offsets,
            index_counts,
            batched_indices,
            bounding_volumes,
            batch_ids,
            center,
            bounding_volume,
            batch_table,
            features: Vec::new(),
            debug_color: None,
            dirty: false,
            destroyed: false,
        })
    }

    #[must_use]
    pub fn batched_indices(&self) -> &[BatchedIndices] {
        &self.batched_indices
    }

    #[must_use]
    pub fn indices(&self) -> &IndexBuffer {
        &self.indices
    }

    #[must_use]
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    #[must_use]
    pub fn center(&self) -> DVec3 {
        self.center
    }

    #[must_use]
    pub fn bounding_volume(&self) -> Option<BoundingSphere> {
        self.bounding_volume
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[must_use]
    pub fn triangles_length(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn geometry_byte_length(&self) -> usize {
        self.indices.byte_length()
            + self.positions.len() * std::mem::size_of::<f32>()
            + self.vertex_batch_ids.len() * std::mem::size_of::<u32>()
    }

    /// One feature per batch table row, created on first use.
    pub fn create_features(&mut self) -> &[Feature] {
        if self.features.is_empty() {
            let length = self.batch_table.borrow().features_length();
            self.features = (0..length as u32)
                .map(|id| Feature::new(id, Rc::clone(&self.batch_table)))
                .collect();
        }
        &self.features
    }

    pub fn feature(&mut self, batch_id: u32) -> Option<Feature> {
        self.create_features().get(batch_id as usize).cloned()
    }

    /// Draw every feature in `color` while enabled.
    pub fn apply_debug_settings(&mut self, enabled: bool, color: Color) {
        let debug_color = enabled.then_some(color);
        if debug_color != self.debug_color {
            self.debug_color = debug_color;
            self.dirty = true;
        }
    }

    /// Write the style's color and visibility for every feature.
    pub fn apply_style(&mut self, style: &dyn TileStyle) {
        self.create_features();
        for feature in &self.features {
            let color = style.color(feature);
            let show = style.show(feature);
            feature.set_color(color);
            feature.set_show(show);
        }
        self.dirty = true;
    }

    /// Change the color of one feature.
    pub fn update_commands(&mut self, batch_id: u32, color: Color) {
        self.batch_table.borrow_mut().set_color(batch_id, color);
        self.dirty = true;
    }

    /// Push this frame's draw commands, regrouping first if colors changed.
    pub fn update(&mut self, options: &TilesetOptions, frame_state: &mut FrameState) {
        if self.destroyed {
            return;
        }
        if self.dirty {
            match self.rebatch() {
                Ok(()) => self.dirty = false,
                Err(e) => tracing::error!("Failed to rebatch vector geometry: {}", e),
            }
        }

        match frame_state.pass {
            Pass::Render => {
                for batch in &self.batched_indices {
                    frame_state.commands.push(DrawCommand {
                        offset: batch.offset,
                        count: batch.count,
                        color: batch.color,
                        wireframe: options.debug_wireframe,
                        classification_type: options.classification_type,
                        bounding_volume: self.bounding_volume,
                        batch_id: None,
                    });
                }
            }
            Pass::Pick => {
                let table = self.batch_table.borrow();
                for (shape, &batch_id) in self.batch_ids.iter().enumerate() {
                    if !table.show(batch_id) {
                        continue;
                    }
                    frame_state.commands.push(DrawCommand {
                        offset: self.index_offsets[shape],
                        count: self.index_counts[shape],
                        color: table.color(batch_id),
                        wireframe: false,
                        classification_type: options.classification_type,
                        bounding_volume: self.bounding_volumes.get(shape).copied(),
                        batch_id: Some(batch_id),
                    });
                }
            }
        }
    }

    fn rebatch(&mut self) -> DecodeResult<()> {
        let colors: Vec<Option<Color>> = {
            let table = self.batch_table.borrow();
            self.batch_ids
                .iter()
                .map(|&id| {
                    table
                        .show(id)
                        .then(|| self.debug_color.unwrap_or_else(|| table.color(id)))
                })
                .collect()
        };

        let (indices, grouped_offsets, batched) = match &self.indices {
            IndexBuffer::U16(indices) => {
                let g = group_by_color(
                    &self.batch_ids,
                    &colors,
                    indices,
                    &self.index_offsets,
                    &self.index_counts,
                )?;
                (IndexBuffer::U16(g.indices), g.index_offsets, g.batched_indices)
            }
            IndexBuffer::U32(indices) => {
                let g = group_by_color(
                    &self.batch_ids,
                    &colors,
                    indices,
                    &self.index_offsets,
                    &self.index_counts,
                )?;
                (IndexBuffer::U32(g.indices), g.index_offsets, g.batched_indices)
            }
        };
        tracing::trace!("Rebatched vector geometry into {} ranges", batched.len());
        self.indices = indices;
        self.index_offsets = grouped_offsets;
        self.batched_indices = batched;
        Ok(())
    }

    /// Nearest visible shape hit by `ray`.
    #[must_use]
    pub fn pick(&self, ray: &Ray) -> Option<DVec3> {
        if self.destroyed {
            return None;
        }
        let table = self.batch_table.borrow();
        let distance = self
            .bounding_volumes
            .iter()
            .zip(&self.batch_ids)
            .filter(|&(_, &id)| table.show(id))
            .filter_map(|(sphere, _)| sphere.intersect_ray(ray.origin, ray.direction))
            .min_by(f64::total_cmp)?;
        Some(ray.origin + ray.direction.normalize() * distance)
    }

    /// Release every buffer. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.positions = Vec::new();
        self.vertex_batch_ids = Vec::new();
        self.indices = IndexBuffer::U16(Vec::new());
        self.index_offsets = Vec::new();
        self.index_counts = Vec::new();
        self.batched_indices = Vec::new();
        self.bounding_volumes = Vec::new();
        self.batch_ids = Vec::new();
        self.features = Vec::new();
        self.destroyed = true;
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}
