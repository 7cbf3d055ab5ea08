//! Fixed-layout packing of decode context and worker results.
//!
//! Both buffers are flat `f64` arrays so they can be moved to and from a
//! worker without any per-field allocation.

use glam::{DMat4, DVec3};

use crate::error::{DecodeError, DecodeResult};
use crate::reader::PackedReader;
use crate::{BatchedIndices, BoundingSphere, CONTEXT_LEN, Color};

/// Slots taken by a packed color.
const COLOR_LEN: usize = 4;

/// Smallest packed batched-index record: color, offset, count, id count.
const MIN_BATCH_RECORD_LEN: usize = COLOR_LEN + 3;

/// Pack the RTC center followed by the column-major model matrix.
#[must_use]
pub fn pack_context(center: DVec3, model_matrix: &DMat4) -> [f64; CONTEXT_LEN] {
    let mut packed = [0.0; CONTEXT_LEN];
    packed[..3].copy_from_slice(&center.to_array());
    packed[3..].copy_from_slice(&model_matrix.to_cols_array());
    packed
}

/// Inverse of [`pack_context`].
pub fn unpack_context(packed: &[f64]) -> DecodeResult<(DVec3, DMat4)> {
    let mut reader = PackedReader::new(packed);
    let center = DVec3::from_slice(reader.read_slice(3, "context center")?);
    let matrix = DMat4::from_cols_slice(reader.read_slice(16, "context model matrix")?);
    Ok((center, matrix))
}

/// Bounding volumes and batched index ranges read from a worker result.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedResult {
    /// Width in bytes of one index (2 or 4).
    pub index_width: usize,
    pub bounding_volumes: Vec<BoundingSphere>,
    pub batched_indices: Vec<BatchedIndices>,
}

/// Pack the scalar part of a worker result.
///
/// Layout: index width, bounding volume count, one 4-slot sphere per volume,
/// batched range count, then per range: color (4), offset, count, batch id
/// count, batch ids.
#[must_use]
pub fn pack_result(
    index_width: usize,
    bounding_volumes: &[BoundingSphere],
    batched_indices: &[BatchedIndices],
) -> Vec<f64> {
    let batch_len: usize = batched_indices
        .iter()
        .map(|b| MIN_BATCH_RECORD_LEN + b.batch_ids.len())
        .sum();
    let mut packed = Vec::with_capacity(
        3 + bounding_volumes.len() * BoundingSphere::PACKED_LEN + batch_len,
    );

    packed.push(index_width as f64);
    packed.push(bounding_volumes.len() as f64);
    for sphere in bounding_volumes {
        packed.extend_from_slice(&sphere.center.to_array());
        packed.push(sphere.radius);
    }

    packed.push(batched_indices.len() as f64);
    for batch in batched_indices {
        let Color { r, g, b, a } = batch.color;
        packed.extend([r, g, b, a].map(f64::from));
        packed.push(f64::from(batch.offset));
        packed.push(f64::from(batch.count));
        packed.push(batch.batch_ids.len() as f64);
        packed.extend(batch.batch_ids.iter().map(|&id| f64::from(id)));
    }
    packed
}

/// Inverse of [`pack_result`].
///
/// Fails fast when a count implies reading past the end of the buffer.
pub fn unpack_result(packed: &[f64]) -> DecodeResult<UnpackedResult> {
    let mut reader = PackedReader::new(packed);

    let width = reader.read("index width")?;
    let index_width = if width == 2.0 {
        2
    } else if width == 4.0 {
        4
    } else {
        return Err(DecodeError::InvalidIndexWidth(width));
    };

    let volume_count = reader.read_count(BoundingSphere::PACKED_LEN, "bounding volumes")?;
    let mut bounding_volumes = Vec::with_capacity(volume_count);
    for _ in 0..volume_count {
        let s = reader.read_slice(BoundingSphere::PACKED_LEN, "bounding volume")?;
        bounding_volumes.push(BoundingSphere::new(DVec3::new(s[0], s[1], s[2]), s[3]));
    }

    let batch_count = reader.read_count(MIN_BATCH_RECORD_LEN, "batched indices")?;
    let mut batched_indices = Vec::with_capacity(batch_count);
    for _ in 0..batch_count {
        let c = reader.read_slice(COLOR_LEN, "batch color")?;
        let color = Color::new(c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32);
        let offset = reader.read_u32("batch offset")?;
        let count = reader.read_u32("batch count")?;
        let id_count = reader.read_count(1, "batch ids")?;
        let batch_ids = (0..id_count)
            .map(|_| reader.read_u32("batch id"))
            .collect::<DecodeResult<Vec<_>>>()?;
        batched_indices.push(BatchedIndices {
            color,
            offset,
            count,
            batch_ids,
        });
    }

    Ok(UnpackedResult {
        index_width,
        bounding_volumes,
        batched_indices,
    })
}
