//! Regrouping indices into one contiguous run per draw color.

use std::collections::{HashMap, HashSet};

use crate::error::{DecodeError, DecodeResult};
use crate::{BatchedIndices, Color};

/// Index buffer reordered so every color's shapes are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedIndices<T> {
    pub indices: Vec<T>,
    /// New offset of every shape's indices, in shape order.
    pub index_offsets: Vec<u32>,
    /// One run per distinct color, in first-appearance order.
    pub batched_indices: Vec<BatchedIndices>,
}

struct Group {
    color: Color,
    shapes: Vec<usize>,
}

/// Reorder `indices` so shapes sharing a color are drawn by one range.
///
/// `colors[i]` is the draw color of shape `i`, or `None` when the shape is
/// hidden. Hidden shapes are moved behind every batched range so their
/// indices survive a later regroup. Shape `i` owns
/// `indices[index_offsets[i]..index_offsets[i] + index_counts[i]]`.
pub fn group_by_color<T: Copy>(
    batch_ids: &[u32],
    colors: &[Option<Color>],
    indices: &[T],
    index_offsets: &[u32],
    index_counts: &[u32],
) -> DecodeResult<GroupedIndices<T>> {
    let shape_count = batch_ids.len();
    for (what, len) in [
        ("shape colors", colors.len()),
        ("index offsets", index_offsets.len()),
        ("index counts", index_counts.len()),
    ] {
        if len != shape_count {
            return Err(DecodeError::InvalidCount {
                what,
                value: len as f64,
            });
        }
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut by_color: HashMap<u32, usize> = HashMap::new();
    let mut hidden = Vec::new();
    for (shape, color) in colors.iter().enumerate() {
        let Some(color) = *color else {
            hidden.push(shape);
            continue;
        };
        let slot = *by_color.entry(color.to_rgba()).or_insert_with(|| {
            groups.push(Group {
                color,
                shapes: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].shapes.push(shape);
    }

    let mut out = Vec::with_capacity(indices.len());
    let mut new_offsets = vec![0u32; shape_count];
    let mut copy_shape = |shape: usize, out: &mut Vec<T>| -> DecodeResult<()> {
        let start = index_offsets[shape] as usize;
        let end = start + index_counts[shape] as usize;
        let source = indices.get(start..end).ok_or(DecodeError::Truncated {
            what: "shape indices",
            needed: end,
            available: indices.len(),
        })?;
        new_offsets[shape] = out.len() as u32;
        out.extend_from_slice(source);
        Ok(())
    };

    let mut batched_indices = Vec::with_capacity(groups.len());
    for group in &groups {
        let offset = out.len();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for &shape in &group.shapes {
            copy_shape(shape, &mut out)?;
            if seen.insert(batch_ids[shape]) {
                ids.push(batch_ids[shape]);
            }
        }
        batched_indices.push(BatchedIndices {
            color: group.color,
            offset: offset as u32,
            count: (out.len() - offset) as u32,
            batch_ids: ids,
        });
    }
    for shape in hidden {
        copy_shape(shape, &mut out)?;
    }

    Ok(GroupedIndices {
        indices: out,
        index_offsets: new_offsets,
        batched_indices,
    })
}
