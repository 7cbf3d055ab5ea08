//! The geometry decode job: shape parameters in, batched buffers out.
//!
//! [`create_vector_geometries`] is the function a background worker runs.
//! Requests and responses own all of their storage, so handing one to a
//! worker moves the buffers and leaves nothing readable behind.

use glam::{DMat4, DVec3};

use crate::batching::group_by_color;
use crate::error::{DecodeError, DecodeResult};
use crate::packing::{pack_result, unpack_context};
use crate::shapes::{
    CYLINDER_SLICES, ELLIPSOID_SLICES, ELLIPSOID_STACKS, ShapeTemplate, unit_box, unit_cylinder,
    unit_ellipsoid,
};
use crate::{BoundingSphere, CONTEXT_LEN, Color, IndexBuffer};

/// Parameters of every instance of one shape kind plus their batch ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeBuffers {
    pub values: Vec<f32>,
    pub batch_ids: Vec<u32>,
}

impl ShapeBuffers {
    #[must_use]
    pub fn new(values: Vec<f32>, batch_ids: Vec<u32>) -> Self {
        Self { values, batch_ids }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batch_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch_ids.is_empty()
    }
}

/// Shape kinds, in the order their instances are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Dimensions (3) + column-major matrix (16).
    Box,
    /// Radius, length + column-major matrix (16).
    Cylinder,
    /// Radii (3) + column-major matrix (16).
    Ellipsoid,
    /// Radius + center (3).
    Sphere,
}

impl ShapeKind {
    pub const ALL: [Self; 4] = [Self::Box, Self::Cylinder, Self::Ellipsoid, Self::Sphere];

    /// Number of `f32` values describing one instance.
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Self::Box | Self::Ellipsoid => 19,
            Self::Cylinder => 18,
            Self::Sphere => 4,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Cylinder => "cylinder",
            Self::Ellipsoid => "ellipsoid",
            Self::Sphere => "sphere",
        }
    }

    fn template(self) -> ShapeTemplate {
        match self {
            Self::Box => unit_box(),
            Self::Cylinder => unit_cylinder(CYLINDER_SLICES),
            Self::Ellipsoid | Self::Sphere => unit_ellipsoid(ELLIPSOID_STACKS, ELLIPSOID_SLICES),
        }
    }

    /// Local-to-content transform of one instance.
    fn instance_transform(self, v: &[f32]) -> DMat4 {
        let d = |i: usize| f64::from(v[i]);
        let matrix = |start: usize| {
            let mut cols = [0.0; 16];
            for (c, value) in cols.iter_mut().zip(&v[start..start + 16]) {
                *c = f64::from(*value);
            }
            DMat4::from_cols_array(&cols)
        };
        match self {
            Self::Box | Self::Ellipsoid => {
                matrix(3) * DMat4::from_scale(DVec3::new(d(0), d(1), d(2)))
            }
            Self::Cylinder => matrix(2) * DMat4::from_scale(DVec3::new(d(0), d(0), d(1))),
            Self::Sphere => {
                DMat4::from_translation(DVec3::new(d(1), d(2), d(3)))
                    * DMat4::from_scale(DVec3::splat(d(0)))
            }
        }
    }
}

/// Everything a worker needs to build vector geometry for one content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeRequest {
    pub boxes: Option<ShapeBuffers>,
    pub cylinders: Option<ShapeBuffers>,
    pub ellipsoids: Option<ShapeBuffers>,
    pub spheres: Option<ShapeBuffers>,
    /// One [`Color::to_rgba`] value per shape instance, in submission order.
    pub packed_colors: Vec<u32>,
    /// Output of [`crate::pack_context`].
    pub context: Vec<f64>,
}

impl DecodeRequest {
    /// Shape buffers paired with their kind, in submission order.
    pub fn shapes(&self) -> impl Iterator<Item = (ShapeKind, &ShapeBuffers)> {
        ShapeKind::ALL
            .into_iter()
            .zip([&self.boxes, &self.cylinders, &self.ellipsoids, &self.spheres])
            .filter_map(|(kind, buffers)| buffers.as_ref().map(|b| (kind, b)))
    }

    /// Total number of shape instances.
    #[must_use]
    pub fn shape_count(&self) -> usize {
        self.shapes().map(|(_, b)| b.len()).sum()
    }
}

/// Worker output. Every field owns its storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResponse {
    /// Output of [`pack_result`]: index width, bounding volumes, batched ranges.
    pub packed: Vec<f64>,
    /// Native-endian index bytes; width is recorded in `packed`.
    pub indices: Vec<u8>,
    /// Per-shape offset into the index buffer.
    pub index_offsets: Vec<u32>,
    /// Per-shape index count.
    pub index_counts: Vec<u32>,
    /// RTC-relative xyz positions.
    pub positions: Vec<f32>,
    pub vertex_batch_ids: Vec<u32>,
    /// Per-shape batch ids, in submission order.
    pub batch_ids: Vec<u32>,
}

fn validate(kind: ShapeKind, buffers: &ShapeBuffers) -> DecodeResult<()> {
    if buffers.values.len() != kind.stride() * buffers.batch_ids.len() {
        return Err(DecodeError::InvalidShapeLayout {
            kind: kind.name(),
            len: buffers.values.len(),
            stride: kind.stride(),
            batch_ids: buffers.batch_ids.len(),
        });
    }
    Ok(())
}

/// Tessellate every shape in `request` and batch its indices by color.
pub fn create_vector_geometries(request: DecodeRequest) -> DecodeResult<DecodeResponse> {
    if request.context.len() != CONTEXT_LEN {
        return Err(DecodeError::InvalidCount {
            what: "context",
            value: request.context.len() as f64,
        });
    }
    let (center, model_matrix) = unpack_context(&request.context)?;

    for (kind, buffers) in request.shapes() {
        validate(kind, buffers)?;
    }
    let shape_count = request.shape_count();
    if request.packed_colors.len() != shape_count {
        return Err(DecodeError::InvalidCount {
            what: "shape colors",
            value: request.packed_colors.len() as f64,
        });
    }

    let mut positions = Vec::new();
    let mut vertex_batch_ids = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut index_offsets = Vec::with_capacity(shape_count);
    let mut index_counts = Vec::with_capacity(shape_count);
    let mut batch_ids = Vec::with_capacity(shape_count);
    let mut bounding_volumes = Vec::with_capacity(shape_count);

    for (kind, buffers) in request.shapes() {
        let template = kind.template();
        for (values, &batch_id) in buffers
            .values
            .chunks_exact(kind.stride())
            .zip(&buffers.batch_ids)
        {
            let transform = model_matrix * kind.instance_transform(values);
            let base = checked_u32(positions.len() / 3, "vertex count")?;
            // The last vertex of this shape must stay addressable too.
            checked_u32(positions.len() / 3 + template.positions.len(), "vertex count")?;
            let index_offset = checked_u32(indices.len(), "index count")?;
            let index_count = checked_u32(template.indices.len(), "index count")?;

            let world: Vec<DVec3> = template
                .positions
                .iter()
                .map(|&p| transform.transform_point3(p))
                .collect();
            let origin = transform.transform_point3(DVec3::ZERO);
            bounding_volumes.push(BoundingSphere::enclosing(origin, world.iter().copied()));

            for p in world {
                positions.extend_from_slice(&(p - center).as_vec3().to_array());
                vertex_batch_ids.push(batch_id);
            }
            index_offsets.push(index_offset);
            index_counts.push(index_count);
            indices.extend(template.indices.iter().map(|i| base + i));
            batch_ids.push(batch_id);
        }
    }

    let colors: Vec<Option<Color>> = request
        .packed_colors
        .iter()
        .map(|&rgba| Some(Color::from_rgba(rgba)))
        .collect();
    let grouped = group_by_color(&batch_ids, &colors, &indices, &index_offsets, &index_counts)?;

    let vertex_count = positions.len() / 3;
    let index_buffer = if vertex_count < usize::from(u16::MAX) + 1 {
        IndexBuffer::U16(grouped.indices.iter().map(|&i| i as u16).collect())
    } else {
        IndexBuffer::U32(grouped.indices)
    };

    Ok(DecodeResponse {
        packed: pack_result(
            index_buffer.width(),
            &bounding_volumes,
            &grouped.batched_indices,
        ),
        indices: index_buffer.to_bytes(),
        index_offsets: grouped.index_offsets,
        index_counts,
        positions,
        vertex_batch_ids,
        batch_ids,
    })
}

fn checked_u32(len: usize, what: &'static str) -> DecodeResult<u32> {
    u32::try_from(len).map_err(|_| DecodeError::TooLarge { what, len })
}
