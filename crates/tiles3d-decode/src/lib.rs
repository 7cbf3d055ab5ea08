//! Decode composite tile containers and build batched vector geometry.
//!
//! This crate provides pure synchronous functions for demultiplexing
//! composite tile payloads and for the heavy buffer work behind vector
//! geometry content. All functions are designed to be called from any
//! threading context - the library user controls parallelism.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **User-controlled parallelism**: Callers decide which thread runs
//!   [`create_vector_geometries`]
//! - **Owned hand-off**: Requests and responses own their buffers, so moving
//!   them across a channel moves the storage with them
//!
//! # Key functions
//!
//! - [`CompositeHeader::parse`] and [`CompositeChildren`]: Walk a composite container
//! - [`pack_context`] / [`unpack_context`]: Fixed-layout RTC center + model matrix
//! - [`unpack_result`]: Read bounding volumes and batched index ranges from a worker result
//! - [`create_vector_geometries`]: Tessellate shapes and group indices by color
//! - [`group_by_color`]: Regroup an index buffer into one contiguous run per color

mod error;
mod reader;

pub mod batching;
pub mod header;
pub mod packing;
pub mod shapes;
pub mod worker;

pub use batching::{GroupedIndices, group_by_color};
pub use error::{DecodeError, DecodeResult};
pub use header::{ChildSpan, CompositeChildren, CompositeHeader};
pub use packing::{UnpackedResult, pack_context, pack_result, unpack_context, unpack_result};
pub use reader::{PackedReader, read_magic, read_u32_le};
pub use worker::{DecodeRequest, DecodeResponse, ShapeBuffers, ShapeKind, create_vector_geometries};

use glam::DVec3;

/// Magic tag of a composite container.
pub const COMPOSITE_MAGIC: [u8; 4] = *b"cmpt";

/// Number of `f64` slots in a packed context buffer: center (3) + matrix (16).
pub const CONTEXT_LEN: usize = 3 + 16;

/// RGBA color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Pack into a `u32` whose little-endian bytes are `[r, g, b, a]`.
    #[must_use]
    pub fn to_rgba(self) -> u32 {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        byte(self.r) | (byte(self.g) << 8) | (byte(self.b) << 16) | (byte(self.a) << 24)
    }

    /// Inverse of [`Color::to_rgba`].
    #[must_use]
    pub fn from_rgba(packed: u32) -> Self {
        let [r, g, b, a] = packed.to_le_bytes();
        Self::from_bytes(r, g, b, a)
    }

    #[must_use]
    pub fn from_bytes(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            f32::from(a) / 255.0,
        )
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Bounding sphere in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    /// Number of `f64` slots a packed sphere occupies.
    pub const PACKED_LEN: usize = 4;

    #[must_use]
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere around `center` enclosing every point.
    pub fn enclosing(center: DVec3, points: impl IntoIterator<Item = DVec3>) -> Self {
        let radius = points
            .into_iter()
            .map(|p| p.distance(center))
            .fold(0.0, f64::max);
        Self { center, radius }
    }

    /// Distance along the ray to the first intersection, if any.
    ///
    /// A ray starting inside the sphere reports distance zero.
    #[must_use]
    pub fn intersect_ray(&self, origin: DVec3, direction: DVec3) -> Option<f64> {
        let dir = direction.normalize_or_zero();
        if dir == DVec3::ZERO {
            return None;
        }
        let oc = origin - self.center;
        let b = oc.dot(dir);
        let c = oc.length_squared() - self.radius * self.radius;
        if c <= 0.0 {
            return Some(0.0);
        }
        let discriminant = b * b - c;
        if b > 0.0 || discriminant < 0.0 {
            return None;
        }
        Some(-b - discriminant.sqrt())
    }
}

/// Index buffer whose element width is chosen by vertex count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Width in bytes of one index.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Self::U16(_) => 2,
            Self::U32(_) => 4,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn byte_length(&self) -> usize {
        self.len() * self.width()
    }

    /// Index at `i` widened to `u32`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            Self::U16(v) => v.get(i).copied().map(u32::from),
            Self::U32(v) => v.get(i).copied(),
        }
    }

    /// Reinterpret raw native-endian bytes as indices of the given width.
    pub fn from_bytes(width: usize, bytes: &[u8]) -> DecodeResult<Self> {
        if bytes.len() % width.max(1) != 0 {
            return Err(DecodeError::Truncated {
                what: "index buffer",
                needed: bytes.len().next_multiple_of(width.max(1)),
                available: bytes.len(),
            });
        }
        match width {
            2 => Ok(Self::U16(bytemuck::pod_collect_to_vec(bytes))),
            4 => Ok(Self::U32(bytemuck::pod_collect_to_vec(bytes))),
            other => Err(DecodeError::InvalidIndexWidth(other as f64)),
        }
    }

    /// Raw native-endian bytes of the buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::U16(v) => bytemuck::cast_slice(v).to_vec(),
            Self::U32(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }
}

/// A contiguous run of indices sharing one draw color.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedIndices {
    pub color: Color,
    /// First index of the run in the flattened index buffer.
    pub offset: u32,
    /// Number of indices in the run.
    pub count: u32,
    /// Batch ids whose shapes are drawn by this run.
    pub batch_ids: Vec<u32>,
}
