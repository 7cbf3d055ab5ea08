//! Tile content pipeline for composite containers and vector geometry.
//!
//! A composite tile is a container of inner tiles, each decoded by the
//! factory registered for its magic and exposed together as one
//! [`TileContent`]. Vector geometry content hands its shape buffers to a
//! background [`DecodeScheduler`], polls for the result once per frame and
//! then draws batched index ranges grouped by color.
//!
//! Everything here runs on one thread. Only [`DecodeRequest`]s and
//! [`DecodeResponse`]s cross to the workers, and they own their buffers.
//!
//! # Example
//!
//! ```ignore
//! let tileset = Rc::new(Tileset::with_worker_pool(TilesetOptions::default())?);
//! let loader = ResourceLoader::with_cache(fetcher, MemoryCache::new());
//! let factories = Rc::new(ContentFactories::with_composite());
//! let mut content = loader
//!     .load_content(tileset.clone(), tile, Resource::new(url), factories)
//!     .await?;
//!
//! let mut frame = FrameState::new(0);
//! content.update(&tileset, &mut frame)?;
//! ```

mod batch_table;
mod composite;
mod content;
mod error;
mod factory;
mod options;
mod primitive;
mod resource;
mod scheduler;
mod tileset;
mod vector;
mod worker;

pub use batch_table::{BatchTable, Feature, SharedBatchTable, TileStyle};
pub use composite::{CompositeContent, decode_composite};
pub use content::{ContentGroup, ContentMetadata, TileContent};
pub use error::{Error, Result};
pub use factory::{ContentFactories, ContentFactory, ContentFuture, FactoryContext, create_content};
pub use options::{ClassificationType, TilesetOptions};
pub use primitive::{PrimitiveOptions, VectorPrimitive};
pub use resource::{Cache, MemoryCache, NoCache, Resource, ResourceFetcher, ResourceLoader};
pub use scheduler::{DecodeHandle, DecodeReply, DecodeScheduler, Scheduled};
pub use tileset::{DrawCommand, FrameState, Pass, Ray, Tile, Tileset};
pub use vector::{DecodeStatus, RawShapes, VectorGeometryContent, VectorGeometryOptions};
pub use worker::DecodeWorkerPool;

pub use tiles3d_decode::{
    BatchedIndices, BoundingSphere, Color, DecodeError, DecodeRequest, DecodeResponse,
    IndexBuffer, ShapeBuffers, ShapeKind,
};
