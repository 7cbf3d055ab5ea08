//! Registry of content factories keyed by magic tag.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use tiles3d_decode::{COMPOSITE_MAGIC, DecodeError, read_magic};

use crate::composite::decode_composite;
use crate::content::TileContent;
use crate::error::Result;
use crate::resource::{Cache, Resource, ResourceFetcher, ResourceLoader};
use crate::tileset::{Tile, Tileset};

/// Everything a factory needs to build the content starting at `byte_offset`.
#[derive(Clone)]
pub struct FactoryContext {
    pub tileset: Rc<Tileset>,
    pub tile: Rc<Tile>,
    pub resource: Resource,
    pub buffer: Rc<[u8]>,
    pub byte_offset: usize,
    /// Registry used for nested containers.
    pub factories: Rc<ContentFactories>,
}

impl FactoryContext {
    /// Bytes from this content's start to the end of the buffer.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.buffer.get(self.byte_offset..).unwrap_or_default()
    }
}

impl fmt::Debug for FactoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryContext")
            .field("tile", &self.tile)
            .field("resource", &self.resource)
            .field("byte_offset", &self.byte_offset)
            .finish_non_exhaustive()
    }
}

pub type ContentFuture = LocalBoxFuture<'static, Result<Box<dyn TileContent>>>;

pub type ContentFactory = Rc<dyn Fn(FactoryContext) -> ContentFuture>;

/// Factories keyed by the 4-byte magic at the start of each content.
#[derive(Clone, Default)]
pub struct ContentFactories {
    factories: HashMap<[u8; 4], ContentFactory>,
}

impl ContentFactories {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already understands composite containers.
    #[must_use]
    pub fn with_composite() -> Self {
        let mut factories = Self::new();
        factories.register(COMPOSITE_MAGIC, |ctx| {
            async move {
                let content: Box<dyn TileContent> = Box::new(decode_composite(ctx).await?);
                Ok(content)
            }
            .boxed_local()
        });
        factories
    }

    pub fn register(
        &mut self,
        magic: [u8; 4],
        factory: impl Fn(FactoryContext) -> ContentFuture + 'static,
    ) -> &mut Self {
        self.factories.insert(magic, Rc::new(factory));
        self
    }

    /// Register a factory that builds its content without suspending.
    pub fn register_sync(
        &mut self,
        magic: [u8; 4],
        factory: impl Fn(FactoryContext) -> Result<Box<dyn TileContent>> + 'static,
    ) -> &mut Self {
        self.register(magic, move |ctx| {
            futures_util::future::ready(factory(ctx)).boxed_local()
        })
    }

    #[must_use]
    pub fn get(&self, magic: &[u8; 4]) -> Option<&ContentFactory> {
        self.factories.get(magic)
    }

    #[must_use]
    pub fn contains(&self, magic: &[u8; 4]) -> bool {
        self.factories.contains_key(magic)
    }
}

impl fmt::Debug for ContentFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<String> = self
            .factories
            .keys()
            .map(|m| String::from_utf8_lossy(m).into_owned())
            .collect();
        tags.sort();
        f.debug_struct("ContentFactories")
            .field("tags", &tags)
            .finish()
    }
}

/// Build the content whose magic sits at `ctx.byte_offset`.
pub async fn create_content(ctx: FactoryContext) -> Result<Box<dyn TileContent>> {
    let magic = read_magic(&ctx.buffer, ctx.byte_offset)?;
    let factory = ctx.factories.get(&magic).cloned().ok_or_else(|| {
        DecodeError::UnknownContentType {
            magic: String::from_utf8_lossy(&magic).into_owned(),
        }
    })?;
    factory(ctx).await
}

impl<F: ResourceFetcher, C: Cache> ResourceLoader<F, C> {
    /// Fetch `resource` and build its content.
    pub async fn load_content(
        &self,
        tileset: Rc<Tileset>,
        tile: Rc<Tile>,
        resource: Resource,
        factories: Rc<ContentFactories>,
    ) -> Result<Box<dyn TileContent>> {
        let buffer = self.fetch(&resource).await?;
        create_content(FactoryContext {
            tileset,
            tile,
            resource,
            buffer,
            byte_offset: 0,
            factories,
        })
        .await
    }
}
