//! Shared fixtures: composite buffer builders and a stub content type.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::DVec3;
use tiles3d::{
    Color, ContentFactories, ContentGroup, ContentMetadata, DecodeRequest, DecodeScheduler, Error,
    Feature, FrameState, Ray, Result, Scheduled, TileContent, TileStyle, Tileset, TilesetOptions,
};

pub const STUB_MAGIC: [u8; 4] = *b"stub";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// An inner tile whose content reports a pick hit `distance` units along the ray.
pub fn stub_tile(distance: u8) -> Vec<u8> {
    tile(STUB_MAGIC, &[distance, 0])
}

/// Like [`stub_tile`], but the hit lies off to the side of the ray at the
/// same distance from its origin.
pub fn stub_tile_aside(distance: u8) -> Vec<u8> {
    tile(STUB_MAGIC, &[distance, 1])
}

/// An inner tile with `magic`, version 1 and `payload` after the header.
pub fn tile(magic: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let byte_length = 12 + payload.len() as u32;
    let mut bytes = Vec::with_capacity(byte_length as usize);
    bytes.extend_from_slice(&magic);
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&byte_length.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn composite(children: &[Vec<u8>]) -> Vec<u8> {
    composite_with_version(1, children)
}

pub fn composite_with_version(version: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let body: usize = children.iter().map(Vec::len).sum();
    let byte_length = (16 + body) as u32;
    let mut bytes = Vec::with_capacity(byte_length as usize);
    bytes.extend_from_slice(b"cmpt");
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&byte_length.to_le_bytes());
    bytes.extend_from_slice(&(children.len() as u32).to_le_bytes());
    for child in children {
        bytes.extend_from_slice(child);
    }
    bytes
}

/// What the stub factory saw for each content it built.
#[derive(Debug)]
pub struct StubLog {
    pub invocations: Cell<usize>,
    pub built: RefCell<Vec<(u8, Option<String>)>>,
    /// Readiness given to each new stub.
    pub initially_ready: Cell<bool>,
    /// One readiness flag per stub, in build order.
    pub ready: RefCell<Vec<Rc<Cell<bool>>>>,
    pub updates: Rc<Cell<usize>>,
    pub styled: Rc<Cell<usize>>,
}

impl StubLog {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            invocations: Cell::new(0),
            built: RefCell::default(),
            initially_ready: Cell::new(true),
            ready: RefCell::default(),
            updates: Rc::default(),
            styled: Rc::default(),
        })
    }

    pub fn set_ready(&self, stub: usize, ready: bool) {
        self.ready.borrow()[stub].set(ready);
    }
}

/// Statistics every stub reports, so containers can be told apart from leaves.
pub const STUB_FEATURES: usize = 10;
pub const STUB_TRIANGLES: usize = 20;
pub const STUB_BYTES: usize = 30;

/// Content that is ready when its flag says so and that reports a hit
/// `distance` units from the ray origin.
pub struct StubContent {
    pub distance: u8,
    pub aside: bool,
    pub ready: Rc<Cell<bool>>,
    pub updates: Rc<Cell<usize>>,
    pub styled: Rc<Cell<usize>>,
    destroyed: bool,
    metadata: Option<Rc<ContentMetadata>>,
    group: Option<Rc<ContentGroup>>,
}

impl StubContent {
    pub fn new(distance: u8, aside: bool) -> Self {
        Self {
            distance,
            aside,
            ready: Rc::new(Cell::new(true)),
            updates: Rc::default(),
            styled: Rc::default(),
            destroyed: false,
            metadata: None,
            group: None,
        }
    }
}

impl TileContent for StubContent {
    fn content_type(&self) -> &'static str {
        "stub"
    }

    fn ready(&self) -> bool {
        self.ready.get()
    }

    fn update(&mut self, _tileset: &Tileset, _frame_state: &mut FrameState) -> Result<()> {
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }

    fn apply_style(&mut self, _style: &dyn TileStyle) {
        self.styled.set(self.styled.get() + 1);
    }

    fn apply_debug_settings(&mut self, _enabled: bool, _color: Color) {}

    fn pick(&self, ray: &Ray, _frame_state: &FrameState) -> Option<DVec3> {
        let direction = ray.direction.normalize();
        let axis = if self.aside {
            direction.any_orthonormal_vector()
        } else {
            direction
        };
        Some(ray.origin + axis * f64::from(self.distance))
    }

    fn has_property(&self, _batch_id: u32, _name: &str) -> bool {
        false
    }

    fn get_feature(&mut self, _batch_id: u32) -> Option<Feature> {
        None
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn metadata(&self) -> Option<&Rc<ContentMetadata>> {
        self.metadata.as_ref()
    }

    fn set_metadata(&mut self, metadata: Option<Rc<ContentMetadata>>) {
        self.metadata = metadata;
    }

    fn group(&self) -> Option<&Rc<ContentGroup>> {
        self.group.as_ref()
    }

    fn set_group(&mut self, group: Option<Rc<ContentGroup>>) {
        self.group = group;
    }

    fn features_length(&self) -> usize {
        STUB_FEATURES
    }

    fn triangles_length(&self) -> usize {
        STUB_TRIANGLES
    }

    fn geometry_byte_length(&self) -> usize {
        STUB_BYTES
    }

    fn batch_table_byte_length(&self) -> usize {
        STUB_BYTES
    }
}

/// A composite-aware registry with a `stub` factory that records its calls.
pub fn stub_factories(log: Rc<StubLog>) -> ContentFactories {
    let mut factories = ContentFactories::with_composite();
    factories.register_sync(STUB_MAGIC, move |ctx| {
        log.invocations.set(log.invocations.get() + 1);
        let payload = ctx.payload();
        let (distance, aside) = (payload[12], payload[13] == 1);
        log.built
            .borrow_mut()
            .push((distance, ctx.resource.composite_index()));

        let mut stub = StubContent::new(distance, aside);
        stub.ready.set(log.initially_ready.get());
        log.ready.borrow_mut().push(Rc::clone(&stub.ready));
        stub.updates = Rc::clone(&log.updates);
        stub.styled = Rc::clone(&log.styled);
        let content: Box<dyn TileContent> = Box::new(stub);
        Ok(content)
    });
    factories
}

/// Scheduler that never accepts work; composites of stubs never decode.
pub struct IdleScheduler;

impl DecodeScheduler for IdleScheduler {
    fn schedule(&self, request: DecodeRequest) -> Scheduled {
        Scheduled::Deferred(request)
    }
}

pub fn idle_tileset() -> Rc<Tileset> {
    Rc::new(Tileset::new(TilesetOptions::default(), Rc::new(IdleScheduler)))
}

pub fn expect_err<T>(result: Result<T>) -> Error {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}
