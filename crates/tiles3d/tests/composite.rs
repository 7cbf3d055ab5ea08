mod common;

use std::cell::Cell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use common::{
    STUB_BYTES, STUB_FEATURES, StubLog, composite, composite_with_version, expect_err,
    idle_tileset, stub_factories, stub_tile, stub_tile_aside, tile,
};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use glam::DVec3;
use tiles3d::{
    Color, ContentFactories, ContentMetadata, DecodeError, Error, FactoryContext, FrameState,
    MemoryCache, Ray, Resource, ResourceFetcher, ResourceLoader, Result, Tile, TileContent,
    create_content,
};

const URL: &str = "https://example.com/tiles/0.cmpt";

async fn decode(bytes: Vec<u8>, factories: ContentFactories) -> Result<Box<dyn TileContent>> {
    create_content(FactoryContext {
        tileset: idle_tileset(),
        tile: Rc::new(Tile::new(7)),
        resource: Resource::new(URL),
        buffer: bytes.into(),
        byte_offset: 0,
        factories: Rc::new(factories),
    })
    .await
}

fn z_ray() -> Ray {
    Ray::new(DVec3::ZERO, DVec3::Z)
}

#[tokio::test]
async fn children_follow_container_order() {
    common::init_tracing();
    let log = StubLog::new();
    let bytes = composite(&[stub_tile(3), stub_tile(1), stub_tile(2)]);
    let content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();

    assert_eq!(content.content_type(), "composite");
    let built = log.built.borrow();
    let ids: Vec<u8> = built.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, [3, 1, 2]);
    let paths: Vec<&str> = built.iter().filter_map(|(_, p)| p.as_deref()).collect();
    assert_eq!(paths, ["0", "1", "2"]);

    let frame = FrameState::new(0);
    let hits: Vec<f64> = content
        .inner_contents()
        .unwrap()
        .iter()
        .map(|c| c.pick(&z_ray(), &frame).unwrap().z)
        .collect();
    assert_eq!(hits, [3.0, 1.0, 2.0]);
}

#[tokio::test]
async fn empty_composite_has_no_children() {
    let log = StubLog::new();
    let content = decode(composite(&[]), stub_factories(Rc::clone(&log)))
        .await
        .unwrap();
    assert_eq!(content.inner_contents().map(<[_]>::len), Some(0));
    assert_eq!(log.invocations.get(), 0);
}

#[tokio::test]
async fn unsupported_version_is_rejected() {
    let log = StubLog::new();
    let bytes = composite_with_version(2, &[stub_tile(1)]);
    let err = expect_err(decode(bytes, stub_factories(Rc::clone(&log))).await);
    assert!(matches!(
        err,
        Error::Decode(DecodeError::UnsupportedVersion { version: 2 })
    ));
    assert_eq!(log.invocations.get(), 0);
}

#[tokio::test]
async fn unknown_tag_aborts_without_visiting_later_siblings() {
    common::init_tracing();
    let log = StubLog::new();
    let bytes = composite(&[stub_tile(1), tile(*b"zzzz", &[0]), stub_tile(2)]);
    let err = expect_err(decode(bytes, stub_factories(Rc::clone(&log))).await);

    match err {
        Error::Decode(DecodeError::UnknownContentType { magic }) => assert_eq!(magic, "zzzz"),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(log.invocations.get(), 1);
}

#[tokio::test]
async fn truncated_child_is_an_error() {
    let log = StubLog::new();
    let mut bytes = composite(&[stub_tile(1), stub_tile(2)]);
    bytes.truncate(bytes.len() - 4);
    let err = expect_err(decode(bytes, stub_factories(Rc::clone(&log))).await);
    assert!(matches!(err, Error::Decode(DecodeError::Truncated { .. })));
}

#[tokio::test]
async fn failing_child_discards_the_composite() {
    let log = StubLog::new();
    let mut factories = stub_factories(Rc::clone(&log));
    factories.register_sync(*b"fail", |ctx| {
        Err(Error::Fetch {
            url: ctx.resource.cache_key(),
            message: "gone".into(),
        })
    });
    let bytes = composite(&[stub_tile(1), tile(*b"fail", &[]), stub_tile(2)]);
    match expect_err(decode(bytes, factories).await) {
        Error::Fetch { url, .. } => assert_eq!(url, format!("{URL}?compositeIndex=1")),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn nested_composites_get_distinct_paths() {
    let log = StubLog::new();
    let inner = composite(&[stub_tile(2), composite(&[stub_tile(3)])]);
    let bytes = composite(&[stub_tile(1), inner]);
    let content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();

    let built = log.built.borrow();
    let mut seen: Vec<(u8, &str)> = built
        .iter()
        .map(|(id, path)| (*id, path.as_deref().unwrap_or_default()))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, [(1, "0"), (2, "1_0"), (3, "1_1_0")]);

    let children = content.inner_contents().unwrap();
    assert_eq!(children[1].content_type(), "composite");
    let grandchildren = children[1].inner_contents().unwrap();
    assert_eq!(grandchildren.len(), 2);
    assert_eq!(grandchildren[1].inner_contents().map(<[_]>::len), Some(1));
}

#[tokio::test]
async fn composite_inside_composite_is_depth_two() {
    let log = StubLog::new();
    let bytes = composite(&[composite(&[stub_tile(1), stub_tile(2)])]);
    let content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();

    let children = content.inner_contents().unwrap();
    assert_eq!(children.len(), 1);
    let grandchildren = children[0].inner_contents().unwrap();
    assert_eq!(grandchildren.len(), 2);
    assert!(grandchildren.iter().all(|c| c.inner_contents().is_none()));
}

#[tokio::test]
async fn ready_once_the_last_child_is_and_then_sticks() {
    let log = StubLog::new();
    log.initially_ready.set(false);
    let tileset = idle_tileset();
    let bytes = composite(&[stub_tile(1), stub_tile(2)]);
    let mut content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();
    let mut frame = FrameState::new(0);

    content.update(&tileset, &mut frame).unwrap();
    assert_eq!(log.updates.get(), 2);
    assert!(!content.ready());
    assert!(content.pick(&z_ray(), &frame).is_none());

    log.set_ready(1, true);
    content.update(&tileset, &mut frame).unwrap();
    assert!(!content.ready());

    log.set_ready(0, true);
    assert!(!content.ready());
    content.update(&tileset, &mut frame).unwrap();
    assert!(content.ready());

    log.set_ready(0, false);
    content.update(&tileset, &mut frame).unwrap();
    assert!(content.ready());
    assert_eq!(log.updates.get(), 8);
}

#[tokio::test]
async fn pick_returns_the_nearest_child_hit() {
    let log = StubLog::new();
    let tileset = idle_tileset();
    let bytes = composite(&[stub_tile(5), stub_tile(2), stub_tile(9)]);
    let mut content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();
    let mut frame = FrameState::new(0);
    content.update(&tileset, &mut frame).unwrap();

    let hit = content.pick(&z_ray(), &frame).unwrap();
    assert_eq!(hit, DVec3::new(0.0, 0.0, 2.0));
}

#[tokio::test]
async fn equally_distant_hits_go_to_the_first_child() {
    let tileset = idle_tileset();
    let mut frame = FrameState::new(0);

    let bytes = composite(&[stub_tile_aside(3), stub_tile(3)]);
    let mut content = decode(bytes, stub_factories(StubLog::new())).await.unwrap();
    content.update(&tileset, &mut frame).unwrap();
    let hit = content.pick(&z_ray(), &frame).unwrap();
    assert_abs_diff_eq!(hit.length(), 3.0);
    assert_abs_diff_eq!(hit.z, 0.0);

    let bytes = composite(&[stub_tile(3), stub_tile_aside(3)]);
    let mut content = decode(bytes, stub_factories(StubLog::new())).await.unwrap();
    content.update(&tileset, &mut frame).unwrap();
    let hit = content.pick(&z_ray(), &frame).unwrap();
    assert_abs_diff_eq!(hit.z, 3.0);
}

#[tokio::test]
async fn statistics_are_not_summed_from_children() {
    let log = StubLog::new();
    let tileset = idle_tileset();
    let bytes = composite(&[stub_tile(1), stub_tile(2)]);
    let mut content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();
    content.update(&tileset, &mut FrameState::new(0)).unwrap();
    assert!(content.ready());

    let children = content.inner_contents().unwrap();
    assert!(children.iter().all(|c| c.features_length() == STUB_FEATURES));
    assert!(children.iter().all(|c| c.batch_table_byte_length() == STUB_BYTES));

    assert_eq!(content.features_length(), 0);
    assert_eq!(content.points_length(), 0);
    assert_eq!(content.triangles_length(), 0);
    assert_eq!(content.geometry_byte_length(), 0);
    assert_eq!(content.textures_byte_length(), 0);
    assert_eq!(content.batch_table_byte_length(), 0);
    assert!(content.batch_table().is_none());
}

#[tokio::test]
async fn style_metadata_and_destroy_fan_out() {
    let log = StubLog::new();
    let bytes = composite(&[stub_tile(1), composite(&[stub_tile(2)])]);
    let mut content = decode(bytes, stub_factories(Rc::clone(&log))).await.unwrap();

    content.apply_style(&Color::RED);
    assert_eq!(log.styled.get(), 2);

    content.set_metadata(Some(Rc::new(ContentMetadata::default())));
    let children = content.inner_contents().unwrap();
    assert!(children.iter().all(|c| c.metadata().is_some()));
    assert!(children[1].inner_contents().unwrap()[0].metadata().is_some());

    content.destroy();
    assert!(content.is_destroyed());
    let children = content.inner_contents().unwrap();
    assert!(children.iter().all(|c| c.is_destroyed()));
    assert!(children[1].inner_contents().unwrap()[0].is_destroyed());
}

struct StaticFetcher {
    bytes: Vec<u8>,
    fetches: Rc<Cell<usize>>,
}

impl ResourceFetcher for StaticFetcher {
    fn fetch_array_buffer<'a>(&'a self, _url: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>>> {
        self.fetches.set(self.fetches.get() + 1);
        let bytes = self.bytes.clone();
        async move { Ok(bytes) }.boxed_local()
    }
}

#[tokio::test]
async fn loader_fetches_once_through_the_cache() {
    let log = StubLog::new();
    let fetches = Rc::new(Cell::new(0));
    let loader = ResourceLoader::with_cache(
        StaticFetcher {
            bytes: composite(&[stub_tile(4)]),
            fetches: Rc::clone(&fetches),
        },
        MemoryCache::new(),
    );
    let factories = Rc::new(stub_factories(Rc::clone(&log)));
    let tile = Rc::new(Tile::new(1));

    for _ in 0..2 {
        let content = loader
            .load_content(
                idle_tileset(),
                Rc::clone(&tile),
                Resource::new(URL),
                Rc::clone(&factories),
            )
            .await
            .unwrap();
        assert_eq!(content.inner_contents().map(<[_]>::len), Some(1));
    }
    assert_eq!(fetches.get(), 1);
    assert_eq!(loader.cache().len(), 1);
    assert_eq!(log.invocations.get(), 2);
}
