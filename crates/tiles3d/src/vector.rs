//! Vector geometry content: boxes, cylinders, ellipsoids and spheres whose
//! buffers are built on a background worker.
//!
//! The content moves through `Unstarted -> Decoding -> Ready`, or ends in
//! `Errored` when the decode fails. Raw shape parameters are copied into the
//! decode request and released; decoded buffers are moved into the
//! primitive. The content never holds both at once.

use std::rc::Rc;

use glam::{DMat4, DVec3};
use tiles3d_decode::{
    BoundingSphere, Color, DecodeRequest, DecodeResponse, IndexBuffer, ShapeBuffers,
    pack_context, unpack_result,
};

use crate::batch_table::{BatchTable, Feature, SharedBatchTable, TileStyle};
use crate::content::{ContentGroup, ContentMetadata, TileContent, precondition};
use crate::error::Result;
use crate::primitive::{PrimitiveOptions, VectorPrimitive};
use crate::scheduler::{DecodeHandle, DecodeScheduler, Scheduled};
use crate::tileset::{FrameState, Ray, Tileset};

/// Shape parameters and batch ids, possibly shared with other owners.
#[derive(Debug, Clone)]
pub struct RawShapes {
    pub values: Rc<[f32]>,
    pub batch_ids: Rc<[u32]>,
}

impl RawShapes {
    pub fn new(values: impl Into<Rc<[f32]>>, batch_ids: impl Into<Rc<[u32]>>) -> Self {
        Self {
            values: values.into(),
            batch_ids: batch_ids.into(),
        }
    }

    fn copy(&self) -> ShapeBuffers {
        ShapeBuffers::new(self.values.to_vec(), self.batch_ids.to_vec())
    }
}

/// Inputs of a [`VectorGeometryContent`].
#[derive(Debug, Clone)]
pub struct VectorGeometryOptions {
    pub boxes: Option<RawShapes>,
    pub cylinders: Option<RawShapes>,
    pub ellipsoids: Option<RawShapes>,
    pub spheres: Option<RawShapes>,
    /// RTC origin; decoded positions are relative to it.
    pub center: DVec3,
    pub model_matrix: DMat4,
    pub batch_table: SharedBatchTable,
    pub bounding_volume: Option<BoundingSphere>,
}

impl VectorGeometryOptions {
    /// Options with no shapes, an identity transform and a zero center.
    #[must_use]
    pub fn new(batch_table: SharedBatchTable) -> Self {
        Self {
            boxes: None,
            cylinders: None,
            ellipsoids: None,
            spheres: None,
            center: DVec3::ZERO,
            model_matrix: DMat4::IDENTITY,
            batch_table,
            bounding_volume: None,
        }
    }
}

/// Externally visible decode progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Unstarted,
    Decoding,
    Ready,
    Errored,
    Destroyed,
}

#[derive(Debug)]
struct RawGeometry {
    boxes: Option<RawShapes>,
    cylinders: Option<RawShapes>,
    ellipsoids: Option<RawShapes>,
    spheres: Option<RawShapes>,
}

impl RawGeometry {
    /// Copy every shape buffer into a request and attach per-shape colors.
    fn pack(self, batch_table: &BatchTable, center: DVec3, model_matrix: &DMat4) -> DecodeRequest {
        let mut request = DecodeRequest {
            boxes: self.boxes.as_ref().map(RawShapes::copy),
            cylinders: self.cylinders.as_ref().map(RawShapes::copy),
            ellipsoids: self.ellipsoids.as_ref().map(RawShapes::copy),
            spheres: self.spheres.as_ref().map(RawShapes::copy),
            packed_colors: Vec::new(),
            context: pack_context(center, model_matrix).to_vec(),
        };
        let packed_colors = request
            .shapes()
            .flat_map(|(_, shapes)| shapes.batch_ids.iter())
            .map(|&id| batch_table.color(id).to_rgba())
            .collect();
        request.packed_colors = packed_colors;
        request
    }
}

#[derive(Debug)]
enum DecodeState {
    Unstarted(RawGeometry),
    /// Packed, waiting for a free worker slot.
    Deferred(DecodeRequest),
    Decoding(DecodeHandle),
    Ready(VectorPrimitive),
    Errored,
    Destroyed,
}

/// Tile content made of batched vector shapes.
#[derive(Debug)]
pub struct VectorGeometryContent {
    state: DecodeState,
    batch_table: SharedBatchTable,
    center: DVec3,
    model_matrix: DMat4,
    bounding_volume: Option<BoundingSphere>,
    metadata: Option<Rc<ContentMetadata>>,
    group: Option<Rc<ContentGroup>>,
}

impl VectorGeometryContent {
    #[must_use]
    pub fn new(options: VectorGeometryOptions) -> Self {
        let VectorGeometryOptions {
            boxes,
            cylinders,
            ellipsoids,
            spheres,
            center,
            model_matrix,
            batch_table,
            bounding_volume,
        } = options;
        Self {
            state: DecodeState::Unstarted(RawGeometry {
                boxes,
                cylinders,
                ellipsoids,
                spheres,
            }),
            batch_table,
            center,
            model_matrix,
            bounding_volume,
            metadata: None,
            group: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> DecodeStatus {
        match self.state {
            DecodeState::Unstarted(_) | DecodeState::Deferred(_) => DecodeStatus::Unstarted,
            DecodeState::Decoding(_) => DecodeStatus::Decoding,
            DecodeState::Ready(_) => DecodeStatus::Ready,
            DecodeState::Errored => DecodeStatus::Errored,
            DecodeState::Destroyed => DecodeStatus::Destroyed,
        }
    }

    #[must_use]
    pub fn primitive(&self) -> Option<&VectorPrimitive> {
        match &self.state {
            DecodeState::Ready(primitive) => Some(primitive),
            _ => None,
        }
    }

    /// Features for every batch id. Requires a ready content.
    pub fn create_features(&mut self) -> &[Feature] {
        match self.primitive_mut("create_features") {
            Some(primitive) => primitive.create_features(),
            None => &[],
        }
    }

    /// Recolor one feature. Requires a ready content.
    pub fn update_commands(&mut self, batch_id: u32, color: Color) {
        if let Some(primitive) = self.primitive_mut("update_commands") {
            primitive.update_commands(batch_id, color);
        }
    }

    fn live(&self, operation: &str) -> bool {
        precondition(
            !matches!(self.state, DecodeState::Destroyed),
            &format!("{operation} called on a destroyed vector geometry content"),
        )
    }

    fn primitive_mut(&mut self, operation: &str) -> Option<&mut VectorPrimitive> {
        if !self.live(operation) {
            return None;
        }
        let ready = matches!(self.state, DecodeState::Ready(_));
        if !precondition(
            ready,
            &format!("{operation} called before vector geometry is ready"),
        ) {
            return None;
        }
        match &mut self.state {
            DecodeState::Ready(primitive) => Some(primitive),
            _ => None,
        }
    }

    fn submit(scheduler: &dyn DecodeScheduler, request: DecodeRequest) -> DecodeState {
        let shapes = request.shape_count();
        match scheduler.schedule(request) {
            Scheduled::Submitted(handle) => {
                tracing::debug!("Submitted {} shapes for decoding", shapes);
                DecodeState::Decoding(handle)
            }
            Scheduled::Deferred(request) => {
                tracing::trace!("Decode deferred, no worker slot free");
                DecodeState::Deferred(request)
            }
        }
    }

    fn build_primitive(&self, response: DecodeResponse) -> Result<VectorPrimitive> {
        let DecodeResponse {
            packed,
            indices,
            index_offsets,
            index_counts,
            positions,
            vertex_batch_ids,
            batch_ids,
        } = response;
        let unpacked = unpack_result(&packed)?;
        let indices = IndexBuffer::from_bytes(unpacked.index_width, &indices)?;
        let primitive = VectorPrimitive::new(PrimitiveOptions {
            positions,
            vertex_batch_ids,
            indices,
            index_offsets,
            index_counts,
            batched_indices: unpacked.batched_indices,
            bounding_volumes: unpacked.bounding_volumes,
            batch_ids,
            center: self.center,
            bounding_volume: self.bounding_volume,
            batch_table: Rc::clone(&self.batch_table),
        })?;
        Ok(primitive)
    }

    /// Move the decode forward by at most one step.
    fn advance(&mut self, scheduler: &dyn DecodeScheduler) -> Result<()> {
        let state = std::mem::replace(&mut self.state, DecodeState::Errored);
        self.state = match state {
            DecodeState::Unstarted(raw) => {
                let request = raw.pack(&self.batch_table.borrow(), self.center, &self.model_matrix);
                Self::submit(scheduler, request)
            }
            DecodeState::Deferred(request) => Self::submit(scheduler, request),
            DecodeState::Decoding(handle) => match handle.poll() {
                None => DecodeState::Decoding(handle),
                Some(result) => match result.and_then(|response| self.build_primitive(response)) {
                    Ok(primitive) => {
                        tracing::debug!(
                            "Vector geometry ready: {} vertices, {} batches",
                            primitive.vertex_count(),
                            primitive.batched_indices().len()
                        );
                        DecodeState::Ready(primitive)
                    }
                    Err(e) => {
                        tracing::error!("Vector geometry decode failed: {}", e);
                        return Err(e);
                    }
                },
            },
            other => other,
        };
        Ok(())
    }
}

impl TileContent for VectorGeometryContent {
    fn content_type(&self) -> &'static str {
        "vector"
    }

    fn ready(&self) -> bool {
        matches!(self.state, DecodeState::Ready(_))
    }

    fn update(&mut self, tileset: &Tileset, frame_state: &mut FrameState) -> Result<()> {
        if !self.live("update") {
            return Ok(());
        }
        if matches!(
            self.state,
            DecodeState::Unstarted(_) | DecodeState::Deferred(_) | DecodeState::Decoding(_)
        ) {
            self.advance(tileset.scheduler())?;
        }
        if let DecodeState::Ready(primitive) = &mut self.state {
            primitive.update(tileset.options(), frame_state);
        }
        Ok(())
    }

    fn apply_style(&mut self, style: &dyn TileStyle) {
        if let Some(primitive) = self.primitive_mut("apply_style") {
            primitive.apply_style(style);
        }
    }

    fn apply_debug_settings(&mut self, enabled: bool, color: Color) {
        if let Some(primitive) = self.primitive_mut("apply_debug_settings") {
            primitive.apply_debug_settings(enabled, color);
        }
    }

    fn pick(&self, ray: &Ray, _frame_state: &FrameState) -> Option<DVec3> {
        if !self.live("pick") {
            return None;
        }
        self.primitive()?.pick(ray)
    }

    fn has_property(&self, batch_id: u32, name: &str) -> bool {
        self.live("has_property") && self.batch_table.borrow().has_property(batch_id, name)
    }

    fn get_feature(&mut self, batch_id: u32) -> Option<Feature> {
        self.primitive_mut("get_feature")?.feature(batch_id)
    }

    fn destroy(&mut self) {
        match &mut self.state {
            DecodeState::Decoding(_) => {
                tracing::debug!("Vector geometry destroyed while decoding, discarding result");
            }
            DecodeState::Ready(primitive) => primitive.destroy(),
            _ => {}
        }
        self.state = DecodeState::Destroyed;
    }

    fn is_destroyed(&self) -> bool {
        matches!(self.state, DecodeState::Destroyed)
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

    fn batch_table(&self) -> Option<SharedBatchTable> {
        Some(Rc::clone(&self.batch_table))
    }

    fn features_length(&self) -> usize {
        self.batch_table.borrow().features_length()
    }

    fn triangles_length(&self) -> usize {
        self.primitive().map_or(0, VectorPrimitive::triangles_length)
    }

    fn geometry_byte_length(&self) -> usize {
        self.primitive()
            .map_or(0, VectorPrimitive::geometry_byte_length)
    }

    fn batch_table_byte_length(&self) -> usize {
        self.batch_table.borrow().memory_size_in_bytes()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use approx::assert_abs_diff_eq;
    use tiles3d_decode::{DecodeError, create_vector_geometries};

    use super::*;
    use crate::batch_table::BatchTable;
    use crate::error::Error;
    use crate::options::TilesetOptions;
    use crate::scheduler::DecodeReply;
    use crate::tileset::Pass;

    /// Records every request and leaves replies to the test.
    #[derive(Default)]
    struct ManualScheduler {
        calls: Cell<usize>,
        defer: Cell<bool>,
        pending: RefCell<Vec<(DecodeReply, DecodeRequest)>>,
    }

    impl ManualScheduler {
        fn finish(&self) {
            for (reply, request) in self.pending.borrow_mut().drain(..) {
                reply.send(create_vector_geometries(request).map_err(Error::from));
            }
        }

        fn finish_corrupted(&self, corrupt: impl Fn(&mut DecodeResponse)) {
            for (reply, request) in self.pending.borrow_mut().drain(..) {
                let mut response = create_vector_geometries(request).unwrap();
                corrupt(&mut response);
                reply.resolve(response);
            }
        }

        fn fail(&self) {
            for (reply, _) in self.pending.borrow_mut().drain(..) {
                reply.reject(Error::Worker("out of memory".into()));
            }
        }
    }

    impl DecodeScheduler for ManualScheduler {
        fn schedule(&self, request: DecodeRequest) -> Scheduled {
            self.calls.set(self.calls.get() + 1);
            if self.defer.get() {
                return Scheduled::Deferred(request);
            }
            let (reply, handle) = DecodeHandle::channel();
            self.pending.borrow_mut().push((reply, request));
            Scheduled::Submitted(handle)
        }
    }

    fn setup() -> (Rc<ManualScheduler>, Tileset) {
        let scheduler = Rc::new(ManualScheduler::default());
        let shared: Rc<dyn DecodeScheduler> = scheduler.clone();
        let tileset = Tileset::new(TilesetOptions::default(), shared);
        (scheduler, tileset)
    }

    /// Two unit spheres on the z axis at z = 5 and z = 10.
    fn content() -> VectorGeometryContent {
        let mut options = VectorGeometryOptions::new(BatchTable::new(2).into_shared());
        options.spheres = Some(RawShapes::new(
            vec![1.0, 0.0, 0.0, 5.0, 1.0, 0.0, 0.0, 10.0],
            vec![0, 1],
        ));
        VectorGeometryContent::new(options)
    }

    #[test]
    fn decodes_in_the_background() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        let mut frame = FrameState::new(0);

        content.update(&tileset, &mut frame).unwrap();
        assert_eq!(content.status(), DecodeStatus::Decoding);
        assert!(frame.commands.is_empty());

        content.update(&tileset, &mut frame).unwrap();
        assert_eq!(content.status(), DecodeStatus::Decoding);

        scheduler.finish();
        content.update(&tileset, &mut frame).unwrap();
        assert!(content.ready());
        assert_eq!(scheduler.calls.get(), 1);
        assert_eq!(frame.commands.len(), 1);
        assert!(content.triangles_length() > 0);
        assert!(content.geometry_byte_length() > 0);
    }

    #[test]
    fn deferred_decode_is_retried() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        let mut frame = FrameState::new(0);

        scheduler.defer.set(true);
        content.update(&tileset, &mut frame).unwrap();
        assert_eq!(content.status(), DecodeStatus::Unstarted);

        scheduler.defer.set(false);
        content.update(&tileset, &mut frame).unwrap();
        assert_eq!(content.status(), DecodeStatus::Decoding);
        assert_eq!(scheduler.calls.get(), 2);
    }

    #[test]
    fn packs_colors_in_submission_order() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        content.batch_table.borrow_mut().set_color(1, Color::RED);
        content.update(&tileset, &mut FrameState::new(0)).unwrap();

        let pending = scheduler.pending.borrow();
        let request = &pending[0].1;
        assert_eq!(
            request.packed_colors,
            vec![Color::WHITE.to_rgba(), Color::RED.to_rgba()]
        );
        assert_eq!(request.spheres.as_ref().map(ShapeBuffers::len), Some(2));
    }

    #[test]
    fn failure_is_reported_once() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        let mut frame = FrameState::new(0);

        content.update(&tileset, &mut frame).unwrap();
        scheduler.fail();
        assert!(matches!(
            content.update(&tileset, &mut frame),
            Err(Error::Worker(_))
        ));
        assert_eq!(content.status(), DecodeStatus::Errored);
        assert!(content.update(&tileset, &mut frame).is_ok());
        assert!(!content.ready());
        assert_eq!(scheduler.calls.get(), 1);
    }

    #[test]
    fn inconsistent_response_is_a_decode_error() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        content.update(&tileset, &mut FrameState::new(0)).unwrap();

        scheduler.finish_corrupted(|response| response.index_offsets.truncate(1));
        let err = content.update(&tileset, &mut FrameState::new(1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::MismatchedLength {
                what: "index offsets",
                ..
            })
        ));
        assert_eq!(content.status(), DecodeStatus::Errored);

        let mut pick = FrameState {
            pass: Pass::Pick,
            ..FrameState::default()
        };
        content.update(&tileset, &mut pick).unwrap();
        assert!(pick.commands.is_empty());
    }

    #[test]
    fn destroy_discards_pending_result() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        content.update(&tileset, &mut FrameState::new(0)).unwrap();

        content.destroy();
        scheduler.finish();
        assert!(content.is_destroyed());
        assert!(content.primitive().is_none());
        content.destroy();
        assert_eq!(content.status(), DecodeStatus::Destroyed);
    }

    #[test]
    fn ready_content_exposes_features() {
        let (scheduler, tileset) = setup();
        let mut content = content();
        content.update(&tileset, &mut FrameState::new(0)).unwrap();
        scheduler.finish();
        content.update(&tileset, &mut FrameState::new(1)).unwrap();

        assert_eq!(content.create_features().len(), 2);
        assert_eq!(content.features_length(), 2);
        content.update_commands(0, Color::RED);
        let feature = content.get_feature(0).unwrap();
        assert_eq!(feature.color(), Color::RED);

        let ray = Ray::new(DVec3::ZERO, DVec3::Z);
        let hit = content.pick(&ray, &FrameState::new(1)).unwrap();
        assert_abs_diff_eq!(hit.z, 4.0, epsilon = 0.1);
    }
}
