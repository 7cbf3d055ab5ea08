//! Thread pool running [`create_vector_geometries`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tiles3d_decode::{DecodeRequest, create_vector_geometries};

use crate::error::{Error, Result};
use crate::options::TilesetOptions;
use crate::scheduler::{DecodeHandle, DecodeReply, DecodeScheduler, Scheduled};

struct Job {
    request: DecodeRequest,
    reply: DecodeReply,
}

/// Fixed set of decode threads with a cap on requests in flight.
pub struct DecodeWorkerPool {
    jobs: async_channel::Sender<Job>,
    active: Arc<AtomicUsize>,
    maximum_active: usize,
    workers: Vec<JoinHandle<()>>,
}

impl DecodeWorkerPool {
    /// Spawn `worker_count` threads accepting at most `maximum_active` requests.
    pub fn new(worker_count: usize, maximum_active: usize) -> Result<Self> {
        let (jobs, queue) = async_channel::unbounded::<Job>();
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count.max(1))
            .map(|i| {
                let queue = queue.clone();
                let active = Arc::clone(&active);
                thread::Builder::new()
                    .name(format!("tiles3d-decode-{i}"))
                    .spawn(move || run_worker(&queue, &active))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        tracing::info!(
            "Started {} decode workers, at most {} active decodes",
            workers.len(),
            maximum_active
        );

        Ok(Self {
            jobs,
            active,
            maximum_active: maximum_active.max(1),
            workers,
        })
    }

    pub fn from_options(options: &TilesetOptions) -> Result<Self> {
        Self::new(options.decode_workers, options.maximum_active_decodes)
    }

    /// Requests accepted but not yet answered.
    #[must_use]
    pub fn active_decodes(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl DecodeScheduler for DecodeWorkerPool {
    fn schedule(&self, request: DecodeRequest) -> Scheduled {
        let reserved = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.maximum_active).then_some(active + 1)
            });
        if reserved.is_err() {
            return Scheduled::Deferred(request);
        }

        let (reply, handle) = DecodeHandle::channel();
        if let Err(e) = self.jobs.try_send(Job { request, reply }) {
            // Only possible once every worker has exited; the dropped reply
            // surfaces as a disconnected handle.
            self.active.fetch_sub(1, Ordering::AcqRel);
            tracing::error!("Decode queue closed: {}", e);
        }
        Scheduled::Submitted(handle)
    }
}

impl Drop for DecodeWorkerPool {
    fn drop(&mut self) {
        self.jobs.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Decode worker exited with a panic");
            }
        }
    }
}

fn run_worker(queue: &async_channel::Receiver<Job>, active: &AtomicUsize) {
    while let Ok(Job { request, reply }) = queue.recv_blocking() {
        let shapes = request.shape_count();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| {
            create_vector_geometries(request)
        })) {
            Ok(Ok(response)) => {
                tracing::debug!(
                    "Decoded {} shapes into {} vertices",
                    shapes,
                    response.positions.len() / 3
                );
                Ok(response)
            }
            Ok(Err(e)) => Err(Error::from(e)),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Decode worker panicked: {}", message);
                Err(Error::Worker(message))
            }
        };
        active.fetch_sub(1, Ordering::AcqRel);
        reply.send(result);
    }
}
