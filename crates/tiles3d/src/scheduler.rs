//! Submission of geometry decodes to background workers.
//!
//! Scheduling never blocks: a full scheduler hands the request back as
//! [`Scheduled::Deferred`] and the caller tries again on a later frame.
//! Replies arrive on a channel that contents poll once per frame.

use async_channel::TryRecvError;
use tiles3d_decode::{DecodeRequest, DecodeResponse};

use crate::error::{Error, Result};

/// Outcome of a scheduling attempt.
#[derive(Debug)]
pub enum Scheduled {
    /// The request was accepted; poll the handle for its reply.
    Submitted(DecodeHandle),
    /// No slot is free. The request is returned untouched.
    Deferred(DecodeRequest),
}

/// Runs geometry decodes away from the caller's thread.
pub trait DecodeScheduler {
    fn schedule(&self, request: DecodeRequest) -> Scheduled;
}

/// Receiving end of one outstanding decode.
#[derive(Debug)]
pub struct DecodeHandle {
    reply: async_channel::Receiver<Result<DecodeResponse>>,
}

impl DecodeHandle {
    /// Create a connected reply/handle pair.
    #[must_use]
    pub fn channel() -> (DecodeReply, DecodeHandle) {
        let (tx, rx) = async_channel::bounded(1);
        (DecodeReply { tx }, DecodeHandle { reply: rx })
    }

    /// Check for a reply without blocking.
    ///
    /// A worker that goes away without replying reports
    /// [`Error::WorkerDisconnected`].
    pub fn poll(&self) -> Option<Result<DecodeResponse>> {
        match self.reply.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(Error::WorkerDisconnected)),
        }
    }
}

/// Sending end of one outstanding decode.
#[derive(Debug)]
pub struct DecodeReply {
    tx: async_channel::Sender<Result<DecodeResponse>>,
}

impl DecodeReply {
    pub fn resolve(self, response: DecodeResponse) {
        self.send(Ok(response));
    }

    pub fn reject(self, error: Error) {
        self.send(Err(error));
    }

    pub fn send(self, result: Result<DecodeResponse>) {
        if self.tx.try_send(result).is_err() {
            // The content was destroyed and dropped its handle.
            tracing::debug!("Discarding decode result for a destroyed content");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_sees_reply_once() {
        let (reply, handle) = DecodeHandle::channel();
        assert!(handle.poll().is_none());
        reply.resolve(DecodeResponse::default());
        assert!(matches!(handle.poll(), Some(Ok(_))));
        assert!(matches!(handle.poll(), Some(Err(Error::WorkerDisconnected))));
    }

    #[test]
    fn dropped_reply_disconnects() {
        let (reply, handle) = DecodeHandle::channel();
        drop(reply);
        assert!(matches!(handle.poll(), Some(Err(Error::WorkerDisconnected))));
    }

    #[test]
    fn reply_after_handle_dropped_is_silent() {
        let (reply, handle) = DecodeHandle::channel();
        drop(handle);
        reply.reject(Error::Worker("late".to_string()));
    }
}
