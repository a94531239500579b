//! Bounded frame queue between the reader and writer pumps
//!
//! Single producer, single consumer. Dropping or closing the producer ends
//! the stream once the consumer has drained what is buffered.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default number of frames buffered per session
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Outcome of pushing a frame into the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame was queued
    Queued,
    /// Cancellation fired while waiting for space; the frame was dropped
    Cancelled,
    /// The consumer is gone; the frame was dropped
    Closed,
}

/// Create a queue holding at most `capacity` frames.
///
/// `capacity` must be at least 1.
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (FrameProducer { tx }, FrameConsumer { rx })
}

/// Pushing half, owned by the reader pump
#[derive(Debug)]
pub struct FrameProducer {
    tx: mpsc::Sender<Bytes>,
}

impl FrameProducer {
    /// Queue a frame, waiting for space unless `token` is cancelled first
    pub async fn push(&self, payload: Bytes, token: &CancellationToken) -> PushOutcome {
        tokio::select! {
            _ = token.cancelled() => PushOutcome::Cancelled,
            sent = self.tx.send(payload) => match sent {
                Ok(()) => PushOutcome::Queued,
                Err(_) => PushOutcome::Closed,
            },
        }
    }

    /// Mark the end of the stream
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Popping half, owned by the writer pump
#[derive(Debug)]
pub struct FrameConsumer {
    rx: mpsc::Receiver<Bytes>,
}

impl FrameConsumer {
    /// Next frame in arrival order, or `None` once closed and drained
    pub async fn pop(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
