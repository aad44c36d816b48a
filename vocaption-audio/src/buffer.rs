//! Bounded chunk queue between the realtime callback and the async consumer
//!
//! The audio callback must never block or fail, so the producer side is a
//! short lock around a `VecDeque`: when the queue is full the oldest chunk is
//! dropped in favour of the newest (losing stale audio beats accumulating
//! latency). The consumer side suspends on a `Notify` until a chunk arrives
//! or the capture session ends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{CaptureError, Result};
use crate::DEFAULT_QUEUE_CAPACITY;

/// One fixed-duration block of raw PCM bytes.
pub type AudioChunk = Vec<u8>;

#[derive(Debug)]
struct QueueInner {
    chunks: Mutex<VecDeque<AudioChunk>>,
    error: Mutex<Option<CaptureError>>,
    capacity: usize,
    notify: Notify,
    stopped: AtomicBool,
}

/// Bounded single-producer single-consumer chunk queue.
///
/// Cloning yields another handle to the same queue; the capture callback
/// holds one clone, the audio pump another.
#[derive(Clone, Debug)]
pub struct ChunkQueue {
    inner: Arc<QueueInner>,
}

impl ChunkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                chunks: Mutex::new(VecDeque::with_capacity(capacity)),
                error: Mutex::new(None),
                capacity,
                notify: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a chunk from the realtime callback. Never blocks beyond the
    /// short deque lock; drops the oldest buffered chunk when full.
    pub fn push(&self, chunk: AudioChunk) {
        if self.inner.stopped.load(Ordering::Acquire) {
            return;
        }

        {
            let mut chunks = self.inner.chunks.lock();
            if chunks.len() >= self.inner.capacity {
                // Another drain may have emptied the queue in between; an
                // empty pop here is benign.
                if chunks.pop_front().is_some() {
                    tracing::debug!("Dropped one audio chunk to keep up with realtime processing");
                }
            }
            chunks.push_back(chunk);
        }
        self.inner.notify.notify_one();
    }

    /// Await the next chunk.
    ///
    /// Resolves to `Ok(None)` once the queue has been closed and to `Err` if
    /// the capture thread reported a read failure.
    pub async fn next(&self) -> Result<Option<AudioChunk>> {
        loop {
            // Register interest before checking state so a push between the
            // check and the await cannot be missed.
            let notified = self.inner.notify.notified();

            if let Some(err) = self.inner.error.lock().take() {
                return Err(err);
            }
            if self.inner.stopped.load(Ordering::Acquire) {
                return Ok(None);
            }
            if let Some(chunk) = self.inner.chunks.lock().pop_front() {
                return Ok(Some(chunk));
            }

            notified.await;
        }
    }

    /// Close the queue; pending and future `next()` calls end the sequence.
    pub fn close(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    /// Record a capture-read failure and close the queue. The error is
    /// surfaced by the next `next()` call.
    pub fn fail(&self, err: CaptureError) {
        *self.inner.error.lock() = Some(err);
        self.close();
    }

    /// Number of chunks currently buffered.
    pub fn len(&self) -> usize {
        self.inner.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.chunks.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
