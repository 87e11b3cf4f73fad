//! Closable bounded audio queue.
//!
//! Producers hold cheap clones of [`AudioQueue`]; the single consumer owns
//! the matching `mpsc::Receiver`. Closing the queue drops the shared sender,
//! so the consumer drains whatever is already buffered and then sees `None`.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default queue capacity in chunks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Returned by [`AudioQueue::push`] once the queue has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("audio queue is closed")]
pub struct QueueClosed;

/// Producer half of a bounded FIFO of PCM chunks.
#[derive(Clone)]
pub struct AudioQueue {
    sender: Arc<Mutex<Option<mpsc::Sender<Bytes>>>>,
}

impl std::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioQueue")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AudioQueue {
    /// Create a queue holding at most `capacity` chunks.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Enqueue a chunk, waiting while the queue is full.
    pub async fn push(&self, chunk: Bytes) -> Result<(), QueueClosed> {
        // Clone under the lock so the await below does not hold it.
        let sender = self.sender.lock().clone().ok_or(QueueClosed)?;
        sender.send(chunk).await.map_err(|_| QueueClosed)
    }

    /// Close the queue. Returns `true` only for the call that closed it.
    ///
    /// A push already waiting for capacity still completes; the consumer
    /// observes the end of the queue once every sender clone is gone.
    pub fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}
