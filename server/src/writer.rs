//! Batched, periodically flushed packet output for one connection
//!
//! Packets submitted to a [`SessionWriter`] are encoded straight into a shared
//! buffer. A background task owned by the writer wakes up every flush interval
//! (or when asked through [`SessionWriter::flush`]) and moves whatever has been
//! buffered to the socket in one write. Broadcasts produce many small packets
//! per recipient, and batching them keeps the number of syscalls per tick low.
//!
//! The first failure is terminal. A submission that overflows the buffer, a
//! failed socket write or an explicit [`SessionWriter::close`] is stored and
//! returned to every later caller, and the flush task exits. The connection
//! task watches [`SessionWriter::stopped`] to tear the session down.

use log::{debug, warn};
use shared::ServerPacket;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Notify};

/// Bytes a session may have queued before it is considered dead.
pub const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Error)]
pub enum WriterError {
    #[error("writer closed")]
    Closed,

    #[error("{pending} bytes pending, limit is {limit}")]
    Overflow { pending: usize, limit: usize },

    #[error("flush failed: {0}")]
    Flush(Arc<io::Error>),
}

#[derive(Debug, Default)]
struct State {
    buffer: Vec<u8>,
    error: Option<WriterError>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to a connection's outbound buffer.
#[derive(Debug, Clone)]
pub struct SessionWriter {
    state: Arc<Mutex<State>>,
    wake: Arc<Notify>,
    stopped: watch::Receiver<bool>,
    limit: usize,
}

impl SessionWriter {
    /// Starts the flush task for `sink` and returns the handle feeding it.
    pub fn spawn<W>(sink: W, interval: Duration) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_limit(sink, interval, MAX_PENDING_BYTES)
    }

    pub fn with_limit<W>(sink: W, interval: Duration, limit: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = Arc::new(Mutex::new(State::default()));
        let wake = Arc::new(Notify::new());
        let (stopped_tx, stopped) = watch::channel(false);

        tokio::spawn(flush_loop(
            sink,
            interval,
            Arc::clone(&state),
            Arc::clone(&wake),
            stopped_tx,
        ));

        Self {
            state,
            wake,
            stopped,
            limit,
        }
    }

    /// Encodes `packets` into the buffer, in order.
    ///
    /// The whole submission is applied under one lock, so it is never
    /// interleaved with another caller's packets. Nothing is written to the
    /// socket until the next flush.
    pub fn submit(&self, packets: &[ServerPacket]) -> Result<(), WriterError> {
        let mut state = lock(&self.state);
        if let Some(err) = &state.error {
            return Err(err.clone());
        }

        for packet in packets {
            let pending = state.buffer.len() + packet.encoded_len();
            if pending > self.limit {
                let err = WriterError::Overflow {
                    pending,
                    limit: self.limit,
                };
                state.error = Some(err.clone());
                self.wake.notify_one();
                return Err(err);
            }
            packet.encode(&mut state.buffer);
        }
        Ok(())
    }

    /// Asks the flush task to write out the buffer now instead of at the next tick.
    pub fn flush(&self) {
        self.wake.notify_one();
    }

    /// Stops accepting packets. Bytes submitted earlier are still written once.
    pub fn close(&self) {
        lock(&self.state).error = Some(WriterError::Closed);
        self.wake.notify_one();
    }

    /// The terminal error, if the writer has one.
    pub fn error(&self) -> Option<WriterError> {
        lock(&self.state).error.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Resolves once the flush task has exited.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        while !*stopped.borrow_and_update() {
            if stopped.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn flush_loop<W>(
    mut sink: W,
    interval: Duration,
    state: Arc<Mutex<State>>,
    wake: Arc<Notify>,
    stopped: watch::Sender<bool>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.notified() => {}
        }

        // every handle dropped without close counts as a close
        let orphaned = Arc::strong_count(&state) == 1;
        let (pending, closing) = {
            let mut state = lock(&state);
            let closing = match state.error {
                None => orphaned,
                Some(WriterError::Closed) => true,
                Some(ref err) => {
                    debug!("Session writer stopping: {}", err);
                    break;
                }
            };
            (std::mem::take(&mut state.buffer), closing)
        };

        if !pending.is_empty() {
            let result = match sink.write_all(&pending).await {
                Ok(()) => sink.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Session writer flush failed: {}", e);
                lock(&state).error = Some(WriterError::Flush(Arc::new(e)));
                break;
            }
        }

        if closing {
            if let Err(e) = sink.shutdown().await {
                debug!("Session writer shutdown failed: {}", e);
            }
            break;
        }
    }

    stopped.send_replace(true);
}
