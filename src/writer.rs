//! Dedicated writer task for the transport's write half.
//!
//! Every byte sent to the controller (requests, retransmissions, ACK/NAK
//! replies) goes through one mpsc channel into one task, so frames from the
//! dispatcher and the read loop can never interleave mid-frame.
//!
//! ```text
//! dispatch()  ─┐
//! retransmit  ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► transport
//! read loop   ─┘
//! ```
//!
//! Frames already queued when the task wakes up are coalesced into a single
//! write followed by one flush.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Result, ZWaveError};
use crate::protocol::{hex, Frame};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum frames to coalesce in a single write.
const MAX_BATCH_SIZE: usize = 16;

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and shared by the dispatcher and the read loop.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Encode and queue a frame.
    ///
    /// Waits if the channel is full. Fails with `ConnectionClosed` once the
    /// writer task has stopped.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        debug!(frame = %frame, "Sending frame");
        self.send_raw(Bytes::from(frame.encode())).await
    }

    /// Queue already encoded bytes.
    pub async fn send_raw(&self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(bytes)
            .await
            .map_err(|_| ZWaveError::ConnectionClosed)
    }

    /// True once the writer task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task exits cleanly when every [`WriterHandle`] has been dropped, or
/// with an error when the transport fails.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = BytesMut::new();

    while let Some(first) = rx.recv().await {
        batch.clear();
        batch.extend_from_slice(&first);

        let mut count = 1;
        while count < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(bytes) => {
                    batch.extend_from_slice(&bytes);
                    count += 1;
                }
                Err(_) => break,
            }
        }

        trace!(bytes = %hex(&batch), frames = count, "Writing");
        writer.write_all(&batch).await?;
        writer.flush().await?;
    }

    debug!("Writer channel closed");
    let _ = writer.shutdown().await;
    Ok(())
}
