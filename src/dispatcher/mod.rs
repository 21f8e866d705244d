//! Request dispatcher.
//!
//! Turns the acknowledged byte stream into a reliable channel with exactly
//! one request outstanding at a time:
//!
//! - callers queue on a fair mutex (the in-flight slot), so requests go out
//!   in FIFO order and the second request's bytes are never written before
//!   the first has settled
//! - the request sits in a [`PendingCell`] that the read loop inspects for
//!   every received frame
//! - an unanswered request is retransmitted on a fixed interval; once the
//!   retry budget is spent a hard timeout settles it as [`ZWaveError::TimedOut`]
//! - frames that match nothing are published to [`Notifications`] subscribers
//!
//! ```text
//! dispatch() ──► slot ──► PendingCell ──► writer
//!                              ▲
//! read loop ──► process_frame ─┴──► ACK/NAK ──► writer
//!                    └──► unsolicited ──► broadcast
//! ```

mod notifications;
mod pending;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, Mutex, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

pub use notifications::Notifications;
use pending::{PendingCell, PendingGuard, PendingRequest};

use crate::config::ControllerConfig;
use crate::error::{Result, ZWaveError};
use crate::protocol::{DataFrame, Frame, FunctionId};
use crate::writer::WriterHandle;

/// Correlates requests with responses and fans out unsolicited frames.
#[derive(Debug)]
pub struct Dispatcher {
    writer: WriterHandle,
    slot: Mutex<()>,
    pending: PendingCell,
    /// Signalled for every valid data frame received while a request is in flight.
    activity: Notify,
    notifications: broadcast::Sender<DataFrame>,
    next_id: AtomicU64,
    closed: CancellationToken,
    retry_count: u32,
    retry_interval: Duration,
    request_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher that writes through `writer`.
    pub fn new(writer: WriterHandle, config: &ControllerConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            writer,
            slot: Mutex::new(()),
            pending: PendingCell::default(),
            activity: Notify::new(),
            notifications,
            next_id: AtomicU64::new(1),
            closed: CancellationToken::new(),
            retry_count: config.retry_count,
            retry_interval: config.retry_interval(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Send `request` and wait for its responses.
    ///
    /// Returns every frame with the request's function code, in arrival
    /// order: one frame for simple requests, the immediate response plus the
    /// callback for send-data requests.
    ///
    /// # Errors
    ///
    /// - [`ZWaveError::Cancelled`] if `token` fires, while queued or in flight
    /// - [`ZWaveError::TimedOut`] after the retries and the hard timeout
    /// - [`ZWaveError::ConnectionClosed`] if the connection goes away
    pub async fn dispatch(
        &self,
        request: DataFrame,
        token: &CancellationToken,
    ) -> Result<Vec<DataFrame>> {
        let mut transmitted = false;
        self.dispatch_tracked(request, token, &mut transmitted).await
    }

    /// [`dispatch`](Self::dispatch) that also reports whether the request
    /// was handed to the writer before it settled.
    pub(crate) async fn dispatch_tracked(
        &self,
        request: DataFrame,
        token: &CancellationToken,
        transmitted: &mut bool,
    ) -> Result<Vec<DataFrame>> {
        let _slot = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ZWaveError::Cancelled),
            _ = self.closed.cancelled() => return Err(ZWaveError::ConnectionClosed),
            slot = self.slot.lock() => slot,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (completion, mut settled) = oneshot::channel();
        self.pending
            .install(PendingRequest::new(id, &request, completion));
        let _guard = PendingGuard {
            cell: &self.pending,
            id,
        };

        let function = request.function();
        let wire = Frame::Data(request);
        // Registered before the first write so activity is never missed.
        let activity = self.activity.notified();
        tokio::pin!(activity);

        self.writer.send(&wire).await?;
        *transmitted = true;

        let mut retries_left = self.retry_count;
        let mut retransmit =
            time::interval_at(Instant::now() + self.retry_interval, self.retry_interval);
        retransmit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = time::sleep(self.request_timeout);
        tokio::pin!(deadline);
        let mut timeout_armed = false;

        loop {
            tokio::select! {
                biased;
                result = &mut settled => {
                    return result.map_err(|_| ZWaveError::ConnectionClosed);
                }
                _ = token.cancelled() => {
                    debug!(%function, "Request cancelled");
                    return Err(ZWaveError::Cancelled);
                }
                _ = self.closed.cancelled() => return Err(ZWaveError::ConnectionClosed),
                _ = activity.as_mut(), if !timeout_armed => {
                    activity.set(self.activity.notified());
                    retries_left = self.retry_count;
                    retransmit.reset();
                }
                _ = retransmit.tick(), if !timeout_armed => {
                    if retries_left > 0 {
                        retries_left -= 1;
                        warn!(%function, retries_left, "No response, retransmitting");
                        self.writer.send(&wire).await?;
                    } else {
                        timeout_armed = true;
                        deadline.as_mut().reset(Instant::now() + self.request_timeout);
                    }
                }
                _ = &mut deadline, if timeout_armed => {
                    warn!(%function, "Request timed out");
                    return Err(ZWaveError::TimedOut);
                }
            }
        }
    }

    /// Handle one frame from the read loop.
    ///
    /// Valid data frames are acknowledged, corrupted ones are answered with
    /// NAK and dropped. Returns the frame if it is unsolicited; the caller
    /// decides what to do with it before [`publish`](Self::publish)ing.
    pub async fn process_frame(&self, frame: Frame) -> Option<DataFrame> {
        match frame {
            Frame::Ack => {
                trace!("Received ACK");
                None
            }
            Frame::Nak | Frame::Cancel => {
                warn!(
                    frame = %frame,
                    in_flight = ?self.pending.current_function(),
                    "Delivery anomaly"
                );
                None
            }
            Frame::Data(data) => {
                if !data.is_checksum_valid() {
                    warn!(
                        frame = %data,
                        checksum = data.checksum(),
                        expected = data.compute_checksum(),
                        "Checksum mismatch, sending NAK"
                    );
                    self.reply(Frame::Nak).await;
                    return None;
                }
                debug!(frame = %data, "Received frame");
                self.reply(Frame::Ack).await;
                self.correlate(data)
            }
        }
    }

    async fn reply(&self, frame: Frame) {
        if let Err(e) = self.writer.send(&frame).await {
            error!(error = %e, frame = %frame, "Failed to send reply");
        }
    }

    fn correlate(&self, frame: DataFrame) -> Option<DataFrame> {
        let mut current = self.pending.lock();
        let Some(pending) = current.as_mut() else {
            return Some(frame);
        };

        self.activity.notify_waiters();

        if pending.function() != frame.function() {
            return Some(frame);
        }

        if pending.accept(frame) {
            if let Some(settled) = current.take() {
                settled.complete();
            }
        }
        None
    }

    /// Publish an unsolicited frame to every subscriber.
    pub fn publish(&self, frame: DataFrame) {
        // No subscribers is the normal case.
        let _ = self.notifications.send(frame);
    }

    /// Subscribe to unsolicited frames published from now on.
    pub fn subscribe(&self) -> Notifications {
        Notifications::new(self.notifications.subscribe(), self.closed.clone())
    }

    /// Function code of the request currently on the wire.
    pub fn in_flight(&self) -> Option<FunctionId> {
        self.pending.current_function()
    }

    /// Fail the in-flight request and every later call with `ConnectionClosed`.
    pub fn close(&self) {
        self.closed.cancel();
        self.pending.take();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the dispatcher closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}
