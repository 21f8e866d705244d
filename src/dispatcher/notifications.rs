//! Subscription to unsolicited frames.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, ZWaveError};
use crate::protocol::DataFrame;

/// A receiver of every unsolicited data frame published after it was created.
///
/// Subscribe *before* sending the request whose asynchronous consequence you
/// want to observe, or the notification may be missed.
#[derive(Debug)]
pub struct Notifications {
    rx: broadcast::Receiver<DataFrame>,
    closed: CancellationToken,
}

impl Notifications {
    pub(crate) fn new(rx: broadcast::Receiver<DataFrame>, closed: CancellationToken) -> Self {
        Self { rx, closed }
    }

    /// Next unsolicited frame.
    ///
    /// A subscriber that fell behind logs the number of dropped frames and
    /// carries on with the oldest retained one.
    pub async fn recv(&mut self) -> Result<DataFrame> {
        loop {
            let received = tokio::select! {
                biased;
                received = self.rx.recv() => received,
                _ = self.closed.cancelled() => return Err(ZWaveError::ConnectionClosed),
            };
            match received {
                Ok(frame) => return Ok(frame),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification subscriber lagged");
                }
                Err(RecvError::Closed) => return Err(ZWaveError::ConnectionClosed),
            }
        }
    }

    /// Wait for the first frame for which `predicate` returns `Some`.
    pub async fn wait_for<T, F>(&mut self, mut predicate: F, token: &CancellationToken) -> Result<T>
    where
        F: FnMut(&DataFrame) -> Option<T>,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ZWaveError::Cancelled),
                frame = self.recv() => frame?,
            };
            if let Some(value) = predicate(&frame) {
                return Ok(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FunctionId;

    fn update(node: u8) -> DataFrame {
        DataFrame::request(FunctionId::APPLICATION_UPDATE, &[0x84, node]).unwrap()
    }

    #[tokio::test]
    async fn test_wait_for_skips_non_matching() {
        let (tx, rx) = broadcast::channel(8);
        let mut notifications = Notifications::new(rx, CancellationToken::new());

        tx.send(update(2)).unwrap();
        tx.send(update(5)).unwrap();

        let token = CancellationToken::new();
        let node = notifications
            .wait_for(|f| (f.payload()[1] == 5).then_some(5u8), &token)
            .await
            .unwrap();
        assert_eq!(node, 5);
    }

    #[tokio::test]
    async fn test_wait_for_cancelled() {
        let (_tx, rx) = broadcast::channel::<DataFrame>(8);
        let mut notifications = Notifications::new(rx, CancellationToken::new());

        let token = CancellationToken::new();
        token.cancel();
        let err = notifications.wait_for(|_| Some(()), &token).await.unwrap_err();
        assert!(matches!(err, ZWaveError::Cancelled));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_continues() {
        let (tx, rx) = broadcast::channel(2);
        let mut notifications = Notifications::new(rx, CancellationToken::new());

        for node in 1..=4 {
            tx.send(update(node)).unwrap();
        }

        let frame = notifications.recv().await.unwrap();
        assert_eq!(frame.payload()[1], 3);
    }

    #[tokio::test]
    async fn test_closed() {
        let (tx, rx) = broadcast::channel::<DataFrame>(2);
        let closed = CancellationToken::new();
        let mut notifications = Notifications::new(rx, closed.clone());

        closed.cancel();
        assert!(matches!(notifications.recv().await, Err(ZWaveError::ConnectionClosed)));
        drop(tx);
    }

    #[tokio::test]
    async fn test_sender_dropped() {
        let (tx, rx) = broadcast::channel::<DataFrame>(2);
        let mut notifications = Notifications::new(rx, CancellationToken::new());

        drop(tx);
        assert!(matches!(notifications.recv().await, Err(ZWaveError::ConnectionClosed)));
    }
}
