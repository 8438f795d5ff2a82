//! Packet streaming channel and cancellation signals
//!
//! Queries deliver packets through a bounded channel whose terminal
//! status travels out-of-band: after the consumer drains every packet it
//! can ask whether the producer finished cleanly, failed, or was
//! cancelled. Closing the channel exactly once is enforced structurally:
//! [`PacketSink::close`] consumes the sink, and dropping an unclosed
//! sink closes it with no error.

use crate::error::BlockfileError;
use crate::types::Packet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Create a bounded packet channel with the given capacity.
pub fn packet_channel(capacity: usize) -> (PacketSink, PacketStream) {
    let (tx, rx) = mpsc::channel(capacity);
    let (status_tx, status_rx) = oneshot::channel();
    (
        PacketSink {
            tx: Some(tx),
            status: Some(status_tx),
        },
        PacketStream {
            rx,
            status: status_rx,
        },
    )
}

/// Producer half of a packet channel.
pub struct PacketSink {
    tx: Option<mpsc::Sender<Packet>>,
    status: Option<oneshot::Sender<Option<BlockfileError>>>,
}

impl PacketSink {
    /// Send one packet, waiting for channel capacity.
    ///
    /// Returns `false` when the consumer has gone away.
    pub async fn send(&self, packet: Packet) -> bool {
        match &self.tx {
            Some(tx) => tx.send(packet).await.is_ok(),
            None => false,
        }
    }

    /// Close the channel with a terminal status. Consumes the sink so a
    /// second close cannot happen.
    pub fn close(mut self, err: Option<BlockfileError>) {
        self.finish(err);
    }

    fn finish(&mut self, err: Option<BlockfileError>) {
        if let Some(status) = self.status.take() {
            // The consumer may already be gone; nothing to report then.
            let _ = status.send(err);
        }
        self.tx = None;
    }
}

impl Drop for PacketSink {
    fn drop(&mut self) {
        self.finish(None);
    }
}

/// Consumer half of a packet channel.
pub struct PacketStream {
    rx: mpsc::Receiver<Packet>,
    status: oneshot::Receiver<Option<BlockfileError>>,
}

impl PacketStream {
    /// Receive the next packet, or `None` once the producer has closed
    /// the channel and all packets are drained.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Terminal status of the stream; `None` means the producer
    /// finished cleanly. This waits until the producer has closed the
    /// channel, so drain with `recv` until it returns `None` first (or
    /// use [`PacketStream::collect`], which does both).
    pub async fn close_err(self) -> Option<BlockfileError> {
        self.status.await.unwrap_or(None)
    }

    /// Drain every remaining packet, then return the terminal status.
    pub async fn collect(mut self) -> (Vec<Packet>, Option<BlockfileError>) {
        let mut packets = Vec::new();
        while let Some(packet) = self.recv().await {
            packets.push(packet);
        }
        let err = self.close_err().await;
        (packets, err)
    }
}

/// Cloneable one-shot cancellation signal.
///
/// Used both for per-query cancellation and for the handle-wide
/// shutdown fired by `close()`. Firing is idempotent; waiters woken by
/// [`CancelToken::cancelled`] observe the signal at the next packet
/// boundary, never mid-read.
#[derive(Clone, Debug)]
pub struct CancelToken {
    shared: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shared: Arc::new(tx),
        }
    }

    /// Fire the signal. Safe to call any number of times.
    pub fn cancel(&self) {
        self.shared.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn cancelled(&self) {
        let mut rx = self.shared.subscribe();
        // wait_for cannot observe a closed channel: we hold the sender.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaptureInfo;
    use bytes::Bytes;

    fn packet(len: u32) -> Packet {
        Packet {
            data: Bytes::from(vec![0u8; len as usize]),
            capture_info: CaptureInfo::new(0, 0, len, len),
        }
    }

    #[tokio::test]
    async fn close_with_error_reaches_consumer() {
        let (sink, stream) = packet_channel(4);
        assert!(sink.send(packet(8)).await);
        sink.close(Some(BlockfileError::Cancelled));

        let (packets, err) = stream.collect().await;
        assert_eq!(packets.len(), 1);
        assert!(matches!(err, Some(BlockfileError::Cancelled)));
    }

    #[tokio::test]
    async fn dropped_sink_closes_cleanly() {
        let (sink, stream) = packet_channel(4);
        drop(sink);
        let (packets, err) = stream.collect().await;
        assert!(packets.is_empty());
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn send_fails_after_consumer_drops() {
        let (sink, stream) = packet_channel(1);
        drop(stream);
        assert!(!sink.send(packet(8)).await);
    }

    #[tokio::test]
    async fn cancel_token_wakes_waiter() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        token.cancel(); // idempotent
        waiter.await.expect("waiter panicked");
        assert!(token.is_cancelled());
    }
}
