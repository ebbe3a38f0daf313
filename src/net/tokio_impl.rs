//! Tokio transport plumbing

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::outbox::TxFrame;
use crate::error::{GptpError, Result};

/// Async outbound seam used by the driver to flush engine frames.
#[async_trait]
pub trait FrameTransport: Send {
    /// Put one frame on the wire.
    async fn send(&mut self, frame: TxFrame) -> Result<()>;
}

/// Transport that forwards frames on an `mpsc` channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<TxFrame>,
}

impl ChannelTransport {
    /// Build a transport and the receiver draining it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TxFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameTransport for ChannelTransport {
    async fn send(&mut self, frame: TxFrame) -> Result<()> {
        let port = frame.port;
        self.tx.send(frame).await.map_err(|_| GptpError::Network {
            port,
            message: "transport channel closed".to_string(),
        })
    }
}
