//! Queueing network interface

use bytes::Bytes;

use super::traits::{NetworkInterface, TxTag};
use crate::error::Result;

/// One transmitted frame, as captured by [`Outbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    /// Network port index
    pub port: usize,
    /// Encoded PDU
    pub frame: Bytes,
    /// Egress timestamp correlation
    pub tag: Option<TxTag>,
}

/// Network interface that queues frames for a driver to flush.
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<TxFrame>,
}

impl Outbox {
    /// Empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued frame.
    pub fn drain(&mut self) -> Vec<TxFrame> {
        std::mem::take(&mut self.frames)
    }

    /// Number of queued frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl NetworkInterface for Outbox {
    fn send(&mut self, port: usize, frame: Bytes, tag: Option<TxTag>) -> Result<()> {
        self.frames.push(TxFrame { port, frame, tag });
        Ok(())
    }
}
