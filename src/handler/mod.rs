//! Tokio driver for a [`TimeAwareSystem`].
//!
//! [`GptpHandler`] owns the engine and is its only writer. Received frames,
//! egress timestamps and link events arrive on `mpsc` channels, timers fire
//! from a `sleep_until` on the engine's next deadline, and every frame the
//! engine queues is flushed to a [`FrameTransport`] before the next wait.
//! Indications are forwarded on an event channel.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::clock::{ClockId, ClockInterface};
use crate::engine::{GptpEvent, TimeAwareSystem};
use crate::error::Result;
use crate::net::{FrameTransport, LinkEvent, Outbox, RxFrame, TxTimestamp};
use crate::types::GptpConfig;

#[cfg(test)]
mod tests;

/// Retry delay when the monotonic clock cannot be read.
const CLOCK_RETRY: Duration = Duration::from_millis(1);

/// Caller side of a [`GptpHandler`].
#[derive(Debug)]
pub struct GptpChannels {
    /// Received frames with their ingress timestamps
    pub frames: mpsc::Sender<RxFrame>,
    /// Egress timestamps for tagged frames
    pub tx_timestamps: mpsc::Sender<TxTimestamp>,
    /// Link state changes
    pub links: mpsc::Sender<LinkEvent>,
    /// Grandmaster, sync state and link delay indications
    pub events: mpsc::Receiver<GptpEvent>,
}

/// Event loop around one time-aware system.
pub struct GptpHandler<C: ClockInterface, T: FrameTransport> {
    system: TimeAwareSystem<C, Outbox>,
    transport: T,
    frames: mpsc::Receiver<RxFrame>,
    tx_timestamps: mpsc::Receiver<TxTimestamp>,
    links: mpsc::Receiver<LinkEvent>,
    events: mpsc::Sender<GptpEvent>,
}

impl<C, T> GptpHandler<C, T>
where
    C: ClockInterface + Send,
    T: FrameTransport,
{
    /// Build the engine and the channels feeding it.
    ///
    /// Every channel holds up to `capacity` messages.
    ///
    /// # Errors
    /// Returns the engine construction error for an invalid configuration
    /// or a failing clock.
    pub fn new(
        config: GptpConfig,
        clock: C,
        transport: T,
        capacity: usize,
    ) -> Result<(Self, GptpChannels)> {
        let system = TimeAwareSystem::new(config, clock, Outbox::new())?;
        let capacity = capacity.max(1);
        let (frames_tx, frames) = mpsc::channel(capacity);
        let (tx_timestamps_tx, tx_timestamps) = mpsc::channel(capacity);
        let (links_tx, links) = mpsc::channel(capacity);
        let (events, events_rx) = mpsc::channel(capacity);
        let handler = Self {
            system,
            transport,
            frames,
            tx_timestamps,
            links,
            events,
        };
        let channels = GptpChannels {
            frames: frames_tx,
            tx_timestamps: tx_timestamps_tx,
            links: links_tx,
            events: events_rx,
        };
        Ok((handler, channels))
    }

    /// The driven engine.
    #[must_use]
    pub fn system(&self) -> &TimeAwareSystem<C, Outbox> {
        &self.system
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    ///
    /// Closed input channels are ignored; timers keep running.
    ///
    /// # Errors
    /// Returns the transport error when a frame cannot be sent.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            clock_identity = format_args!("{:016x}", self.system.config().clock_identity),
            instances = self.system.instance_count(),
            "gPTP handler started"
        );
        self.flush().await?;

        loop {
            let deadline = self.deadline();
            tokio::select! {
                Some(frame) = self.frames.recv() => {
                    self.system.on_frame(&frame);
                }

                Some(ts) = self.tx_timestamps.recv() => {
                    self.system.on_tx_timestamp(&ts);
                }

                Some(event) = self.links.recv() => {
                    self.system.on_link_change(event);
                }

                () = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.system.poll_timers();
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("gPTP handler shutting down");
                        break;
                    }
                }
            }
            self.flush().await?;
        }
        Ok(())
    }

    /// Tokio instant of the engine's next timer.
    fn deadline(&self) -> Option<Instant> {
        let deadline = self.system.next_deadline()?;
        match self.system.clock().now(ClockId::Monotonic) {
            Ok(now) => Some(Instant::now() + Duration::from_nanos(deadline.saturating_sub(now))),
            Err(e) => {
                tracing::warn!("monotonic clock: {}", e);
                Some(Instant::now() + CLOCK_RETRY)
            }
        }
    }

    /// Send queued frames and forward queued indications.
    async fn flush(&mut self) -> Result<()> {
        for frame in self.system.net_mut().drain() {
            self.transport.send(frame).await?;
        }
        for event in self.system.drain_events() {
            match self.events.try_send(event) {
                Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    tracing::warn!(?event, "event channel full, indication dropped");
                }
            }
        }
        Ok(())
    }
}
