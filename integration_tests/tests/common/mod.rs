//! Common test utilities and fixtures
#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use gptp::error::Result;
use gptp::net::{ChannelTransport, TxFrame};
use gptp::testing::SimClock;
use gptp::{
    AdjustMode, ClockId, ClockInterface, GptpChannels, GptpConfig, GptpHandler, LinkEvent,
    RxFrame, TxTimestamp,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive("gptp=info".parse().unwrap());

        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Simulated clock driven by tokio's clock, so `tokio::time::pause()` makes
/// whole networks run in virtual time.
#[derive(Debug, Clone)]
pub struct PacedClock {
    sim: SimClock,
    last: Arc<Mutex<Instant>>,
}

impl PacedClock {
    pub fn new(sim: SimClock) -> Self {
        Self {
            sim,
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn sim(&self) -> &SimClock {
        self.catch_up();
        &self.sim
    }

    fn catch_up(&self) {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap();
        let dt = now.duration_since(*last);
        *last = now;
        self.sim.advance(u64::try_from(dt.as_nanos()).unwrap());
    }
}

impl ClockInterface for PacedClock {
    fn now(&self, id: ClockId) -> Result<u64> {
        self.catch_up();
        self.sim.now(id)
    }

    fn set_time(&mut self, id: ClockId, ns: u64) -> Result<()> {
        self.catch_up();
        self.sim.set_time(id, ns)
    }

    fn set_freq(&mut self, id: ClockId, ppb: i64) -> Result<()> {
        self.catch_up();
        self.sim.set_freq(id, ppb)
    }

    fn set_offset(&mut self, id: ClockId, ns: i64) -> Result<()> {
        self.catch_up();
        self.sim.set_offset(id, ns)
    }

    fn adjust_mode(&self, id: ClockId) -> AdjustMode {
        self.sim.adjust_mode(id)
    }

    fn convert(&self, from: ClockId, ns: u64, to: ClockId) -> Result<u64> {
        self.catch_up();
        self.sim.convert(from, ns, to)
    }
}

pub type Handler = GptpHandler<PacedClock, ChannelTransport>;

/// One running handler and everything needed to cable it.
pub struct Node {
    pub clock: PacedClock,
    pub channels: GptpChannels,
    wire: Option<mpsc::Receiver<TxFrame>>,
    task: JoinHandle<(Handler, Result<()>)>,
}

impl Node {
    /// Start a handler for `config` on a fresh clock.
    pub fn spawn(config: GptpConfig, sim: SimClock, shutdown: watch::Receiver<bool>) -> Self {
        let clock = PacedClock::new(sim);
        let (transport, wire) = ChannelTransport::new(256);
        let (mut handler, channels) =
            GptpHandler::new(config, clock.clone(), transport, 256).unwrap();
        let task = tokio::spawn(async move {
            let result = handler.run(shutdown).await;
            (handler, result)
        });
        Self {
            clock,
            channels,
            wire: Some(wire),
            task,
        }
    }

    /// Wait for the handler to stop and hand it back.
    pub async fn join(self) -> Handler {
        let (handler, result) = self.task.await.unwrap();
        result.unwrap();
        handler
    }
}

/// Cable port 0 of `a` to port 0 of `b` and bring both ends up.
///
/// A node owns a single outbound frame channel, so it takes one cable.
pub async fn cable(a: &mut Node, b: &mut Node, delay_ns: u64) {
    let wire_a = a.wire.take().unwrap();
    let wire_b = b.wire.take().unwrap();
    relay(wire_a, a, b, delay_ns);
    relay(wire_b, b, a, delay_ns);
    for node in [a, b] {
        node.channels
            .links
            .send(LinkEvent {
                port: 0,
                up: true,
                rate_mbps: 1000,
            })
            .await
            .unwrap();
    }
}

fn relay(mut wire: mpsc::Receiver<TxFrame>, from: &Node, to: &Node, delay_ns: u64) {
    let from_clock = from.clock.clone();
    let to_clock = to.clock.clone();
    let tx_timestamps = from.channels.tx_timestamps.clone();
    let frames = to.channels.frames.clone();
    tokio::spawn(async move {
        while let Some(frame) = wire.recv().await {
            if let Some(tag) = frame.tag {
                let ts = TxTimestamp {
                    port: frame.port,
                    tag,
                    timestamp: from_clock.now(ClockId::Local).unwrap(),
                };
                if tx_timestamps.send(ts).await.is_err() {
                    break;
                }
            }
            let rx = RxFrame {
                port: 0,
                data: frame.frame,
                timestamp: to_clock.now(ClockId::Local).unwrap() + delay_ns,
            };
            if frames.send(rx).await.is_err() {
                break;
            }
        }
    });
}

/// Signed difference between the target clocks of two nodes, in ns.
pub fn target_offset(a: &Node, b: &Node) -> i128 {
    let a = a.clock.sim().time_of(ClockId::Target(0));
    let b = b.clock.sim().time_of(ClockId::Target(0));
    i128::from(b) - i128::from(a)
}
