use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::clock::{AdjustMode, ClockId, ClockInterface, PllState};
use crate::engine::GptpEvent;
use crate::error::{GptpError, Result};
use crate::handler::{GptpChannels, GptpHandler};
use crate::net::{ChannelTransport, LinkEvent, RxFrame, TxFrame, TxKind, TxTimestamp};
use crate::protocol::message::{Message, MessageType};
use crate::testing::{SimClock, sim_config};
use crate::types::GptpConfig;

const START_NS: u64 = 1_000_000_000;
const SYS_A: u64 = 0x0011_22FF_FE33_4401;
const SYS_B: u64 = 0x0011_22FF_FE33_4402;

/// Simulated clock that follows tokio's (paused) clock.
#[derive(Debug, Clone)]
struct PacedClock {
    sim: SimClock,
    last: Arc<Mutex<Instant>>,
}

impl PacedClock {
    fn new(sim: SimClock) -> Self {
        Self {
            sim,
            last: Arc::new(Mutex::new(Instant::now())),
        }
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

type Handler = GptpHandler<PacedClock, ChannelTransport>;

fn handler(
    config: GptpConfig,
    clock: PacedClock,
) -> (Handler, GptpChannels, mpsc::Receiver<TxFrame>) {
    let (transport, wire) = ChannelTransport::new(64);
    let (handler, channels) = GptpHandler::new(config, clock, transport, 64).unwrap();
    (handler, channels, wire)
}

fn spawn(
    mut handler: Handler,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<(Handler, Result<()>)> {
    tokio::spawn(async move {
        let result = handler.run(shutdown).await;
        (handler, result)
    })
}

fn up(port: usize) -> LinkEvent {
    LinkEvent {
        port,
        up: true,
        rate_mbps: 1000,
    }
}

/// Carry frames from one handler's transport to its peer, reporting egress
/// timestamps back to the sender.
fn relay(
    mut wire: mpsc::Receiver<TxFrame>,
    sender: (PacedClock, mpsc::Sender<TxTimestamp>),
    receiver: (PacedClock, mpsc::Sender<RxFrame>),
    delay_ns: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = wire.recv().await {
            if let Some(tag) = frame.tag {
                let timestamp = sender.0.now(ClockId::Local).unwrap();
                let ts = TxTimestamp {
                    port: frame.port,
                    tag,
                    timestamp,
                };
                if sender.1.send(ts).await.is_err() {
                    break;
                }
            }
            let rx = RxFrame {
                port: 0,
                data: frame.frame,
                timestamp: receiver.0.now(ClockId::Local).unwrap() + delay_ns,
            };
            if receiver.1.send(rx).await.is_err() {
                break;
            }
        }
    })
}

// ===== Lifecycle =====

#[tokio::test]
async fn test_handler_rejects_invalid_config() {
    let mut config = sim_config(SYS_A, 100, 1);
    config.ports.clear();
    let (transport, _wire) = ChannelTransport::new(4);
    let clock = PacedClock::new(SimClock::new(START_NS));
    let result = GptpHandler::new(config, clock, transport, 4);
    assert!(matches!(result, Err(GptpError::Config(_))));
}

#[tokio::test]
async fn test_handler_stops_on_shutdown() {
    tokio::time::pause();
    let clock = PacedClock::new(SimClock::new(START_NS));
    let (handler, _channels, _wire) = handler(sim_config(SYS_A, 100, 1), clock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = spawn(handler, shutdown_rx);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!task.is_finished());
    shutdown_tx.send(true).unwrap();
    let (_handler, result) = task.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_handler_stops_when_shutdown_dropped() {
    tokio::time::pause();
    let clock = PacedClock::new(SimClock::new(START_NS));
    let (handler, _channels, _wire) = handler(sim_config(SYS_A, 100, 1), clock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = spawn(handler, shutdown_rx);
    drop(shutdown_tx);
    let (_handler, result) = task.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_handler_survives_closed_inputs() {
    tokio::time::pause();
    let clock = PacedClock::new(SimClock::new(START_NS));
    let (handler, channels, _wire) = handler(sim_config(SYS_A, 100, 1), clock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = spawn(handler, shutdown_rx);
    drop(channels);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!task.is_finished());
    shutdown_tx.send(true).unwrap();
    let (_handler, result) = task.await.unwrap();
    assert!(result.is_ok());
}

// ===== Events =====

#[tokio::test]
async fn test_startup_grandmaster_event_forwarded() {
    tokio::time::pause();
    let clock = PacedClock::new(SimClock::new(START_NS));
    let (handler, mut channels, _wire) = handler(sim_config(SYS_A, 100, 1), clock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = spawn(handler, shutdown_rx);

    let event = channels.events.recv().await.unwrap();
    assert_eq!(
        event,
        GptpEvent::GmChange {
            instance: 0,
            domain: 0,
            gm_identity: SYS_A,
            gm_present: true,
            is_grandmaster: true,
        }
    );
    shutdown_tx.send(true).unwrap();
    task.await.unwrap().1.unwrap();
}

// ===== Frames and Timers =====

#[tokio::test]
async fn test_link_up_flushes_tagged_pdelay_requests() {
    tokio::time::pause();
    let clock = PacedClock::new(SimClock::new(START_NS));
    let (handler, channels, mut wire) = handler(sim_config(SYS_A, 100, 1), clock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = spawn(handler, shutdown_rx);

    channels.links.send(up(0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    shutdown_tx.send(true).unwrap();
    let (handler, result) = task.await.unwrap();
    result.unwrap();

    let mut requests = 0;
    while let Ok(frame) = wire.try_recv() {
        let msg = Message::decode(&frame.frame).unwrap();
        if msg.header.message_type == MessageType::PdelayReq {
            assert_eq!(frame.tag.map(|tag| tag.kind), Some(TxKind::PdelayReq));
            requests += 1;
        }
    }
    // Initial request plus one per second.
    assert!(requests >= 4, "{requests} requests");
    assert_eq!(
        handler.system().net_port_counters(0).unwrap().tx_timestamp_requests,
        requests
    );
}

#[tokio::test]
async fn test_transport_failure_stops_handler() {
    tokio::time::pause();
    let clock = PacedClock::new(SimClock::new(START_NS));
    let (handler, channels, wire) = handler(sim_config(SYS_A, 100, 1), clock);
    drop(wire);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = spawn(handler, shutdown_rx);

    channels.links.send(up(0)).await.unwrap();
    let (_handler, result) = task.await.unwrap();
    assert!(matches!(result, Err(GptpError::Network { port: 0, .. })));
}

#[tokio::test]
async fn test_two_handlers_synchronize() {
    tokio::time::pause();
    let clock_a = PacedClock::new(SimClock::new(START_NS));
    let clock_b = PacedClock::new(SimClock::new(3 * START_NS).with_drift(25.0));
    let (handler_a, channels_a, wire_a) = handler(sim_config(SYS_A, 100, 1), clock_a.clone());
    let (handler_b, channels_b, wire_b) = handler(sim_config(SYS_B, 200, 1), clock_b.clone());

    relay(
        wire_a,
        (clock_a.clone(), channels_a.tx_timestamps.clone()),
        (clock_b.clone(), channels_b.frames.clone()),
        500,
    );
    relay(
        wire_b,
        (clock_b.clone(), channels_b.tx_timestamps.clone()),
        (clock_a.clone(), channels_a.frames.clone()),
        500,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task_a = spawn(handler_a, shutdown_rx.clone());
    let task_b = spawn(handler_b, shutdown_rx);
    channels_a.links.send(up(0)).await.unwrap();
    channels_b.links.send(up(0)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    shutdown_tx.send(true).unwrap();
    let (handler_a, result_a) = task_a.await.unwrap();
    let (handler_b, result_b) = task_b.await.unwrap();
    result_a.unwrap();
    result_b.unwrap();

    let (a, b) = (handler_a.system(), handler_b.system());
    assert!(a.is_grandmaster(0));
    assert_eq!(b.grandmaster_identity(0), Some(SYS_A));
    assert!(a.as_capable(0, 0));
    assert!(b.as_capable(0, 0));
    assert_eq!(b.pll_state(0), Some(PllState::Locked));
    assert!(b.port_counters(0, 0).unwrap().rx_sync > 50);

    let delay = b.mean_link_delay(0).unwrap();
    assert!((delay - 500.0).abs() < 5.0, "delay {delay}");
}
