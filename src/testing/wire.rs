//! Simulated wire connecting several time-aware systems.
//!
//! Time advances in 1 ms ticks. Every tick advances all clocks, fires the
//! expired timers and then delivers frames until no system has anything
//! left to send. Egress timestamps are taken from the sender's local clock
//! and ingress timestamps from the receiver's, plus the link delay.

use crate::clock::ClockId;
use crate::engine::TimeAwareSystem;
use crate::error::Result;
use crate::net::{LinkEvent, Outbox, RxFrame, TxTimestamp};
use crate::protocol::time::NS_PER_MS;
use crate::types::GptpConfig;

use super::SimClock;

/// Simulation step.
pub const TICK_NS: u64 = NS_PER_MS;

/// Bound on delivery rounds within one tick.
const MAX_ROUNDS: usize = 64;

/// Link rate reported when a simulated link comes up.
const LINK_RATE_MBPS: u32 = 1000;

/// Engine type driven by the simulation.
pub type SimSystem = TimeAwareSystem<SimClock, Outbox>;

/// Point-to-point cable between two system ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimLink {
    /// (system, port) of one end
    pub a: (usize, usize),
    /// (system, port) of the other end
    pub b: (usize, usize),
    /// One-way propagation delay, in ns
    pub delay_ns: u64,
    /// Whether frames are carried
    pub up: bool,
}

impl SimLink {
    fn peer_of(&self, end: (usize, usize)) -> Option<(usize, usize)> {
        if self.a == end {
            Some(self.b)
        } else if self.b == end {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct Node {
    engine: SimSystem,
    clock: SimClock,
}

/// Collection of systems and the cables between them.
#[derive(Debug, Default)]
pub struct SimNetwork {
    nodes: Vec<Node>,
    links: Vec<SimLink>,
    elapsed_ns: u64,
    delivered: u64,
    dropped: u64,
}

impl SimNetwork {
    /// Empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system using `clock`; returns its index.
    ///
    /// # Errors
    ///
    /// Returns the error of [`TimeAwareSystem::new`].
    pub fn add_system(&mut self, config: GptpConfig, clock: SimClock) -> Result<usize> {
        let engine = TimeAwareSystem::new(config, clock.clone(), Outbox::new())?;
        self.nodes.push(Node { engine, clock });
        Ok(self.nodes.len() - 1)
    }

    /// Cable port `port_a` of system `a` to port `port_b` of system `b`.
    ///
    /// The link stays down until [`SimNetwork::set_link`] or
    /// [`SimNetwork::start`]. Returns the link index.
    pub fn connect(
        &mut self,
        a: usize,
        port_a: usize,
        b: usize,
        port_b: usize,
        delay_ns: u64,
    ) -> usize {
        self.links.push(SimLink {
            a: (a, port_a),
            b: (b, port_b),
            delay_ns,
            up: false,
        });
        self.links.len() - 1
    }

    /// Bring every link up.
    pub fn start(&mut self) {
        for l in 0..self.links.len() {
            self.set_link(l, true);
        }
    }

    /// Plug or unplug link `l`, reporting the change to both ends.
    pub fn set_link(&mut self, l: usize, up: bool) {
        let Some(link) = self.links.get_mut(l) else {
            return;
        };
        link.up = up;
        let ends = [link.a, link.b];
        for (system, port) in ends {
            let rate_mbps = if up { LINK_RATE_MBPS } else { 0 };
            self.nodes[system].engine.on_link_change(LinkEvent { port, up, rate_mbps });
        }
        self.deliver();
    }

    /// Advance by `ms` ticks.
    pub fn run_for(&mut self, ms: u64) {
        for _ in 0..ms {
            self.step();
        }
    }

    /// Advance one tick.
    pub fn step(&mut self) {
        self.elapsed_ns += TICK_NS;
        for node in &self.nodes {
            node.clock.advance(TICK_NS);
        }
        for node in &mut self.nodes {
            node.engine.poll_timers();
        }
        self.deliver();
    }

    fn deliver(&mut self) {
        for _ in 0..MAX_ROUNDS {
            let mut moved = false;
            for sender in 0..self.nodes.len() {
                let frames = self.nodes[sender].engine.net_mut().drain();
                for frame in frames {
                    moved = true;
                    let tx_local = self.nodes[sender].clock.time_of(ClockId::Local);
                    if let Some(tag) = frame.tag {
                        let ts = TxTimestamp {
                            port: frame.port,
                            tag,
                            timestamp: tx_local,
                        };
                        self.nodes[sender].engine.on_tx_timestamp(&ts);
                    }

                    let end = (sender, frame.port);
                    let link = self
                        .links
                        .iter()
                        .filter(|link| link.up)
                        .find_map(|link| link.peer_of(end).map(|peer| (peer, link.delay_ns)));
                    let Some(((receiver, port), delay_ns)) = link else {
                        self.dropped += 1;
                        continue;
                    };
                    let rx_local = self.nodes[receiver].clock.time_of(ClockId::Local) + delay_ns;
                    let rx = RxFrame {
                        port,
                        data: frame.frame,
                        timestamp: rx_local,
                    };
                    self.nodes[receiver].engine.on_frame(&rx);
                    self.delivered += 1;
                }
            }
            if !moved {
                return;
            }
        }
        tracing::warn!("frame delivery did not settle within {MAX_ROUNDS} rounds");
    }

    /// Engine of system `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a system index.
    #[must_use]
    pub fn system(&self, i: usize) -> &SimSystem {
        &self.nodes[i].engine
    }

    /// Mutable engine of system `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a system index.
    pub fn system_mut(&mut self, i: usize) -> &mut SimSystem {
        &mut self.nodes[i].engine
    }

    /// Clock handle of system `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a system index.
    #[must_use]
    pub fn clock(&self, i: usize) -> &SimClock {
        &self.nodes[i].clock
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no system was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Simulated time since creation, in ns.
    #[must_use]
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }

    /// Frames carried so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Frames sent on unplugged or unconnected ports.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Offset between the target clock of instance 0 on system `i` and the
    /// one on system `j`, in ns.
    #[must_use]
    pub fn target_offset(&self, i: usize, j: usize) -> i128 {
        let a = self.nodes[i].clock.time_of(ClockId::Target(0));
        let b = self.nodes[j].clock.time_of(ClockId::Target(0));
        i128::from(a) - i128::from(b)
    }
}
