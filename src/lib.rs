//! # gptp
//!
//! An IEEE 802.1AS-2020 (gPTP) time synchronization engine.
//!
//! ## Features
//!
//! - Peer delay measurement, per domain or shared through CMLDS
//! - Best master clock selection over any number of ports and domains
//! - Sync relay for bridges and a PI servo for the local target clock
//! - Standard and automotive profiles
//! - Interval negotiation and gPTP-capable neighbor discovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use gptp::testing::{SimClock, SimNetwork, sim_config};
//!
//! let mut net = SimNetwork::new();
//! let gm = net.add_system(sim_config(1, 100, 1), SimClock::new(1_000_000_000)).unwrap();
//! let slave = net.add_system(sim_config(2, 200, 1), SimClock::new(0)).unwrap();
//! net.connect(gm, 0, slave, 0, 500);
//! net.start();
//! net.run_for(10_000);
//! assert_eq!(net.system(slave).grandmaster_identity(0), Some(1));
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Driver**: `GptpHandler` - tokio event loop around one system
//! - **Engine**: `TimeAwareSystem` - every state machine, no I/O of its own
//! - **Low-level**: protocol modules - wire format, time arithmetic, BMCA

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod clock;
pub mod engine;
#[cfg(feature = "tokio-runtime")]
pub mod handler;
pub mod measure;
pub mod net;
pub mod protocol;

// Re-exports
pub use clock::{AdjustMode, ClockId, ClockInterface, PllState};
pub use engine::{GptpEvent, SyncState, TimeAwareSystem};
pub use error::{ConfigError, GptpError, ParseError};
#[cfg(feature = "tokio-runtime")]
pub use handler::{GptpChannels, GptpHandler};
pub use net::{LinkEvent, NetworkInterface, RxFrame, TxTag, TxTimestamp};
pub use types::{DelayMechanism, DomainConfig, GptpConfig, PdelayMode, PortConfig, PortRole};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        ClockId, ClockInterface, GptpConfig, GptpError, GptpEvent, LinkEvent, NetworkInterface,
        PortRole, RxFrame, TimeAwareSystem, TxTimestamp,
    };
}
