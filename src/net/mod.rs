//! Network interface collaborator.
//!
//! Frames leave the engine through [`NetworkInterface::send`]. Event
//! messages that need an egress timestamp carry a [`TxTag`]; the transport
//! reports the timestamp back with the same tag and the engine correlates
//! it with the pending transmission.

mod outbox;
mod traits;

#[cfg(feature = "tokio-runtime")]
mod tokio_impl;


pub use outbox::{Outbox, TxFrame};
pub use traits::{LinkEvent, NetworkInterface, RxFrame, TxKind, TxTag, TxTimestamp};

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::{ChannelTransport, FrameTransport};
