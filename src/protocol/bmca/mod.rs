//! Best Master Clock Algorithm comparators.
//!
//! A priority vector is compared as the lexical order of its 28-byte
//! big-endian image; the smaller image is the better clock.
//!
//! ```text
//! +-----------+---------+-----------+---------+--------+------------+-------+
//! | priority1 | quality | priority2 | root id | steps  | source pid | port# |
//! |   1 B     |   4 B   |   1 B     |  8 B    |  2 B   |   10 B     |  2 B  |
//! +-----------+---------+-----------+---------+--------+------------+-------+
//! ```

#[cfg(test)]
mod tests;

use crate::protocol::message::{AnnounceBody, ClockIdentity, Header, PortIdentity};

/// Grandmaster clock quality (802.1AS 10.5.3.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClockQuality {
    /// Clock class.
    pub clock_class: u8,
    /// Clock accuracy enumeration.
    pub clock_accuracy: u8,
    /// Offset scaled log variance.
    pub offset_scaled_log_variance: u16,
}

impl ClockQuality {
    /// Wire size in bytes.
    pub const SIZE: usize = 4;

    /// Encode as 4 bytes, network byte order.
    #[must_use]
    pub fn encode(&self) -> [u8; 4] {
        let v = self.offset_scaled_log_variance.to_be_bytes();
        [self.clock_class, self.clock_accuracy, v[0], v[1]]
    }

    /// Decode from 4 bytes.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        let d = data.get(..Self::SIZE)?;
        Some(Self {
            clock_class: d[0],
            clock_accuracy: d[1],
            offset_scaled_log_variance: u16::from_be_bytes([d[2], d[3]]),
        })
    }
}

/// System identity: the root part of a priority vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SystemIdentity {
    /// Priority 1 (255 means not grandmaster-capable).
    pub priority1: u8,
    /// Clock quality.
    pub clock_quality: ClockQuality,
    /// Priority 2.
    pub priority2: u8,
    /// Clock identity.
    pub clock_identity: ClockIdentity,
}

impl SystemIdentity {
    /// Byte image used for ordering.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 14] {
        let mut buf = [0u8; 14];
        buf[0] = self.priority1;
        buf[1..5].copy_from_slice(&self.clock_quality.encode());
        buf[5] = self.priority2;
        buf[6..14].copy_from_slice(&self.clock_identity.to_be_bytes());
        buf
    }

    /// Root identity advertised by an Announce message.
    #[must_use]
    pub fn from_announce(announce: &AnnounceBody) -> Self {
        Self {
            priority1: announce.grandmaster_priority1,
            clock_quality: announce.grandmaster_clock_quality,
            priority2: announce.grandmaster_priority2,
            clock_identity: announce.grandmaster_identity,
        }
    }
}

/// Port time-synchronization spanning tree priority vector (802.1AS 10.3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PriorityVector {
    /// Root system identity.
    pub root_system_identity: SystemIdentity,
    /// Steps removed from the root.
    pub steps_removed: u16,
    /// Identity of the port that sent the information.
    pub source_port_identity: PortIdentity,
    /// Receiving port number.
    pub port_number: u16,
}

impl PriorityVector {
    /// Byte image used for ordering.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 28] {
        let mut buf = [0u8; 28];
        buf[0..14].copy_from_slice(&self.root_system_identity.to_bytes());
        buf[14..16].copy_from_slice(&self.steps_removed.to_be_bytes());
        buf[16..26].copy_from_slice(&self.source_port_identity.encode());
        buf[26..28].copy_from_slice(&self.port_number.to_be_bytes());
        buf
    }

    /// messagePriorityVector of an Announce received on `port_number`
    /// (802.1AS 10.3.5).
    #[must_use]
    pub fn from_announce(header: &Header, announce: &AnnounceBody, port_number: u16) -> Self {
        Self {
            root_system_identity: SystemIdentity::from_announce(announce),
            steps_removed: announce.steps_removed,
            source_port_identity: header.source_port_identity,
            port_number,
        }
    }

    /// Whether the root of this vector is grandmaster-capable.
    #[must_use]
    pub fn is_gm_capable(&self) -> bool {
        self.root_system_identity.priority1 < 255
    }
}

impl std::fmt::Display for PriorityVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let root = &self.root_system_identity;
        write!(
            f,
            "root {:016x} p1 {} class {} accuracy {} variance {} p2 {} steps {} source {} port {}",
            root.clock_identity,
            root.priority1,
            root.clock_quality.clock_class,
            root.clock_quality.clock_accuracy,
            root.clock_quality.offset_scaled_log_variance,
            root.priority2,
            self.steps_removed,
            self.source_port_identity,
            self.port_number
        )
    }
}

/// Result of a priority vector comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorOrder {
    /// The first vector is better.
    ABetter,
    /// The second vector is better.
    BBetter,
    /// Both vectors are identical.
    Same,
}

impl VectorOrder {
    /// Result with the operands swapped.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::ABetter => Self::BBetter,
            Self::BBetter => Self::ABetter,
            Self::Same => Self::Same,
        }
    }
}

impl From<std::cmp::Ordering> for VectorOrder {
    fn from(ord: std::cmp::Ordering) -> Self {
        match ord {
            std::cmp::Ordering::Less => Self::ABetter,
            std::cmp::Ordering::Greater => Self::BBetter,
            std::cmp::Ordering::Equal => Self::Same,
        }
    }
}

/// Compare two priority vectors over their byte image.
#[must_use]
pub fn compare_priority_vector(a: &PriorityVector, b: &PriorityVector) -> VectorOrder {
    a.to_bytes().cmp(&b.to_bytes()).into()
}

/// Compare only the root system identities of two vectors.
#[must_use]
pub fn compare_system_identity(a: &PriorityVector, b: &PriorityVector) -> VectorOrder {
    a.root_system_identity
        .to_bytes()
        .cmp(&b.root_system_identity.to_bytes())
        .into()
}

/// Compare a received message vector with the port's current vector.
///
/// Information from the same master port as the current port vector always
/// replaces it (802.1AS 10.3.5), so it is reported as `ABetter`.
#[must_use]
pub fn compare_message_vector(msg: &PriorityVector, port: &PriorityVector) -> VectorOrder {
    if msg.source_port_identity == port.source_port_identity {
        return VectorOrder::ABetter;
    }
    compare_priority_vector(msg, port)
}
