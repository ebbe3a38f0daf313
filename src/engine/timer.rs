//! One-shot millisecond timers on the monotonic clock.

use std::collections::BTreeMap;

use crate::protocol::time::NS_PER_MS;

/// Owner and purpose of a timer.
///
/// Instance-scoped timers carry `(instance, port)` indexes, link timers the
/// link index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum TimerId {
    /// `Pdelay_Req` interval
    PdelayReq(usize),
    /// Follow_Up receipt timeout of the media sync receiver
    FollowUpReceipt(usize, usize),
    /// Sync receipt timeout of the port sync receiver
    SyncReceipt(usize, usize),
    /// Sync transmit interval of the port sync sender
    SyncTransmit(usize, usize),
    /// Relayed sync info expiry of the port sync sender
    PsSyncReceipt(usize, usize),
    /// Announce receipt timeout
    AnnounceReceipt(usize, usize),
    /// Announce transmit interval
    AnnounceTransmit(usize, usize),
    /// gPTP-capable signaling interval
    GptpCapableTransmit(usize, usize),
    /// gPTP-capable receipt timeout
    GptpCapableReceipt(usize, usize),
    /// Clock master sync interval
    ClockMasterSync(usize),
    /// Statistics dump
    Stats,
}

/// Deadline table, in monotonic nanoseconds.
#[derive(Debug, Default)]
pub(crate) struct TimerTable {
    now_ns: u64,
    deadlines: BTreeMap<TimerId, u64>,
}

impl TimerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Latch the current monotonic time. Time never goes backwards.
    pub(crate) fn set_now(&mut self, now_ns: u64) {
        self.now_ns = self.now_ns.max(now_ns);
    }

    pub(crate) fn now(&self) -> u64 {
        self.now_ns
    }

    /// (Re)start `id` to fire `ms` milliseconds from now.
    pub(crate) fn start(&mut self, id: TimerId, ms: u64) {
        let deadline = self.now_ns.saturating_add(ms.saturating_mul(NS_PER_MS));
        self.deadlines.insert(id, deadline);
    }

    /// (Re)start `id` with a nanosecond timeout, rounded down to whole ms.
    pub(crate) fn start_ns(&mut self, id: TimerId, ns: u64) {
        self.start(id, ns / NS_PER_MS);
    }

    pub(crate) fn stop(&mut self, id: TimerId) {
        self.deadlines.remove(&id);
    }

    pub(crate) fn is_running(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().copied().min()
    }

    /// Remove and return the earliest expired timer.
    pub(crate) fn pop_expired(&mut self) -> Option<TimerId> {
        let (id, _) = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= self.now_ns)
            .min_by_key(|&(&id, &deadline)| (deadline, id))?;
        let id = *id;
        self.deadlines.remove(&id);
        Some(id)
    }
}
