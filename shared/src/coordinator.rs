//! Dual-band transport coordination: fans outbound traffic across the
//! short-range opportunistic link and the long-range scheduled link,
//! deduplicates inbound traffic, and tracks short-range link-state
//! transitions.
//!
//! The long-range path is never transmitted to directly from here — it is
//! only ever reached by enqueuing into a [`crate::scheduler::Scheduler`],
//! whose own dequeue-and-transmit pump the caller's main loop drives
//! separately. That split is what keeps this module non-blocking: the only
//! thing it asks the caller to wait on is the spacing delay reported in
//! [`SendOutcome::needs_spacing_delay`].

use crate::config::TierOverrides;
use crate::dedup::{DedupTable, Observation};
use crate::events::{EventCause, LinkEvent};
use crate::payload;
use crate::scheduler::{EnqueueOutcome, Scheduler};
use crate::tier::Tier;
use crate::time::{Duration, Millis};
use crate::types::{LinkId, SequenceNumber, SystemId};

/// Minimum spacing between a short-range transmit and the long-range
/// scheduler being allowed to dequeue-and-transmit the same message, so a
/// single burst does not key up both radios back to back.
pub const INTER_TRANSMIT_DELAY: Duration = Duration::from_millis(5);

/// A short-range radio link, abstracted the way [`crate::radio::Radio`]
/// abstracts the long-range one. Distinct from that trait because the
/// short-range link additionally exposes peer reachability, which the
/// coordinator needs to detect link-state transitions, and does not need
/// the long-range path's CAD/retry policy (it is opportunistic, not
/// scheduled).
pub trait ShortRangeLink {
    /// Whether the peer has been heard from recently enough to be considered
    /// reachable.
    fn is_peer_reachable(&self) -> bool;

    /// Attempts to transmit `bytes`, returning whether it was accepted by the
    /// hardware.
    fn transmit(&mut self, bytes: &[u8]) -> bool;

    /// Drains any bytes received since the last call, returning the count
    /// written into `buf`.
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// RSSI of the last received packet, in dBm.
    fn rssi_dbm(&self) -> Option<f32>;

    /// SNR of the last received packet, in dB.
    fn snr_db(&self) -> Option<f32>;
}

/// Outcome of [`Coordinator::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Whether the short-range transmit was accepted.
    pub short_range_ok: bool,
    /// Whether the message was also enqueued to the long-range scheduler
    /// (essential messages only).
    pub long_range_enqueued: bool,
    /// Whether the caller should insert [`INTER_TRANSMIT_DELAY`] before
    /// driving the long-range scheduler's next dequeue-and-transmit.
    pub needs_spacing_delay: bool,
}

impl SendOutcome {
    /// Whether at least one path accepted the message.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.short_range_ok || self.long_range_enqueued
    }
}

/// A message received through either link, with its sequence-deduplication
/// outcome already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Number of bytes written into the caller's buffer.
    pub len: usize,
    /// Which physical link the message arrived on.
    pub link: LinkId,
}

/// Owns both link halves, the long-range scheduler, and the inbound dedup
/// table for one node.
pub struct Coordinator<S> {
    short: S,
    scheduler: Scheduler,
    dedup: DedupTable,
    short_range_reachable: bool,
    short_range_failures: u32,
    tier_overrides: TierOverrides,
}

impl<S: ShortRangeLink> Coordinator<S> {
    /// Builds a coordinator over an already-initialised short-range link,
    /// with no classification overrides.
    pub fn new(short: S) -> Self {
        Self::with_tier_overrides(short, TierOverrides::default())
    }

    /// Builds a coordinator consulting `tier_overrides` ahead of
    /// [`crate::tier::classify`], both for its own essential-message check
    /// and (via a cloned copy) for the long-range [`Scheduler`] it owns.
    pub fn with_tier_overrides(short: S, tier_overrides: TierOverrides) -> Self {
        Self {
            short,
            scheduler: Scheduler::with_tier_overrides(tier_overrides.clone()),
            dedup: DedupTable::new(),
            short_range_reachable: false,
            short_range_failures: 0,
            tier_overrides,
        }
    }

    /// Sends `payload`: always attempted on the short-range link; if the
    /// message classifies as essential (T0 ∪ T1), also enqueued to the
    /// long-range scheduler. An unextractable payload is classified `T2` and
    /// so never takes the long-range path, matching
    /// [`crate::tier::classify`]'s fail-closed rule.
    pub fn send(&mut self, payload: &[u8], now: Millis) -> SendOutcome {
        let short_range_ok = self.short.transmit(payload);
        if !short_range_ok {
            self.short_range_failures += 1;
        } else {
            self.short_range_failures = 0;
        }

        let essential =
            payload::extract(payload).is_some_and(|fields| self.tier_overrides.classify(fields.msg_id).is_essential());

        let long_range_enqueued =
            essential && matches!(self.scheduler.enqueue(payload, now), EnqueueOutcome::Queued(_));

        SendOutcome {
            short_range_ok,
            long_range_enqueued,
            needs_spacing_delay: short_range_ok && long_range_enqueued,
        }
    }

    /// Dequeues the next long-range item ready for transmission, if any.
    /// Transmitting it onto the actual radio is the caller's responsibility
    /// (via [`crate::radio::RadioLink::transmit_with_retry`]).
    pub fn poll_long_range(&mut self, now: Millis) -> Option<crate::scheduler::Item> {
        self.scheduler.poll_next(now)
    }

    /// Polls the short-range link for inbound traffic, applying
    /// sequence-based deduplication. The long-range radio is owned by the
    /// caller's main loop, not by this coordinator, so long-range inbound
    /// bytes are deduplicated through [`Self::dedup`] directly against
    /// whatever buffer the caller already read them into; polling
    /// short-range first (lower latency) is the caller's responsibility too,
    /// by calling this before checking its own long-range buffer.
    pub fn receive(&mut self, buf: &mut [u8]) -> Option<ReceivedMessage> {
        let len = self.short.receive(buf)?;
        if self.dedup(&buf[..len]) {
            Some(ReceivedMessage { len, link: LinkId::ShortRange })
        } else {
            None
        }
    }

    /// Applies sequence-based deduplication to an already-received buffer,
    /// returning whether it is new (not an exact repeat). Used directly by
    /// the caller for long-range inbound bytes, and internally by
    /// [`Self::receive`] for short-range ones.
    #[must_use]
    pub fn dedup(&mut self, received: &[u8]) -> bool {
        match payload::extract(received) {
            Some(fields) => {
                let observation = self.dedup.observe(SystemId::new(fields.sys_id), SequenceNumber::new(fields.seq));
                observation.is_new()
            }
            None => true,
        }
    }

    /// Checks short-range peer reachability against its previous value,
    /// returning a [`LinkEvent`] if it changed.
    pub fn tick(&mut self, now: Millis) -> Option<LinkEvent> {
        let reachable = self.short.is_peer_reachable();
        if reachable == self.short_range_reachable {
            return None;
        }
        self.short_range_reachable = reachable;
        let cause = if reachable { EventCause::ShortRangeUp } else { EventCause::ShortRangeDown };
        let mut event = LinkEvent::new(now, cause);
        if let (Some(rssi), Some(snr)) = (self.short.rssi_dbm(), self.short.snr_db()) {
            event = event.with_link_quality(rssi, snr);
        }
        Some(event)
    }

    /// Total packets dropped as exact duplicates since construction.
    #[must_use]
    pub fn duplicates_dropped(&self) -> u32 {
        self.dedup.dup_dropped()
    }

    /// Whether the short-range link is currently considered reachable.
    #[must_use]
    pub const fn short_range_reachable(&self) -> bool {
        self.short_range_reachable
    }

    /// Consecutive short-range transmit failures since the last success.
    #[must_use]
    pub const fn short_range_failures(&self) -> u32 {
        self.short_range_failures
    }

    /// Point-in-time read of the long-range scheduler's per-tier counters.
    #[must_use]
    pub fn scheduler_snapshot(&self) -> crate::scheduler::Snapshot {
        self.scheduler.snapshot()
    }
}

/// Whether `tier` takes the long-range path in addition to short-range.
#[must_use]
pub const fn is_essential(tier: Tier) -> bool {
    tier.is_essential()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeShortLink {
        reachable: bool,
        accept: bool,
        inbound: Option<heapless::Vec<u8, 64>>,
    }

    impl ShortRangeLink for FakeShortLink {
        fn is_peer_reachable(&self) -> bool {
            self.reachable
        }

        fn transmit(&mut self, _bytes: &[u8]) -> bool {
            self.accept
        }

        fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
            let data = self.inbound.take()?;
            let len = data.len();
            buf[..len].copy_from_slice(&data);
            Some(len)
        }

        fn rssi_dbm(&self) -> Option<f32> {
            Some(-60.0)
        }

        fn snr_db(&self) -> Option<f32> {
            Some(15.0)
        }
    }

    fn heartbeat() -> [u8; 8] {
        [payload::DISCRIMINATOR_V1, 2, 0, 1, 1, 0, 0, 0]
    }

    fn routine() -> [u8; 8] {
        [payload::DISCRIMINATOR_V1, 2, 0, 1, 1, 200, 0, 0]
    }

    #[test]
    fn essential_message_uses_both_paths() {
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: true, inbound: None });
        let outcome = coordinator.send(&heartbeat(), Millis::new(0));
        assert!(outcome.short_range_ok);
        assert!(outcome.long_range_enqueued);
        assert!(outcome.needs_spacing_delay);
    }

    #[test]
    fn routine_message_is_short_range_only() {
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: true, inbound: None });
        let outcome = coordinator.send(&routine(), Millis::new(0));
        assert!(outcome.short_range_ok);
        assert!(!outcome.long_range_enqueued);
        assert!(!outcome.needs_spacing_delay);
    }

    #[test]
    fn short_range_failure_still_enqueues_essential_long_range() {
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: false, inbound: None });
        let outcome = coordinator.send(&heartbeat(), Millis::new(0));
        assert!(!outcome.short_range_ok);
        assert!(outcome.long_range_enqueued);
        assert!(outcome.accepted());
    }

    #[test]
    fn peer_reachability_transition_emits_event() {
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: true, inbound: None });
        let first = coordinator.tick(Millis::new(0));
        assert_eq!(first.map(|e| e.cause), Some(EventCause::ShortRangeUp));
        assert_eq!(coordinator.tick(Millis::new(1)), None);
    }

    #[test]
    fn duplicate_inbound_is_dropped() {
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: true, inbound: None });
        let frame = heartbeat();
        assert!(coordinator.dedup(&frame));
        assert!(!coordinator.dedup(&frame));
        assert_eq!(coordinator.duplicates_dropped(), 1);
    }

    #[test]
    fn receive_surfaces_new_short_range_traffic() {
        let mut inbound = heapless::Vec::new();
        inbound.extend_from_slice(&heartbeat()).unwrap();
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: true, inbound: Some(inbound) });
        let mut buf = [0u8; 64];
        let message = coordinator.receive(&mut buf).expect("first observation is always new");
        assert_eq!(message.link, LinkId::ShortRange);
        assert_eq!(message.len, heartbeat().len());
    }

    #[test]
    fn tier_override_demotes_message_out_of_the_long_range_path() {
        let mut overrides = TierOverrides::new();
        overrides.insert(0, Tier::T2).unwrap(); // heartbeat's msg_id, T0 by default
        let mut coordinator =
            Coordinator::with_tier_overrides(FakeShortLink { reachable: true, accept: true, inbound: None }, overrides);
        let outcome = coordinator.send(&heartbeat(), Millis::new(0));
        assert!(!outcome.long_range_enqueued);
    }

    #[test]
    fn receive_returns_none_when_short_range_link_is_idle() {
        let mut coordinator = Coordinator::new(FakeShortLink { reachable: true, accept: true, inbound: None });
        let mut buf = [0u8; 64];
        assert!(coordinator.receive(&mut buf).is_none());
    }
}
