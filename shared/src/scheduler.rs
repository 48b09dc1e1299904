//! Priority-tier transmit scheduler.
//!
//! Three separate bounded FIFOs, one per [`Tier`], dequeued strict-priority
//! T0 → T1 → T2. Enqueue on a full tier never displaces an older item from
//! that tier and never crosses tiers; dequeue lazily evicts stale items
//! rather than scanning on a timer.

use heapless::Deque;

use crate::config::TierOverrides;
use crate::payload;
use crate::tier::Tier;
use crate::time::Millis;

/// Maximum payload length accepted by the scheduler, matching a typical
/// radio's maximum transmission unit.
pub const MAX_PAYLOAD_LEN: usize = 245;

const T0_SLOTS: usize = 10;
const T1_SLOTS: usize = 20;
const T2_SLOTS: usize = 30;

/// An item waiting to be dequeued for transmission.
#[derive(Debug, Clone)]
pub struct Item {
    payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
    tier: Tier,
    enqueued_at: Millis,
}

impl Item {
    /// The queued payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Tier this item was classified into.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.tier
    }

    /// Monotonic time this item was enqueued.
    #[must_use]
    pub const fn enqueued_at(&self) -> Millis {
        self.enqueued_at
    }
}

/// Result of an [`Scheduler::enqueue`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted into its tier's queue.
    Queued(Tier),
    /// Rejected: the payload was empty or exceeded [`MAX_PAYLOAD_LEN`].
    RejectedInvalid,
    /// Rejected: the destination tier's queue was full.
    RejectedFull(Tier),
}

/// Per-tier counters, read through [`Scheduler::snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounters {
    /// Items successfully dequeued for transmission.
    pub tx: u32,
    /// Enqueue attempts rejected because the tier was full.
    pub drops_full: u32,
    /// Items discarded by `poll_next` for exceeding the tier's max age.
    pub drops_stale: u32,
    /// Current queue depth.
    pub depth: usize,
}

/// A point-in-time read of every tier's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// T0 counters.
    pub t0: TierCounters,
    /// T1 counters.
    pub t1: TierCounters,
    /// T2 counters.
    pub t2: TierCounters,
}

impl Snapshot {
    /// Counters for a given tier.
    #[must_use]
    pub fn for_tier(&self, tier: Tier) -> &TierCounters {
        match tier {
            Tier::T0 => &self.t0,
            Tier::T1 => &self.t1,
            Tier::T2 => &self.t2,
        }
    }
}

/// Strict-priority, bounded, age-aware transmit scheduler.
pub struct Scheduler {
    t0: Deque<Item, T0_SLOTS>,
    t1: Deque<Item, T1_SLOTS>,
    t2: Deque<Item, T2_SLOTS>,
    counters: Snapshot,
    tier_overrides: TierOverrides,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler with all counters zeroed and no
    /// classification overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tier_overrides(TierOverrides::default())
    }

    /// Creates an empty scheduler consulting `tier_overrides` ahead of
    /// [`crate::tier::classify`].
    #[must_use]
    pub fn with_tier_overrides(tier_overrides: TierOverrides) -> Self {
        Self {
            t0: Deque::new(),
            t1: Deque::new(),
            t2: Deque::new(),
            counters: Snapshot::default(),
            tier_overrides,
        }
    }

    /// Classifies and enqueues `raw` at `now`.
    ///
    /// Zero-length or oversized payloads are rejected before classification.
    /// A payload whose `msg_id` cannot be extracted is still classified
    /// [`Tier::T2`] and enqueued — classification never fails open into T0.
    pub fn enqueue(&mut self, raw: &[u8], now: Millis) -> EnqueueOutcome {
        if raw.is_empty() || raw.len() > MAX_PAYLOAD_LEN {
            return EnqueueOutcome::RejectedInvalid;
        }
        let tier = payload::extract(raw).map_or(Tier::T2, |fields| self.tier_overrides.classify(fields.msg_id));

        let mut buf = heapless::Vec::new();
        // Length already checked above; this cannot fail.
        let _ = buf.extend_from_slice(raw);
        let item = Item { payload: buf, tier, enqueued_at: now };

        let (queue, counters) = self.queue_and_counters_mut(tier);
        if queue.push_back(item).is_err() {
            counters.drops_full += 1;
            return EnqueueOutcome::RejectedFull(tier);
        }
        counters.depth = queue.len();
        EnqueueOutcome::Queued(tier)
    }

    /// Returns the next item eligible for transmission at `now`, scanning
    /// tiers T0 → T1 → T2 and evicting stale head-of-line items lazily.
    pub fn poll_next(&mut self, now: Millis) -> Option<Item> {
        for tier in Tier::ALL {
            if let Some(item) = self.poll_tier(tier, now) {
                return Some(item);
            }
        }
        None
    }

    fn poll_tier(&mut self, tier: Tier, now: Millis) -> Option<Item> {
        let max_age = tier.max_age();
        loop {
            let (queue, counters) = self.queue_and_counters_mut(tier);
            let item = queue.pop_front()?;
            counters.depth = queue.len();
            if item.enqueued_at.elapsed_since(now) > max_age {
                counters.drops_stale += 1;
                continue;
            }
            counters.tx += 1;
            return Some(item);
        }
    }

    fn queue_and_counters_mut(&mut self, tier: Tier) -> (&mut dyn QueueLike, &mut TierCounters) {
        match tier {
            Tier::T0 => (&mut self.t0, &mut self.counters.t0),
            Tier::T1 => (&mut self.t1, &mut self.counters.t1),
            Tier::T2 => (&mut self.t2, &mut self.counters.t2),
        }
    }

    /// Point-in-time read of every tier's counters.
    #[must_use]
    pub const fn snapshot(&self) -> Snapshot {
        self.counters
    }
}

/// Narrow interface used only to let [`Scheduler::enqueue`] share code across
/// the three differently-sized per-tier deques.
trait QueueLike {
    fn push_back(&mut self, item: Item) -> Result<(), Item>;
    fn pop_front(&mut self) -> Option<Item>;
    fn len(&self) -> usize;
}

impl<const N: usize> QueueLike for Deque<Item, N> {
    fn push_back(&mut self, item: Item) -> Result<(), Item> {
        Deque::push_back(self, item)
    }

    fn pop_front(&mut self) -> Option<Item> {
        Deque::pop_front(self)
    }

    fn len(&self) -> usize {
        Deque::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat_at(now: Millis) -> ([u8; 8], Millis) {
        ([payload::DISCRIMINATOR_V1, 2, 0, 1, 1, 0, 0, 0], now)
    }

    #[test]
    fn enqueue_classifies_and_queues() {
        let mut scheduler = Scheduler::new();
        let (frame, now) = heartbeat_at(Millis::new(0));
        assert_eq!(scheduler.enqueue(&frame, now), EnqueueOutcome::Queued(Tier::T0));
        assert_eq!(scheduler.snapshot().t0.depth, 1);
    }

    #[test]
    fn enqueue_rejects_empty_and_oversized() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.enqueue(&[], Millis::new(0)), EnqueueOutcome::RejectedInvalid);
        let oversized = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(scheduler.enqueue(&oversized, Millis::new(0)), EnqueueOutcome::RejectedInvalid);
    }

    #[test]
    fn t0_does_not_displace_on_full_queue() {
        let mut scheduler = Scheduler::new();
        let (frame, _) = heartbeat_at(Millis::new(0));
        for i in 0..Tier::T0.slots() {
            assert_eq!(scheduler.enqueue(&frame, Millis::new(i as u64)), EnqueueOutcome::Queued(Tier::T0));
        }
        assert_eq!(scheduler.enqueue(&frame, Millis::new(999)), EnqueueOutcome::RejectedFull(Tier::T0));
        assert_eq!(scheduler.snapshot().t0.drops_full, 1);
        assert_eq!(scheduler.snapshot().t0.depth, Tier::T0.slots());
    }

    #[test]
    fn poll_next_is_strict_priority() {
        let mut scheduler = Scheduler::new();
        let t2_frame = [payload::DISCRIMINATOR_V1, 2, 0, 1, 1, 200, 0, 0];
        let (t0_frame, _) = heartbeat_at(Millis::new(0));
        scheduler.enqueue(&t2_frame, Millis::new(0));
        scheduler.enqueue(&t0_frame, Millis::new(1));
        let next = scheduler.poll_next(Millis::new(2)).unwrap();
        assert_eq!(next.tier(), Tier::T0);
    }

    #[test]
    fn stale_items_are_dropped_before_fresh_ones() {
        let mut scheduler = Scheduler::new();
        let (frame, _) = heartbeat_at(Millis::new(0));
        scheduler.enqueue(&frame, Millis::new(0));
        scheduler.enqueue(&frame, Millis::new(500));
        // T0 max age is 1s; at t=2000 the first item is stale, the second is not.
        let next = scheduler.poll_next(Millis::new(2000)).unwrap();
        assert_eq!(next.enqueued_at(), Millis::new(500));
        assert_eq!(scheduler.snapshot().t0.drops_stale, 1);
        assert_eq!(scheduler.snapshot().t0.tx, 1);
    }

    #[test]
    fn poll_next_on_empty_scheduler_returns_none() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.poll_next(Millis::new(0)).is_none());
    }

    #[test]
    fn tier_override_reclassifies_enqueued_items() {
        // heartbeat_at's frame carries msg_id 0 (HEARTBEAT), T0 by default.
        let mut overrides = TierOverrides::new();
        overrides.insert(0, Tier::T2).unwrap();
        let mut scheduler = Scheduler::with_tier_overrides(overrides);
        let (frame, now) = heartbeat_at(Millis::new(0));
        assert_eq!(scheduler.enqueue(&frame, now), EnqueueOutcome::Queued(Tier::T2));
    }
}
