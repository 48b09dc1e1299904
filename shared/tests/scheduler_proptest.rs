//! Property-based checks for the scheduler's two structural invariants:
//! per-tier depth never exceeds its slot count, and a stale-drop is only ever
//! counted once the item's age has actually crossed its tier's max age.

use aerolink_shared::payload::DISCRIMINATOR_V1;
use aerolink_shared::scheduler::{EnqueueOutcome, Scheduler};
use aerolink_shared::tier::Tier;
use aerolink_shared::time::Millis;
use proptest::prelude::*;

fn frame(msg_id: u8, seq: u8) -> [u8; 8] {
    [DISCRIMINATOR_V1, 2, seq, 1, 1, msg_id, 0, 0]
}

proptest! {
    #[test]
    fn depth_never_exceeds_slots_under_arbitrary_enqueue_order(
        msg_ids in proptest::collection::vec(any::<u8>(), 0..300),
        seqs in proptest::collection::vec(any::<u8>(), 0..300),
    ) {
        let mut scheduler = Scheduler::new();
        for (msg_id, seq) in msg_ids.iter().zip(seqs.iter()) {
            scheduler.enqueue(&frame(*msg_id, *seq), Millis::new(0));
            let snapshot = scheduler.snapshot();
            for tier in Tier::ALL {
                prop_assert!(snapshot.for_tier(tier).depth <= tier.slots());
            }
        }
    }

    #[test]
    fn a_stale_drop_implies_the_outage_exceeded_the_tiers_max_age(
        msg_id in any::<u8>(),
        seq in any::<u8>(),
        outage_ms in 0u64..20_000,
    ) {
        let mut scheduler = Scheduler::new();
        let tier = match scheduler.enqueue(&frame(msg_id, seq), Millis::new(0)) {
            EnqueueOutcome::Queued(tier) => tier,
            _ => return Ok(()),
        };

        scheduler.poll_next(Millis::new(outage_ms));
        let drops_stale = scheduler.snapshot().for_tier(tier).drops_stale;
        if drops_stale > 0 {
            prop_assert!(outage_ms > tier.max_age().as_millis());
        }
    }
}
