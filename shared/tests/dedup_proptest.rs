//! Property-based checks for the dedup filter: a redundant copy of the same
//! `(sys_id, seq)` pair is never delivered twice, while genuinely advancing
//! sequence numbers within one forward-distance window are always delivered.

use aerolink_shared::dedup::DedupTable;
use aerolink_shared::types::{SequenceNumber, SystemId};
use proptest::prelude::*;

proptest! {
    #[test]
    fn repeating_the_same_packet_is_never_delivered_twice(sys_id in any::<u8>(), seq in any::<u8>()) {
        let mut table = DedupTable::new();
        let first = table.observe(SystemId::new(sys_id), SequenceNumber::new(seq));
        let second = table.observe(SystemId::new(sys_id), SequenceNumber::new(seq));
        prop_assert!(first.is_new());
        prop_assert!(!second.is_new());
    }

    #[test]
    fn strictly_forward_progressing_sequences_are_all_delivered(
        sys_id in any::<u8>(),
        start in any::<u8>(),
        steps in proptest::collection::vec(1u8..=127, 1..20),
    ) {
        let mut table = DedupTable::new();
        let mut seq = start;
        prop_assert!(table.observe(SystemId::new(sys_id), SequenceNumber::new(seq)).is_new());
        for step in steps {
            seq = seq.wrapping_add(step);
            let observation = table.observe(SystemId::new(sys_id), SequenceNumber::new(seq));
            prop_assert!(observation.is_new(), "forward progression within one window must always be new");
        }
    }

    #[test]
    fn distinct_systems_never_suppress_each_other(sys_a in any::<u8>(), sys_b in any::<u8>(), seq in any::<u8>()) {
        prop_assume!(sys_a != sys_b);
        let mut table = DedupTable::new();
        let first = table.observe(SystemId::new(sys_a), SequenceNumber::new(seq));
        let second = table.observe(SystemId::new(sys_b), SequenceNumber::new(seq));
        prop_assert!(first.is_new());
        prop_assert!(second.is_new());
    }
}
