//! Priority tiers and the `msg_id → Tier` classification table.
//!
//! The tier is a pure function of `msg_id`, identical on every node; nothing
//! here looks at payload content beyond the single byte the framer already
//! extracted.

use serde::{Deserialize, Serialize};

use crate::time::Duration;

/// Transmit priority band. Ordered `T0 < T1 < T2` so that `Tier::T0` sorts
/// first wherever tiers are compared or iterated in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Critical: heartbeat, command-long, mode-set, parameter-set, mission
    /// item/count, acknowledgements.
    T0,
    /// Important: GPS position, attitude, global position, RC channels, HUD.
    T1,
    /// Routine: everything else.
    T2,
}

impl Tier {
    /// All tiers, in dequeue priority order.
    pub const ALL: [Tier; 3] = [Tier::T0, Tier::T1, Tier::T2];

    /// Bounded FIFO depth for this tier.
    pub const fn slots(self) -> usize {
        match self {
            Tier::T0 => 10,
            Tier::T1 => 20,
            Tier::T2 => 30,
        }
    }

    /// Maximum age before a queued item in this tier is dropped as stale.
    pub const fn max_age(self) -> Duration {
        match self {
            Tier::T0 => Duration::from_secs(1),
            Tier::T1 => Duration::from_secs(2),
            Tier::T2 => Duration::from_secs(5),
        }
    }

    /// Whether this tier is part of the essential-message filter (T0 ∪ T1)
    /// used to decide whether a message also goes out on the long-range link.
    pub const fn is_essential(self) -> bool {
        matches!(self, Tier::T0 | Tier::T1)
    }
}

/// Classifies a MAVLink common-message-set `msg_id` into a [`Tier`].
///
/// This is the canonical default table; a deployment may override it via
/// [`crate::config::Config`]. Unknown ids fall to `T2` — classification never
/// fails open into `T0`.
///
/// IDs are the MAVLink common dialect's message ids:
/// `HEARTBEAT`=0, `COMMAND_LONG`=76, `SET_MODE`=11, `PARAM_SET`=23,
/// `MISSION_ITEM_INT`=73, `MISSION_COUNT`=44, `COMMAND_ACK`=77,
/// `MISSION_ACK`=47, `GPS_RAW_INT`=24, `GLOBAL_POSITION_INT`=33,
/// `ATTITUDE`=30, `RC_CHANNELS`=65, `VFR_HUD`=74.
#[must_use]
pub const fn classify(msg_id: u8) -> Tier {
    match msg_id {
        0 | 76 | 11 | 23 | 73 | 44 | 77 | 47 => Tier::T0,
        24 | 33 | 30 | 65 | 74 => Tier::T1,
        _ => Tier::T2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_is_t0() {
        assert_eq!(classify(0), Tier::T0);
    }

    #[test]
    fn gps_position_is_t1() {
        assert_eq!(classify(24), Tier::T1);
    }

    #[test]
    fn unknown_id_falls_to_t2() {
        assert_eq!(classify(200), Tier::T2);
    }

    #[test]
    fn ordering_is_strict_priority() {
        assert!(Tier::T0 < Tier::T1);
        assert!(Tier::T1 < Tier::T2);
    }

    #[test]
    fn essential_filter_is_t0_and_t1() {
        assert!(Tier::T0.is_essential());
        assert!(Tier::T1.is_essential());
        assert!(!Tier::T2.is_essential());
    }

    #[test]
    fn slot_counts_match_canonical_table() {
        assert_eq!(Tier::T0.slots(), 10);
        assert_eq!(Tier::T1.slots(), 20);
        assert_eq!(Tier::T2.slots(), 30);
    }
}
