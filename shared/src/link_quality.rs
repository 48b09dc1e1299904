//! Rolling per-radio link-quality tracking and hysteresis-confirmed jamming
//! detection.

use serde::{Deserialize, Serialize};

/// Canonical jamming-detection thresholds, centralised so every caller
/// constructs scenario-specific instances instead of touching global state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JammingThresholds {
    /// RSSI floor in dBm; readings at or below this count as bad.
    pub rssi_floor_dbm: f32,
    /// SNR floor in dB; readings at or below this count as bad.
    pub snr_floor_db: f32,
    /// Packet loss ratio ceiling (0.0–1.0), only evaluated once `expected`
    /// reaches [`Self::min_expected_for_loss`].
    pub loss_ceiling: f32,
    /// Minimum expected-packet count before loss ratio is evaluated.
    pub min_expected_for_loss: u32,
    /// Consecutive-loss count that alone counts as bad.
    pub consecutive_loss_ceiling: u32,
    /// SNR margin added to `snr_floor_db` before a jammed link is considered
    /// recovering (hysteresis, avoids flapping at the threshold).
    pub hysteresis_margin_db: f32,
    /// Consecutive good or bad ticks required before the detector flips
    /// state, in either direction.
    pub confirm_run_len: u32,
}

impl Default for JammingThresholds {
    fn default() -> Self {
        Self {
            rssi_floor_dbm: -100.0,
            snr_floor_db: 5.0,
            loss_ceiling: 0.30,
            min_expected_for_loss: 10,
            consecutive_loss_ceiling: 5,
            hysteresis_margin_db: 10.0,
            confirm_run_len: 5,
        }
    }
}

/// Per-radio rolling quality counters.
///
/// Invariants: every counter is monotone except on an explicit `reset` at a
/// mode transition; `expected >= received` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkQualityRecord {
    rssi_dbm: f32,
    snr_db: f32,
    expected: u32,
    received: u32,
    consecutive_lost: u32,
    consecutive_good: u32,
}

impl LinkQualityRecord {
    /// A fresh record with all counters zeroed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successfully received packet with its RSSI/SNR.
    pub fn record_received(&mut self, rssi_dbm: f32, snr_db: f32) {
        self.rssi_dbm = rssi_dbm;
        self.snr_db = snr_db;
        self.expected += 1;
        self.received += 1;
        self.consecutive_lost = 0;
        self.consecutive_good += 1;
    }

    /// Records an expected packet that was not received (a gap detected by
    /// sequence numbering, or a periodic heartbeat that did not arrive).
    pub fn record_lost(&mut self) {
        self.expected += 1;
        self.consecutive_lost += 1;
        self.consecutive_good = 0;
    }

    /// Resets all counters, used at an explicit mode transition.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Loss ratio, `0.0` when no packets are expected yet.
    #[must_use]
    pub fn loss_ratio(&self) -> f32 {
        if self.expected == 0 {
            0.0
        } else {
            1.0 - (self.received as f32 / self.expected as f32)
        }
    }

    /// Last recorded RSSI in dBm.
    #[must_use]
    pub const fn rssi_dbm(&self) -> f32 {
        self.rssi_dbm
    }

    /// Last recorded SNR in dB.
    #[must_use]
    pub const fn snr_db(&self) -> f32 {
        self.snr_db
    }

    /// Consecutive lost packets since the last received one.
    #[must_use]
    pub const fn consecutive_lost(&self) -> u32 {
        self.consecutive_lost
    }

    fn is_bad(&self, thresholds: &JammingThresholds) -> bool {
        self.rssi_dbm <= thresholds.rssi_floor_dbm
            || self.snr_db <= thresholds.snr_floor_db
            || self.consecutive_lost >= thresholds.consecutive_loss_ceiling
            || (self.expected >= thresholds.min_expected_for_loss && self.loss_ratio() > thresholds.loss_ceiling)
    }

    fn is_good(&self, thresholds: &JammingThresholds) -> bool {
        self.rssi_dbm > thresholds.rssi_floor_dbm + thresholds.hysteresis_margin_db
            && self.snr_db > thresholds.snr_floor_db + thresholds.hysteresis_margin_db
            && self.consecutive_lost == 0
    }
}

/// Jamming state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JammingState {
    /// Link quality is acceptable.
    Clear,
    /// Link is jammed: confirmed by a sustained run of bad readings.
    Jammed,
}

/// Hysteresis-confirmed jamming detector: requires [`JammingThresholds::confirm_run_len`]
/// consecutive bad (or good) ticks before flipping state, so a single noisy
/// reading cannot toggle relay/failover behavior.
#[derive(Debug, Clone, Copy)]
pub struct JammingDetector {
    thresholds: JammingThresholds,
    state: JammingState,
    run: u32,
}

impl JammingDetector {
    /// Creates a detector starting in [`JammingState::Clear`].
    #[must_use]
    pub const fn new(thresholds: JammingThresholds) -> Self {
        Self { thresholds, state: JammingState::Clear, run: 0 }
    }

    /// Feeds one tick's link-quality snapshot, returning the (possibly
    /// unchanged) jamming state.
    pub fn tick(&mut self, record: &LinkQualityRecord) -> JammingState {
        let confirming = match self.state {
            JammingState::Clear => record.is_bad(&self.thresholds),
            JammingState::Jammed => record.is_good(&self.thresholds),
        };

        if confirming {
            self.run += 1;
            if self.run >= self.thresholds.confirm_run_len {
                self.state = match self.state {
                    JammingState::Clear => JammingState::Jammed,
                    JammingState::Jammed => JammingState::Clear,
                };
                self.run = 0;
            }
        } else {
            self.run = 0;
        }
        self.state
    }

    /// Current state without advancing the detector.
    #[must_use]
    pub const fn state(&self) -> JammingState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_ratio_is_zero_with_no_expected_packets() {
        let record = LinkQualityRecord::new();
        assert_eq!(record.loss_ratio(), 0.0);
    }

    #[test]
    fn expected_is_always_at_least_received() {
        let mut record = LinkQualityRecord::new();
        record.record_received(-50.0, 12.0);
        record.record_lost();
        assert!(record.expected >= record.received);
    }

    #[test]
    fn sustained_bad_readings_confirm_jammed() {
        let mut detector = JammingDetector::new(JammingThresholds::default());
        let mut record = LinkQualityRecord::new();
        for _ in 0..4 {
            record.record_lost();
            assert_eq!(detector.tick(&record), JammingState::Clear);
        }
        record.record_lost();
        assert_eq!(detector.tick(&record), JammingState::Jammed);
    }

    #[test]
    fn single_bad_tick_does_not_flip_state() {
        let mut detector = JammingDetector::new(JammingThresholds::default());
        let mut record = LinkQualityRecord::new();
        record.record_lost();
        assert_eq!(detector.tick(&record), JammingState::Clear);
        record.record_received(-40.0, 20.0);
        assert_eq!(detector.tick(&record), JammingState::Clear);
    }

    #[test]
    fn sustained_good_readings_recover_from_jammed() {
        let thresholds = JammingThresholds::default();
        let mut detector = JammingDetector::new(thresholds);
        let mut record = LinkQualityRecord::new();
        for _ in 0..thresholds.confirm_run_len {
            record.record_lost();
            detector.tick(&record);
        }
        assert_eq!(detector.state(), JammingState::Jammed);

        record.reset();
        for _ in 0..thresholds.confirm_run_len {
            record.record_received(-40.0, 30.0);
            detector.tick(&record);
        }
        assert_eq!(detector.state(), JammingState::Clear);
    }
}
