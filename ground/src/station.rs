//! Ground-side dual-radio failover: the direct link to the aircraft's
//! Primary is used while healthy; a silent direct link for longer than
//! [`GroundFailoverConfig::activation_timeout`] hands off to the relay link,
//! and enough consecutive direct packets hand back. This is the ground-side
//! mirror of the aircraft's client relay state machine, but simpler — the
//! ground station is always either the target of a relay chain or the
//! direct peer, never itself a relay provider.

use aerolink_shared::config::{Config, GroundFailoverConfig};
use aerolink_shared::dedup::DedupTable;
use aerolink_shared::events::{self, EventCause, LinkEvent};
use aerolink_shared::payload;
use aerolink_shared::radio::{Radio, RadioConfig, RadioLink};
use aerolink_shared::time::Millis;

use crate::hal::{GroundRadio, StdDelay, ThreadRngJitter};

/// Which radio the ground station currently treats as authoritative for
/// inbound telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Receiving directly from the aircraft's Primary.
    Direct,
    /// Receiving via a relaying aircraft's Secondary.
    Relay,
}

/// Owns both ground radios and the failover state machine between them.
pub struct GroundStation {
    direct_radio: RadioLink<GroundRadio>,
    relay_radio: RadioLink<GroundRadio>,
    mode: LinkMode,
    last_direct_packet_at: Millis,
    consecutive_direct_packets: u32,
    dedup: DedupTable,
    failover: GroundFailoverConfig,
    delay: StdDelay,
    jitter: ThreadRngJitter,
}

impl GroundStation {
    /// Initialises both radios and starts in [`LinkMode::Direct`].
    pub fn new(config: &Config, direct_freq_hz: u32, relay_freq_hz: u32) -> anyhow::Result<Self> {
        let mut direct_radio = RadioLink::with_retry_config(GroundRadio::default(), config.retry);
        direct_radio.inner_mut().initialise(RadioConfig {
            frequency_hz: direct_freq_hz,
            bandwidth_hz: 125_000,
            spreading_factor: 9,
            coding_rate: 5,
            sync_word: 0x43,
            power_dbm: 20,
        })?;

        let mut relay_radio = RadioLink::with_retry_config(GroundRadio::default(), config.retry);
        relay_radio.inner_mut().initialise(RadioConfig {
            frequency_hz: relay_freq_hz,
            bandwidth_hz: 125_000,
            spreading_factor: 9,
            coding_rate: 5,
            sync_word: 0x4D,
            power_dbm: 20,
        })?;

        Ok(Self {
            direct_radio,
            relay_radio,
            mode: LinkMode::Direct,
            last_direct_packet_at: Millis::new(0),
            consecutive_direct_packets: 0,
            dedup: DedupTable::new(),
            failover: config.ground_failover,
            delay: StdDelay,
            jitter: ThreadRngJitter,
        })
    }

    /// Current link mode.
    #[must_use]
    pub const fn mode(&self) -> LinkMode {
        self.mode
    }

    /// One pump of both radios plus the failover timeout check. Returns any
    /// newly-deduplicated telemetry payload received this tick.
    pub fn tick(&mut self, now: Millis, buf: &mut [u8]) -> Option<usize> {
        let mut received = None;

        if let Ok(n) = self.direct_radio.inner_mut().read(buf) {
            if n > 0 {
                self.last_direct_packet_at = now;
                self.consecutive_direct_packets += 1;
                if self.mode == LinkMode::Relay
                    && self.consecutive_direct_packets >= self.failover.deactivation_confirm_packets
                {
                    self.mode = LinkMode::Direct;
                    events::emit(LinkEvent::new(now, EventCause::GroundFailoverToDirect));
                }
                if self.accept(&buf[..n]) {
                    received = Some(n);
                }
            }
        }

        if self.mode == LinkMode::Direct
            && self.last_direct_packet_at.elapsed_since(now) > self.failover.activation_timeout
        {
            self.mode = LinkMode::Relay;
            self.consecutive_direct_packets = 0;
            events::emit(LinkEvent::new(now, EventCause::GroundFailoverToRelay));
        }

        if self.mode == LinkMode::Relay && received.is_none() {
            if let Ok(n) = self.relay_radio.inner_mut().read(buf) {
                if n > 0 && self.accept(&buf[..n]) {
                    received = Some(n);
                }
            }
        }

        received
    }

    fn accept(&mut self, received: &[u8]) -> bool {
        match payload::extract(received) {
            Some(fields) => self
                .dedup
                .observe(
                    aerolink_shared::types::SystemId::new(fields.sys_id),
                    aerolink_shared::types::SequenceNumber::new(fields.seq),
                )
                .is_new(),
            None => true,
        }
    }

    /// CAD-gates and transmits an uplink command payload on whichever radio
    /// is currently authoritative.
    pub fn transmit(&mut self, bytes: &[u8]) -> bool {
        let radio = match self.mode {
            LinkMode::Direct => &mut self.direct_radio,
            LinkMode::Relay => &mut self.relay_radio,
        };
        if !radio.wait_for_clear_channel(&mut self.delay, &mut self.jitter) {
            return false;
        }
        matches!(
            radio.transmit_with_retry(bytes, &mut self.delay),
            aerolink_shared::radio::TransmitOutcome::Sent
        )
    }

    /// Total duplicate packets discarded since construction.
    #[must_use]
    pub fn duplicates_dropped(&self) -> u32 {
        self.dedup.dup_dropped()
    }

    /// Feeds bytes into the direct radio's simulated receive queue, standing
    /// in for an over-the-air arrival from the aircraft's Primary.
    pub fn inject_direct(&mut self, bytes: &[u8]) {
        self.direct_radio.inner_mut().inject(bytes);
    }

    /// Feeds bytes into the relay radio's simulated receive queue, standing
    /// in for an over-the-air arrival relayed by the aircraft's Secondary.
    pub fn inject_relay(&mut self, bytes: &[u8]) {
        self.relay_radio.inner_mut().inject(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_direct_mode() {
        let config = Config::default();
        let station = GroundStation::new(&config, 915_000_000, 433_000_000).unwrap();
        assert_eq!(station.mode(), LinkMode::Direct);
    }

    #[test]
    fn silent_direct_link_fails_over_to_relay() {
        let config = Config::default();
        let mut station = GroundStation::new(&config, 915_000_000, 433_000_000).unwrap();
        let mut buf = [0u8; 64];
        station.tick(Millis::new(0), &mut buf);
        let after_timeout = config.ground_failover.activation_timeout.as_millis() + 1;
        station.tick(Millis::new(after_timeout), &mut buf);
        assert_eq!(station.mode(), LinkMode::Relay);
    }
}
