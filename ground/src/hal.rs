//! Ground-side radio hardware abstraction.
//!
//! A deployed ground station talks to its dual radios over a USB/serial
//! modem board; what's here is the same simulated-status shape the aircraft
//! side uses, so the failover logic in [`crate::station`] can be exercised
//! and tested without real hardware attached.

use aerolink_shared::radio::{ChannelState, Delay, Jitter, Radio, RadioConfig};
use rand::Rng;
use std::collections::VecDeque;

/// Simulated ground radio, used for both the direct and relay links.
pub struct GroundRadio {
    config: Option<RadioConfig>,
    rssi_dbm: f32,
    snr_db: f32,
    inbound: VecDeque<u8>,
}

impl Default for GroundRadio {
    fn default() -> Self {
        Self { config: None, rssi_dbm: -85.0, snr_db: 10.0, inbound: VecDeque::new() }
    }
}

impl Radio for GroundRadio {
    type Error = anyhow::Error;

    fn initialise(&mut self, config: RadioConfig) -> Result<(), Self::Error> {
        self.config = Some(config);
        Ok(())
    }

    fn transmit(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
        if self.config.is_none() {
            anyhow::bail!("radio not initialised");
        }
        Ok(())
    }

    fn begin_receive(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.inbound.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn rssi(&self) -> f32 {
        self.rssi_dbm
    }

    fn snr(&self) -> f32 {
        self.snr_db
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.inbound.clear();
        Ok(())
    }

    fn scan_channel(&mut self) -> Result<ChannelState, Self::Error> {
        Ok(ChannelState::Free)
    }
}

impl GroundRadio {
    /// Feeds bytes into the simulated receive queue, standing in for an
    /// over-the-air arrival until real hardware is attached.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

/// `std::thread::sleep`-backed [`Delay`] for the ground station's blocking
/// retry and CAD backoff.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// `rand::thread_rng`-backed [`Jitter`] for CAD busy-retry backoff.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl Jitter for ThreadRngJitter {
    fn jitter_ms(&mut self, min: u32, max: u32) -> u32 {
        rand::thread_rng().gen_range(min..=max)
    }
}
