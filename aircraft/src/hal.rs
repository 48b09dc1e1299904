//! Hardware abstraction for the aircraft's two radios.
//!
//! A real airframe wires these onto an SPI-attached LoRa-class transceiver
//! through `embedded-hal`; what's here is the simulated status-tracking
//! shape that plugs into [`aerolink_shared::radio::Radio`] and
//! [`aerolink_shared::coordinator::ShortRangeLink`] today, with the actual
//! register pokes left for the board bring-up that follows this crate.

use aerolink_shared::coordinator::ShortRangeLink;
use aerolink_shared::radio::{ChannelState, Delay, Jitter, Radio, RadioConfig};
use heapless::Deque;
use rand_core::{RngCore, SeedableRng};

/// Simulated long-range (GCS-link or mesh-link, depending on role) radio.
pub struct LongRangeRadio {
    config: Option<RadioConfig>,
    rssi_dbm: f32,
    snr_db: f32,
    inbound: Deque<u8, 512>,
}

impl Default for LongRangeRadio {
    fn default() -> Self {
        Self { config: None, rssi_dbm: -90.0, snr_db: 8.0, inbound: Deque::new() }
    }
}

impl Radio for LongRangeRadio {
    type Error = ();

    fn initialise(&mut self, config: RadioConfig) -> Result<(), Self::Error> {
        self.config = Some(config);
        Ok(())
    }

    fn transmit(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
        if self.config.is_none() {
            return Err(());
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

/// Simulated short-range, opportunistic 2.4GHz radio.
pub struct ShortRangeRadio {
    peer_reachable: bool,
    rssi_dbm: f32,
    snr_db: f32,
    inbound: Deque<u8, 512>,
}

impl Default for ShortRangeRadio {
    fn default() -> Self {
        Self { peer_reachable: false, rssi_dbm: -55.0, snr_db: 20.0, inbound: Deque::new() }
    }
}

impl ShortRangeLink for ShortRangeRadio {
    fn is_peer_reachable(&self) -> bool {
        self.peer_reachable
    }

    fn transmit(&mut self, _bytes: &[u8]) -> bool {
        self.peer_reachable
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.inbound.is_empty() {
            return None;
        }
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
        Some(n)
    }

    fn rssi_dbm(&self) -> Option<f32> {
        Some(self.rssi_dbm)
    }

    fn snr_db(&self) -> Option<f32> {
        Some(self.snr_db)
    }
}

/// Busy-wait stand-in for a hardware timer, used to block between retry and
/// CAD attempts. Board bring-up will swap this for an `embedded-hal` delay
/// driven by a real timer peripheral; the simulated radios above never
/// actually need the wait, so the spin count only has to be in the right
/// ballpark for host-side timing tests.
pub struct SimDelay;

impl Delay for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..(u64::from(ms) * 1_000) {
            core::hint::spin_loop();
        }
    }
}

/// CSMA backoff jitter source backed by a `ChaCha8` stream cipher RNG, seeded
/// once at startup since this target has no hardware entropy source wired up
/// yet.
pub struct ChaChaJitter {
    rng: rand_chacha::ChaCha8Rng,
}

impl ChaChaJitter {
    /// Seeds a new jitter source.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { rng: rand_chacha::ChaCha8Rng::seed_from_u64(seed) }
    }
}

impl Jitter for ChaChaJitter {
    fn jitter_ms(&mut self, min: u32, max: u32) -> u32 {
        min + self.rng.next_u32() % (max - min + 1)
    }
}

/// The flight controller's telemetry UART, carried only by the Primary role.
pub trait FlightControllerUart {
    /// Drains application telemetry bytes produced by the flight controller
    /// since the last call.
    fn read(&mut self, buf: &mut [u8]) -> Option<usize>;
}

/// Simulated flight-controller UART.
#[derive(Default)]
pub struct FlightControllerLink {
    inbound: Deque<u8, 512>,
}

impl FlightControllerUart for FlightControllerLink {
    fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.inbound.is_empty() {
            return None;
        }
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
        Some(n)
    }
}

/// The point-to-point serial link between the Primary and Secondary MCUs,
/// carrying the binary inter-controller frames.
pub trait InterControllerUart {
    /// Drains raw bytes received on the inter-controller link since the last
    /// call, returning the count written into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Writes a complete encoded frame.
    fn write(&mut self, bytes: &[u8]);

    /// Bytes currently buffered but not yet drained by `read`, used to
    /// detect a FIFO approaching overflow.
    fn pending(&self) -> usize;
}

/// Simulated inter-controller UART.
#[derive(Default)]
pub struct InterControllerLink {
    inbound: Deque<u8, 1024>,
}

impl InterControllerUart for InterControllerLink {
    fn read(&mut self, buf: &mut [u8]) -> usize {
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
        n
    }

    fn write(&mut self, _bytes: &[u8]) {}

    fn pending(&self) -> usize {
        self.inbound.len()
    }
}

/// The host-facing debug console: line-oriented text commands (`DUMP`,
/// `CLEAR`) rather than the binary inter-controller framing, used to drain
/// the [`aerolink_shared::events::EventLog`] ring buffer without a `tracing`
/// subscriber available on this target.
pub trait HostUart {
    /// Drains bytes received since the last call, returning the count
    /// written into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Writes bytes to the host console.
    fn write(&mut self, bytes: &[u8]);
}

/// Simulated host console UART.
#[derive(Default)]
pub struct HostLink {
    inbound: Deque<u8, 256>,
}

impl HostUart for HostLink {
    fn read(&mut self, buf: &mut [u8]) -> usize {
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
        n
    }

    fn write(&mut self, _bytes: &[u8]) {}
}
