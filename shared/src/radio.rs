//! The `Radio` capability trait and the retry/reset wrapper driven by the
//! scheduler.
//!
//! Radio hardware drivers are an external collaborator; this module only
//! defines the seam and the policy layered on top of it (exponential-backoff
//! retry, consecutive-failure reset, CAD-gated channel access).

use crate::config::RetryConfig;
use crate::time::Duration;

/// Modulation parameters passed to [`Radio::initialise`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioConfig {
    /// Center frequency in Hz.
    pub frequency_hz: u32,
    /// Channel bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// LoRa spreading factor (or equivalent).
    pub spreading_factor: u8,
    /// Forward error correction coding rate denominator.
    pub coding_rate: u8,
    /// Sync word identifying this node's link domain (GCS-link or mesh-link).
    pub sync_word: u8,
    /// Transmit power in dBm.
    pub power_dbm: i8,
}

/// Outcome of a channel-activity-detection scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No energy detected; safe to transmit.
    Free,
    /// Channel in use by another transmitter.
    Busy,
}

/// A radio transceiver, hiding the hardware driver behind a narrow seam.
///
/// Every method is synchronous and bounded: the only two operations this
/// crate expects to block are `transmit` and the CAD scan inside it, both for
/// at most a few tens of milliseconds.
pub trait Radio {
    /// Hardware or transport error surfaced by the driver.
    type Error;

    /// Configures frequency, bandwidth, spreading factor, coding rate, sync
    /// word, and power.
    fn initialise(&mut self, config: RadioConfig) -> Result<(), Self::Error>;

    /// Transmits `bytes`, blocking until the hardware reports completion.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Arms the receiver; subsequent received bytes surface through `read`.
    fn begin_receive(&mut self) -> Result<(), Self::Error>;

    /// Drains any bytes received since the last call, returning the count
    /// written into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// RSSI of the last received packet, in dBm.
    fn rssi(&self) -> f32;

    /// SNR of the last received packet, in dB.
    fn snr(&self) -> f32;

    /// Resets and re-initialises the hardware after repeated failures.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Channel activity detection, used to gate long-range transmits.
    fn scan_channel(&mut self) -> Result<ChannelState, Self::Error>;
}

/// Blocks the caller for approximately `ms` milliseconds, injected so the
/// retry/CAD backoff schedules below can run unchanged on a `no_std` target
/// (a hardware timer) and on `std` (a thread sleep).
pub trait Delay {
    /// Blocks for approximately `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Source of jitter for the CAD busy-retry backoff, injected for the same
/// reason as [`Delay`]: this crate has no RNG of its own on `no_std`.
pub trait Jitter {
    /// Returns a value uniformly distributed over `min..=max`, in milliseconds.
    fn jitter_ms(&mut self, min: u32, max: u32) -> u32;
}

/// Outcome of [`RadioLink::transmit_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Transmitted, possibly after some transient retries.
    Sent,
    /// Failed after exhausting transient retries; radio was not reset.
    TransientFailure,
    /// Failed five consecutive times across calls; radio was reset.
    ResetPerformed,
}

/// Wraps a [`Radio`] with the retry-and-reset policy: up to three transient
/// retries with doubling backoff, and a hardware reset after five
/// consecutive failed [`Self::transmit_with_retry`] calls.
pub struct RadioLink<R> {
    radio: R,
    retry: RetryConfig,
    consecutive_failures: u8,
    radio_resets: u32,
}

impl<R: Radio> RadioLink<R> {
    /// Wraps an already-initialised radio, using [`RetryConfig::default`].
    pub fn new(radio: R) -> Self {
        Self::with_retry_config(radio, RetryConfig::default())
    }

    /// Wraps an already-initialised radio with a deployment-tuned retry schedule.
    pub fn with_retry_config(radio: R, retry: RetryConfig) -> Self {
        Self { radio, retry, consecutive_failures: 0, radio_resets: 0 }
    }

    /// Transmits `bytes`, retrying transient failures up to
    /// [`RetryConfig::max_transient_retries`] times with doubling backoff
    /// starting at [`RetryConfig::radio_retry_initial`], then escalating to a
    /// reset after [`RetryConfig::consecutive_failures_before_reset`]
    /// consecutive failed calls.
    ///
    /// `delay` is blocked on between retries; this crate has no blocking
    /// primitive of its own on `no_std`, so the caller supplies one backed by
    /// a hardware timer or a thread sleep.
    pub fn transmit_with_retry(&mut self, bytes: &[u8], delay: &mut impl Delay) -> TransmitOutcome {
        let mut attempt = 0;
        let mut backoff = self.retry.radio_retry_initial;
        loop {
            match self.radio.transmit(bytes) {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    return TransmitOutcome::Sent;
                }
                Err(_) if attempt < self.retry.max_transient_retries => {
                    attempt += 1;
                    delay.delay_ms(backoff.as_millis() as u32);
                    backoff = backoff.doubled();
                }
                Err(_) => break,
            }
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.retry.consecutive_failures_before_reset {
            self.consecutive_failures = 0;
            self.radio_resets += 1;
            let _ = self.radio.reset();
            return TransmitOutcome::ResetPerformed;
        }
        TransmitOutcome::TransientFailure
    }

    /// Performs CAD, retrying a busy channel up to
    /// [`RetryConfig::max_cad_attempts`] times, waiting a random 10-50ms
    /// between attempts. Returns `false` if the channel was busy on every
    /// attempt.
    pub fn wait_for_clear_channel(&mut self, delay: &mut impl Delay, jitter: &mut impl Jitter) -> bool {
        for attempt in 0..self.retry.max_cad_attempts {
            if matches!(self.radio.scan_channel(), Ok(ChannelState::Free)) {
                return true;
            }
            if attempt + 1 < self.retry.max_cad_attempts {
                delay.delay_ms(jitter.jitter_ms(10, 50));
            }
        }
        false
    }

    /// Number of hardware resets performed since construction.
    #[must_use]
    pub const fn radio_resets(&self) -> u32 {
        self.radio_resets
    }

    /// Borrows the underlying radio, e.g. to call `rssi`/`snr`.
    pub fn inner(&self) -> &R {
        &self.radio
    }

    /// Mutably borrows the underlying radio.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDelay;

    impl Delay for NoopDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    struct FixedJitter;

    impl Jitter for FixedJitter {
        fn jitter_ms(&mut self, min: u32, _max: u32) -> u32 {
            min
        }
    }

    struct FlakyRadio {
        fail_next: u32,
        calls: u32,
        resets: u32,
    }

    impl Radio for FlakyRadio {
        type Error = ();

        fn initialise(&mut self, _config: RadioConfig) -> Result<(), Self::Error> {
            Ok(())
        }

        fn transmit(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
            self.calls += 1;
            if self.calls <= self.fail_next {
                Err(())
            } else {
                Ok(())
            }
        }

        fn begin_receive(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
            Ok(0)
        }

        fn rssi(&self) -> f32 {
            -60.0
        }

        fn snr(&self) -> f32 {
            10.0
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            self.resets += 1;
            self.calls = 0;
            Ok(())
        }

        fn scan_channel(&mut self) -> Result<ChannelState, Self::Error> {
            Ok(ChannelState::Free)
        }
    }

    #[test]
    fn succeeds_after_transient_retries() {
        let mut link = RadioLink::new(FlakyRadio { fail_next: 2, calls: 0, resets: 0 });
        assert_eq!(link.transmit_with_retry(&[1, 2, 3], &mut NoopDelay), TransmitOutcome::Sent);
    }

    #[test]
    fn permanent_failure_is_transient_until_five_consecutive_calls() {
        let mut link = RadioLink::new(FlakyRadio { fail_next: u32::MAX, calls: 0, resets: 0 });
        for _ in 0..4 {
            assert_eq!(link.transmit_with_retry(&[1], &mut NoopDelay), TransmitOutcome::TransientFailure);
        }
        assert_eq!(link.transmit_with_retry(&[1], &mut NoopDelay), TransmitOutcome::ResetPerformed);
        assert_eq!(link.radio_resets(), 1);
    }

    #[test]
    fn clear_channel_detected_immediately() {
        let mut link = RadioLink::new(FlakyRadio { fail_next: 0, calls: 0, resets: 0 });
        assert!(link.wait_for_clear_channel(&mut NoopDelay, &mut FixedJitter));
    }
}
