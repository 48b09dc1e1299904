//! The structured link-event stream.
//!
//! Every link-up, link-down, relay mode transition, relay establish/lost,
//! radio reset, and consecutive-failure burst is recorded as a [`LinkEvent`]
//! and emitted through [`emit`]. On `std` targets emission goes straight
//! through `tracing` at a level fixed per [`EventCause`]; on `no_std` targets
//! there is no subscriber to emit to, so the same record is pushed onto a
//! bounded ring buffer instead, drained on request by the host-facing `DUMP`
//! command.

use crate::time::Millis;

#[cfg(not(feature = "std"))]
use heapless::Deque;

/// What happened, and at what `tracing` level it belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCause {
    /// The short-range link started being able to reach its peer.
    ShortRangeUp,
    /// The short-range link stopped being able to reach its peer.
    ShortRangeDown,
    /// A ground station entered relay mode after the direct-link timeout.
    GroundFailoverToRelay,
    /// A ground station returned to direct mode after enough consecutive
    /// direct packets.
    GroundFailoverToDirect,
    /// A relay client completed provider discovery and began forwarding.
    RelayEstablished,
    /// A relay client's session with its provider ended (heartbeat timeout,
    /// provider eviction, or an explicit return to direct operation).
    RelayLost,
    /// A radio was power-cycled after five consecutive transmit failures.
    RadioReset,
    /// The relay state machine's 2s transition watchdog fired and reverted
    /// a stuck `Discovering`/`Requesting` state back to `Idle`.
    TransitionWatchdogReverted,
    /// Five (or more) consecutive radio transmit failures, short of the
    /// count that triggers [`Self::RadioReset`].
    ConsecutiveFailureBurst,
    /// A Primary's GCS-link jamming detector confirmed a sustained bad run
    /// and commanded its Secondary to begin client-side relay discovery.
    JammingConfirmed,
    /// A Primary's GCS-link jamming detector confirmed a sustained good run
    /// past the hysteresis margin and commanded a return to direct operation.
    JammingCleared,
    /// The inter-controller framer's success rate stayed below its
    /// configured floor for a sustained run of evaluations.
    FramerHealthCritical,
}

impl EventCause {
    /// Fixed `tracing` level for this cause, per the logging policy: `ERROR`
    /// for radio resets and watchdog reverts, `WARN` for mode transitions and
    /// failure bursts, `INFO` for link and relay up/down.
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::RadioReset | Self::TransitionWatchdogReverted | Self::FramerHealthCritical => Level::Error,
            Self::GroundFailoverToRelay
            | Self::GroundFailoverToDirect
            | Self::ConsecutiveFailureBurst
            | Self::JammingConfirmed => Level::Warn,
            Self::ShortRangeUp
            | Self::ShortRangeDown
            | Self::RelayEstablished
            | Self::RelayLost
            | Self::JammingCleared => Level::Info,
        }
    }
}

/// A `tracing`-independent level, so `no_std` builds (which cannot depend on
/// `tracing`) still have something to branch on when draining the ring
/// buffer through a host tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Per-tick counters; not retained in the ring buffer.
    Debug,
    /// Link and relay up/down.
    Info,
    /// Mode transitions and failure bursts.
    Warn,
    /// Radio resets and watchdog reverts.
    Error,
}

/// One structured link-event record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkEvent {
    /// Monotonic time the event occurred.
    pub timestamp: Millis,
    /// What happened.
    pub cause: EventCause,
    /// RSSI at the time of the event, in dBm, if relevant.
    pub rssi_dbm: Option<f32>,
    /// SNR at the time of the event, in dB, if relevant.
    pub snr_db: Option<f32>,
    /// A cause-specific counter (consecutive failures, retries attempted).
    pub counter: u32,
}

impl LinkEvent {
    /// Builds a new event with no link-quality context.
    #[must_use]
    pub const fn new(timestamp: Millis, cause: EventCause) -> Self {
        Self { timestamp, cause, rssi_dbm: None, snr_db: None, counter: 0 }
    }

    /// Attaches RSSI/SNR readings.
    #[must_use]
    pub const fn with_link_quality(mut self, rssi_dbm: f32, snr_db: f32) -> Self {
        self.rssi_dbm = Some(rssi_dbm);
        self.snr_db = Some(snr_db);
        self
    }

    /// Attaches a cause-specific counter.
    #[must_use]
    pub const fn with_counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }
}

/// Emits `event` through `tracing` at its fixed level.
#[cfg(feature = "std")]
pub fn emit(event: LinkEvent) {
    match event.cause.level() {
        Level::Error => tracing::error!(
            cause = ?event.cause,
            timestamp_ms = event.timestamp.as_u64(),
            rssi_dbm = event.rssi_dbm,
            snr_db = event.snr_db,
            counter = event.counter,
            "link event"
        ),
        Level::Warn => tracing::warn!(
            cause = ?event.cause,
            timestamp_ms = event.timestamp.as_u64(),
            rssi_dbm = event.rssi_dbm,
            snr_db = event.snr_db,
            counter = event.counter,
            "link event"
        ),
        Level::Info => tracing::info!(
            cause = ?event.cause,
            timestamp_ms = event.timestamp.as_u64(),
            rssi_dbm = event.rssi_dbm,
            snr_db = event.snr_db,
            counter = event.counter,
            "link event"
        ),
        Level::Debug => tracing::debug!(
            cause = ?event.cause,
            timestamp_ms = event.timestamp.as_u64(),
            counter = event.counter,
            "link event"
        ),
    }
}

/// Bounded ring buffer of [`LinkEvent`]s, used on `no_std` targets in place of
/// a `tracing` subscriber. Oldest events are dropped once [`RING_CAPACITY`]
/// is reached; a full buffer is itself evidence the link has been unstable,
/// not a condition worth a further event.
pub const RING_CAPACITY: usize = 32;

/// Ring buffer type, exposed so `no_std` callers can own one directly.
#[cfg(not(feature = "std"))]
#[derive(Debug, Default)]
pub struct EventLog {
    events: Deque<LinkEvent, RING_CAPACITY>,
}

#[cfg(not(feature = "std"))]
impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Deque::new() }
    }

    /// Records `event`, dropping the oldest entry first if the buffer is full.
    pub fn push(&mut self, event: LinkEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    /// Drains every buffered event in arrival order, for the host-facing
    /// `DUMP` command.
    pub fn drain(&mut self) -> impl Iterator<Item = LinkEvent> + '_ {
        core::iter::from_fn(move || self.events.pop_front())
    }

    /// Number of events currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
