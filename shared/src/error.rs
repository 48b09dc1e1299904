//! Error types shared by every node role.
//!
//! Every variant corresponds to exactly one row of the error-handling table: the
//! variant's fields carry whatever the disposition in that table needs (a counter
//! to bump, a value to log). Nothing in this crate panics; an `AerolinkError` is
//! always the local, already-recovered-from record of what happened, not a signal
//! to unwind.

use core::fmt;

/// Standard result type for aerolink protocol operations.
pub type Result<T> = core::result::Result<T, AerolinkError>;

/// Severity bucket for an [`AerolinkError`].
///
/// There is exactly one severity representation in this crate; status reports
/// and the structured link-event stream both read `severity()` off the error
/// directly rather than keeping a second, possibly-diverging classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Routine, expected, and already fully handled.
    Low,
    /// Degraded but recovering automatically.
    Medium,
    /// Degraded mode now active; visible in status reports.
    High,
    /// Requires a radio reset or a state machine revert to recover.
    Critical,
}

/// Every local, recoverable failure mode in the core protocol.
///
/// Each variant maps to one row of the error-handling table: queue-full,
/// staleness, checksum mismatch, framer timeout, and so on. None of these are
/// fatal; the disposition (drop, retry, reset, revert) is carried out by the
/// component that raised the error, and the error itself only needs to be
/// counted and optionally logged.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum AerolinkError {
    /// Scheduler `enqueue` on a full tier.
    #[cfg_attr(feature = "std", error("tier {tier:?} queue full, depth {depth}"))]
    QueueFull {
        /// Tier whose queue was full.
        tier: crate::tier::Tier,
        /// Number of slots in that tier (for context in logs).
        depth: usize,
    },

    /// Scheduler `poll_next` found the head-of-line item older than the tier's
    /// max age.
    #[cfg_attr(feature = "std", error("tier {tier:?} item stale, age {age_ms}ms > max {max_age_ms}ms"))]
    StaleItem {
        /// Tier the stale item belonged to.
        tier: crate::tier::Tier,
        /// Observed age in milliseconds.
        age_ms: u64,
        /// Tier's configured max age in milliseconds.
        max_age_ms: u64,
    },

    /// Channel activity detection found the long-range channel busy on every
    /// attempt.
    #[cfg_attr(feature = "std", error("channel busy after {attempts} CAD attempts"))]
    ChannelBusy {
        /// Number of CAD attempts made before giving up.
        attempts: u8,
    },

    /// A radio `transmit` failed transiently; the wrapper will retry.
    #[cfg_attr(feature = "std", error("transient radio transmit failure, retry {retry} of {max_retries}"))]
    RadioTransientFailure {
        /// Retry attempt number (1-based).
        retry: u8,
        /// Configured maximum retries.
        max_retries: u8,
    },

    /// A radio failed five consecutive times and was reset.
    #[cfg_attr(feature = "std", error("radio reset after {consecutive_failures} consecutive failures"))]
    RadioReset {
        /// Number of consecutive failures observed before the reset.
        consecutive_failures: u8,
    },

    /// Inter-controller Fletcher-16 checksum mismatch.
    #[cfg_attr(feature = "std", error("checksum mismatch: expected {expected:#06x}, computed {computed:#06x}"))]
    ChecksumMismatch {
        /// Checksum carried in the packet.
        expected: u16,
        /// Checksum computed over header+payload on receipt.
        computed: u16,
    },

    /// No byte arrived for 100ms while the inter-controller receiver was mid-frame.
    #[cfg_attr(feature = "std", error("inter-controller frame receive timed out"))]
    FramerTimeout,

    /// Declared payload length in `READ_HEADER` was out of the valid 0..=255 range.
    #[cfg_attr(feature = "std", error("inter-controller frame length {len} out of range"))]
    FramerLengthOutOfRange {
        /// The out-of-range length field as received (pre-truncation).
        len: u16,
    },

    /// The inter-controller UART buffer approached its FIFO capacity and had to
    /// be drained.
    #[cfg_attr(feature = "std", error("inter-controller receive buffer overflow, {dropped} bytes drained"))]
    BufferOverflow {
        /// Number of bytes dropped while draining.
        dropped: usize,
    },

    /// An inter-controller command requiring ACK was abandoned after exhausting
    /// its retry budget.
    #[cfg_attr(feature = "std", error("command {command:?} abandoned after {retries} retries"))]
    CommandAbandoned {
        /// The command that was abandoned.
        command: crate::framer::Command,
        /// Number of retries attempted.
        retries: u8,
    },

    /// Relay request to a chosen peer timed out waiting for `ACCEPT`/`REJECT`.
    #[cfg_attr(feature = "std", error("relay request to system {target} timed out"))]
    RelayRequestTimeout {
        /// System id of the peer that did not respond.
        target: crate::types::SystemId,
    },

    /// A relay provider's heartbeat was not received before the client timeout.
    #[cfg_attr(feature = "std", error("relay heartbeat timeout for client {client}"))]
    HeartbeatTimeout {
        /// System id of the client evicted (provider side) or lost (client side).
        client: crate::types::SystemId,
    },

    /// The relay state machine's 2s transition watchdog fired.
    #[cfg_attr(feature = "std", error("relay transition watchdog fired, reverting"))]
    TransitionWatchdog,

    /// A duplicate `(sys_id, seq)` pair was observed and discarded.
    #[cfg_attr(feature = "std", error("duplicate packet from system {sys_id}, seq {seq}"))]
    DuplicatePacket {
        /// System id the duplicate was observed from.
        sys_id: crate::types::SystemId,
        /// Sequence number of the duplicate.
        seq: u8,
    },

    /// An inter-controller command byte did not match any entry in the command
    /// catalogue.
    #[cfg_attr(feature = "std", error("unknown inter-controller command byte {command_byte:#04x}"))]
    UnknownCommand {
        /// The unrecognised command byte.
        command_byte: u8,
    },

    /// Inter-controller framer success rate stayed below the configured
    /// floor for a sustained run of evaluations.
    #[cfg_attr(
        feature = "std",
        error("framer health critical: {received} of {sampled} samples received")
    )]
    FramerHealthCritical {
        /// Frames successfully received over the evaluated window.
        received: u32,
        /// Total frames-plus-errors evaluated.
        sampled: u32,
    },

    /// A configuration value failed validation at load time.
    #[cfg_attr(feature = "std", error("invalid configuration: {parameter} = {value}"))]
    ConfigurationError {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// The invalid value, pre-formatted by the caller.
        value: heapless::String<32>,
    },
}

#[cfg(not(feature = "std"))]
impl fmt::Display for AerolinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { tier, depth } => write!(f, "tier {tier:?} queue full, depth {depth}"),
            Self::StaleItem { tier, age_ms, max_age_ms } => {
                write!(f, "tier {tier:?} item stale, age {age_ms}ms > max {max_age_ms}ms")
            }
            Self::ChannelBusy { attempts } => write!(f, "channel busy after {attempts} CAD attempts"),
            Self::RadioTransientFailure { retry, max_retries } => {
                write!(f, "transient radio transmit failure, retry {retry} of {max_retries}")
            }
            Self::RadioReset { consecutive_failures } => {
                write!(f, "radio reset after {consecutive_failures} consecutive failures")
            }
            Self::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum mismatch: expected {expected:#06x}, computed {computed:#06x}")
            }
            Self::FramerTimeout => write!(f, "inter-controller frame receive timed out"),
            Self::FramerLengthOutOfRange { len } => write!(f, "inter-controller frame length {len} out of range"),
            Self::BufferOverflow { dropped } => {
                write!(f, "inter-controller receive buffer overflow, {dropped} bytes drained")
            }
            Self::CommandAbandoned { command, retries } => {
                write!(f, "command {command:?} abandoned after {retries} retries")
            }
            Self::RelayRequestTimeout { target } => write!(f, "relay request to system {target} timed out"),
            Self::HeartbeatTimeout { client } => write!(f, "relay heartbeat timeout for client {client}"),
            Self::TransitionWatchdog => write!(f, "relay transition watchdog fired, reverting"),
            Self::DuplicatePacket { sys_id, seq } => write!(f, "duplicate packet from system {sys_id}, seq {seq}"),
            Self::UnknownCommand { command_byte } => {
                write!(f, "unknown inter-controller command byte {command_byte:#04x}")
            }
            Self::FramerHealthCritical { received, sampled } => {
                write!(f, "framer health critical: {received} of {sampled} samples received")
            }
            Self::ConfigurationError { parameter, value } => {
                write!(f, "invalid configuration: {parameter} = {value}")
            }
        }
    }
}

impl AerolinkError {
    /// Severity bucket for this error, used both by status reports and by the
    /// structured link-event stream to pick a `tracing` level.
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::QueueFull { .. }
            | Self::StaleItem { .. }
            | Self::DuplicatePacket { .. }
            | Self::UnknownCommand { .. } => ErrorSeverity::Low,

            Self::ChannelBusy { .. }
            | Self::RadioTransientFailure { .. }
            | Self::ChecksumMismatch { .. }
            | Self::FramerTimeout
            | Self::FramerLengthOutOfRange { .. }
            | Self::BufferOverflow { .. }
            | Self::RelayRequestTimeout { .. } => ErrorSeverity::Medium,

            Self::CommandAbandoned { .. } | Self::HeartbeatTimeout { .. } => ErrorSeverity::High,

            Self::RadioReset { .. }
            | Self::TransitionWatchdog
            | Self::FramerHealthCritical { .. }
            | Self::ConfigurationError { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether the core is expected to keep operating after this error.
    ///
    /// Every variant here is recoverable by construction: the error-handling
    /// table in the functional design names the recovery action for each kind.
    /// This exists for callers (status reports) that want to flag "currently
    /// degraded" without re-deriving that from severity.
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ConfigurationError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_low_severity() {
        let err = AerolinkError::QueueFull { tier: crate::tier::Tier::T2, depth: 30 };
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn radio_reset_is_critical() {
        let err = AerolinkError::RadioReset { consecutive_failures: 5 };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn framer_health_critical_is_critical_severity() {
        let err = AerolinkError::FramerHealthCritical { received: 2, sampled: 10 };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn configuration_error_is_the_only_unrecoverable_variant() {
        let err = AerolinkError::ConfigurationError {
            parameter: "jamming.rssi_floor_dbm",
            value: heapless::String::new(),
        };
        assert!(!err.is_recoverable());
        assert!(AerolinkError::FramerTimeout.is_recoverable());
    }
}
