//! Binary inter-controller framing: packet layout, the receive state
//! machine, and the retry-with-ACK pending-command list.
//!
//! Layout: start byte `0xAA`, command byte, 16-bit little-endian payload
//! length (`L ≤ 255`), `L` payload bytes, little-endian Fletcher-16 checksum
//! computed over the four header bytes plus the payload.

use heapless::Vec;

use crate::config::{FramerHealthConfig, RetryConfig};
use crate::error::AerolinkError;
use crate::fletcher16;
use crate::time::{Duration, Millis};

/// Start-of-frame marker.
pub const START_BYTE: u8 = 0xAA;
/// Maximum payload length (fits in the wire format's `L ≤ 255` constraint).
pub const MAX_PAYLOAD_LEN: usize = 255;
/// Byte budget for one complete frame (4-byte header + payload + 2-byte checksum).
pub const MAX_FRAME_LEN: usize = 4 + MAX_PAYLOAD_LEN + 2;
/// No-byte-arrived timeout while mid-frame.
pub const BYTE_TIMEOUT: Duration = Duration::from_millis(100);
/// Commands waiting in a [`PendingCommands`] list beyond this count are abandoned outright.
pub const MAX_PENDING_COMMANDS: usize = 4;

/// The inter-controller command catalogue. Unknown command bytes are
/// counted and discarded, never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Primary→Secondary: mode string, primary/secondary frequency, timestamp. Requires ACK.
    Init,
    /// Either direction: acknowledges a prior command. Carries no payload.
    Ack,
    /// Primary→Secondary: enable/disable relay mode. Requires ACK.
    RelayActivate,
    /// Primary→Secondary: opaque frame to relay onward.
    RelayTx,
    /// Secondary→Primary: RSSI, SNR, and the opaque frame received over the mesh.
    RelayRx,
    /// Primary→Secondary: system id, RSSI, SNR, frame length, frame.
    BridgeTx,
    /// Secondary→Primary: same shape as `BridgeTx`.
    BridgeRx,
    /// Secondary→Primary: bulk counters and link metrics.
    StatusReport,
    /// Primary→Secondary: request a status report. Carries no payload.
    StatusRequest,
    /// Primary→Secondary: RSSI, SNR, loss, broadcast as a relay request.
    BroadcastRelayReq,
    /// Primary→Secondary: own position, GCS RSSI/SNR/loss.
    StartRelayDiscovery,
    /// Secondary→Primary: relay system id, mesh RSSI/SNR, score.
    RelaySelected,
    /// Secondary→Primary: relay system id.
    RelayEstablished,
    /// Secondary→Primary: relay system id, reason.
    RelayLost,
}

impl Command {
    /// Whether this command requires the receiver to send `Ack` back and
    /// the sender to track it on a retry list.
    #[must_use]
    pub const fn requires_ack(self) -> bool {
        matches!(self, Self::Init | Self::RelayActivate)
    }

    /// Wire byte for this command.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Init => 0x01,
            Self::Ack => 0x02,
            Self::RelayActivate => 0x03,
            Self::RelayTx => 0x04,
            Self::RelayRx => 0x05,
            Self::BridgeTx => 0x06,
            Self::BridgeRx => 0x07,
            Self::StatusReport => 0x08,
            Self::StatusRequest => 0x09,
            Self::BroadcastRelayReq => 0x0A,
            Self::StartRelayDiscovery => 0x0B,
            Self::RelaySelected => 0x0C,
            Self::RelayEstablished => 0x0D,
            Self::RelayLost => 0x0E,
        }
    }

    /// Decodes a wire byte into a [`Command`], or `None` if unrecognised.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::Init,
            0x02 => Self::Ack,
            0x03 => Self::RelayActivate,
            0x04 => Self::RelayTx,
            0x05 => Self::RelayRx,
            0x06 => Self::BridgeTx,
            0x07 => Self::BridgeRx,
            0x08 => Self::StatusReport,
            0x09 => Self::StatusRequest,
            0x0A => Self::BroadcastRelayReq,
            0x0B => Self::StartRelayDiscovery,
            0x0C => Self::RelaySelected,
            0x0D => Self::RelayEstablished,
            0x0E => Self::RelayLost,
            _ => return None,
        })
    }
}

/// A fully decoded inter-controller packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Which command this packet carries.
    pub command: Command,
    /// Payload bytes (opaque to the framer).
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

/// Encodes `command` and `payload` into wire bytes, appending to `out`.
///
/// Returns `Err(())` if `payload` exceeds [`MAX_PAYLOAD_LEN`] or `out`
/// lacks capacity; neither can happen when `out` is sized [`MAX_FRAME_LEN`].
pub fn encode(command: Command, payload: &[u8], out: &mut Vec<u8, MAX_FRAME_LEN>) -> Result<(), ()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(());
    }
    let len = payload.len() as u16;
    let mut header = Vec::<u8, 4>::new();
    header.push(START_BYTE).map_err(|_| ())?;
    header.push(command.to_byte()).map_err(|_| ())?;
    header.push(len.to_le_bytes()[0]).map_err(|_| ())?;
    header.push(len.to_le_bytes()[1]).map_err(|_| ())?;

    let checksum_input_len = header.len() + payload.len();
    let mut checksum_input: Vec<u8, MAX_FRAME_LEN> = Vec::new();
    checksum_input.extend_from_slice(&header).map_err(|_| ())?;
    checksum_input.extend_from_slice(payload).map_err(|_| ())?;
    debug_assert_eq!(checksum_input.len(), checksum_input_len);
    let checksum = fletcher16::checksum(&checksum_input);

    out.extend_from_slice(&header).map_err(|_| ())?;
    out.extend_from_slice(payload).map_err(|_| ())?;
    out.extend_from_slice(&checksum.to_le_bytes()).map_err(|_| ())?;
    Ok(())
}

/// Receive-side state of [`FrameReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitStart,
    ReadHeader,
    ReadPayload,
    ReadChecksum,
}

/// Result of feeding a byte (or a tick) to [`FrameReceiver`].
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A complete, checksum-valid packet was decoded.
    Packet(Packet),
    /// Checksum mismatch; packet discarded.
    ChecksumError,
    /// Declared payload length was out of range.
    LengthError,
    /// Checksum was valid but the command byte matched no known command.
    UnknownCommand(u8),
    /// No byte arrived for [`BYTE_TIMEOUT`] while mid-frame.
    Timeout,
}

/// Streaming receiver implementing the `WAIT_START → READ_HEADER →
/// READ_PAYLOAD → READ_CHECKSUM → VALIDATE` state machine.
pub struct FrameReceiver {
    state: State,
    header: Vec<u8, 4>,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
    checksum_bytes: Vec<u8, 2>,
    declared_len: usize,
    last_byte_at: Millis,
    parse_errors: u32,
    checksum_errors: u32,
    timeout_errors: u32,
    buffer_overflow: u32,
    packets_received: u32,
    health: FramerHealthConfig,
    low_success_run: u32,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    /// Creates a receiver in `WAIT_START`, using [`FramerHealthConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_health_config(FramerHealthConfig::default())
    }

    /// Creates a receiver in `WAIT_START` with a deployment-tuned health floor.
    #[must_use]
    pub fn with_health_config(health: FramerHealthConfig) -> Self {
        Self {
            state: State::WaitStart,
            header: Vec::new(),
            payload: Vec::new(),
            checksum_bytes: Vec::new(),
            declared_len: 0,
            last_byte_at: Millis::new(0),
            parse_errors: 0,
            checksum_errors: 0,
            timeout_errors: 0,
            buffer_overflow: 0,
            packets_received: 0,
            health,
            low_success_run: 0,
        }
    }

    fn reset(&mut self) {
        self.state = State::WaitStart;
        self.header.clear();
        self.payload.clear();
        self.checksum_bytes.clear();
        self.declared_len = 0;
    }

    /// Checks for the mid-frame byte timeout without consuming a byte. Call
    /// once per main-loop iteration.
    pub fn tick(&mut self, now: Millis) -> Option<FrameEvent> {
        if self.state != State::WaitStart && self.last_byte_at.elapsed_since(now) > BYTE_TIMEOUT {
            self.reset();
            self.timeout_errors += 1;
            return Some(FrameEvent::Timeout);
        }
        None
    }

    /// If the underlying byte stream's buffer is at or past `threshold`
    /// pending bytes, drains it, resets the machine, and counts the overflow.
    pub fn drain_if_overflowing(&mut self, pending_bytes: usize, threshold: usize) -> bool {
        if pending_bytes >= threshold {
            self.reset();
            self.buffer_overflow += 1;
            true
        } else {
            false
        }
    }

    /// Feeds one received byte into the state machine.
    pub fn push_byte(&mut self, byte: u8, now: Millis) -> Option<FrameEvent> {
        self.last_byte_at = now;
        match self.state {
            State::WaitStart => {
                if byte == START_BYTE {
                    self.header.clear();
                    let _ = self.header.push(byte);
                    self.state = State::ReadHeader;
                }
                None
            }
            State::ReadHeader => {
                let _ = self.header.push(byte);
                if self.header.len() < 4 {
                    return None;
                }
                let len = u16::from_le_bytes([self.header[2], self.header[3]]);
                if len > MAX_PAYLOAD_LEN as u16 {
                    self.reset();
                    self.parse_errors += 1;
                    return Some(FrameEvent::LengthError);
                }
                self.declared_len = len as usize;
                self.payload.clear();
                if self.declared_len == 0 {
                    self.checksum_bytes.clear();
                    self.state = State::ReadChecksum;
                } else {
                    self.state = State::ReadPayload;
                }
                None
            }
            State::ReadPayload => {
                let _ = self.payload.push(byte);
                if self.payload.len() >= self.declared_len {
                    self.checksum_bytes.clear();
                    self.state = State::ReadChecksum;
                }
                None
            }
            State::ReadChecksum => {
                let _ = self.checksum_bytes.push(byte);
                if self.checksum_bytes.len() < 2 {
                    return None;
                }
                Some(self.validate())
            }
        }
    }

    fn validate(&mut self) -> FrameEvent {
        let expected = u16::from_le_bytes([self.checksum_bytes[0], self.checksum_bytes[1]]);
        let mut header_and_payload: Vec<u8, MAX_FRAME_LEN> = Vec::new();
        let _ = header_and_payload.extend_from_slice(&self.header);
        let _ = header_and_payload.extend_from_slice(&self.payload);
        let computed = fletcher16::checksum(&header_and_payload);

        let command_byte = self.header[1];
        let result = if expected != computed {
            self.checksum_errors += 1;
            FrameEvent::ChecksumError
        } else if let Some(command) = Command::from_byte(command_byte) {
            self.packets_received += 1;
            FrameEvent::Packet(Packet { command, payload: self.payload.clone() })
        } else {
            self.parse_errors += 1;
            FrameEvent::UnknownCommand(command_byte)
        };
        self.reset();
        result
    }

    /// `packets_received / (packets_received + parse_errors + checksum_errors + timeout_errors)`.
    #[must_use]
    pub fn success_rate(&self) -> f32 {
        let total = self.packets_received + self.parse_errors + self.checksum_errors + self.timeout_errors;
        if total == 0 {
            1.0
        } else {
            self.packets_received as f32 / total as f32
        }
    }

    /// Evaluates `success_rate` against [`FramerHealthConfig::success_rate_floor`].
    ///
    /// Below-floor evaluations accumulate in a run that resets the moment the
    /// rate recovers; once the run reaches [`FramerHealthConfig::sustained_ticks`]
    /// this returns [`AerolinkError::FramerHealthCritical`] and resets the run,
    /// so the caller sees the signal once per sustained episode rather than
    /// once per tick for as long as the link stays bad. Evaluations before
    /// [`FramerHealthConfig::min_samples`] total frames-plus-errors are
    /// ignored so a cold start never trips the floor.
    pub fn check_health(&mut self) -> Option<AerolinkError> {
        let total = self.packets_received + self.parse_errors + self.checksum_errors + self.timeout_errors;
        if total < self.health.min_samples {
            return None;
        }
        if self.success_rate() < self.health.success_rate_floor {
            self.low_success_run += 1;
        } else {
            self.low_success_run = 0;
        }
        if self.low_success_run >= self.health.sustained_ticks {
            self.low_success_run = 0;
            Some(AerolinkError::FramerHealthCritical { received: self.packets_received, sampled: total })
        } else {
            None
        }
    }
}

/// One ACK-bearing command awaiting acknowledgement.
#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    command: Command,
    sent_at: Millis,
    retry_count: u8,
    backoff: Duration,
}

/// Tracks ACK-bearing commands and drives the doubling retry schedule.
pub struct PendingCommands {
    pending: Vec<PendingCommand, MAX_PENDING_COMMANDS>,
    retry: RetryConfig,
}

impl Default for PendingCommands {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCommands {
    /// Creates an empty list, using [`RetryConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_retry_config(RetryConfig::default())
    }

    /// Creates an empty list with a deployment-tuned retry schedule.
    #[must_use]
    pub fn with_retry_config(retry: RetryConfig) -> Self {
        Self { pending: Vec::new(), retry }
    }

    /// Registers `command` as sent at `now`, to be tracked until ACKed.
    pub fn track(&mut self, command: Command, now: Millis) {
        let _ = self.pending.push(PendingCommand {
            command,
            sent_at: now,
            retry_count: 0,
            backoff: self.retry.framer_retry_initial,
        });
    }

    /// Clears the first tracked instance of `command` on ACK receipt.
    pub fn acknowledge(&mut self, command: Command) {
        if let Some(pos) = self.pending.iter().position(|p| p.command.to_byte() == command.to_byte()) {
            self.pending.swap_remove(pos);
        }
    }

    /// Advances the retry schedule. Returns commands due for resend, and
    /// separately reports any abandoned after
    /// [`RetryConfig::max_framer_retries`] attempts.
    pub fn poll(&mut self, now: Millis) -> (Vec<Command, MAX_PENDING_COMMANDS>, Vec<Command, MAX_PENDING_COMMANDS>) {
        let mut due = Vec::new();
        let mut abandoned = Vec::new();
        let mut remaining: Vec<PendingCommand, MAX_PENDING_COMMANDS> = Vec::new();

        for mut entry in core::mem::take(&mut self.pending) {
            if entry.sent_at.elapsed_since(now) < entry.backoff {
                let _ = remaining.push(entry);
                continue;
            }
            if entry.retry_count >= self.retry.max_framer_retries {
                let _ = abandoned.push(entry.command);
                continue;
            }
            entry.retry_count += 1;
            entry.sent_at = now;
            entry.backoff = entry.backoff.doubled();
            let _ = due.push(entry.command);
            let _ = remaining.push(entry);
        }
        self.pending = remaining;
        (due, abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(command: Command, payload: &[u8]) -> Vec<u8, MAX_FRAME_LEN> {
        let mut out = Vec::new();
        encode(command, payload, &mut out).unwrap();
        out
    }

    #[test]
    fn encode_decode_roundtrip_with_payload() {
        let frame = roundtrip(Command::StatusReport, &[1, 2, 3, 4]);
        let mut receiver = FrameReceiver::new();
        let mut last = None;
        for (i, byte) in frame.iter().enumerate() {
            last = receiver.push_byte(*byte, Millis::new(i as u64));
        }
        match last {
            Some(FrameEvent::Packet(packet)) => {
                assert_eq!(packet.command, Command::StatusReport);
                assert_eq!(packet.payload.as_slice(), &[1, 2, 3, 4]);
            }
            other => panic!("expected Packet, got {other:?}"),
        }
    }

    #[test]
    fn encode_decode_roundtrip_empty_payload() {
        let frame = roundtrip(Command::Ack, &[]);
        let mut receiver = FrameReceiver::new();
        let mut last = None;
        for (i, byte) in frame.iter().enumerate() {
            last = receiver.push_byte(*byte, Millis::new(i as u64));
        }
        assert!(matches!(last, Some(FrameEvent::Packet(_))));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut frame = roundtrip(Command::StatusRequest, &[]);
        let last_idx = frame.len() - 1;
        frame[last_idx] ^= 0xFF;
        let mut receiver = FrameReceiver::new();
        let mut last = None;
        for (i, byte) in frame.iter().enumerate() {
            last = receiver.push_byte(*byte, Millis::new(i as u64));
        }
        assert!(matches!(last, Some(FrameEvent::ChecksumError)));
    }

    #[test]
    fn mid_frame_timeout_resets_machine() {
        let mut receiver = FrameReceiver::new();
        receiver.push_byte(START_BYTE, Millis::new(0));
        let event = receiver.tick(Millis::new(200));
        assert!(matches!(event, Some(FrameEvent::Timeout)));
        assert_eq!(receiver.timeout_errors, 1);
    }

    #[test]
    fn unknown_command_byte_is_counted_not_dispatched() {
        let mut out: Vec<u8, MAX_FRAME_LEN> = Vec::new();
        out.extend_from_slice(&[START_BYTE, 0xFF, 0, 0]).unwrap();
        let checksum = fletcher16::checksum(&out);
        out.extend_from_slice(&checksum.to_le_bytes()).unwrap();
        let mut receiver = FrameReceiver::new();
        let mut last = None;
        for (i, byte) in out.iter().enumerate() {
            last = receiver.push_byte(*byte, Millis::new(i as u64));
        }
        assert!(matches!(last, Some(FrameEvent::UnknownCommand(0xFF))));
        assert_eq!(receiver.parse_errors, 1);
    }

    #[test]
    fn pending_command_retries_with_doubling_backoff_then_abandons() {
        let mut pending = PendingCommands::new();
        pending.track(Command::Init, Millis::new(0));

        let (due, abandoned) = pending.poll(Millis::new(500));
        assert_eq!(due.len(), 1);
        assert!(abandoned.is_empty());

        let (due, _) = pending.poll(Millis::new(1500));
        assert_eq!(due.len(), 1);

        let (due, _) = pending.poll(Millis::new(3500));
        assert_eq!(due.len(), 1);

        let (_, abandoned) = pending.poll(Millis::new(9999));
        assert_eq!(abandoned, Vec::<Command, MAX_PENDING_COMMANDS>::from_slice(&[Command::Init]).unwrap());
    }

    #[test]
    fn sustained_low_success_rate_raises_framer_health_critical() {
        let mut receiver = FrameReceiver::with_health_config(FramerHealthConfig {
            success_rate_floor: 0.5,
            min_samples: 4,
            sustained_ticks: 3,
        });
        receiver.packets_received = 1;
        receiver.checksum_errors = 3;

        assert!(receiver.check_health().is_none());
        assert!(receiver.check_health().is_none());
        match receiver.check_health() {
            Some(AerolinkError::FramerHealthCritical { received, sampled }) => {
                assert_eq!(received, 1);
                assert_eq!(sampled, 4);
            }
            other => panic!("expected FramerHealthCritical, got {other:?}"),
        }
        // The run reset after firing; a single further below-floor tick doesn't refire.
        assert!(receiver.check_health().is_none());
    }

    #[test]
    fn below_min_samples_never_trips_the_floor() {
        let mut receiver = FrameReceiver::with_health_config(FramerHealthConfig {
            success_rate_floor: 0.9,
            min_samples: 100,
            sustained_ticks: 1,
        });
        receiver.checksum_errors = 5;
        assert!(receiver.check_health().is_none());
    }

    #[test]
    fn ack_clears_pending_command() {
        let mut pending = PendingCommands::new();
        pending.track(Command::RelayActivate, Millis::new(0));
        pending.acknowledge(Command::RelayActivate);
        let (due, abandoned) = pending.poll(Millis::new(10_000));
        assert!(due.is_empty());
        assert!(abandoned.is_empty());
    }
}
