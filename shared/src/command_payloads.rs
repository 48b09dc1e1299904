//! Fixed-layout encodings for the inter-controller command payloads that the
//! node wiring actually needs to inspect rather than forward opaquely.
//!
//! [`crate::framer`] treats a command's payload as an opaque byte slice; this
//! module is the one place call sites go to turn those bytes into the fields
//! §4.4's command catalogue names for [`crate::framer::Command::RelayActivate`],
//! [`crate::framer::Command::StartRelayDiscovery`],
//! [`crate::framer::Command::BridgeTx`]/[`crate::framer::Command::BridgeRx`],
//! [`crate::framer::Command::RelaySelected`], [`crate::framer::Command::RelayEstablished`]
//! and [`crate::framer::Command::RelayLost`] — mirroring the single-table
//! extraction approach [`crate::payload`] already takes for the application
//! protocol.

use heapless::Vec;

use crate::relay::RelayLostReason;
use crate::types::{Coordinates, SystemId};

fn write_f32(out: &mut [u8], offset: usize, value: f32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_f32(buf: &[u8], offset: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

/// `RelayActivate` payload: a single boolean.
#[must_use]
pub fn encode_relay_activate(active: bool) -> [u8; 1] {
    [u8::from(active)]
}

/// Decodes a `RelayActivate` payload, defaulting to `false` on a short packet.
#[must_use]
pub fn decode_relay_activate(payload: &[u8]) -> bool {
    payload.first().is_some_and(|b| *b != 0)
}

/// `StartRelayDiscovery` payload: own position, GCS-link RSSI/SNR/loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayDiscoveryStart {
    /// The Primary's own position at the moment discovery was triggered.
    pub position: Coordinates,
    /// GCS-link RSSI in dBm.
    pub gcs_rssi_dbm: f32,
    /// GCS-link SNR in dB.
    pub gcs_snr_db: f32,
    /// GCS-link loss ratio.
    pub gcs_loss_ratio: f32,
}

/// Wire length of [`RelayDiscoveryStart`].
pub const RELAY_DISCOVERY_START_LEN: usize = 8 + 8 + 4 + 4 + 4 + 4;

impl RelayDiscoveryStart {
    /// Encodes into `out`, returning the number of bytes written.
    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0..8].copy_from_slice(&self.position.latitude.to_le_bytes());
        out[8..16].copy_from_slice(&self.position.longitude.to_le_bytes());
        write_f32(out, 16, self.position.altitude as f32);
        write_f32(out, 20, self.gcs_rssi_dbm);
        write_f32(out, 24, self.gcs_snr_db);
        write_f32(out, 28, self.gcs_loss_ratio);
        RELAY_DISCOVERY_START_LEN
    }

    /// Decodes from `buf`, or `None` if too short.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RELAY_DISCOVERY_START_LEN {
            return None;
        }
        let mut lat = [0u8; 8];
        lat.copy_from_slice(&buf[0..8]);
        let mut lon = [0u8; 8];
        lon.copy_from_slice(&buf[8..16]);
        Some(Self {
            position: Coordinates::new(f64::from_le_bytes(lat), f64::from_le_bytes(lon), f64::from(read_f32(buf, 16))),
            gcs_rssi_dbm: read_f32(buf, 20),
            gcs_snr_db: read_f32(buf, 24),
            gcs_loss_ratio: read_f32(buf, 28),
        })
    }
}

/// Fixed header length of a `BridgeTx`/`BridgeRx` payload, before the opaque
/// frame bytes: system id, RSSI, SNR, 16-bit frame length.
pub const BRIDGE_HEADER_LEN: usize = 1 + 4 + 4 + 2;

/// Encodes a `BridgeTx`/`BridgeRx` payload: system id, RSSI, SNR, frame
/// length, frame. Returns `Err(())` if `frame` does not fit in `out`.
pub fn encode_bridge<const N: usize>(
    system_id: SystemId,
    rssi_dbm: f32,
    snr_db: f32,
    frame: &[u8],
    out: &mut Vec<u8, N>,
) -> Result<(), ()> {
    let mut header = [0u8; BRIDGE_HEADER_LEN];
    header[0] = system_id.value();
    write_f32(&mut header, 1, rssi_dbm);
    write_f32(&mut header, 5, snr_db);
    header[9..11].copy_from_slice(&(frame.len() as u16).to_le_bytes());
    out.extend_from_slice(&header).map_err(|_| ())?;
    out.extend_from_slice(frame).map_err(|_| ())
}

/// A decoded `BridgeTx`/`BridgeRx` payload; `frame` borrows from the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeFrame<'a> {
    /// The client system id this bridged traffic belongs to.
    pub system_id: SystemId,
    /// RSSI observed on the link the frame was bridged from, in dBm.
    pub rssi_dbm: f32,
    /// SNR observed on the link the frame was bridged from, in dB.
    pub snr_db: f32,
    /// The opaque application frame being bridged.
    pub frame: &'a [u8],
}

/// Decodes a `BridgeTx`/`BridgeRx` payload, or `None` if malformed.
#[must_use]
pub fn decode_bridge(buf: &[u8]) -> Option<BridgeFrame<'_>> {
    if buf.len() < BRIDGE_HEADER_LEN {
        return None;
    }
    let frame_len = u16::from_le_bytes([buf[9], buf[10]]) as usize;
    let frame = buf.get(BRIDGE_HEADER_LEN..BRIDGE_HEADER_LEN + frame_len)?;
    Some(BridgeFrame {
        system_id: SystemId::new(buf[0]),
        rssi_dbm: read_f32(buf, 1),
        snr_db: read_f32(buf, 5),
        frame,
    })
}

/// `RelaySelected` payload: relay system id, mesh RSSI/SNR, score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaySelected {
    /// The chosen relay peer.
    pub relay: SystemId,
    /// Mesh-link RSSI to that peer, in dBm.
    pub mesh_rssi_dbm: f32,
    /// Mesh-link SNR to that peer, in dB.
    pub mesh_snr_db: f32,
    /// The peer's computed relay score.
    pub score: f32,
}

/// Wire length of [`RelaySelected`].
pub const RELAY_SELECTED_LEN: usize = 1 + 4 + 4 + 4;

impl RelaySelected {
    /// Encodes into `out`, returning the number of bytes written.
    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.relay.value();
        write_f32(out, 1, self.mesh_rssi_dbm);
        write_f32(out, 5, self.mesh_snr_db);
        write_f32(out, 9, self.score);
        RELAY_SELECTED_LEN
    }

    /// Decodes from `buf`, or `None` if too short.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RELAY_SELECTED_LEN {
            return None;
        }
        Some(Self {
            relay: SystemId::new(buf[0]),
            mesh_rssi_dbm: read_f32(buf, 1),
            mesh_snr_db: read_f32(buf, 5),
            score: read_f32(buf, 9),
        })
    }
}

/// `RelayEstablished` payload: just the relay system id.
#[must_use]
pub fn encode_relay_established(relay: SystemId) -> [u8; 1] {
    [relay.value()]
}

/// Decodes a `RelayEstablished` payload.
#[must_use]
pub fn decode_relay_established(payload: &[u8]) -> Option<SystemId> {
    payload.first().copied().map(SystemId::new)
}

/// On-wire reason byte for [`RelayLostReason`], used only by
/// [`encode_relay_lost`]/[`decode_relay_lost`] — distinct from
/// [`crate::relay::RejectReason`]'s wire encoding in [`crate::mesh_frame`].
const RELAY_LOST_HEARTBEAT_TIMEOUT: u8 = 0x01;
const RELAY_LOST_GCS_RESTORED: u8 = 0x02;

/// `RelayLost` payload: relay system id, reason.
#[must_use]
pub fn encode_relay_lost(relay: SystemId, reason: RelayLostReason) -> [u8; 2] {
    let reason_byte = match reason {
        RelayLostReason::HeartbeatTimeout => RELAY_LOST_HEARTBEAT_TIMEOUT,
        RelayLostReason::GcsRestored => RELAY_LOST_GCS_RESTORED,
    };
    [relay.value(), reason_byte]
}

/// Decodes a `RelayLost` payload, or `None` if too short or the reason byte
/// is unrecognised.
#[must_use]
pub fn decode_relay_lost(payload: &[u8]) -> Option<(SystemId, RelayLostReason)> {
    if payload.len() < 2 {
        return None;
    }
    let reason = match payload[1] {
        RELAY_LOST_HEARTBEAT_TIMEOUT => RelayLostReason::HeartbeatTimeout,
        RELAY_LOST_GCS_RESTORED => RelayLostReason::GcsRestored,
        _ => return None,
    };
    Some((SystemId::new(payload[0]), reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_activate_roundtrips() {
        assert!(decode_relay_activate(&encode_relay_activate(true)));
        assert!(!decode_relay_activate(&encode_relay_activate(false)));
    }

    #[test]
    fn relay_discovery_start_roundtrips() {
        let start = RelayDiscoveryStart {
            position: Coordinates::new(12.5, -71.0, 300.0),
            gcs_rssi_dbm: -95.0,
            gcs_snr_db: 3.0,
            gcs_loss_ratio: 0.4,
        };
        let mut buf = [0u8; RELAY_DISCOVERY_START_LEN];
        assert_eq!(start.encode(&mut buf), RELAY_DISCOVERY_START_LEN);
        assert_eq!(RelayDiscoveryStart::decode(&buf), Some(start));
    }

    #[test]
    fn bridge_frame_roundtrips() {
        let mut out: Vec<u8, 64> = Vec::new();
        encode_bridge(SystemId::new(9), -70.0, 11.0, &[1, 2, 3, 4], &mut out).unwrap();
        let decoded = decode_bridge(&out).unwrap();
        assert_eq!(decoded.system_id, SystemId::new(9));
        assert_eq!(decoded.frame, &[1, 2, 3, 4]);
    }

    #[test]
    fn relay_selected_roundtrips() {
        let selected = RelaySelected { relay: SystemId::new(4), mesh_rssi_dbm: -60.0, mesh_snr_db: 12.0, score: 150.0 };
        let mut buf = [0u8; RELAY_SELECTED_LEN];
        selected.encode(&mut buf);
        assert_eq!(RelaySelected::decode(&buf), Some(selected));
    }

    #[test]
    fn relay_lost_roundtrips() {
        let encoded = encode_relay_lost(SystemId::new(3), RelayLostReason::GcsRestored);
        assert_eq!(decode_relay_lost(&encoded), Some((SystemId::new(3), RelayLostReason::GcsRestored)));
    }

    #[test]
    fn relay_lost_rejects_unknown_reason_byte() {
        assert_eq!(decode_relay_lost(&[3, 0xFF]), None);
    }
}
