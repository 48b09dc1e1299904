//! On-air codec for relay mesh announcement/request/accept/reject frames.
//!
//! Each frame begins with a 1-byte magic discriminator, followed by a
//! fixed-size structure per kind. Frames are small (tens of bytes), carried
//! directly on the mesh radio — no length prefix is needed since the kind
//! alone determines the frame size.

use crate::relay::RejectReason;
use crate::types::{Coordinates, SystemId};

/// Magic byte for an announcement frame (`'A'`).
pub const MAGIC_ANNOUNCEMENT: u8 = 0x41;
/// Magic byte for a request frame (`'R'`).
pub const MAGIC_REQUEST: u8 = 0x52;
/// Magic byte for an accept frame (`'C'`).
pub const MAGIC_ACCEPT: u8 = 0x43;
/// Magic byte for a reject frame (`'J'`).
pub const MAGIC_REJECT: u8 = 0x4A;
/// Magic byte for a bridged client-traffic frame (`'D'`), distinct from the
/// four control-frame magics above so a provider demultiplexing inbound mesh
/// traffic never confuses a relayed application frame for a handshake frame.
pub const MAGIC_BRIDGE_DATA: u8 = 0x44;

/// Byte length of an encoded [`MeshFrame::Announcement`].
pub const ANNOUNCEMENT_LEN: usize = 1 + 1 + 1 + 4 + 4 + 4 + 8 + 8 + 4;
/// Byte length of an encoded [`MeshFrame::Request`].
pub const REQUEST_LEN: usize = 1 + 1 + 1 + 1;
/// Byte length of an encoded [`MeshFrame::Accept`].
pub const ACCEPT_LEN: usize = 1 + 1 + 1;
/// Byte length of an encoded [`MeshFrame::Reject`].
pub const REJECT_LEN: usize = 1 + 1 + 1 + 1;

/// A decoded relay mesh frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshFrame {
    /// Provider-side periodic broadcast of availability and link quality.
    Announcement {
        /// Broadcasting peer's system id.
        system_id: SystemId,
        /// Whether the peer currently accepts relay clients.
        available: bool,
        /// Peer's GCS-link RSSI in dBm.
        gcs_rssi_dbm: f32,
        /// Peer's GCS-link SNR in dB.
        gcs_snr_db: f32,
        /// Peer's GCS-link loss ratio.
        gcs_loss_ratio: f32,
        /// Peer's position.
        position: Coordinates,
    },
    /// Client→provider relay request.
    Request {
        /// Requesting client's system id.
        client: SystemId,
        /// Addressed provider's system id.
        target: SystemId,
        /// Request sequence number, echoed in the response.
        seq: u8,
    },
    /// Provider→client acceptance.
    Accept {
        /// Accepting provider's system id.
        provider: SystemId,
        /// Echoed request sequence number.
        seq: u8,
    },
    /// Provider→client rejection.
    Reject {
        /// Rejecting provider's system id.
        provider: SystemId,
        /// Echoed request sequence number.
        seq: u8,
        /// Why the request was rejected.
        reason: RejectReason,
    },
}

fn encode_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn decode_f32(buf: &[u8], offset: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

impl MeshFrame {
    /// Encodes this frame into `out`, returning the number of bytes written.
    /// `out` must be at least [`ANNOUNCEMENT_LEN`] bytes (the largest kind).
    pub fn encode(&self, out: &mut [u8]) -> usize {
        match *self {
            Self::Announcement { system_id, available, gcs_rssi_dbm, gcs_snr_db, gcs_loss_ratio, position } => {
                out[0] = MAGIC_ANNOUNCEMENT;
                out[1] = system_id.value();
                out[2] = u8::from(available);
                encode_f32(out, 3, gcs_rssi_dbm);
                encode_f32(out, 7, gcs_snr_db);
                encode_f32(out, 11, gcs_loss_ratio);
                out[15..23].copy_from_slice(&position.latitude.to_le_bytes()[..8]);
                out[23..31].copy_from_slice(&position.longitude.to_le_bytes()[..8]);
                encode_f32(out, 31, position.altitude as f32);
                ANNOUNCEMENT_LEN
            }
            Self::Request { client, target, seq } => {
                out[0] = MAGIC_REQUEST;
                out[1] = client.value();
                out[2] = target.value();
                out[3] = seq;
                REQUEST_LEN
            }
            Self::Accept { provider, seq } => {
                out[0] = MAGIC_ACCEPT;
                out[1] = provider.value();
                out[2] = seq;
                ACCEPT_LEN
            }
            Self::Reject { provider, seq, reason } => {
                out[0] = MAGIC_REJECT;
                out[1] = provider.value();
                out[2] = seq;
                out[3] = match reason {
                    RejectReason::CapacityFull => 0x01,
                };
                REJECT_LEN
            }
        }
    }

    /// Decodes a mesh frame from `buf`, or `None` if the magic byte is
    /// unrecognised or `buf` is shorter than that kind's fixed length.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let magic = *buf.first()?;
        match magic {
            MAGIC_ANNOUNCEMENT if buf.len() >= ANNOUNCEMENT_LEN => {
                let mut lat_bytes = [0u8; 8];
                lat_bytes.copy_from_slice(&buf[15..23]);
                let mut lon_bytes = [0u8; 8];
                lon_bytes.copy_from_slice(&buf[23..31]);
                Some(Self::Announcement {
                    system_id: SystemId::new(buf[1]),
                    available: buf[2] != 0,
                    gcs_rssi_dbm: decode_f32(buf, 3),
                    gcs_snr_db: decode_f32(buf, 7),
                    gcs_loss_ratio: decode_f32(buf, 11),
                    position: Coordinates::new(
                        f64::from_le_bytes(lat_bytes),
                        f64::from_le_bytes(lon_bytes),
                        f64::from(decode_f32(buf, 31)),
                    ),
                })
            }
            MAGIC_REQUEST if buf.len() >= REQUEST_LEN => Some(Self::Request {
                client: SystemId::new(buf[1]),
                target: SystemId::new(buf[2]),
                seq: buf[3],
            }),
            MAGIC_ACCEPT if buf.len() >= ACCEPT_LEN => {
                Some(Self::Accept { provider: SystemId::new(buf[1]), seq: buf[2] })
            }
            MAGIC_REJECT if buf.len() >= REJECT_LEN => {
                let reason = match buf[3] {
                    _ => RejectReason::CapacityFull,
                };
                Some(Self::Reject { provider: SystemId::new(buf[1]), seq: buf[2], reason })
            }
            _ => None,
        }
    }
}

/// Encodes a bridged client-traffic frame: [`MAGIC_BRIDGE_DATA`], the
/// client's system id, then the opaque application frame bytes. Used on the
/// mesh link itself (never on the inter-controller serial, which carries the
/// same bytes inside `BridgeTx`/`BridgeRx`'s own header).
///
/// Returns `None` if `out` is too small for the magic, system id, and frame.
#[must_use]
pub fn encode_bridge_data(client: SystemId, frame: &[u8], out: &mut [u8]) -> Option<usize> {
    let total = 2 + frame.len();
    if out.len() < total {
        return None;
    }
    out[0] = MAGIC_BRIDGE_DATA;
    out[1] = client.value();
    out[2..total].copy_from_slice(frame);
    Some(total)
}

/// Decodes a bridged client-traffic frame, returning the client system id
/// and a borrowed slice of the application frame, or `None` if the magic
/// byte does not match.
#[must_use]
pub fn decode_bridge_data(buf: &[u8]) -> Option<(SystemId, &[u8])> {
    if buf.first()? != &MAGIC_BRIDGE_DATA || buf.len() < 2 {
        return None;
    }
    Some((SystemId::new(buf[1]), &buf[2..]))
}
