//! Centralised application-payload field extraction.
//!
//! The only coupling this crate has to the application telemetry protocol is
//! the first-byte discriminator and a per-discriminator offset table; every
//! call site that needs `msg_id`/`sys_id`/`seq` goes through [`extract`]
//! rather than re-deriving offsets locally.

/// Discriminator byte for a MAVLink v1 frame.
pub const DISCRIMINATOR_V1: u8 = 0xFE;
/// Discriminator byte for a MAVLink v2 frame.
pub const DISCRIMINATOR_V2: u8 = 0xFD;

/// Fixed field offsets for one framing version, indexed from the start of
/// the discriminator byte.
struct Offsets {
    min_len: usize,
    seq: usize,
    sys_id: usize,
    msg_id: usize,
}

const V1_OFFSETS: Offsets = Offsets { min_len: 6, seq: 2, sys_id: 3, msg_id: 5 };
const V2_OFFSETS: Offsets = Offsets { min_len: 10, seq: 4, sys_id: 5, msg_id: 7 };

/// The fields every downstream component needs, extracted once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadFields {
    /// Framing discriminator the fields were extracted under.
    pub discriminator: u8,
    /// Application message id, used for tier classification.
    pub msg_id: u8,
    /// Originating system id.
    pub sys_id: u8,
    /// Wraparound sequence number.
    pub seq: u8,
}

/// Extracts `{discriminator, msg_id, sys_id, seq}` from a raw application
/// payload.
///
/// Returns `None` if the payload is empty, carries an unrecognised
/// discriminator, or is shorter than that discriminator's minimum frame
/// length — in every such case the caller classifies the message as
/// [`crate::tier::Tier::T2`] rather than treating extraction failure as an
/// error.
#[must_use]
pub fn extract(payload: &[u8]) -> Option<PayloadFields> {
    let discriminator = *payload.first()?;
    let offsets = match discriminator {
        DISCRIMINATOR_V1 => &V1_OFFSETS,
        DISCRIMINATOR_V2 => &V2_OFFSETS,
        _ => return None,
    };
    if payload.len() < offsets.min_len {
        return None;
    }
    Some(PayloadFields {
        discriminator,
        msg_id: payload[offsets.msg_id],
        sys_id: payload[offsets.sys_id],
        seq: payload[offsets.seq],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_frame(seq: u8, sys_id: u8, msg_id: u8) -> [u8; 8] {
        [DISCRIMINATOR_V1, 2, seq, sys_id, 1, msg_id, 0, 0]
    }

    #[test]
    fn extracts_v1_fields() {
        let frame = v1_frame(7, 42, 0);
        let fields = extract(&frame).unwrap();
        assert_eq!(fields.discriminator, DISCRIMINATOR_V1);
        assert_eq!(fields.seq, 7);
        assert_eq!(fields.sys_id, 42);
        assert_eq!(fields.msg_id, 0);
    }

    #[test]
    fn extracts_v2_fields() {
        let mut frame = [0u8; 11];
        frame[0] = DISCRIMINATOR_V2;
        frame[4] = 9;
        frame[5] = 3;
        frame[7] = 24;
        let fields = extract(&frame).unwrap();
        assert_eq!(fields.seq, 9);
        assert_eq!(fields.sys_id, 3);
        assert_eq!(fields.msg_id, 24);
    }

    #[test]
    fn rejects_unknown_discriminator() {
        let frame = [0x00, 1, 2, 3, 4, 5, 6, 7];
        assert!(extract(&frame).is_none());
    }

    #[test]
    fn rejects_short_frame() {
        let frame = [DISCRIMINATOR_V1, 0, 0];
        assert!(extract(&frame).is_none());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(extract(&[]).is_none());
    }
}
