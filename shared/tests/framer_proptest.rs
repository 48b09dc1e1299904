//! Property-based check for the inter-controller framer: corrupting a single
//! byte of an otherwise well-formed frame must never cause the receiver to
//! hand a `Packet` to the caller — it is either caught as a checksum/length
//! mismatch or simply never resolves into a complete frame.

use aerolink_shared::fletcher16;
use aerolink_shared::framer::{self, Command, FrameEvent, FrameReceiver};
use aerolink_shared::time::Millis;
use proptest::prelude::*;

fn commands() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Init),
        Just(Command::Ack),
        Just(Command::RelayActivate),
        Just(Command::RelayTx),
        Just(Command::StatusReport),
        Just(Command::StatusRequest),
        Just(Command::BroadcastRelayReq),
    ]
}

proptest! {
    #[test]
    fn a_single_corrupted_byte_never_yields_a_packet(
        command in commands(),
        payload in proptest::collection::vec(any::<u8>(), 0..32),
        corrupt_index in any::<proptest::sample::Index>(),
        corrupt_xor in 1u8..=255,
    ) {
        let mut frame: heapless::Vec<u8, { framer::MAX_FRAME_LEN }> = heapless::Vec::new();
        framer::encode(command, &payload, &mut frame).unwrap();

        let index = corrupt_index.index(frame.len());
        frame[index] ^= corrupt_xor;

        // Recompute the checksum the same way `validate` does, so this test
        // does not depend on the corruption actually landing where we think.
        let header_and_payload = &frame[..frame.len() - 2];
        let declared = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
        let still_valid = fletcher16::checksum(header_and_payload) == declared;

        let mut receiver = FrameReceiver::new();
        let mut last = None;
        for (i, byte) in frame.iter().enumerate() {
            last = receiver.push_byte(*byte, Millis::new(i as u64));
        }

        prop_assume!(!still_valid);
        prop_assert!(
            !matches!(last, Some(FrameEvent::Packet(_))),
            "a frame whose checksum no longer matches its contents must not parse as a Packet"
        );
    }

    #[test]
    fn well_formed_frames_always_round_trip(
        command in commands(),
        payload in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let mut frame: heapless::Vec<u8, { framer::MAX_FRAME_LEN }> = heapless::Vec::new();
        framer::encode(command, &payload, &mut frame).unwrap();

        let mut receiver = FrameReceiver::new();
        let mut last = None;
        for (i, byte) in frame.iter().enumerate() {
            last = receiver.push_byte(*byte, Millis::new(i as u64));
        }

        match last {
            Some(FrameEvent::Packet(packet)) => {
                prop_assert_eq!(packet.command, command);
                prop_assert_eq!(packet.payload.as_slice(), payload.as_slice());
            }
            other => prop_assert!(false, "well-formed frame failed to parse: {other:?}"),
        }
    }
}
