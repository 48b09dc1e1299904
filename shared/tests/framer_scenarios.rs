//! Inter-controller link scenarios: an ACK-bearing command that is lost on
//! the wire must be retried with doubling backoff and then cleared the
//! moment a (possibly delayed) `Ack` frame actually arrives, exercising
//! [`PendingCommands`] and [`FrameReceiver`] together the way the aircraft's
//! main loop drives them.

use aerolink_shared::framer::{self, Command, FrameEvent, FrameReceiver, PendingCommands};
use aerolink_shared::time::Millis;

fn push_frame(receiver: &mut FrameReceiver, frame: &[u8], start: u64) -> Option<FrameEvent> {
    let mut last = None;
    for (i, byte) in frame.iter().enumerate() {
        last = receiver.push_byte(*byte, Millis::new(start + i as u64));
    }
    last
}

#[test]
fn lost_ack_is_retried_with_doubling_backoff_until_it_arrives() {
    let mut pending = PendingCommands::new();
    pending.track(Command::Init, Millis::new(0));

    // First two windows pass with no Ack: the command is resent each time.
    let (due, abandoned) = pending.poll(Millis::new(500));
    assert_eq!(due, heapless::Vec::<Command, { framer::MAX_PENDING_COMMANDS }>::from_slice(&[Command::Init]).unwrap());
    assert!(abandoned.is_empty());

    let (due, _) = pending.poll(Millis::new(1_500));
    assert_eq!(due.len(), 1, "second retry after the backoff doubles to 1s");

    // The Ack finally arrives; the caller clears it before the next poll.
    let mut out = heapless::Vec::new();
    framer::encode(Command::Ack, &[], &mut out).unwrap();
    let mut receiver = FrameReceiver::new();
    let event = push_frame(&mut receiver, &out, 2_000);
    assert!(matches!(event, Some(FrameEvent::Packet(ref packet)) if packet.command == Command::Ack));

    pending.acknowledge(Command::Init);
    let (due, abandoned) = pending.poll(Millis::new(9_999));
    assert!(due.is_empty());
    assert!(abandoned.is_empty());
}

#[test]
fn command_is_abandoned_after_max_retries_with_no_ack() {
    let mut pending = PendingCommands::new();
    pending.track(Command::RelayActivate, Millis::new(0));

    pending.poll(Millis::new(500)); // retry 1, backoff -> 1s
    pending.poll(Millis::new(1_500)); // retry 2, backoff -> 2s
    pending.poll(Millis::new(3_500)); // retry 3, backoff -> 4s (MAX_RETRIES reached)
    let (due, abandoned) = pending.poll(Millis::new(7_600));
    assert!(due.is_empty());
    assert_eq!(
        abandoned,
        heapless::Vec::<Command, { framer::MAX_PENDING_COMMANDS }>::from_slice(&[Command::RelayActivate]).unwrap()
    );
}

#[test]
fn byte_stream_interleaving_two_frames_decodes_both_in_order() {
    let mut first = heapless::Vec::new();
    framer::encode(Command::StatusRequest, &[], &mut first).unwrap();
    let mut second = heapless::Vec::new();
    framer::encode(Command::StatusReport, &[9, 8, 7], &mut second).unwrap();

    let mut receiver = FrameReceiver::new();
    let mut events = heapless::Vec::<FrameEvent, 4>::new();
    let mut t = 0u64;
    for byte in first.iter().chain(second.iter()) {
        if let Some(event) = receiver.push_byte(*byte, Millis::new(t)) {
            events.push(event).ok();
        }
        t += 1;
    }

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], FrameEvent::Packet(p) if p.command == Command::StatusRequest));
    assert!(matches!(&events[1], FrameEvent::Packet(p) if p.command == Command::StatusReport && p.payload.as_slice() == [9, 8, 7]));
}

#[test]
fn overflowing_uart_buffer_is_drained_and_machine_resets_mid_frame() {
    let mut receiver = FrameReceiver::new();
    receiver.push_byte(framer::START_BYTE, Millis::new(0));
    receiver.push_byte(Command::Init.to_byte(), Millis::new(1));

    assert!(receiver.drain_if_overflowing(950, 900));
    // After the drain, the next well-formed frame must decode cleanly rather
    // than being misread as a continuation of the abandoned one.
    let mut out = heapless::Vec::new();
    framer::encode(Command::Ack, &[], &mut out).unwrap();
    let event = push_frame(&mut receiver, &out, 10);
    assert!(matches!(event, Some(FrameEvent::Packet(p)) if p.command == Command::Ack));
}
