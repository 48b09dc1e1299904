//! Aircraft-side radio node: Primary or Secondary role on the jamming-resistant
//! aircraft/ground telemetry link.
//!
//! A single binary is built for both roles; [`aerolink_shared::config::AircraftRole`]
//! picks which one a given flash image runs as, decided by ordinary `match`
//! arms rather than a compile-time feature. Primary owns the flight-controller
//! UART and the dual-band GCS link; Secondary owns the mesh-link radio and
//! the relay discovery/provider state machines. The two halves talk over the
//! inter-controller serial link using the binary framing in
//! `aerolink_shared::framer`.

#![no_std]
#![no_main]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod hal;

use aerolink_shared::command_payloads::{self, BridgeFrame, RelayDiscoveryStart, RelaySelected};
use aerolink_shared::config::{AircraftRole, Config, TierOverrides};
use aerolink_shared::coordinator::Coordinator;
use aerolink_shared::error::AerolinkError;
use aerolink_shared::events::{EventCause, EventLog, LinkEvent};
use aerolink_shared::framer::{self, Command, FrameEvent, FrameReceiver, PendingCommands};
use aerolink_shared::link_quality::{JammingDetector, JammingState, LinkQualityRecord};
use aerolink_shared::mesh_frame::{self, MeshFrame};
use aerolink_shared::radio::{RadioConfig, RadioLink, TransmitOutcome};
use aerolink_shared::relay::{
    ClientAction, ClientRelay, ClientState, ProviderSessions, RejectReason, RelayLostReason, RelayTable,
    RelayTableEntry, ANNOUNCEMENT_PERIOD, CLIENT_HEARTBEAT_TIMEOUT, REQUEST_TIMEOUT,
};
use aerolink_shared::time::Millis;
use aerolink_shared::types::SystemId;
use embassy_executor::Spawner;
use embassy_time::{Duration as EmbassyDuration, Instant, Timer};

use hal::{
    ChaChaJitter, FlightControllerLink, FlightControllerUart, HostLink, HostUart, InterControllerLink,
    InterControllerUart, LongRangeRadio, ShortRangeRadio, SimDelay,
};

/// How often the cooperative main loop wakes, independent of any radio's own
/// timing; every timeout in this crate is a comparison against monotonic
/// `Millis`, not a sleep of its own.
const TICK_INTERVAL: EmbassyDuration = EmbassyDuration::from_millis(10);

/// Inter-controller UART bytes pending beyond this are drained outright
/// rather than risking a FIFO overrun.
const INTER_CONTROLLER_OVERFLOW_THRESHOLD: usize = 900;

const GCS_LINK_SYNC_WORD: u8 = 0x43;
const MESH_LINK_SYNC_WORD: u8 = 0x4D;

fn now() -> Millis {
    Millis::new(Instant::now().as_millis())
}

/// Line-buffers bytes from the host debug console and dispatches the two
/// recognised commands against an [`EventLog`]: `DUMP` writes every buffered
/// event back out as text, `CLEAR` discards them. This is the only way to
/// read this target's ring buffer, since there is no `tracing` subscriber to
/// drain it through.
struct HostConsole {
    link: HostLink,
    line: heapless::String<32>,
}

impl HostConsole {
    fn new() -> Self {
        Self { link: HostLink::default(), line: heapless::String::new() }
    }

    /// Drains pending host bytes, dispatching on each complete line.
    fn poll(&mut self, events: &mut EventLog) {
        let mut buf = [0u8; 64];
        let n = self.link.read(&mut buf);
        for &byte in &buf[..n] {
            match byte {
                b'\n' | b'\r' => {
                    self.dispatch(events);
                    self.line.clear();
                }
                _ => {
                    let _ = self.line.push(byte as char);
                }
            }
        }
    }

    fn dispatch(&mut self, events: &mut EventLog) {
        match self.line.as_str() {
            "DUMP" => {
                for event in events.drain() {
                    let mut out: heapless::String<96> = heapless::String::new();
                    if core::fmt::write(&mut out, format_args!("{event:?}\n")).is_ok() {
                        self.link.write(out.as_bytes());
                    }
                }
            }
            "CLEAR" => {
                for _ in events.drain() {}
            }
            _ => {}
        }
    }
}

/// State owned by the Primary role: flight-controller intake, the dual-band
/// GCS link, and the inter-controller link to the Secondary.
struct PrimaryNode {
    own_id: SystemId,
    home_position: aerolink_shared::types::Coordinates,
    flight_controller: FlightControllerLink,
    coordinator: Coordinator<ShortRangeRadio>,
    gcs_radio: RadioLink<LongRangeRadio>,
    link_quality: LinkQualityRecord,
    jamming: JammingDetector,
    jamming_state: JammingState,
    relay_active: bool,
    relay_peer: Option<SystemId>,
    inter_controller: InterControllerLink,
    frame_receiver: FrameReceiver,
    pending_commands: PendingCommands,
    tier_overrides: TierOverrides,
    events: EventLog,
    host: HostConsole,
    delay: SimDelay,
    jitter: ChaChaJitter,
    app_buf: [u8; 256],
    frame_buf: [u8; framer::MAX_FRAME_LEN],
}

impl PrimaryNode {
    fn new(config: &Config) -> Self {
        let mut gcs_radio = RadioLink::with_retry_config(LongRangeRadio::default(), config.retry);
        let _ = gcs_radio.inner_mut().initialise(RadioConfig {
            frequency_hz: 915_000_000,
            bandwidth_hz: 125_000,
            spreading_factor: 9,
            coding_rate: 5,
            sync_word: GCS_LINK_SYNC_WORD,
            power_dbm: 20,
        });
        Self {
            own_id: config.system_id,
            home_position: config.home_position,
            flight_controller: FlightControllerLink::default(),
            coordinator: Coordinator::with_tier_overrides(ShortRangeRadio::default(), config.tier_overrides.clone()),
            gcs_radio,
            link_quality: LinkQualityRecord::new(),
            jamming: JammingDetector::new(config.jamming),
            jamming_state: JammingState::Clear,
            relay_active: false,
            relay_peer: None,
            inter_controller: InterControllerLink::default(),
            frame_receiver: FrameReceiver::with_health_config(config.framer_health),
            pending_commands: PendingCommands::with_retry_config(config.retry),
            tier_overrides: config.tier_overrides.clone(),
            events: EventLog::new(),
            host: HostConsole::new(),
            delay: SimDelay,
            jitter: ChaChaJitter::new(u64::from(config.system_id.value())),
            app_buf: [0u8; 256],
            frame_buf: [0u8; framer::MAX_FRAME_LEN],
        }
    }

    fn tick(&mut self, now: Millis) {
        if let Some(event) = self.coordinator.tick(now) {
            self.events.push(event);
        }

        let mut read_buf = [0u8; 256];
        if let Ok(n) = self.gcs_radio.inner_mut().read(&mut read_buf) {
            if n > 0 {
                self.link_quality.record_received(self.gcs_radio.inner().rssi(), self.gcs_radio.inner().snr());
                let _ = self.coordinator.dedup(&read_buf[..n]);
            } else {
                self.link_quality.record_lost();
            }
        }
        self.check_jamming_transition(now);

        if let Some(item) = self.coordinator.poll_long_range(now) {
            if self.gcs_radio.wait_for_clear_channel(&mut self.delay, &mut self.jitter) {
                if matches!(
                    self.gcs_radio.transmit_with_retry(item.payload(), &mut self.delay),
                    TransmitOutcome::ResetPerformed
                ) {
                    self.events.push(
                        LinkEvent::new(now, EventCause::RadioReset).with_counter(self.gcs_radio.radio_resets()),
                    );
                }
            }
        }

        if let Some(n) = self.flight_controller.read(&mut self.app_buf) {
            let payload = self.app_buf;
            self.coordinator.send(&payload[..n], now);
            if self.relay_active {
                self.forward_via_relay(&payload[..n], now);
            }
        }

        self.pump_inter_controller(now);
        self.host.poll(&mut self.events);
    }

    /// Detects a jamming-state transition (edge, not level) and commands the
    /// Secondary accordingly: begin client-side discovery on confirmed
    /// jamming, or return to direct operation on confirmed recovery. Spec
    /// §4.3's five-consecutive-bad/five-consecutive-good-above-hysteresis
    /// confirmation is already implemented by `JammingDetector`; this only
    /// has to act once per transition.
    fn check_jamming_transition(&mut self, now: Millis) {
        let state = self.jamming.tick(&self.link_quality);
        if state == self.jamming_state {
            return;
        }
        self.jamming_state = state;
        match state {
            JammingState::Jammed => {
                let start = RelayDiscoveryStart {
                    position: self.home_position,
                    gcs_rssi_dbm: self.link_quality.rssi_dbm(),
                    gcs_snr_db: self.link_quality.snr_db(),
                    gcs_loss_ratio: self.link_quality.loss_ratio(),
                };
                let mut payload = [0u8; command_payloads::RELAY_DISCOVERY_START_LEN];
                start.encode(&mut payload);
                self.send_command(Command::StartRelayDiscovery, &payload, now);
                self.events.push(
                    LinkEvent::new(now, EventCause::JammingConfirmed)
                        .with_link_quality(self.link_quality.rssi_dbm(), self.link_quality.snr_db()),
                );
            }
            JammingState::Clear => {
                self.send_command(Command::RelayActivate, &command_payloads::encode_relay_activate(false), now);
                self.events.push(LinkEvent::new(now, EventCause::JammingCleared));
            }
        }
    }

    /// Forwards `payload` to the Secondary for onward transmission to the
    /// currently-connected relay peer, if one has been established. This is
    /// a parallel path to the direct GCS link, not a replacement for it: the
    /// scheduler still drives its own long-range retries independently.
    fn forward_via_relay(&mut self, payload: &[u8], now: Millis) {
        let Some(relay) = self.relay_peer else { return };
        let essential = aerolink_shared::payload::extract(payload)
            .is_some_and(|fields| self.tier_overrides.classify(fields.msg_id).is_essential());
        if !essential {
            return;
        }
        let mut out: heapless::Vec<u8, { framer::MAX_PAYLOAD_LEN }> = heapless::Vec::new();
        if command_payloads::encode_bridge(relay, self.link_quality.rssi_dbm(), self.link_quality.snr_db(), payload, &mut out)
            .is_ok()
        {
            self.send_command(Command::BridgeTx, &out, now);
        }
    }

    fn pump_inter_controller(&mut self, now: Millis) {
        if self.frame_receiver.drain_if_overflowing(self.inter_controller.pending(), INTER_CONTROLLER_OVERFLOW_THRESHOLD)
        {
            return;
        }
        let n = self.inter_controller.read(&mut self.frame_buf);
        let frame_buf = self.frame_buf;
        for byte in &frame_buf[..n] {
            if let Some(event) = self.frame_receiver.push_byte(*byte, now) {
                self.handle_frame_event(event, now);
            }
        }
        if let Some(event) = self.frame_receiver.tick(now) {
            self.handle_frame_event(event, now);
        }
        if let Some(AerolinkError::FramerHealthCritical { received, sampled }) = self.frame_receiver.check_health() {
            self.events.push(LinkEvent::new(now, EventCause::FramerHealthCritical).with_counter(sampled - received));
        }

        let (due, abandoned) = self.pending_commands.poll(now);
        for command in due {
            self.resend_command(command, now);
        }
        if !abandoned.is_empty() {
            self.events.push(LinkEvent::new(now, EventCause::ConsecutiveFailureBurst).with_counter(abandoned.len() as u32));
        }
    }

    fn handle_frame_event(&mut self, event: FrameEvent, now: Millis) {
        let FrameEvent::Packet(packet) = event else { return };
        match packet.command {
            Command::Ack => {
                // Only Init and RelayActivate ever carry an ACK requirement,
                // and the Secondary never has both outstanding at once.
                self.pending_commands.acknowledge(Command::Init);
                self.pending_commands.acknowledge(Command::RelayActivate);
            }
            Command::RelaySelected => {
                if let Some(selected) = RelaySelected::decode(&packet.payload) {
                    self.relay_peer = Some(selected.relay);
                }
            }
            Command::RelayEstablished => {
                if let Some(relay) = command_payloads::decode_relay_established(&packet.payload) {
                    self.relay_peer = Some(relay);
                    self.relay_active = true;
                    self.events.push(LinkEvent::new(now, EventCause::RelayEstablished));
                }
            }
            Command::RelayLost => {
                if command_payloads::decode_relay_lost(&packet.payload).is_some() {
                    self.relay_active = false;
                    self.relay_peer = None;
                    self.events.push(LinkEvent::new(now, EventCause::RelayLost));
                }
            }
            Command::BridgeRx => {
                if let Some(BridgeFrame { frame, .. }) = command_payloads::decode_bridge(&packet.payload) {
                    let _ = self.coordinator.dedup(frame);
                }
            }
            _ => {}
        }
    }

    fn send_command(&mut self, command: Command, payload: &[u8], now: Millis) {
        let mut out = heapless::Vec::new();
        if framer::encode(command, payload, &mut out).is_ok() {
            self.inter_controller.write(&out);
            if command.requires_ack() {
                self.pending_commands.track(command, now);
            }
        }
    }

    /// Resends a command already on the retry list; unlike
    /// [`Self::send_command`] this must not re-enqueue it a second time.
    fn resend_command(&mut self, command: Command, _now: Millis) {
        let mut out = heapless::Vec::new();
        let payload: &[u8] = match command {
            Command::RelayActivate => &[0],
            _ => &[],
        };
        if framer::encode(command, payload, &mut out).is_ok() {
            self.inter_controller.write(&out);
        }
    }
}

/// State owned by the Secondary role: the mesh-link radio, relay discovery
/// and the client/provider handshake machines, and the inter-controller link
/// to the Primary.
struct SecondaryNode {
    own_id: SystemId,
    mesh_radio: RadioLink<LongRangeRadio>,
    relay_table: RelayTable,
    client_relay: ClientRelay,
    provider_sessions: ProviderSessions,
    link_quality: LinkQualityRecord,
    jamming: JammingDetector,
    inter_controller: InterControllerLink,
    frame_receiver: FrameReceiver,
    events: EventLog,
    host: HostConsole,
    delay: SimDelay,
    jitter: ChaChaJitter,
    frame_buf: [u8; framer::MAX_FRAME_LEN],
    mesh_buf: [u8; framer::MAX_FRAME_LEN],

    /// Last GCS-link quality and position reported by this node's own
    /// Primary, broadcast verbatim in this node's own periodic announcement.
    own_position: aerolink_shared::types::Coordinates,
    own_gcs_rssi_dbm: f32,
    own_gcs_snr_db: f32,
    own_gcs_loss_ratio: f32,
    next_announcement_at: Millis,

    /// Target and send time of the outstanding `REQUEST`, tracked here since
    /// `ClientRelay` only reports the target once, at the moment it is first
    /// chosen.
    pending_request_target: Option<SystemId>,
    request_sent_at: Millis,
    request_seq: u8,

    /// Last time this node, as a client, heard anything at all (announcement
    /// or accept) from its current relay; `ProviderSessions` already tracks
    /// heartbeats it receives as a provider, but the client side of the same
    /// timeout has nothing to watch unless this node records it itself.
    last_relay_seen_at: Millis,
    /// Next time this node, while connected, should send an empty bridge-data
    /// keepalive so an idle client (no application traffic to forward) is not
    /// evicted by its provider's [`CLIENT_HEARTBEAT_TIMEOUT`].
    next_keepalive_at: Millis,
}

impl SecondaryNode {
    fn new(config: &Config) -> Self {
        let mut mesh_radio = RadioLink::with_retry_config(LongRangeRadio::default(), config.retry);
        let _ = mesh_radio.inner_mut().initialise(RadioConfig {
            frequency_hz: 433_000_000,
            bandwidth_hz: 125_000,
            spreading_factor: 9,
            coding_rate: 5,
            sync_word: MESH_LINK_SYNC_WORD,
            power_dbm: 17,
        });
        Self {
            own_id: config.system_id,
            mesh_radio,
            relay_table: RelayTable::new(),
            client_relay: ClientRelay::new(),
            provider_sessions: ProviderSessions::new(),
            link_quality: LinkQualityRecord::new(),
            jamming: JammingDetector::new(config.jamming),
            inter_controller: InterControllerLink::default(),
            frame_receiver: FrameReceiver::with_health_config(config.framer_health),
            events: EventLog::new(),
            host: HostConsole::new(),
            delay: SimDelay,
            jitter: ChaChaJitter::new(u64::from(config.system_id.value()) ^ 0xA5A5_A5A5),
            frame_buf: [0u8; framer::MAX_FRAME_LEN],
            mesh_buf: [0u8; framer::MAX_FRAME_LEN],
            own_position: config.home_position,
            own_gcs_rssi_dbm: 0.0,
            own_gcs_snr_db: 0.0,
            own_gcs_loss_ratio: 0.0,
            next_announcement_at: Millis::new(0),
            pending_request_target: None,
            request_sent_at: Millis::new(0),
            request_seq: 0,
            last_relay_seen_at: Millis::new(0),
            next_keepalive_at: Millis::new(0),
        }
    }

    fn tick(&mut self, now: Millis) {
        self.relay_table.purge_stale(now);
        self.provider_sessions.evict_timed_out(now);

        let previous_state = self.client_relay.state();
        self.client_relay.check_watchdog(now);
        if previous_state != ClientState::Idle && self.client_relay.state() == ClientState::Idle {
            self.events.push(LinkEvent::new(now, EventCause::TransitionWatchdogReverted));
        }

        // This node's own mesh-link quality, used only as a local health
        // indicator; it does not drive discovery (that is the GCS link's
        // job, signalled by the Primary over the inter-controller link).
        let _ = self.jamming.tick(&self.link_quality);

        self.maybe_broadcast_announcement(now);
        self.drive_discovery(now);
        self.check_relay_heartbeat(now);
        self.pump_mesh_radio(now);
        self.pump_inter_controller(now);
        self.host.poll(&mut self.events);
    }

    /// While connected, watches for the provider going silent
    /// ([`CLIENT_HEARTBEAT_TIMEOUT`]) and sends an empty bridge-data keepalive
    /// often enough that an idle client is never evicted for lack of traffic.
    fn check_relay_heartbeat(&mut self, now: Millis) {
        if self.client_relay.state() != ClientState::Connected {
            return;
        }
        if self.last_relay_seen_at.elapsed_since(now) > CLIENT_HEARTBEAT_TIMEOUT {
            if let Some(ClientAction::NotifyLost { relay, reason }) = self.client_relay.on_heartbeat_timeout(now) {
                self.send_command(Command::RelayLost, &command_payloads::encode_relay_lost(relay, reason), now);
                self.events.push(LinkEvent::new(now, EventCause::RelayLost));
            }
            return;
        }
        if now.as_u64() >= self.next_keepalive_at.as_u64() && self.client_relay.current_relay().is_some() {
            if let Some(len) = mesh_frame::encode_bridge_data(self.own_id, &[], &mut self.mesh_buf) {
                let buf = self.mesh_buf;
                self.mesh_transmit(&buf[..len]);
            }
            self.next_keepalive_at = Millis::new(now.as_u64() + CLIENT_HEARTBEAT_TIMEOUT.as_millis() / 2);
        }
    }

    fn maybe_broadcast_announcement(&mut self, now: Millis) {
        if now.as_u64() < self.next_announcement_at.as_u64() {
            return;
        }
        let frame = MeshFrame::Announcement {
            system_id: self.own_id,
            available: !self.provider_sessions.is_full(),
            gcs_rssi_dbm: self.own_gcs_rssi_dbm,
            gcs_snr_db: self.own_gcs_snr_db,
            gcs_loss_ratio: self.own_gcs_loss_ratio,
            position: self.own_position,
        };
        let len = frame.encode(&mut self.mesh_buf);
        let buf = self.mesh_buf;
        self.mesh_transmit(&buf[..len]);
        self.next_announcement_at = Millis::new(now.as_u64() + ANNOUNCEMENT_PERIOD.as_millis());
    }

    /// CAD-gates and sends `bytes` on the mesh radio, matching the
    /// GCS-link's own channel-activity-detection policy before every
    /// long-range transmit.
    fn mesh_transmit(&mut self, bytes: &[u8]) {
        if self.mesh_radio.wait_for_clear_channel(&mut self.delay, &mut self.jitter) {
            let _ = self.mesh_radio.transmit_with_retry(bytes, &mut self.delay);
        }
    }

    fn drive_discovery(&mut self, now: Millis) {
        match self.client_relay.state() {
            ClientState::Discovering => {
                if let Some(candidate) = self.relay_table.best_candidate(Some(self.own_position)) {
                    if let Some(ClientAction::SendRequest { target, seq }) =
                        self.client_relay.on_best_candidate_found(candidate, now)
                    {
                        self.send_request(target, seq, now);
                    }
                }
            }
            ClientState::Requesting => {
                if let Some(target) = self.pending_request_target {
                    if self.request_sent_at.elapsed_since(now) > REQUEST_TIMEOUT {
                        match self.client_relay.on_request_timeout(target, now) {
                            Some(ClientAction::SendRequest { target, seq }) => self.send_request(target, seq, now),
                            _ => self.pending_request_target = None,
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn send_request(&mut self, target: SystemId, seq: u8, now: Millis) {
        self.pending_request_target = Some(target);
        self.request_sent_at = now;
        self.request_seq = seq;
        let frame = MeshFrame::Request { client: self.own_id, target, seq };
        let len = frame.encode(&mut self.mesh_buf);
        let buf = self.mesh_buf;
        self.mesh_transmit(&buf[..len]);
    }

    fn pump_mesh_radio(&mut self, now: Millis) {
        let mut buf = [0u8; framer::MAX_FRAME_LEN];
        let Ok(n) = self.mesh_radio.inner_mut().read(&mut buf) else { return };
        if n == 0 {
            return;
        }
        let rssi = self.mesh_radio.inner().rssi();
        let snr = self.mesh_radio.inner().snr();

        if let Some((client, frame)) = mesh_frame::decode_bridge_data(&buf[..n]) {
            self.handle_bridge_data(client, frame, rssi, snr, now);
            return;
        }

        match MeshFrame::decode(&buf[..n]) {
            Some(MeshFrame::Announcement { system_id, available, gcs_rssi_dbm, gcs_snr_db, gcs_loss_ratio, position }) => {
                if self.client_relay.current_relay() == Some(system_id) {
                    self.last_relay_seen_at = now;
                }
                self.relay_table.observe_announcement(
                    RelayTableEntry {
                        system_id,
                        available,
                        gcs_rssi_dbm,
                        gcs_snr_db,
                        gcs_loss_ratio,
                        position: Some(position),
                        mesh_rssi_dbm: rssi,
                        mesh_snr_db: snr,
                        last_heard: now,
                    },
                    self.own_id,
                );
            }
            Some(MeshFrame::Request { client, target, seq }) if target == self.own_id => {
                match self.provider_sessions.on_request(client, now) {
                    Ok(()) => {
                        let frame = MeshFrame::Accept { provider: self.own_id, seq };
                        let len = frame.encode(&mut self.mesh_buf);
                        let out = self.mesh_buf;
                        self.mesh_transmit(&out[..len]);
                    }
                    Err(RejectReason::CapacityFull) => {
                        let frame =
                            MeshFrame::Reject { provider: self.own_id, seq, reason: RejectReason::CapacityFull };
                        let len = frame.encode(&mut self.mesh_buf);
                        let out = self.mesh_buf;
                        self.mesh_transmit(&out[..len]);
                    }
                }
            }
            Some(MeshFrame::Accept { provider, seq }) if self.pending_request_target == Some(provider) && seq == self.request_seq => {
                if let Some(ClientAction::NotifyEstablished { relay }) = self.client_relay.on_accept(provider, now) {
                    self.pending_request_target = None;
                    self.last_relay_seen_at = now;
                    self.next_keepalive_at = now;
                    self.send_command(
                        Command::RelayEstablished,
                        &command_payloads::encode_relay_established(relay),
                        now,
                    );
                }
            }
            Some(MeshFrame::Reject { provider, seq, .. }) if self.pending_request_target == Some(provider) && seq == self.request_seq => {
                self.relay_table.remove(provider);
                self.pending_request_target = None;
                self.client_relay.on_reject(now);
            }
            _ => {}
        }
    }

    fn handle_bridge_data(&mut self, client: SystemId, frame: &[u8], rssi: f32, snr: f32, now: Millis) {
        if !self.provider_sessions.is_active_client(client) {
            return;
        }
        self.provider_sessions.on_heartbeat(client, now);
        self.provider_sessions.record_relayed_packet(client);
        let mut out: heapless::Vec<u8, { framer::MAX_PAYLOAD_LEN }> = heapless::Vec::new();
        if command_payloads::encode_bridge(client, rssi, snr, frame, &mut out).is_ok() {
            self.send_command(Command::BridgeRx, &out, now);
        }
    }

    fn pump_inter_controller(&mut self, now: Millis) {
        if self.frame_receiver.drain_if_overflowing(self.inter_controller.pending(), INTER_CONTROLLER_OVERFLOW_THRESHOLD)
        {
            return;
        }
        let n = self.inter_controller.read(&mut self.frame_buf);
        let frame_buf = self.frame_buf;
        for byte in &frame_buf[..n] {
            if let Some(FrameEvent::Packet(packet)) = self.frame_receiver.push_byte(*byte, now) {
                self.handle_primary_command(packet, now);
            }
        }
        self.frame_receiver.tick(now);
        if let Some(AerolinkError::FramerHealthCritical { received, sampled }) = self.frame_receiver.check_health() {
            self.events.push(LinkEvent::new(now, EventCause::FramerHealthCritical).with_counter(sampled - received));
        }
    }

    fn handle_primary_command(&mut self, packet: framer::Packet, now: Millis) {
        match packet.command {
            Command::StartRelayDiscovery => {
                if let Some(start) = RelayDiscoveryStart::decode(&packet.payload) {
                    self.own_position = start.position;
                    self.own_gcs_rssi_dbm = start.gcs_rssi_dbm;
                    self.own_gcs_snr_db = start.gcs_snr_db;
                    self.own_gcs_loss_ratio = start.gcs_loss_ratio;
                }
                self.client_relay.on_gcs_link_lost(now);
                self.send_command(Command::Ack, &[], now);
            }
            Command::RelayActivate => {
                let active = command_payloads::decode_relay_activate(&packet.payload);
                if !active {
                    if let Some(ClientAction::NotifyLost { relay, .. }) = self.client_relay.on_gcs_restored(now) {
                        self.send_command(
                            Command::RelayLost,
                            &command_payloads::encode_relay_lost(relay, RelayLostReason::GcsRestored),
                            now,
                        );
                    }
                }
                self.send_command(Command::Ack, &[], now);
            }
            Command::BridgeTx => {
                if let Some(BridgeFrame { frame, .. }) = command_payloads::decode_bridge(&packet.payload) {
                    if self.client_relay.current_relay().is_some() {
                        if let Some(len) = mesh_frame::encode_bridge_data(self.own_id, frame, &mut self.mesh_buf) {
                            let buf = self.mesh_buf;
                            self.mesh_transmit(&buf[..len]);
                        }
                    }
                }
            }
            Command::StatusRequest => {
                self.send_command(Command::StatusReport, &[], now);
            }
            _ => {}
        }
    }

    fn send_command(&mut self, command: Command, payload: &[u8], now: Millis) {
        let mut out = heapless::Vec::new();
        if framer::encode(command, payload, &mut out).is_ok() {
            self.inter_controller.write(&out);
            let _ = now;
        }
    }
}

/// Role-specific state, chosen at startup by [`Config::role`] rather than a
/// compile-time feature.
enum Node {
    Primary(PrimaryNode),
    Secondary(SecondaryNode),
}

#[embassy_executor::task]
async fn link_loop(mut node: Node) {
    loop {
        let t = now();
        match &mut node {
            Node::Primary(primary) => primary.tick(t),
            Node::Secondary(secondary) => secondary.tick(t),
        }
        Timer::after(TICK_INTERVAL).await;
    }
}

/// Entry point: builds the compiled-in configuration, constructs the role's
/// state, and spawns the single cooperative link-management task.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = Config::default();
    let node = match config.role {
        AircraftRole::Primary => Node::Primary(PrimaryNode::new(&config)),
        AircraftRole::Secondary => Node::Secondary(SecondaryNode::new(&config)),
    };
    spawner.spawn(link_loop(node)).ok();
}
