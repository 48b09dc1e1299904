//! Relay discovery table, peer scoring, and the client/provider relay
//! handshake state machines.
//!
//! Every aircraft Secondary runs both roles: it is a client when its own
//! Primary's GCS link degrades, and a provider for any peer whose `REQUEST`
//! it accepts.

use heapless::Vec;

use crate::time::{Duration, Millis};
use crate::types::{Coordinates, SystemId};

/// Maximum distinct peers tracked in the discovery table.
pub const MAX_TABLE_ENTRIES: usize = 8;
/// Maximum concurrent relay clients a provider serves.
pub const PROVIDER_CAPACITY: usize = 4;
/// Entries older than this are purged from the discovery table.
pub const TABLE_STALE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default provider announcement period.
pub const ANNOUNCEMENT_PERIOD: Duration = Duration::from_secs(2);
/// Request handshake timeout before a retry or give-up.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
/// Maximum request retries before the client gives up and returns to `Idle`.
pub const MAX_REQUEST_RETRIES: u8 = 3;
/// Provider evicts a client silently after this much time since its last heartbeat.
pub const CLIENT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);
/// Every client-state transition starts this watchdog; if still transitional
/// when it fires, the machine reverts.
pub const TRANSITION_WATCHDOG: Duration = Duration::from_secs(2);

/// One peer's entry in the discovery table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayTableEntry {
    /// Peer's system id.
    pub system_id: SystemId,
    /// Whether the peer is currently willing to act as a provider.
    pub available: bool,
    /// Peer's last-reported GCS-link RSSI in dBm.
    pub gcs_rssi_dbm: f32,
    /// Peer's last-reported GCS-link SNR in dB.
    pub gcs_snr_db: f32,
    /// Peer's last-reported GCS-link loss ratio.
    pub gcs_loss_ratio: f32,
    /// Peer's last known position, if reported.
    pub position: Option<Coordinates>,
    /// Mesh-link RSSI observed locally on receipt of the peer's announcement.
    pub mesh_rssi_dbm: f32,
    /// Mesh-link SNR observed locally.
    pub mesh_snr_db: f32,
    /// Monotonic time this entry was last refreshed.
    pub last_heard: Millis,
}

/// Bounded discovery table, insert-or-replace by `system_id`.
#[derive(Debug, Default)]
pub struct RelayTable {
    entries: Vec<RelayTableEntry, MAX_TABLE_ENTRIES>,
}

impl RelayTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Inserts or refreshes `entry`. Announcements from `own_id` are ignored.
    pub fn observe_announcement(&mut self, entry: RelayTableEntry, own_id: SystemId) {
        if entry.system_id == own_id {
            return;
        }
        if let Some(existing) = self.entries.iter_mut().find(|e| e.system_id == entry.system_id) {
            *existing = entry;
        } else {
            let _ = self.entries.push(entry);
        }
    }

    /// Removes entries whose `last_heard` is older than [`TABLE_STALE_TIMEOUT`].
    pub fn purge_stale(&mut self, now: Millis) {
        self.entries.retain(|e| e.last_heard.elapsed_since(now) <= TABLE_STALE_TIMEOUT);
    }

    /// Removes a single peer, used when it rejects a relay request.
    pub fn remove(&mut self, system_id: SystemId) {
        if let Some(pos) = self.entries.iter().position(|e| e.system_id == system_id) {
            self.entries.swap_remove(pos);
        }
    }

    /// Scores every available entry and returns the best candidate, if any.
    ///
    /// Weighting descends mesh-link quality, peer-reported GCS-link
    /// quality, inverse planar distance — in that order, per the ordering
    /// requirement; a peer whose availability flag is false is excluded.
    #[must_use]
    pub fn best_candidate(&self, own_position: Option<Coordinates>) -> Option<SystemId> {
        self.entries
            .iter()
            .filter(|e| e.available)
            .max_by(|a, b| score(a, own_position).total_cmp(&score(b, own_position)))
            .map(|e| e.system_id)
    }
}

fn score(entry: &RelayTableEntry, own_position: Option<Coordinates>) -> f32 {
    const MESH_WEIGHT: f32 = 100.0;
    const GCS_WEIGHT: f32 = 10.0;
    const DISTANCE_WEIGHT: f32 = 1.0;

    let mesh_term = MESH_WEIGHT * (entry.mesh_rssi_dbm + entry.mesh_snr_db);
    let gcs_term = GCS_WEIGHT * (entry.gcs_rssi_dbm + entry.gcs_snr_db - 100.0 * entry.gcs_loss_ratio);
    let distance_term = match (own_position, entry.position) {
        (Some(own), Some(peer)) => {
            let distance_km = own.distance_to(&peer).max(0.001);
            DISTANCE_WEIGHT * (1.0 / distance_km)
        }
        _ => 0.0,
    };
    mesh_term + gcs_term + distance_term
}

/// Client-side relay handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No relay in use; GCS link is healthy.
    Idle,
    /// GCS link lost; scoring candidates.
    Discovering,
    /// `REQUEST` sent to the chosen candidate, awaiting response.
    Requesting,
    /// Relay established and in use.
    Connected,
}

/// Reason a relay session ended, reported to the Primary via `RELAY_LOST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayLostReason {
    /// The provider's heartbeat was not received in time.
    HeartbeatTimeout,
    /// The direct GCS link recovered.
    GcsRestored,
}

/// An action the caller must carry out after a client state transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientAction {
    /// Emit `REQUEST(target)` with the given sequence number.
    SendRequest { target: SystemId, seq: u8 },
    /// Notify the Primary the relay is established.
    NotifyEstablished { relay: SystemId },
    /// Notify the Primary the relay was lost.
    NotifyLost { relay: SystemId, reason: RelayLostReason },
}

/// Drives the client side of the relay handshake.
pub struct ClientRelay {
    state: ClientState,
    current_relay: Option<SystemId>,
    request_seq: u8,
    request_retries: u8,
    transition_started_at: Millis,
    pub transition_failures: u32,
}

impl Default for ClientRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRelay {
    /// Creates a machine in `Idle`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ClientState::Idle,
            current_relay: None,
            request_seq: 0,
            request_retries: 0,
            transition_started_at: Millis::new(0),
            transition_failures: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// The peer currently serving as relay, if [`ClientState::Connected`].
    #[must_use]
    pub const fn current_relay(&self) -> Option<SystemId> {
        self.current_relay
    }

    fn enter(&mut self, state: ClientState, now: Millis) {
        self.state = state;
        self.transition_started_at = now;
    }

    /// The Primary signalled GCS link loss.
    pub fn on_gcs_link_lost(&mut self, now: Millis) {
        if self.state == ClientState::Idle {
            self.enter(ClientState::Discovering, now);
        }
    }

    /// Scoring found a best candidate; emits the `REQUEST` action.
    pub fn on_best_candidate_found(&mut self, target: SystemId, now: Millis) -> Option<ClientAction> {
        if self.state != ClientState::Discovering {
            return None;
        }
        self.request_seq = self.request_seq.wrapping_add(1);
        self.request_retries = 0;
        self.enter(ClientState::Requesting, now);
        Some(ClientAction::SendRequest { target, seq: self.request_seq })
    }

    /// `ACCEPT` was received for our outstanding request.
    pub fn on_accept(&mut self, relay: SystemId, now: Millis) -> Option<ClientAction> {
        if self.state != ClientState::Requesting {
            return None;
        }
        self.current_relay = Some(relay);
        self.enter(ClientState::Connected, now);
        Some(ClientAction::NotifyEstablished { relay })
    }

    /// `REJECT` was received; caller has already removed the peer from the
    /// table. Returns to `Discovering` to re-score.
    pub fn on_reject(&mut self, now: Millis) {
        if self.state == ClientState::Requesting {
            self.enter(ClientState::Discovering, now);
        }
    }

    /// The 500ms request timeout fired for the outstanding request to
    /// `target`. Retries up to [`MAX_REQUEST_RETRIES`] by returning a fresh
    /// `SendRequest` action for the caller to retransmit; once retries are
    /// exhausted, returns to `Discovering` to re-score instead.
    pub fn on_request_timeout(&mut self, target: SystemId, now: Millis) -> Option<ClientAction> {
        if self.state != ClientState::Requesting {
            return None;
        }
        self.request_retries += 1;
        if self.request_retries >= MAX_REQUEST_RETRIES {
            self.enter(ClientState::Discovering, now);
            None
        } else {
            self.request_seq = self.request_seq.wrapping_add(1);
            Some(ClientAction::SendRequest { target, seq: self.request_seq })
        }
    }

    /// The provider's heartbeat was not received in time.
    pub fn on_heartbeat_timeout(&mut self, now: Millis) -> Option<ClientAction> {
        if self.state != ClientState::Connected {
            return None;
        }
        let relay = self.current_relay.take()?;
        self.enter(ClientState::Idle, now);
        Some(ClientAction::NotifyLost { relay, reason: RelayLostReason::HeartbeatTimeout })
    }

    /// The direct GCS link recovered while connected via relay.
    pub fn on_gcs_restored(&mut self, now: Millis) -> Option<ClientAction> {
        if self.state != ClientState::Connected {
            if self.state != ClientState::Idle {
                self.enter(ClientState::Idle, now);
            }
            return None;
        }
        let relay = self.current_relay.take()?;
        self.enter(ClientState::Idle, now);
        Some(ClientAction::NotifyLost { relay, reason: RelayLostReason::GcsRestored })
    }

    /// Checks the 2s transition watchdog. If still in a transitional
    /// substate (`Discovering` or `Requesting`) when it fires, reverts to
    /// `Idle` and counts the failure.
    pub fn check_watchdog(&mut self, now: Millis) {
        let transitional = matches!(self.state, ClientState::Discovering | ClientState::Requesting);
        if transitional && self.transition_started_at.elapsed_since(now) > TRANSITION_WATCHDOG {
            self.transition_failures += 1;
            self.enter(ClientState::Idle, now);
        }
    }
}

/// One client being served by this node as a relay provider.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ProviderClient {
    system_id: SystemId,
    last_heartbeat_at: Millis,
    packets_relayed: u32,
}

/// Reason a `REQUEST` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Provider is already serving [`PROVIDER_CAPACITY`] clients.
    CapacityFull,
}

/// Provider-side session set: which clients this node is currently relaying
/// for.
#[derive(Debug, Default)]
pub struct ProviderSessions {
    clients: Vec<ProviderClient, PROVIDER_CAPACITY>,
}

impl ProviderSessions {
    /// Creates an empty session set.
    #[must_use]
    pub fn new() -> Self {
        Self { clients: Vec::new() }
    }

    /// Handles an inbound `REQUEST`, admitting the client if capacity allows.
    pub fn on_request(&mut self, system_id: SystemId, now: Millis) -> Result<(), RejectReason> {
        if self.clients.iter().any(|c| c.system_id == system_id) {
            return Ok(());
        }
        self.clients
            .push(ProviderClient { system_id, last_heartbeat_at: now, packets_relayed: 0 })
            .map_err(|_| RejectReason::CapacityFull)
    }

    /// Refreshes a client's heartbeat clock.
    pub fn on_heartbeat(&mut self, system_id: SystemId, now: Millis) {
        if let Some(client) = self.clients.iter_mut().find(|c| c.system_id == system_id) {
            client.last_heartbeat_at = now;
        }
    }

    /// Records one relayed packet for accounting.
    pub fn record_relayed_packet(&mut self, system_id: SystemId) {
        if let Some(client) = self.clients.iter_mut().find(|c| c.system_id == system_id) {
            client.packets_relayed += 1;
        }
    }

    /// Silently evicts clients whose heartbeat exceeded
    /// [`CLIENT_HEARTBEAT_TIMEOUT`].
    pub fn evict_timed_out(&mut self, now: Millis) {
        self.clients.retain(|c| c.last_heartbeat_at.elapsed_since(now) <= CLIENT_HEARTBEAT_TIMEOUT);
    }

    /// Whether `system_id` currently has an active session.
    #[must_use]
    pub fn is_active_client(&self, system_id: SystemId) -> bool {
        self.clients.iter().any(|c| c.system_id == system_id)
    }

    /// Whether this provider is already serving [`PROVIDER_CAPACITY`] clients
    /// and would reject a new `REQUEST`. Used to set the `available` flag in
    /// this node's own periodic announcement.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.clients.len() >= PROVIDER_CAPACITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u8, available: bool, mesh_rssi: f32) -> RelayTableEntry {
        RelayTableEntry {
            system_id: SystemId::new(id),
            available,
            gcs_rssi_dbm: -80.0,
            gcs_snr_db: 8.0,
            gcs_loss_ratio: 0.0,
            position: None,
            mesh_rssi_dbm: mesh_rssi,
            mesh_snr_db: 15.0,
            last_heard: Millis::new(0),
        }
    }

    #[test]
    fn own_announcements_are_ignored() {
        let mut table = RelayTable::new();
        table.observe_announcement(entry(1, true, -50.0), SystemId::new(1));
        assert_eq!(table.best_candidate(None), None);
    }

    #[test]
    fn best_candidate_prefers_stronger_mesh_link() {
        let mut table = RelayTable::new();
        table.observe_announcement(entry(2, true, -80.0), SystemId::new(1));
        table.observe_announcement(entry(3, true, -40.0), SystemId::new(1));
        assert_eq!(table.best_candidate(None), Some(SystemId::new(3)));
    }

    #[test]
    fn unavailable_peers_are_excluded() {
        let mut table = RelayTable::new();
        table.observe_announcement(entry(2, false, -30.0), SystemId::new(1));
        assert_eq!(table.best_candidate(None), None);
    }

    #[test]
    fn purge_removes_stale_entries() {
        let mut table = RelayTable::new();
        table.observe_announcement(entry(2, true, -50.0), SystemId::new(1));
        table.purge_stale(Millis::new(TABLE_STALE_TIMEOUT.as_millis() + 1));
        assert_eq!(table.best_candidate(None), None);
    }

    #[test]
    fn client_handshake_happy_path() {
        let mut client = ClientRelay::new();
        client.on_gcs_link_lost(Millis::new(0));
        assert_eq!(client.state(), ClientState::Discovering);

        let action = client.on_best_candidate_found(SystemId::new(5), Millis::new(10)).unwrap();
        assert!(matches!(action, ClientAction::SendRequest { target, .. } if target == SystemId::new(5)));
        assert_eq!(client.state(), ClientState::Requesting);

        let action = client.on_accept(SystemId::new(5), Millis::new(20)).unwrap();
        assert!(matches!(action, ClientAction::NotifyEstablished { relay } if relay == SystemId::new(5)));
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[test]
    fn reject_returns_to_discovering() {
        let mut client = ClientRelay::new();
        client.on_gcs_link_lost(Millis::new(0));
        client.on_best_candidate_found(SystemId::new(5), Millis::new(0));
        client.on_reject(Millis::new(1));
        assert_eq!(client.state(), ClientState::Discovering);
    }

    #[test]
    fn watchdog_reverts_stuck_transitional_state() {
        let mut client = ClientRelay::new();
        client.on_gcs_link_lost(Millis::new(0));
        client.check_watchdog(Millis::new(TRANSITION_WATCHDOG.as_millis() + 1));
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.transition_failures, 1);
    }

    #[test]
    fn heartbeat_timeout_notifies_primary_and_returns_idle() {
        let mut client = ClientRelay::new();
        client.on_gcs_link_lost(Millis::new(0));
        client.on_best_candidate_found(SystemId::new(5), Millis::new(0));
        client.on_accept(SystemId::new(5), Millis::new(0));
        let action = client.on_heartbeat_timeout(Millis::new(1000)).unwrap();
        assert!(matches!(action, ClientAction::NotifyLost { reason: RelayLostReason::HeartbeatTimeout, .. }));
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn provider_rejects_beyond_capacity() {
        let mut sessions = ProviderSessions::new();
        for i in 0..PROVIDER_CAPACITY as u8 {
            assert!(sessions.on_request(SystemId::new(i), Millis::new(0)).is_ok());
        }
        assert_eq!(
            sessions.on_request(SystemId::new(200), Millis::new(0)),
            Err(RejectReason::CapacityFull)
        );
    }

    #[test]
    fn provider_evicts_on_heartbeat_timeout() {
        let mut sessions = ProviderSessions::new();
        sessions.on_request(SystemId::new(1), Millis::new(0)).unwrap();
        sessions.evict_timed_out(Millis::new(CLIENT_HEARTBEAT_TIMEOUT.as_millis() + 1));
        assert!(!sessions.is_active_client(SystemId::new(1)));
    }

    #[test]
    fn provider_reports_full_at_capacity() {
        let mut sessions = ProviderSessions::new();
        assert!(!sessions.is_full());
        for i in 0..PROVIDER_CAPACITY as u8 {
            sessions.on_request(SystemId::new(i), Millis::new(0)).unwrap();
        }
        assert!(sessions.is_full());
    }

    #[test]
    fn request_timeout_retries_then_gives_up() {
        let mut client = ClientRelay::new();
        client.on_gcs_link_lost(Millis::new(0));
        client.on_best_candidate_found(SystemId::new(5), Millis::new(0));

        for _ in 0..MAX_REQUEST_RETRIES - 1 {
            let action = client.on_request_timeout(SystemId::new(5), Millis::new(0)).unwrap();
            assert!(matches!(action, ClientAction::SendRequest { target, .. } if target == SystemId::new(5)));
            assert_eq!(client.state(), ClientState::Requesting);
        }

        assert!(client.on_request_timeout(SystemId::new(5), Millis::new(0)).is_none());
        assert_eq!(client.state(), ClientState::Discovering);
    }

    #[test]
    fn current_relay_reports_none_until_connected() {
        let mut client = ClientRelay::new();
        assert_eq!(client.current_relay(), None);
        client.on_gcs_link_lost(Millis::new(0));
        client.on_best_candidate_found(SystemId::new(5), Millis::new(0));
        client.on_accept(SystemId::new(5), Millis::new(0));
        assert_eq!(client.current_relay(), Some(SystemId::new(5)));
    }
}
