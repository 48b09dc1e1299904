//! Deployment-tunable configuration.
//!
//! Everything here is plain, `serde`-round-trippable data; the layered
//! loading (defaults, then a TOML file, then `AEROLINK_*` environment
//! overrides) lives in the host binaries, which alone link `clap` and the
//! `config` crate. The `no_std` aircraft target never loads a file at
//! runtime: its [`Config`] is the compiled-in [`Config::default`], patched by
//! host-side tooling before flashing.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{AerolinkError, Result};
use crate::link_quality::JammingThresholds;
use crate::tier::Tier;
use crate::time::Duration;
use crate::types::{Coordinates, SystemId};

/// Which half of an aircraft's dual-radio pair a binary is acting as.
///
/// A single aircraft binary is built; this field, not a `#[cfg]` feature, is
/// what picks the role at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AircraftRole {
    /// Owns the flight-controller UART and the GCS-link radio.
    Primary,
    /// Owns the mesh-link radio and accepts relay clients.
    Secondary,
}

/// Retry, backoff, and reset tuning for the radio and framer layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial backoff before a radio transmit retry.
    pub radio_retry_initial: Duration,
    /// Transient retries before a radio transmit counts as a failed attempt.
    pub max_transient_retries: u8,
    /// Consecutive failed attempts before a radio is reset.
    pub consecutive_failures_before_reset: u8,
    /// CAD attempts before a long-range transmit is abandoned as channel-busy.
    pub max_cad_attempts: u8,
    /// Initial backoff before an unacknowledged inter-controller command is
    /// retried (subsequently doubled per attempt).
    pub framer_retry_initial: Duration,
    /// Retries before an inter-controller command is abandoned.
    pub max_framer_retries: u8,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            radio_retry_initial: Duration::from_millis(50),
            max_transient_retries: 3,
            consecutive_failures_before_reset: 5,
            max_cad_attempts: 5,
            framer_retry_initial: Duration::from_millis(500),
            max_framer_retries: 3,
        }
    }
}

/// Inter-controller framer health-monitoring thresholds, read by
/// [`crate::framer::FrameReceiver::check_health`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramerHealthConfig {
    /// Success-rate floor; a sustained run of evaluations below this raises
    /// [`crate::error::AerolinkError::FramerHealthCritical`].
    pub success_rate_floor: f32,
    /// Minimum frames-plus-errors observed before the floor is evaluated, so
    /// a cold start with few samples never trips it.
    pub min_samples: u32,
    /// Consecutive below-floor evaluations required before the signal fires.
    pub sustained_ticks: u32,
}

impl Default for FramerHealthConfig {
    fn default() -> Self {
        Self { success_rate_floor: 0.5, min_samples: 10, sustained_ticks: 5 }
    }
}

/// Ground-side direct/relay failover timing (spec §4.3's ground-side
/// symmetry: a silent direct link hands off to relay, and enough consecutive
/// direct packets hand back).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundFailoverConfig {
    /// No-packet-received duration on the direct link before failing over to
    /// relay mode.
    pub activation_timeout: Duration,
    /// Consecutive direct packets required before returning to direct mode.
    pub deactivation_confirm_packets: u32,
}

impl Default for GroundFailoverConfig {
    fn default() -> Self {
        Self { activation_timeout: Duration::from_secs(3), deactivation_confirm_packets: 5 }
    }
}

/// Maximum number of `msg_id -> Tier` overrides a deployment may configure.
pub const MAX_TIER_OVERRIDES: usize = 16;

/// Deployment-specific overrides to the default `msg_id -> Tier` table.
///
/// Most deployments never populate this; [`crate::tier::classify`] already
/// encodes the canonical table. This exists for the rare airframe that needs
/// to reclassify one or two message ids without forking the crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierOverrides {
    entries: Vec<(u8, Tier), MAX_TIER_OVERRIDES>,
}

impl TierOverrides {
    /// Creates an empty override table.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Adds or replaces the override for `msg_id`. Fails if the table is full
    /// and `msg_id` is not already present.
    pub fn insert(&mut self, msg_id: u8, tier: Tier) -> core::result::Result<(), ()> {
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == msg_id) {
            entry.1 = tier;
            return Ok(());
        }
        self.entries.push((msg_id, tier)).map_err(|_| ())
    }

    /// Classifies `msg_id`, consulting overrides first and falling back to
    /// [`crate::tier::classify`].
    #[must_use]
    pub fn classify(&self, msg_id: u8) -> Tier {
        self.entries
            .iter()
            .find(|(id, _)| *id == msg_id)
            .map_or_else(|| crate::tier::classify(msg_id), |(_, tier)| *tier)
    }
}

/// Top-level, deployment-tunable configuration shared by every node role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Role this aircraft binary acts as. Ignored by the ground binary, which
    /// always runs both link roles.
    pub role: AircraftRole,
    /// This node's own system id, carried in relay announcements, requests,
    /// and bridged-traffic framing. An aircraft's Primary and Secondary share
    /// the same airframe identity.
    pub system_id: SystemId,
    /// Compiled-in starting position, used for the relay scoring distance
    /// term until the flight controller's own telemetry supersedes it. The
    /// application telemetry protocol is opaque to this crate (see spec
    /// §1 Out-of-scope), so this is the only position source available to
    /// the inter-controller relay-discovery payload.
    pub home_position: Coordinates,
    /// Jamming detection thresholds.
    pub jamming: JammingThresholds,
    /// Radio and framer retry/backoff tuning.
    pub retry: RetryConfig,
    /// Inter-controller framer health-monitoring thresholds.
    pub framer_health: FramerHealthConfig,
    /// Ground-side direct/relay failover timing.
    pub ground_failover: GroundFailoverConfig,
    /// Deployment-specific `msg_id -> Tier` overrides.
    pub tier_overrides: TierOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: AircraftRole::Primary,
            system_id: SystemId::new(1),
            home_position: Coordinates::new(0.0, 0.0, 0.0),
            jamming: JammingThresholds::default(),
            retry: RetryConfig::default(),
            framer_health: FramerHealthConfig::default(),
            ground_failover: GroundFailoverConfig::default(),
            tier_overrides: TierOverrides::default(),
        }
    }
}

impl Config {
    /// Validates cross-field constraints a plain deserialize cannot enforce.
    ///
    /// Host binaries call this once after layering defaults, file, and
    /// environment overrides together; the `no_std` aircraft target never
    /// calls it since its `Config` is always the validated compiled-in
    /// default.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jamming.loss_ceiling) {
            return Err(AerolinkError::ConfigurationError {
                parameter: "jamming.loss_ceiling",
                value: format_f32(self.jamming.loss_ceiling),
            });
        }
        if self.retry.max_transient_retries == 0 {
            return Err(AerolinkError::ConfigurationError {
                parameter: "retry.max_transient_retries",
                value: format_u8(self.retry.max_transient_retries),
            });
        }
        if !(0.0..=1.0).contains(&self.framer_health.success_rate_floor) {
            return Err(AerolinkError::ConfigurationError {
                parameter: "framer_health.success_rate_floor",
                value: format_f32(self.framer_health.success_rate_floor),
            });
        }
        if self.ground_failover.deactivation_confirm_packets == 0 {
            return Err(AerolinkError::ConfigurationError {
                parameter: "ground_failover.deactivation_confirm_packets",
                value: format_u32(self.ground_failover.deactivation_confirm_packets),
            });
        }
        Ok(())
    }
}

fn format_f32(value: f32) -> heapless::String<32> {
    let mut s = heapless::String::new();
    let _ = core::fmt::write(&mut s, format_args!("{value}"));
    s
}

fn format_u8(value: u8) -> heapless::String<32> {
    let mut s = heapless::String::new();
    let _ = core::fmt::write(&mut s, format_args!("{value}"));
    s
}

fn format_u32(value: u32) -> heapless::String<32> {
    let mut s = heapless::String::new();
    let _ = core::fmt::write(&mut s, format_args!("{value}"));
    s
}
