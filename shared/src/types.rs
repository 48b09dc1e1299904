//! Fundamental identifiers and geographic types shared by every component.

use serde::{Deserialize, Serialize};

/// Identifies a node (aircraft or ground station) on the mesh/relay frequency.
///
/// The wire protocol carries this as a single byte (spec data model: `sys_id`
/// is 8 bits), so the type is a thin, `Copy`-able wrapper rather than a richer
/// identifier — there is nothing to validate beyond "it's a byte".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SystemId(pub u8);

impl SystemId {
    /// Construct from a raw byte.
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Raw byte value.
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for SystemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An 8-bit, wraparound application-message sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceNumber(pub u8);

impl SequenceNumber {
    /// Construct from a raw byte.
    pub const fn new(seq: u8) -> Self {
        Self(seq)
    }

    /// Raw byte value.
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Modular forward distance from `self` to `other`, i.e. `other - self`
    /// computed on the 256-value ring. Used by the dedup window: `[1, 127]`
    /// is in-order, `0` is a duplicate, `[128, 255]` is treated as new (wrap
    /// or reorder) while advancing the stored value.
    pub const fn forward_distance_to(&self, other: SequenceNumber) -> u8 {
        other.0.wrapping_sub(self.0)
    }
}

/// Geographic position used for relay scoring's inverse-distance term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters above sea level.
    pub altitude: f64,
}

impl Coordinates {
    /// Construct a new position.
    pub const fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self { latitude, longitude, altitude }
    }

    /// Great-circle (Haversine) planar distance to another position, in
    /// kilometers. Altitude is not factored in: the scoring function only
    /// needs a planar distance term, not a full 3D range.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}

/// Which physical link a packet was sent or received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkId {
    /// The short-range, opportunistic 2.4GHz link.
    ShortRange,
    /// The long-range, bandwidth-constrained link.
    LongRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_distance_in_order() {
        let stored = SequenceNumber::new(10);
        assert_eq!(stored.forward_distance_to(SequenceNumber::new(11)), 1);
        assert_eq!(stored.forward_distance_to(SequenceNumber::new(137)), 127);
    }

    #[test]
    fn sequence_distance_duplicate_and_wrap() {
        let stored = SequenceNumber::new(10);
        assert_eq!(stored.forward_distance_to(SequenceNumber::new(10)), 0);
        // distance 128..=255 is the "treat as new, advance anyway" band
        assert_eq!(stored.forward_distance_to(SequenceNumber::new(138)), 128);
    }

    #[test]
    fn coordinates_distance_is_positive_and_bounded() {
        let a = Coordinates::new(0.0, 0.0, 0.0);
        let b = Coordinates::new(1.0, 1.0, 0.0);
        let distance = a.distance_to(&b);
        assert!(distance > 0.0);
        assert!(distance < 200.0);
    }
}
