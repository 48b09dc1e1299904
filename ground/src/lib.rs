//! Library half of the ground station: radio HAL and the dual-link failover
//! state machine, exposed so integration tests can drive [`station::GroundStation`]
//! without going through the CLI binary.

pub mod hal;
pub mod station;
