//! # Aerolink Shared Protocol Library
//!
//! Core, node-agnostic protocol logic for the jamming-resistant aircraft/ground
//! telemetry transport: priority-tier scheduling, dual-band coordination with
//! deduplication, relay discovery and failover, and the binary inter-controller
//! framing used between an aircraft's Primary and Secondary radio nodes.
//!
//! Every type here is usable from both the `std`-hosted ground/test binaries and
//! the `no_std` embedded aircraft binary; the `std`/`no-std` feature switch only
//! changes which error and logging backends are linked in.

#![cfg_attr(feature = "no-std", no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused_qualifications)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(not(feature = "std"))]
extern crate core as std;

pub mod command_payloads;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod events;
pub mod fletcher16;
pub mod framer;
pub mod link_quality;
pub mod mesh_frame;
pub mod payload;
pub mod radio;
pub mod relay;
pub mod scheduler;
pub mod tier;
pub mod time;
pub mod types;

pub use config::Config;
pub use error::{AerolinkError, ErrorSeverity, Result};
pub use tier::Tier;
pub use time::{Duration, Millis};
pub use types::{Coordinates, SequenceNumber, SystemId};
