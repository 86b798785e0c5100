//! # TECS Core
//!
//! Total Energy Control System for fixed-wing longitudinal flight, designed
//! for `no_std` environments. This crate contains only the code that needs
//! to run in the control loop:
//! - Second-order complementary airspeed filter
//! - Jerk-limited altitude and height-rate trajectory generators
//! - Energy bookkeeping and the throttle/pitch feedback laws
//! - Underspeed and uncommanded-descent mode detection
//!
//! The controller never allocates, blocks, or logs. Degraded conditions are
//! reported through [`TecsMode`], not through errors.
//!
//! # Features
//! - `std`: Enable standard library support (for testing)
//! - Default: `no_std` with no allocations (bare metal embedded)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod filter;
pub mod tecs;
pub mod trajectory;

// Re-export core types
pub use filter::FirstOrderLpf;
pub use tecs::{Tecs, TecsDiagnostics, TecsMode, TecsTuning};
pub use trajectory::{max_speed_from_distance, AltitudeTrajectory, VelocitySmoothing};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
