//! TECS Simulation Library
//!
//! Provides a longitudinal fixed-wing plant, an air-data sensor model and a
//! closed-loop harness that embeds the energy controller the way a flight
//! stack would.

pub mod aircraft;
pub mod host;
pub mod params;
pub mod sensor;

// Re-export main types
pub use aircraft::{Aircraft, AircraftParams, AircraftState};
pub use host::{run_closed_loop, ControlResult, Scenario};
pub use params::{tecs_tuning_default, ParamSpec, TuningConfig, TECS_PARAM_NAMES};
pub use sensor::{AirDataSensors, Measurement, SensorConfig};
