//! # Longitudinal Fixed-Wing Point-Mass Model
//!
//! A vertical-plane aircraft model used to exercise the energy controller
//! in closed loop:
//! - Point-mass dynamics along the flight path
//! - Parabolic drag polar with the lift coefficient set by level flight
//! - Throttle-proportional thrust
//! - First-order flight path response to the commanded pitch
//! - Exponential atmosphere for the EAS/TAS relation
//!
//! ## Coordinate Systems
//!
//! - **Vertical plane**: X along track, Y altitude (positive up)
//! - Flight path angle positive for climb
//!
//! ## Physics Notes
//!
//! - Fixed-timestep semi-implicit Euler integration
//! - The pitch-to-flight-path lag stands in for the attitude loop and the
//!   angle-of-attack offset; the controller only needs a plant that trades
//!   throttle for energy and pitch for energy distribution

use nalgebra::Vector2;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Atmospheric scale height (meters) for the exponential density model
const H_SCALE: f64 = 7400.0;

/// Minimum dynamic-pressure airspeed used in the aero calculations (m/s)
const MIN_AERO_SPEED: f64 = 1.0;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Airframe and environment parameters for the longitudinal model
#[derive(Debug, Clone)]
pub struct AircraftParams {
    /// All-up mass (kg)
    pub mass: f64,

    /// Wing reference area (m²)
    pub wing_area: f64,

    /// Zero-lift drag coefficient (dimensionless)
    pub cd0: f64,

    /// Induced drag factor k in `cd = cd0 + k * cl²`
    pub induced_drag_factor: f64,

    /// Static thrust at full throttle (N)
    pub max_thrust: f64,

    /// Time constant of the flight-path response to pitch (s)
    pub pitch_time_const: f64,

    /// Gravitational acceleration (m/s²)
    pub gravity: f64,

    /// Air density at sea level (kg/m³)
    pub air_density_sea_level: f64,
}

impl Default for AircraftParams {
    fn default() -> Self {
        // Small fixed-wing UAV: ~4 m/s climb capability at 20 m/s cruise.
        Self {
            mass: 10.0,
            wing_area: 0.8,
            cd0: 0.035,
            induced_drag_factor: 0.045,
            max_thrust: 30.0,
            pitch_time_const: 0.7,
            gravity: 9.80665,
            air_density_sea_level: 1.225,
        }
    }
}

// ---------------------------------------------------------------------------
// State & model
// ---------------------------------------------------------------------------

/// Instantaneous state of the airframe
#[derive(Debug, Clone, Copy)]
pub struct AircraftState {
    /// Along-track distance and altitude (m)
    pub position: Vector2<f64>,
    /// True airspeed (m/s)
    pub tas: f64,
    /// Flight path angle (rad, positive up)
    pub flight_path: f64,
}

pub struct Aircraft {
    pub params: AircraftParams,
    pub state: AircraftState,

    /// Along-path acceleration from the last step (m/s²), what an
    /// airspeed-axis accelerometer would report.
    accel_along: f64,
}

impl Aircraft {
    pub fn new(params: AircraftParams, altitude: f64, tas: f64) -> Self {
        Self {
            params,
            state: AircraftState {
                position: Vector2::new(0.0, altitude),
                tas,
                flight_path: 0.0,
            },
            accel_along: 0.0,
        }
    }

    /// Advance the model by `dt` with a throttle in [0, 1] and a pitch
    /// command in radians.
    pub fn step(&mut self, dt: f64, throttle: f64, pitch_cmd: f64) {
        let p = &self.params;
        let s = &mut self.state;

        let rho = p.air_density_sea_level * (-s.position.y / H_SCALE).exp();
        let speed = s.tas.max(MIN_AERO_SPEED);
        let q = 0.5 * rho * speed * speed;

        // Lift balances weight along the normal axis; the induced term of
        // the polar follows from that lift coefficient.
        let weight = p.mass * p.gravity;
        let cl = weight * s.flight_path.cos() / (q * p.wing_area);
        let cd = p.cd0 + p.induced_drag_factor * cl * cl;
        let drag = q * p.wing_area * cd;

        let thrust = throttle.clamp(0.0, 1.0) * p.max_thrust;

        let accel = (thrust - drag) / p.mass - p.gravity * s.flight_path.sin();

        // The attitude loop and angle of attack are abstracted into a lag
        // from commanded pitch to flight path.
        s.flight_path += (pitch_cmd - s.flight_path) / p.pitch_time_const * dt;

        s.tas = (s.tas + accel * dt).max(0.0);
        s.position += Vector2::new(
            s.tas * s.flight_path.cos(),
            s.tas * s.flight_path.sin(),
        ) * dt;

        self.accel_along = accel;
    }

    pub fn altitude(&self) -> f64 {
        self.state.position.y
    }

    pub fn tas(&self) -> f64 {
        self.state.tas
    }

    pub fn climb_rate(&self) -> f64 {
        self.state.tas * self.state.flight_path.sin()
    }

    pub fn accel_along(&self) -> f64 {
        self.accel_along
    }

    /// TAS over EAS at the current altitude, from the exponential
    /// atmosphere.
    pub fn eas_to_tas(&self) -> f64 {
        (self.state.position.y / (2.0 * H_SCALE)).exp()
    }

    pub fn eas(&self) -> f64 {
        self.state.tas / self.eas_to_tas()
    }

    /// Throttle that balances drag in level flight at `tas`, the natural
    /// cruise setting to hand the controller as trim.
    pub fn trim_throttle(&self, tas: f64) -> f64 {
        let p = &self.params;
        let rho = p.air_density_sea_level * (-self.state.position.y / H_SCALE).exp();
        let q = 0.5 * rho * tas.max(MIN_AERO_SPEED).powi(2);
        let cl = p.mass * p.gravity / (q * p.wing_area);
        let cd = p.cd0 + p.induced_drag_factor * cl * cl;
        let drag = q * p.wing_area * cd;
        (drag / p.max_thrust).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trim_throttle_holds_speed_and_altitude() {
        let params = AircraftParams::default();
        let mut aircraft = Aircraft::new(params, 100.0, 20.0);
        let trim = aircraft.trim_throttle(20.0);

        for _ in 0..2500 {
            aircraft.step(0.02, trim, 0.0);
        }

        assert_relative_eq!(aircraft.tas(), 20.0, epsilon = 0.5);
        assert_relative_eq!(aircraft.altitude(), 100.0, epsilon = 1.0);
    }

    #[test]
    fn test_full_throttle_accelerates_then_drag_limits() {
        let mut aircraft = Aircraft::new(AircraftParams::default(), 100.0, 20.0);

        for _ in 0..6000 {
            aircraft.step(0.02, 1.0, 0.0);
        }

        // Level acceleration stops where thrust meets drag.
        assert!(aircraft.tas() > 25.0);
        let residual = aircraft.accel_along();
        assert!(residual.abs() < 0.2, "residual accel {residual}");
    }

    #[test]
    fn test_positive_pitch_produces_climb() {
        let params = AircraftParams::default();
        let mut aircraft = Aircraft::new(params, 100.0, 20.0);
        let trim = aircraft.trim_throttle(20.0);

        for _ in 0..500 {
            aircraft.step(0.02, (trim + 0.3).min(1.0), 0.1);
        }

        assert!(aircraft.altitude() > 101.0);
        assert!(aircraft.climb_rate() > 0.5);
    }

    #[test]
    fn test_eas_to_tas_grows_with_altitude() {
        let low = Aircraft::new(AircraftParams::default(), 0.0, 20.0);
        let high = Aircraft::new(AircraftParams::default(), 3000.0, 20.0);
        assert!(high.eas_to_tas() > low.eas_to_tas());
        assert_relative_eq!(low.eas_to_tas(), 1.0, epsilon = 1e-9);
    }
}
