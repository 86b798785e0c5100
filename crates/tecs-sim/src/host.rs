//! Closed-loop harness: plant, sensors and controller stepped in lockstep,
//! the way a flight stack schedules them.

use crate::aircraft::{Aircraft, AircraftParams};
use crate::sensor::{AirDataSensors, SensorConfig};
use tecs_core::{Tecs, TecsMode, TecsTuning};

/// One closed-loop run description.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Simulated time (s)
    pub duration: f64,
    /// Control period (s)
    pub dt: f64,

    pub initial_altitude: f64,
    pub initial_eas: f64,

    pub altitude_setpoint: f64,
    pub eas_setpoint: f64,
    /// Height-rate command; `Some` switches the controller into rate
    /// tracking, `None` flies the altitude setpoint.
    pub height_rate_setpoint: Option<f64>,

    /// Climbout phase is held active until this altitude is first crossed.
    pub climbout_until_altitude: Option<f64>,
    pub pitch_min_climbout: f64,

    pub throttle_min: f64,
    pub throttle_max: f64,
    pub pitch_min: f64,
    pub pitch_max: f64,
    pub target_climbrate: f64,
    pub target_sinkrate: f64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            duration: 60.0,
            dt: 0.02,
            initial_altitude: 100.0,
            initial_eas: 20.0,
            altitude_setpoint: 100.0,
            eas_setpoint: 20.0,
            height_rate_setpoint: None,
            climbout_until_altitude: None,
            pitch_min_climbout: 0.17,
            throttle_min: 0.05,
            throttle_max: 1.0,
            pitch_min: -0.5,
            pitch_max: 0.5,
            target_climbrate: 3.0,
            target_sinkrate: 2.0,
        }
    }
}

/// Column-wise traces of a closed-loop run.
#[derive(Clone, Default)]
pub struct ControlResult {
    pub time: Vec<f64>,
    pub altitude: Vec<f64>,
    pub tas: Vec<f64>,
    pub eas_meas: Vec<f64>,
    pub throttle: Vec<f64>,
    pub pitch: Vec<f64>,
    pub mode: Vec<TecsMode>,
    pub hgt_setpoint: Vec<f64>,
    pub hgt_rate_setpoint: Vec<f64>,
    pub ste_error: Vec<f64>,
    pub percent_undersped: Vec<f64>,
}

impl ControlResult {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn final_altitude(&self) -> f64 {
        self.altitude.last().copied().unwrap_or(f64::NAN)
    }

    pub fn final_tas(&self) -> f64 {
        self.tas.last().copied().unwrap_or(f64::NAN)
    }
}

/// Run the controller against the plant for the whole scenario.
pub fn run_closed_loop(
    aircraft_params: &AircraftParams,
    sensor_config: SensorConfig,
    tuning: TecsTuning,
    scenario: &Scenario,
) -> ControlResult {
    let mut aircraft = Aircraft::new(aircraft_params.clone(), scenario.initial_altitude, 0.0);
    aircraft.state.tas = scenario.initial_eas * aircraft.eas_to_tas();

    let mut sensors = AirDataSensors::new(sensor_config);
    let mut tecs = Tecs::new(tuning);

    let tas_setpoint = scenario.eas_setpoint * aircraft.eas_to_tas();
    let throttle_trim = aircraft.trim_throttle(tas_setpoint);

    let n = (scenario.duration / scenario.dt).ceil() as usize;
    let mut result = ControlResult::default();

    let mut climbout_done = scenario.climbout_until_altitude.is_none();

    for step in 0..n {
        let t = step as f64 * scenario.dt;
        let now_us = (t * 1e6) as u64;

        let meas = sensors.measure(t, &aircraft);

        if let Some(exit_alt) = scenario.climbout_until_altitude {
            if meas.altitude >= exit_alt {
                climbout_done = true;
            }
        }
        let climbout = !climbout_done;

        tecs.update_vehicle_state_estimates(
            now_us,
            meas.eas as f32,
            meas.accel_fwd as f32,
            true,
            meas.altitude as f32,
            meas.vz as f32,
        );

        let hgt_rate_sp = scenario
            .height_rate_setpoint
            .map(|v| v as f32)
            .unwrap_or(f32::NAN);

        tecs.update_pitch_throttle(
            now_us,
            aircraft.state.flight_path as f32,
            meas.altitude as f32,
            scenario.altitude_setpoint as f32,
            scenario.eas_setpoint as f32,
            meas.eas as f32,
            meas.eas_to_tas as f32,
            climbout,
            scenario.pitch_min_climbout as f32,
            scenario.throttle_min as f32,
            scenario.throttle_max as f32,
            throttle_trim as f32,
            scenario.pitch_min as f32,
            scenario.pitch_max as f32,
            scenario.target_climbrate as f32,
            scenario.target_sinkrate as f32,
            hgt_rate_sp,
        );

        let throttle = tecs.throttle_setpoint() as f64;
        let pitch = tecs.pitch_setpoint() as f64;

        aircraft.step(scenario.dt, throttle, pitch);

        result.time.push(t);
        result.altitude.push(aircraft.altitude());
        result.tas.push(aircraft.tas());
        result.eas_meas.push(meas.eas);
        result.throttle.push(throttle);
        result.pitch.push(pitch);
        result.mode.push(tecs.mode());
        result.hgt_setpoint.push(tecs.hgt_setpoint() as f64);
        result
            .hgt_rate_setpoint
            .push(tecs.hgt_rate_setpoint() as f64);
        result.ste_error.push(tecs.ste_error() as f64);
        result.percent_undersped.push(tecs.percent_undersped() as f64);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_sensors() -> SensorConfig {
        SensorConfig {
            noise_scale: 0.0,
            ..SensorConfig::default()
        }
    }

    fn cruise_tuning() -> TecsTuning {
        TecsTuning {
            equivalent_airspeed_min: 12.0,
            equivalent_airspeed_max: 28.0,
            equivalent_airspeed_trim: 20.0,
            ..TecsTuning::default()
        }
    }

    fn assert_commands_bounded(result: &ControlResult, scenario: &Scenario) {
        for (thr, pitch) in result.throttle.iter().zip(result.pitch.iter()) {
            assert!(*thr >= scenario.throttle_min - 1e-6);
            assert!(*thr <= scenario.throttle_max + 1e-6);
            assert!(*pitch >= scenario.pitch_min - 1e-6);
            assert!(*pitch <= scenario.pitch_max + 1e-6);
            assert!(thr.is_finite() && pitch.is_finite());
        }
    }

    #[test]
    fn test_cruise_converges_from_altitude_offset() {
        let scenario = Scenario {
            initial_altitude: 95.0,
            altitude_setpoint: 100.0,
            duration: 60.0,
            ..Scenario::default()
        };

        let result = run_closed_loop(
            &AircraftParams::default(),
            quiet_sensors(),
            cruise_tuning(),
            &scenario,
        );

        assert_commands_bounded(&result, &scenario);
        assert!(
            (result.final_altitude() - 100.0).abs() < 3.0,
            "altitude {}",
            result.final_altitude()
        );
        assert!(
            (result.final_tas() - 20.0).abs() < 1.5,
            "speed {}",
            result.final_tas()
        );
        assert_eq!(*result.mode.last().unwrap(), TecsMode::Normal);
    }

    #[test]
    fn test_climb_reaches_new_altitude_within_rate_envelope() {
        let scenario = Scenario {
            initial_altitude: 100.0,
            altitude_setpoint: 150.0,
            duration: 90.0,
            ..Scenario::default()
        };

        let tuning = cruise_tuning();
        let result = run_closed_loop(
            &AircraftParams::default(),
            quiet_sensors(),
            tuning,
            &scenario,
        );

        assert_commands_bounded(&result, &scenario);
        assert!(
            (result.final_altitude() - 150.0).abs() < 3.0,
            "altitude {}",
            result.final_altitude()
        );

        // Observed climb rate stays inside the commanded envelope.
        let dt = scenario.dt;
        for w in result.altitude.windows(2) {
            let rate = (w[1] - w[0]) / dt;
            assert!(rate < scenario.target_climbrate + 1.5, "climb rate {rate}");
        }
    }

    #[test]
    fn test_airspeed_outage_keeps_the_loop_sane() {
        let scenario = Scenario {
            duration: 80.0,
            ..Scenario::default()
        };
        let sensors = SensorConfig {
            noise_scale: 0.0,
            airspeed_dropout: Some((20.0, 60.0)),
            ..SensorConfig::default()
        };

        let result = run_closed_loop(
            &AircraftParams::default(),
            sensors,
            cruise_tuning(),
            &scenario,
        );

        assert_commands_bounded(&result, &scenario);
        for alt in &result.altitude {
            assert!(alt.is_finite());
        }
        assert!(
            (result.final_altitude() - 100.0).abs() < 15.0,
            "altitude {}",
            result.final_altitude()
        );
    }

    #[test]
    fn test_underspeed_recovery() {
        let scenario = Scenario {
            initial_eas: 14.0,
            duration: 60.0,
            ..Scenario::default()
        };
        let tuning = TecsTuning {
            equivalent_airspeed_min: 18.0,
            equivalent_airspeed_max: 28.0,
            equivalent_airspeed_trim: 20.0,
            ..TecsTuning::default()
        };

        let result = run_closed_loop(
            &AircraftParams::default(),
            quiet_sensors(),
            tuning,
            &scenario,
        );

        // Deep below the minimum speed the controller must flag the
        // condition and push power.
        let early = &result.mode[..50];
        assert!(early.contains(&TecsMode::Underspeed));

        assert_eq!(*result.mode.last().unwrap(), TecsMode::Normal);
        assert!(result.final_tas() > 17.0, "speed {}", result.final_tas());
    }

    #[test]
    fn test_height_rate_command_climbs() {
        let scenario = Scenario {
            height_rate_setpoint: Some(1.5),
            duration: 30.0,
            ..Scenario::default()
        };

        let result = run_closed_loop(
            &AircraftParams::default(),
            quiet_sensors(),
            cruise_tuning(),
            &scenario,
        );

        assert_commands_bounded(&result, &scenario);
        let gained = result.final_altitude() - 100.0;
        assert!(
            gained > 25.0 && gained < 55.0,
            "altitude gained {gained} over 30 s at 1.5 m/s"
        );
    }

    #[test]
    fn test_climbout_phase_pins_throttle_then_levels_off() {
        let scenario = Scenario {
            initial_altitude: 100.0,
            initial_eas: 18.0,
            altitude_setpoint: 160.0,
            climbout_until_altitude: Some(130.0),
            duration: 120.0,
            ..Scenario::default()
        };

        let result = run_closed_loop(
            &AircraftParams::default(),
            quiet_sensors(),
            cruise_tuning(),
            &scenario,
        );

        // While below the climbout exit altitude: full power, floor pitch,
        // climbout mode reported.
        assert_eq!(result.mode[10], TecsMode::Climbout);
        assert!(result.throttle[10] > 0.95);
        assert!(result.pitch[10] >= scenario.pitch_min_climbout - 1e-3);

        assert!(result.mode.contains(&TecsMode::Normal));
        assert!(
            (result.final_altitude() - 160.0).abs() < 4.0,
            "altitude {}",
            result.final_altitude()
        );
    }
}
