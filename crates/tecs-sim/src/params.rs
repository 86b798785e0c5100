//! Parameter definitions for the energy controller tuning map.

use tecs_core::TecsTuning;

/// Parameter specification with bounds and step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Human-readable label.
    pub label: &'static str,
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Step size for sweeps and sliders.
    pub step: f32,
}

impl ParamSpec {
    /// Create a new parameter specification.
    pub const fn new(label: &'static str, min: f32, max: f32, step: f32) -> Self {
        Self {
            label,
            min,
            max,
            step,
        }
    }
}

/// Airspeed envelope parameters.
pub mod airspeed {
    use super::ParamSpec;

    pub const EAS_MIN: ParamSpec = ParamSpec::new("EAS Min (m/s)", 5.0, 30.0, 0.5);
    pub const EAS_MAX: ParamSpec = ParamSpec::new("EAS Max (m/s)", 10.0, 60.0, 0.5);
    pub const EAS_TRIM: ParamSpec = ParamSpec::new("EAS Trim (m/s)", 8.0, 40.0, 0.5);
}

/// Vertical envelope parameters.
pub mod vertical {
    use super::ParamSpec;

    pub const MAX_CLIMB_RATE: ParamSpec = ParamSpec::new("Max Climb (m/s)", 0.5, 15.0, 0.5);
    pub const MIN_SINK_RATE: ParamSpec = ParamSpec::new("Min Sink (m/s)", 0.5, 10.0, 0.5);
    pub const MAX_SINK_RATE: ParamSpec = ParamSpec::new("Max Sink (m/s)", 1.0, 15.0, 0.5);
    pub const VERT_ACCEL_LIMIT: ParamSpec = ParamSpec::new("Vert Accel (m/s²)", 1.0, 15.0, 0.5);
    pub const JERK_MAX: ParamSpec = ParamSpec::new("Jerk Max (m/s³)", 1.0, 1000.0, 1.0);
}

/// Loop gain parameters.
pub mod gains {
    use super::ParamSpec;

    pub const PITCH_DAMPING: ParamSpec = ParamSpec::new("Pitch Damping", 0.0, 2.0, 0.01);
    pub const THROTTLE_DAMPING: ParamSpec = ParamSpec::new("Throttle Damping", 0.0, 2.0, 0.01);
    pub const INTEGRATOR_PITCH: ParamSpec = ParamSpec::new("Pitch Integ Gain", 0.0, 2.0, 0.01);
    pub const INTEGRATOR_THROTTLE: ParamSpec =
        ParamSpec::new("Throttle Integ Gain", 0.0, 2.0, 0.01);
    pub const AIRSPEED_ERROR_GAIN: ParamSpec = ParamSpec::new("Airspeed Err Gain", 0.01, 2.0, 0.01);
    pub const HEIGHT_ERROR_GAIN: ParamSpec = ParamSpec::new("Height Err Gain", 0.01, 2.0, 0.01);
    pub const HEIGHT_FF: ParamSpec = ParamSpec::new("Height Rate FF", 0.0, 1.0, 0.05);
    pub const PITCH_SPEED_WEIGHT: ParamSpec = ParamSpec::new("Speed Weight", 0.0, 2.0, 0.1);
    pub const SEB_RATE_FF: ParamSpec = ParamSpec::new("SEB Rate FF", 0.0, 2.0, 0.05);
}

/// Filter and compensation parameters.
pub mod filters {
    use super::ParamSpec;

    pub const TAS_ESTIMATE_FREQ: ParamSpec = ParamSpec::new("TAS Est Freq (rad/s)", 0.5, 10.0, 0.1);
    pub const SPEED_DERIV_TC: ParamSpec = ParamSpec::new("Speed Deriv TC (s)", 0.05, 2.0, 0.05);
    pub const STE_RATE_TC: ParamSpec = ParamSpec::new("STE Rate TC (s)", 0.05, 2.0, 0.05);
    pub const LOAD_FACTOR_CORRECTION: ParamSpec =
        ParamSpec::new("Load Factor Corr (m²/s³)", 0.0, 40.0, 1.0);
    pub const THROTTLE_SLEWRATE: ParamSpec = ParamSpec::new("Throttle Slew (1/s)", 0.0, 2.0, 0.05);
}

/// Every tunable, in the order used for sweeps and exports.
pub const TECS_PARAM_NAMES: [&str; 22] = [
    "equivalent_airspeed_min",
    "equivalent_airspeed_max",
    "equivalent_airspeed_trim",
    "max_climb_rate",
    "min_sink_rate",
    "max_sink_rate",
    "vert_accel_limit",
    "jerk_max",
    "pitch_damping_gain",
    "throttle_damping_gain",
    "integrator_gain_pitch",
    "integrator_gain_throttle",
    "airspeed_error_gain",
    "height_error_gain",
    "height_setpoint_gain_ff",
    "pitch_speed_weight",
    "load_factor_correction",
    "throttle_slewrate",
    "tas_estimate_freq",
    "speed_derivative_time_const",
    "ste_rate_time_const",
    "seb_rate_ff",
];

/// Get the default value of a tuning parameter by name.
pub fn tecs_tuning_default(param: &str) -> Option<f32> {
    TuningConfig::default().get_param(param)
}

/// Name-addressable view over the controller tuning, for configuration
/// surfaces that deal in `(name, value)` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TuningConfig {
    pub tuning: TecsTuning,
}

impl TuningConfig {
    pub fn get_param(&self, name: &str) -> Option<f32> {
        let t = &self.tuning;
        let value = match name {
            "equivalent_airspeed_min" => t.equivalent_airspeed_min,
            "equivalent_airspeed_max" => t.equivalent_airspeed_max,
            "equivalent_airspeed_trim" => t.equivalent_airspeed_trim,
            "max_climb_rate" => t.max_climb_rate,
            "min_sink_rate" => t.min_sink_rate,
            "max_sink_rate" => t.max_sink_rate,
            "vert_accel_limit" => t.vert_accel_limit,
            "jerk_max" => t.jerk_max,
            "pitch_damping_gain" => t.pitch_damping_gain,
            "throttle_damping_gain" => t.throttle_damping_gain,
            "integrator_gain_pitch" => t.integrator_gain_pitch,
            "integrator_gain_throttle" => t.integrator_gain_throttle,
            "airspeed_error_gain" => t.airspeed_error_gain,
            "height_error_gain" => t.height_error_gain,
            "height_setpoint_gain_ff" => t.height_setpoint_gain_ff,
            "pitch_speed_weight" => t.pitch_speed_weight,
            "load_factor_correction" => t.load_factor_correction,
            "throttle_slewrate" => t.throttle_slewrate,
            "tas_estimate_freq" => t.tas_estimate_freq,
            "speed_derivative_time_const" => t.speed_derivative_time_const,
            "ste_rate_time_const" => t.ste_rate_time_const,
            "seb_rate_ff" => t.seb_rate_ff,
            _ => return None,
        };
        Some(value)
    }

    pub fn set_param(&mut self, name: &str, value: f32) -> bool {
        let t = &mut self.tuning;
        match name {
            "equivalent_airspeed_min" => t.equivalent_airspeed_min = value,
            "equivalent_airspeed_max" => t.equivalent_airspeed_max = value,
            "equivalent_airspeed_trim" => t.equivalent_airspeed_trim = value,
            "max_climb_rate" => t.max_climb_rate = value,
            "min_sink_rate" => t.min_sink_rate = value,
            "max_sink_rate" => t.max_sink_rate = value,
            "vert_accel_limit" => t.vert_accel_limit = value,
            "jerk_max" => t.jerk_max = value,
            "pitch_damping_gain" => t.pitch_damping_gain = value,
            "throttle_damping_gain" => t.throttle_damping_gain = value,
            "integrator_gain_pitch" => t.integrator_gain_pitch = value,
            "integrator_gain_throttle" => t.integrator_gain_throttle = value,
            "airspeed_error_gain" => t.airspeed_error_gain = value,
            "height_error_gain" => t.height_error_gain = value,
            "height_setpoint_gain_ff" => t.height_setpoint_gain_ff = value,
            "pitch_speed_weight" => t.pitch_speed_weight = value,
            "load_factor_correction" => t.load_factor_correction = value,
            "throttle_slewrate" => t.throttle_slewrate = value,
            "tas_estimate_freq" => t.tas_estimate_freq = value,
            "speed_derivative_time_const" => t.speed_derivative_time_const = value,
            "ste_rate_time_const" => t.ste_rate_time_const = value,
            "seb_rate_ff" => t.seb_rate_ff = value,
            _ => return false,
        }
        true
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for name in TECS_PARAM_NAMES {
            if let Some(value) = self.get_param(name) {
                map.insert(name.to_string(), serde_json::json!(value));
            }
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_param_resolves() {
        let config = TuningConfig::default();
        for name in TECS_PARAM_NAMES {
            assert!(config.get_param(name).is_some(), "missing param {name}");
        }
        assert!(config.get_param("unknown_param").is_none());
    }

    #[test]
    fn test_set_param_round_trips() {
        let mut config = TuningConfig::default();
        assert!(config.set_param("max_climb_rate", 7.5));
        assert_eq!(config.get_param("max_climb_rate"), Some(7.5));
        assert_eq!(config.tuning.max_climb_rate, 7.5);
        assert!(!config.set_param("unknown_param", 1.0));
    }

    #[test]
    fn test_defaults_match_core_tuning() {
        assert_eq!(
            tecs_tuning_default("equivalent_airspeed_trim"),
            Some(TecsTuning::default().equivalent_airspeed_trim)
        );
        assert_eq!(tecs_tuning_default("nonexistent"), None);
    }

    #[test]
    fn test_json_export_covers_all_params() {
        let config = TuningConfig::default();
        let json = config.to_json();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), TECS_PARAM_NAMES.len());
        assert!(obj.contains_key("ste_rate_time_const"));
    }

    #[test]
    fn test_param_spec() {
        let spec = ParamSpec::new("Test", 0.0, 100.0, 1.0);
        assert_eq!(spec.label, "Test");
        assert_eq!(spec.min, 0.0);
        assert_eq!(spec.max, 100.0);
        assert_eq!(spec.step, 1.0);
    }
}
