//! Air-data sensor model feeding the controller's estimator inputs.

use crate::aircraft::Aircraft;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub struct SensorConfig {
    pub noise_scale: f64,
    pub eas_noise_std: f64,   // m/s
    pub alt_noise_std: f64,   // meters
    pub vz_noise_std: f64,    // m/s
    pub accel_noise_std: f64, // m/s^2

    /// Airspeed outage window `(start, end)` in seconds; inside it the EAS
    /// measurement is NaN, the way an invalidated sensor reads.
    pub airspeed_dropout: Option<(f64, f64)>,

    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise_scale: 1.0,
            eas_noise_std: 0.2,
            alt_noise_std: 0.3,
            vz_noise_std: 0.1,
            accel_noise_std: 0.05,
            airspeed_dropout: None,
            seed: 42,
        }
    }
}

/// One sample of everything the controller ingests per tick.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    /// Equivalent airspeed (m/s), NaN during a dropout
    pub eas: f64,
    /// Along-path acceleration (m/s^2)
    pub accel_fwd: f64,
    /// Altitude (m)
    pub altitude: f64,
    /// Vertical speed, NED convention (m/s, positive down)
    pub vz: f64,
    /// TAS over EAS at the current altitude
    pub eas_to_tas: f64,
}

pub struct AirDataSensors {
    config: SensorConfig,
    rng: StdRng,
    d_eas: Normal<f64>,
    d_alt: Normal<f64>,
    d_vz: Normal<f64>,
    d_accel: Normal<f64>,
}

impl AirDataSensors {
    pub fn new(config: SensorConfig) -> Self {
        let s = config.noise_scale;
        let d_eas = Normal::new(0.0, (s * config.eas_noise_std).max(f64::MIN_POSITIVE)).unwrap();
        let d_alt = Normal::new(0.0, (s * config.alt_noise_std).max(f64::MIN_POSITIVE)).unwrap();
        let d_vz = Normal::new(0.0, (s * config.vz_noise_std).max(f64::MIN_POSITIVE)).unwrap();
        let d_accel =
            Normal::new(0.0, (s * config.accel_noise_std).max(f64::MIN_POSITIVE)).unwrap();
        let rng = StdRng::seed_from_u64(config.seed);

        Self {
            config,
            rng,
            d_eas,
            d_alt,
            d_vz,
            d_accel,
        }
    }

    /// Sample the air-data suite at simulation time `t`.
    pub fn measure(&mut self, t: f64, aircraft: &Aircraft) -> Measurement {
        let in_dropout = match self.config.airspeed_dropout {
            Some((start, end)) => t >= start && t < end,
            None => false,
        };

        let eas = if in_dropout {
            f64::NAN
        } else {
            aircraft.eas() + self.d_eas.sample(&mut self.rng)
        };

        Measurement {
            eas,
            accel_fwd: aircraft.accel_along() + self.d_accel.sample(&mut self.rng),
            altitude: aircraft.altitude() + self.d_alt.sample(&mut self.rng),
            vz: -aircraft.climb_rate() + self.d_vz.sample(&mut self.rng),
            eas_to_tas: aircraft.eas_to_tas(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::AircraftParams;

    #[test]
    fn test_same_seed_same_samples() {
        let aircraft = Aircraft::new(AircraftParams::default(), 100.0, 20.0);
        let mut a = AirDataSensors::new(SensorConfig::default());
        let mut b = AirDataSensors::new(SensorConfig::default());

        for i in 0..50 {
            let t = i as f64 * 0.02;
            let ma = a.measure(t, &aircraft);
            let mb = b.measure(t, &aircraft);
            assert_eq!(ma.eas, mb.eas);
            assert_eq!(ma.altitude, mb.altitude);
        }
    }

    #[test]
    fn test_dropout_window_yields_nan_eas() {
        let aircraft = Aircraft::new(AircraftParams::default(), 100.0, 20.0);
        let mut sensors = AirDataSensors::new(SensorConfig {
            airspeed_dropout: Some((1.0, 2.0)),
            ..SensorConfig::default()
        });

        assert!(sensors.measure(0.5, &aircraft).eas.is_finite());
        assert!(sensors.measure(1.5, &aircraft).eas.is_nan());
        assert!(sensors.measure(2.5, &aircraft).eas.is_finite());
        // The rest of the suite keeps reporting through the outage.
        assert!(sensors.measure(1.5, &aircraft).altitude.is_finite());
    }
}
