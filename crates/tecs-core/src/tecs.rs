//! Total energy control core.
//!
//! The controller regulates airspeed and altitude together by commanding a
//! throttle and a pitch setpoint. Throttle changes the total specific
//! energy of the airframe; pitch trades energy between the kinetic and
//! potential stores. Working in energy space keeps the two loops decoupled
//! across the flight envelope without switching between dedicated climb
//! and speed controllers.
//!
//! The host drives two entry points from a single control task:
//! [`Tecs::update_vehicle_state_estimates`] whenever fresh estimator data
//! arrives and [`Tecs::update_pitch_throttle`] once per control tick.
//! Neither call blocks or allocates, and identical inputs always produce
//! identical outputs. Degraded conditions (airspeed loss, underspeed,
//! uncommanded descent, stale data) surface as [`TecsMode`] transitions
//! and internal fallbacks rather than errors.

use crate::filter::FirstOrderLpf;
use crate::trajectory::{AltitudeTrajectory, VelocitySmoothing};

use core::f32::consts::SQRT_2;
use libm::fabsf;

/// Minimum allowed value of the integration step (sec).
const DT_MIN: f32 = 0.001;
/// Step gap above which the filter states are re-initialized (sec).
const DT_MAX: f32 = 1.0;
/// Fallback step used while the timing is not yet established (sec).
const DT_DEFAULT: f32 = 0.02;

/// Standard gravity (m/s^2).
const ONE_G: f32 = 9.80665;

/// Allowed fraction of the trim airspeed between the underspeed ramp
/// bounds.
const TAS_ERROR_PERCENTAGE: f32 = 0.1;

/// Total energy error above which an uncommanded descent may be declared
/// (m^2/s^2).
const UNCOMMANDED_DESCENT_STE_ERROR: f32 = 200.0;

// ---------------------------------------------------------------------------
// Mode & tuning
// ---------------------------------------------------------------------------

/// Operating mode published at the end of every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TecsMode {
    Normal = 0,
    Underspeed = 1,
    BadDescent = 2,
    Climbout = 3,
}

impl TecsMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Underspeed => "Underspeed",
            Self::BadDescent => "BadDescent",
            Self::Climbout => "Climbout",
        }
    }
}

/// Controller tuning. Every field may be changed between steps; none are
/// read back mutably during a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TecsTuning {
    /// Lower bound of the commanded equivalent airspeed (m/s).
    pub equivalent_airspeed_min: f32,
    /// Upper bound of the commanded equivalent airspeed (m/s).
    pub equivalent_airspeed_max: f32,
    /// Cruise equivalent airspeed, also the fallback when the airspeed
    /// sensor is unavailable (m/s).
    pub equivalent_airspeed_trim: f32,

    /// Climb rate achievable at maximum throttle (m/s).
    pub max_climb_rate: f32,
    /// Sink rate at minimum throttle in level flight (m/s).
    pub min_sink_rate: f32,
    /// Sink rate limit for trajectory shaping (m/s).
    pub max_sink_rate: f32,

    /// Vertical acceleration limit for the reference trajectories and the
    /// pitch rate bound (m/s^2).
    pub vert_accel_limit: f32,
    /// Jerk limit for the reference trajectories (m/s^3).
    pub jerk_max: f32,

    /// Damping gain of the pitch (energy balance) loop.
    pub pitch_damping_gain: f32,
    /// Damping gain of the throttle (total energy) loop.
    pub throttle_damping_gain: f32,
    /// Integrator gain of the pitch loop.
    pub integrator_gain_pitch: f32,
    /// Integrator gain of the throttle loop.
    pub integrator_gain_throttle: f32,

    /// First-order gain from true airspeed error to airspeed rate demand
    /// (1/s).
    pub airspeed_error_gain: f32,
    /// First-order gain from height error to height rate demand (1/s).
    pub height_error_gain: f32,
    /// Feed-forward gain from reference trajectory velocity to height rate
    /// demand.
    pub height_setpoint_gain_ff: f32,

    /// Speed/height priority of the pitch loop, 0 = height only,
    /// 2 = speed only.
    pub pitch_speed_weight: f32,
    /// Energy rate added per unit of extra normal load factor to cover the
    /// induced drag rise in turns (m^2/s^3).
    pub load_factor_correction: f32,
    /// Throttle slew limit as fraction of the full throttle range per
    /// second; magnitudes below 0.01 disable the limit.
    pub throttle_slewrate: f32,

    /// Natural frequency of the airspeed complementary filter (rad/s).
    pub tas_estimate_freq: f32,
    /// Time constant of the airspeed derivative filter (s).
    pub speed_derivative_time_const: f32,
    /// Time constant of the total energy rate error filter (s).
    pub ste_rate_time_const: f32,
    /// Feed-forward gain from energy balance rate demand to pitch.
    pub seb_rate_ff: f32,
}

impl Default for TecsTuning {
    fn default() -> Self {
        Self {
            equivalent_airspeed_min: 10.0,
            equivalent_airspeed_max: 20.0,
            equivalent_airspeed_trim: 15.0,
            max_climb_rate: 5.0,
            min_sink_rate: 2.0,
            max_sink_rate: 5.0,
            vert_accel_limit: 7.0,
            jerk_max: 1000.0,
            pitch_damping_gain: 0.1,
            throttle_damping_gain: 0.5,
            integrator_gain_pitch: 0.1,
            integrator_gain_throttle: 0.3,
            airspeed_error_gain: 0.25,
            height_error_gain: 0.2,
            height_setpoint_gain_ff: 0.3,
            pitch_speed_weight: 1.0,
            load_factor_correction: 15.0,
            throttle_slewrate: 0.0,
            tas_estimate_freq: 2.0,
            speed_derivative_time_const: 0.5,
            ste_rate_time_const: 0.5,
            seb_rate_ff: 1.0,
        }
    }
}

/// Snapshot of the controller internals for host-side logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct TecsDiagnostics {
    pub tas_state: f32,
    pub tas_rate_state: f32,
    pub tas_innovation: f32,
    pub tas_setpoint_adj: f32,
    pub tas_rate_setpoint: f32,
    pub hgt_setpoint: f32,
    pub hgt_rate_setpoint: f32,
    pub spe_estimate: f32,
    pub ske_estimate: f32,
    pub spe_rate: f32,
    pub ske_rate: f32,
    pub ste_error: f32,
    pub ste_rate_error: f32,
    pub seb_error: f32,
    pub seb_rate_error: f32,
    pub throttle_integ: f32,
    pub pitch_integ: f32,
    pub percent_undersped: f32,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The total energy controller. One instance per airframe; state persists
/// across steps and is owned exclusively by the instance.
pub struct Tecs {
    /// Tuning, host writable between steps.
    pub tuning: TecsTuning,

    // External auxiliary inputs
    load_factor: f32,
    airspeed_enabled: bool,
    detect_underspeed_enabled: bool,

    // Step timing; `None` until the first call establishes an epoch
    state_update_ts: Option<u64>,
    speed_update_ts: Option<u64>,
    pitch_update_ts: Option<u64>,
    dt: f32,

    // Per-step limits captured from the caller
    throttle_setpoint_min: f32,
    throttle_setpoint_max: f32,
    pitch_setpoint_min: f32,
    pitch_setpoint_max: f32,
    throttle_trim: f32,

    // Inertial states from the estimator
    vert_pos_state: f32,
    vert_vel_state: f32,

    // Airspeed complementary filter
    tas_state: f32,
    tas_rate_state: f32,
    tas_innov: f32,
    tas_rate_raw: f32,
    tas_rate_filtered: f32,
    tas_rate_filter: FirstOrderLpf,

    // Airspeed setpoints
    eas_setpoint: f32,
    tas_setpoint: f32,
    tas_setpoint_adj: f32,
    tas_rate_setpoint: f32,
    tas_min: f32,
    tas_max: f32,

    // Height setpoints
    hgt_setpoint: f32,
    hgt_rate_setpoint: f32,
    alt_control_traj_generator: AltitudeTrajectory,
    velocity_control_traj_generator: VelocitySmoothing,

    // Specific energies
    spe_estimate: f32,
    ske_estimate: f32,
    spe_rate: f32,
    ske_rate: f32,
    spe_setpoint: f32,
    ske_setpoint: f32,
    spe_rate_setpoint: f32,
    ske_rate_setpoint: f32,
    ste_error: f32,
    ste_rate_error: f32,
    ste_rate_setpoint: f32,
    ste_rate_min: f32,
    ste_rate_max: f32,
    seb_error: f32,
    seb_rate_error: f32,
    ste_rate_error_filter: FirstOrderLpf,

    // Energy distribution weights
    spe_weighting: f32,
    ske_weighting: f32,

    // Feedback integrators
    throttle_integ_state: f32,
    pitch_integ_state: f32,

    // Outputs
    last_throttle_setpoint: f32,
    last_pitch_setpoint: f32,
    pitch_setpoint_unc: f32,

    // Mode bookkeeping
    states_initialized: bool,
    climbout_mode_active: bool,
    airspeed_active: bool,
    uncommanded_descent_recovery: bool,
    percent_undersped: f32,
    tecs_mode: TecsMode,
}

impl Default for Tecs {
    fn default() -> Self {
        Self::new(TecsTuning::default())
    }
}

impl Tecs {
    pub fn new(tuning: TecsTuning) -> Self {
        Self {
            tuning,
            load_factor: 1.0,
            airspeed_enabled: true,
            detect_underspeed_enabled: true,
            state_update_ts: None,
            speed_update_ts: None,
            pitch_update_ts: None,
            dt: DT_DEFAULT,
            throttle_setpoint_min: 0.0,
            throttle_setpoint_max: 1.0,
            pitch_setpoint_min: 0.0,
            pitch_setpoint_max: 0.0,
            throttle_trim: 0.0,
            vert_pos_state: 0.0,
            vert_vel_state: 0.0,
            tas_state: 0.0,
            tas_rate_state: 0.0,
            tas_innov: 0.0,
            tas_rate_raw: 0.0,
            tas_rate_filtered: 0.0,
            tas_rate_filter: FirstOrderLpf::new(),
            eas_setpoint: 0.0,
            tas_setpoint: 0.0,
            tas_setpoint_adj: 0.0,
            tas_rate_setpoint: 0.0,
            tas_min: 0.0,
            tas_max: 0.0,
            hgt_setpoint: 0.0,
            hgt_rate_setpoint: 0.0,
            alt_control_traj_generator: AltitudeTrajectory::default(),
            velocity_control_traj_generator: VelocitySmoothing::default(),
            spe_estimate: 0.0,
            ske_estimate: 0.0,
            spe_rate: 0.0,
            ske_rate: 0.0,
            spe_setpoint: 0.0,
            ske_setpoint: 0.0,
            spe_rate_setpoint: 0.0,
            ske_rate_setpoint: 0.0,
            ste_error: 0.0,
            ste_rate_error: 0.0,
            ste_rate_setpoint: 0.0,
            ste_rate_min: 0.0,
            ste_rate_max: 0.0,
            seb_error: 0.0,
            seb_rate_error: 0.0,
            ste_rate_error_filter: FirstOrderLpf::new(),
            spe_weighting: 1.0,
            ske_weighting: 1.0,
            throttle_integ_state: 0.0,
            pitch_integ_state: 0.0,
            last_throttle_setpoint: 0.0,
            last_pitch_setpoint: 0.0,
            pitch_setpoint_unc: 0.0,
            states_initialized: false,
            climbout_mode_active: false,
            airspeed_active: false,
            uncommanded_descent_recovery: false,
            percent_undersped: 0.0,
            tecs_mode: TecsMode::Normal,
        }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Ingest fresh estimator data ahead of the main step.
    ///
    /// `vz` follows the NED convention (positive down); internally altitude
    /// and vertical velocity are kept positive up. A first call, a gap of
    /// more than [`DT_MAX`] seconds, or a lost altitude reference marks the
    /// states for re-initialization on the next control step.
    pub fn update_vehicle_state_estimates(
        &mut self,
        now_us: u64,
        equivalent_airspeed: f32,
        speed_deriv_forward: f32,
        altitude_lock: bool,
        altitude: f32,
        vz: f32,
    ) {
        let dt = match self.state_update_ts {
            Some(last) => ((now_us.saturating_sub(last)) as f32 * 1e-6).max(DT_MIN),
            None => DT_MIN,
        };

        let mut reset_altitude = self.state_update_ts.is_none() || dt > DT_MAX;

        if !altitude_lock {
            reset_altitude = true;
        }

        if reset_altitude {
            self.states_initialized = false;
        }

        self.state_update_ts = Some(now_us);

        self.vert_vel_state = -vz;
        self.vert_pos_state = altitude;

        // Average the speed rate of change only while airspeed is measured.
        if equivalent_airspeed.is_finite() && self.airspeed_enabled {
            self.tas_rate_raw = speed_deriv_forward;
            self.tas_rate_filtered = self.tas_rate_filter.update(speed_deriv_forward);
        } else {
            self.tas_rate_raw = 0.0;
            self.tas_rate_filtered = 0.0;
        }
    }

    /// The main control step. Produces a throttle and a pitch setpoint and
    /// publishes the operating mode. The stage order is load-bearing: the
    /// uncommanded-descent detector must observe the previous step's
    /// energies and throttle, and the energy accountant must observe the
    /// current airspeed state and height setpoint.
    #[allow(clippy::too_many_arguments)]
    pub fn update_pitch_throttle(
        &mut self,
        now_us: u64,
        pitch: f32,
        baro_altitude: f32,
        hgt_setpoint: f32,
        eas_setpoint: f32,
        equivalent_airspeed: f32,
        eas_to_tas: f32,
        climbout_mode: bool,
        pitch_min_climbout: f32,
        throttle_min: f32,
        throttle_max: f32,
        throttle_trim: f32,
        pitch_limit_min: f32,
        pitch_limit_max: f32,
        target_climbrate: f32,
        target_sinkrate: f32,
        hgt_rate_sp: f32,
    ) {
        self.dt = match self.pitch_update_ts {
            Some(last) => ((now_us.saturating_sub(last)) as f32 * 1e-6).max(DT_MIN),
            None => DT_MIN,
        };

        self.throttle_setpoint_max = throttle_max;
        self.throttle_setpoint_min = throttle_min.min(throttle_max);
        self.pitch_setpoint_max = pitch_limit_max;
        self.pitch_setpoint_min = pitch_limit_min.min(pitch_limit_max);
        self.climbout_mode_active = climbout_mode;
        self.throttle_trim = throttle_trim;

        // A non-finite measurement disables airspeed feedback for the whole
        // step, same as an unavailable sensor.
        self.airspeed_active = self.airspeed_enabled && equivalent_airspeed.is_finite();
        let eas = if self.airspeed_active {
            equivalent_airspeed
        } else {
            self.tuning.equivalent_airspeed_trim
        };

        self.initialize_states(pitch, baro_altitude, pitch_min_climbout, eas, eas_to_tas);

        self.update_trajectory_constraints();

        self.update_speed_states(now_us, eas_setpoint, eas, eas_to_tas);

        self.update_ste_rate_limits();

        self.detect_underspeed();

        self.update_speed_height_weights();

        self.detect_uncommanded_descent();

        self.update_speed_setpoint();

        self.calculate_height_rate_setpoint(
            hgt_setpoint,
            hgt_rate_sp,
            target_climbrate,
            target_sinkrate,
            baro_altitude,
        );

        self.update_energy_estimates();

        self.update_throttle_setpoint();

        self.update_pitch_setpoint();

        self.pitch_update_ts = Some(now_us);

        self.tecs_mode = if self.percent_undersped > f32::EPSILON {
            TecsMode::Underspeed
        } else if self.uncommanded_descent_recovery {
            TecsMode::BadDescent
        } else if self.climbout_mode_active {
            TecsMode::Climbout
        } else {
            TecsMode::Normal
        };
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    fn initialize_states(
        &mut self,
        pitch: f32,
        baro_altitude: f32,
        pitch_min_climbout: f32,
        eas: f32,
        eas_to_tas: f32,
    ) {
        // Climbout overrides come first so that a cold start in climbout
        // already seeds the floor pitch and the pinned throttle range.
        if self.climbout_mode_active {
            self.pitch_setpoint_min = pitch_min_climbout.min(self.pitch_setpoint_max);

            // Throttle lower limit pinned just below the ceiling so the
            // throttle loop cannot pull power during the climb.
            self.throttle_setpoint_min = self.throttle_setpoint_max - 0.01;

            // Airspeed demand tracks the measurement until climbout ends.
            self.tas_setpoint = eas * eas_to_tas;
            self.tas_setpoint_adj = eas * eas_to_tas;

            self.hgt_setpoint = baro_altitude;

            self.uncommanded_descent_recovery = false;
        }

        if self.pitch_update_ts.is_none() || self.dt > DT_MAX || !self.states_initialized {
            self.vert_vel_state = 0.0;
            self.vert_pos_state = baro_altitude;
            self.tas_rate_state = 0.0;
            self.tas_state = eas * eas_to_tas;
            // The raw speed derivative survives the reset so the airspeed
            // filter propagates from the latest measurement; the filtered
            // term restarts at zero with its filter below.
            self.tas_rate_filtered = 0.0;
            self.last_throttle_setpoint = self.throttle_trim;
            self.last_pitch_setpoint =
                pitch.clamp(self.pitch_setpoint_min, self.pitch_setpoint_max);
            self.pitch_setpoint_unc = self.last_pitch_setpoint;
            self.tas_setpoint = eas * eas_to_tas;
            self.tas_setpoint_adj = self.tas_setpoint;
            self.uncommanded_descent_recovery = false;
            self.ste_error = 0.0;
            self.ste_rate_error = 0.0;
            self.spe_estimate = 0.0;
            self.ske_estimate = 0.0;
            self.spe_rate = 0.0;
            self.ske_rate = 0.0;
            self.percent_undersped = 0.0;
            self.hgt_setpoint = baro_altitude;
            self.hgt_rate_setpoint = 0.0;

            self.reset_integrals();

            if self.dt > DT_MAX || self.dt < DT_MIN {
                self.dt = DT_DEFAULT;
            }

            self.reset_trajectory_generators(baro_altitude);

            self.ste_rate_error_filter
                .set_parameters(DT_DEFAULT, self.tuning.ste_rate_time_const);
            self.ste_rate_error_filter.reset(0.0);

            self.tas_rate_filter
                .set_parameters(DT_DEFAULT, self.tuning.speed_derivative_time_const);
            self.tas_rate_filter.reset(0.0);
        }

        self.states_initialized = true;
    }

    /// Zero both feedback integrators.
    pub fn reset_integrals(&mut self) {
        self.throttle_integ_state = 0.0;
        self.pitch_integ_state = 0.0;
    }

    /// Re-seat both reference trajectory generators at `altitude` with zero
    /// rate.
    pub fn reset_trajectory_generators(&mut self, altitude: f32) {
        self.alt_control_traj_generator.reset(altitude);
        self.velocity_control_traj_generator.reset(0.0, 0.0, altitude);
    }

    fn update_trajectory_constraints(&mut self) {
        let t = &self.tuning;

        self.alt_control_traj_generator.set_max_jerk(t.jerk_max);
        self.alt_control_traj_generator
            .set_max_accel(t.vert_accel_limit);
        self.alt_control_traj_generator
            .set_max_vel(t.max_climb_rate.max(t.max_sink_rate));

        self.velocity_control_traj_generator.set_max_jerk(t.jerk_max);
        self.velocity_control_traj_generator
            .set_max_accel_up(t.vert_accel_limit);
        self.velocity_control_traj_generator
            .set_max_accel_down(t.vert_accel_limit);
        // Fixed-wing convention swap: the climb-rate limit bounds braking
        // out of a sink and vice versa.
        self.velocity_control_traj_generator
            .set_max_vel_up(t.max_sink_rate);
        self.velocity_control_traj_generator
            .set_max_vel_down(t.max_climb_rate);
    }

    // -----------------------------------------------------------------------
    // Airspeed state estimation
    // -----------------------------------------------------------------------

    /// Second-order complementary filter fusing the airspeed measurement
    /// with the along-axis acceleration, critically damped at
    /// `tas_estimate_freq`.
    fn update_speed_states(&mut self, now_us: u64, eas_setpoint: f32, eas: f32, eas_to_tas: f32) {
        let dt = match self.speed_update_ts {
            Some(last) => ((now_us.saturating_sub(last)) as f32 * 1e-6).clamp(DT_MIN, DT_MAX),
            None => DT_MIN,
        };

        self.eas_setpoint = eas_setpoint;
        self.tas_setpoint = eas_setpoint * eas_to_tas;
        self.tas_min = self.tuning.equivalent_airspeed_min * eas_to_tas;
        self.tas_max = (self.tuning.equivalent_airspeed_max * eas_to_tas).max(self.tas_min);

        if self.speed_update_ts.is_none() {
            self.tas_rate_state = 0.0;
            self.tas_state = eas * eas_to_tas;
        }

        let freq = self.tuning.tas_estimate_freq;
        self.tas_innov = eas * eas_to_tas - self.tas_state;
        let tas_rate_state_input = self.tas_innov * freq * freq;

        self.tas_rate_state += tas_rate_state_input * dt;
        let tas_state_input = self.tas_rate_state + self.tas_rate_raw + self.tas_innov * freq * SQRT_2;
        let new_tas_state = self.tas_state + tas_state_input * dt;

        if new_tas_state < 0.0 {
            // Clip at zero and back-calculate the rate so the clipped
            // derivative stays self-consistent.
            let tas_state_input = -self.tas_state / dt;
            self.tas_rate_state =
                tas_state_input - self.tas_rate_raw - self.tas_innov * freq * SQRT_2;
            self.tas_state = 0.0;
        } else {
            self.tas_state = new_tas_state;
        }

        self.speed_update_ts = Some(now_us);
    }

    fn update_ste_rate_limits(&mut self) {
        // Climb rate at maximum throttle and sink rate at minimum throttle
        // bound the achievable total energy rate.
        self.ste_rate_max = self.tuning.max_climb_rate.max(f32::EPSILON) * ONE_G;
        self.ste_rate_min = -self.tuning.min_sink_rate.max(f32::EPSILON) * ONE_G;
    }

    // -----------------------------------------------------------------------
    // Mode detection
    // -----------------------------------------------------------------------

    fn detect_underspeed(&mut self) {
        if !self.detect_underspeed_enabled {
            self.percent_undersped = 0.0;
            return;
        }

        let tas_error_bound = TAS_ERROR_PERCENTAGE * self.tuning.equivalent_airspeed_trim;
        let tas_underspeed_soft_bound = TAS_ERROR_PERCENTAGE * self.tuning.equivalent_airspeed_trim;

        let tas_fully_undersped =
            (self.tas_min - tas_error_bound - tas_underspeed_soft_bound).max(0.0);
        let tas_starting_to_underspeed =
            (self.tas_min - tas_error_bound).max(tas_fully_undersped);

        self.percent_undersped = 1.0
            - ((self.tas_state - tas_fully_undersped)
                / (tas_starting_to_underspeed - tas_fully_undersped).max(f32::EPSILON))
            .clamp(0.0, 1.0);
    }

    /// Detects the condition where the demanded airspeed exceeds what the
    /// airframe can hold in level flight: total energy low and falling with
    /// the throttle already near the ceiling. Works on the previous step's
    /// energies and throttle, so the latch trails the condition by one
    /// step.
    fn detect_uncommanded_descent(&mut self) {
        let ste_rate = self.spe_rate + self.ske_rate;

        let underspeed_detected = self.percent_undersped > f32::EPSILON;

        let enter_mode = !self.uncommanded_descent_recovery
            && !underspeed_detected
            && self.ste_error > UNCOMMANDED_DESCENT_STE_ERROR
            && ste_rate < 0.0
            && self.last_throttle_setpoint >= self.throttle_setpoint_max * 0.9;

        let exit_mode = self.uncommanded_descent_recovery
            && (underspeed_detected || self.ste_error < 0.0);

        if enter_mode {
            self.uncommanded_descent_recovery = true;
        } else if exit_mode {
            self.uncommanded_descent_recovery = false;
        }
    }

    fn update_speed_height_weights(&mut self) {
        let mut pitch_speed_weight = self.tuning.pitch_speed_weight.clamp(0.0, 2.0);

        if self.climbout_mode_active && self.airspeed_active {
            pitch_speed_weight = 2.0;
        } else if self.percent_undersped > f32::EPSILON && self.airspeed_active {
            pitch_speed_weight = 2.0 * self.percent_undersped
                + (1.0 - self.percent_undersped) * pitch_speed_weight;
        } else if !self.airspeed_active {
            pitch_speed_weight = 0.0;
        }

        // Weights above one shorten the closed-loop time constant and can
        // destabilize the loop.
        self.spe_weighting = (2.0 - pitch_speed_weight).clamp(0.0, 1.0);
        self.ske_weighting = pitch_speed_weight.clamp(0.0, 1.0);
    }

    // -----------------------------------------------------------------------
    // Setpoint shaping
    // -----------------------------------------------------------------------

    fn update_speed_setpoint(&mut self) {
        // Demand the minimum airspeed while recovering from an underspeed
        // or an uncommanded descent to maximize the climb capability.
        if self.uncommanded_descent_recovery {
            self.tas_setpoint = self.tas_min;
        } else if self.percent_undersped > f32::EPSILON {
            self.tas_setpoint = self.tas_min * self.percent_undersped
                + (1.0 - self.percent_undersped) * self.tas_setpoint;
        }

        self.tas_setpoint = self.tas_setpoint.clamp(self.tas_min, self.tas_max);

        // Airspeed rate demand from physical limits, with 50% margin left
        // for the total energy loop.
        let denom = self.tas_state.max(f32::EPSILON);
        let max_tas_rate_sp = 0.5 * self.ste_rate_max / denom;
        let min_tas_rate_sp = 0.5 * self.ste_rate_min / denom;

        self.tas_setpoint_adj = self.tas_setpoint;

        self.tas_rate_setpoint = if self.airspeed_active {
            ((self.tas_setpoint_adj - self.tas_state) * self.tuning.airspeed_error_gain)
                .clamp(min_tas_rate_sp, max_tas_rate_sp)
        } else {
            // A constant rate demand with a locked airspeed estimate would
            // never decay.
            0.0
        };
    }

    fn calculate_height_rate_setpoint(
        &mut self,
        altitude_sp: f32,
        height_rate_sp: f32,
        target_climbrate: f32,
        target_sinkrate: f32,
        altitude: f32,
    ) {
        let input_is_height_rate = height_rate_sp.is_finite();

        self.velocity_control_traj_generator
            .set_vel_sp_feedback(self.hgt_rate_setpoint);

        let mut altitude_sp = altitude_sp;
        let control_altitude;

        if input_is_height_rate {
            self.velocity_control_traj_generator
                .set_current_position_estimate(altitude);
            self.velocity_control_traj_generator
                .update(self.dt, height_rate_sp);
            self.hgt_rate_setpoint = self.velocity_control_traj_generator.velocity();
            altitude_sp = self.velocity_control_traj_generator.position();
            control_altitude = altitude_sp.is_finite();
        } else {
            self.velocity_control_traj_generator
                .reset(0.0, self.hgt_rate_setpoint, self.hgt_setpoint);
            control_altitude = altitude_sp.is_finite();
        }

        if control_altitude {
            self.run_altitude_controller(altitude_sp, target_climbrate, target_sinkrate, altitude);
        } else {
            // Neither a usable altitude nor height rate demand: hold the
            // current altitude.
            self.alt_control_traj_generator
                .set_current_velocity(self.hgt_rate_setpoint);
            self.alt_control_traj_generator.set_current_position(altitude);
            self.hgt_setpoint = altitude;

            if !input_is_height_rate {
                self.hgt_rate_setpoint = 0.0;
            }
        }
    }

    fn run_altitude_controller(
        &mut self,
        altitude_sp: f32,
        target_climbrate: f32,
        target_sinkrate: f32,
        altitude: f32,
    ) {
        let target_climbrate = target_climbrate.min(self.tuning.max_climb_rate);
        let target_sinkrate = target_sinkrate.min(self.tuning.max_sink_rate);

        self.alt_control_traj_generator.track_position(
            self.dt,
            altitude_sp,
            target_climbrate,
            target_sinkrate,
        );

        self.hgt_setpoint = self.alt_control_traj_generator.position();
        self.hgt_rate_setpoint = ((self.hgt_setpoint - altitude) * self.tuning.height_error_gain
            + self.tuning.height_setpoint_gain_ff * self.alt_control_traj_generator.velocity())
        .clamp(-self.tuning.max_sink_rate, self.tuning.max_climb_rate);
    }

    // -----------------------------------------------------------------------
    // Energy bookkeeping
    // -----------------------------------------------------------------------

    fn seb_setpoint(&self) -> f32 {
        self.spe_setpoint * self.spe_weighting - self.ske_setpoint * self.ske_weighting
    }

    fn update_energy_estimates(&mut self) {
        // Demands in specific units (m^2/s^2).
        self.spe_setpoint = self.hgt_setpoint * ONE_G;
        self.ske_setpoint = 0.5 * self.tas_setpoint_adj * self.tas_setpoint_adj;

        // Errors are formed against the previous step's estimates before
        // those estimates are refreshed below; the descent detector depends
        // on that one-step lag.
        self.ste_error =
            self.spe_setpoint - self.spe_estimate + self.ske_setpoint - self.ske_estimate;

        self.seb_error = self.seb_setpoint()
            - (self.spe_estimate * self.spe_weighting - self.ske_estimate * self.ske_weighting);

        // Rate demands (m^2/s^3).
        self.spe_rate_setpoint = self.hgt_rate_setpoint * ONE_G;
        self.ske_rate_setpoint = self.tas_state * self.tas_rate_setpoint;

        // Estimates.
        self.spe_estimate = self.vert_pos_state * ONE_G;
        self.ske_estimate = 0.5 * self.tas_state * self.tas_state;

        self.spe_rate = self.vert_vel_state * ONE_G;
        self.ske_rate = self.tas_state * self.tas_rate_filtered;
    }

    // -----------------------------------------------------------------------
    // Throttle law
    // -----------------------------------------------------------------------

    fn update_throttle_setpoint(&mut self) {
        self.ste_rate_setpoint = self.spe_rate_setpoint + self.ske_rate_setpoint;

        // Filtered total energy rate error; the raw term carries
        // accelerometer noise through the kinetic rate estimate.
        self.ste_rate_error = self.ste_rate_error_filter.update(
            -self.spe_rate - self.ske_rate + self.spe_rate_setpoint + self.ske_rate_setpoint,
        );

        // Induced drag rises linearly with the extra normal load factor in
        // a turn.
        self.ste_rate_setpoint +=
            self.tuning.load_factor_correction * (self.load_factor - 1.0);

        self.ste_rate_setpoint = self
            .ste_rate_setpoint
            .clamp(self.ste_rate_min, self.ste_rate_max);

        // Predicted throttle: the maximum energy rate maps to full
        // throttle, zero to cruise, the minimum to idle.
        let throttle_predicted = if self.ste_rate_setpoint >= 0.0 {
            self.throttle_trim
                + self.ste_rate_setpoint / self.ste_rate_max
                    * (self.throttle_setpoint_max - self.throttle_trim)
        } else {
            self.throttle_trim
                + self.ste_rate_setpoint / self.ste_rate_min
                    * (self.throttle_setpoint_min - self.throttle_trim)
        };

        let ste_rate_to_throttle = 1.0 / (self.ste_rate_max - self.ste_rate_min);

        let mut throttle_setpoint =
            self.ste_rate_error * self.tuning.throttle_damping_gain * ste_rate_to_throttle
                + throttle_predicted;
        throttle_setpoint =
            throttle_setpoint.clamp(self.throttle_setpoint_min, self.throttle_setpoint_max);

        if self.airspeed_active {
            if self.tuning.integrator_gain_throttle > 0.0 {
                let integ_state_max = self.throttle_setpoint_max - throttle_setpoint;
                let integ_state_min = self.throttle_setpoint_min - throttle_setpoint;

                // Underspeed zeroes out the integration.
                let mut throttle_integ_input = self.ste_rate_error
                    * self.tuning.integrator_gain_throttle
                    * self.dt
                    * ste_rate_to_throttle
                    * (1.0 - self.percent_undersped);

                // Only integrate in the direction that unsaturates the
                // throttle.
                if self.throttle_integ_state > integ_state_max {
                    throttle_integ_input = throttle_integ_input.min(0.0);
                } else if self.throttle_integ_state < integ_state_min {
                    throttle_integ_input = throttle_integ_input.max(0.0);
                }

                self.throttle_integ_state += throttle_integ_input;

                if self.climbout_mode_active {
                    // Hold the integrator at the ceiling so the throttle
                    // does not dip when closed-loop control resumes after
                    // climbout.
                    self.throttle_integ_state = integ_state_max;
                }
            } else {
                self.throttle_integ_state = 0.0;
            }

            throttle_setpoint += self.throttle_integ_state;
        } else {
            // Without airspeed feedback only the predicted throttle is
            // usable.
            throttle_setpoint = throttle_predicted;
            self.throttle_integ_state = 0.0;
        }

        // Ramp in the maximum throttle with the underspeediness.
        throttle_setpoint = self.percent_undersped * self.throttle_setpoint_max
            + (1.0 - self.percent_undersped) * throttle_setpoint;

        if fabsf(self.tuning.throttle_slewrate) > 0.01 {
            let throttle_increment_limit = self.dt
                * (self.throttle_setpoint_max - self.throttle_setpoint_min)
                * fabsf(self.tuning.throttle_slewrate);
            throttle_setpoint = throttle_setpoint.clamp(
                self.last_throttle_setpoint - throttle_increment_limit,
                self.last_throttle_setpoint + throttle_increment_limit,
            );
        }

        self.last_throttle_setpoint =
            throttle_setpoint.clamp(self.throttle_setpoint_min, self.throttle_setpoint_max);
    }

    // -----------------------------------------------------------------------
    // Pitch law
    // -----------------------------------------------------------------------

    fn update_pitch_setpoint(&mut self) {
        let seb_rate_setpoint = self.spe_rate_setpoint * self.spe_weighting
            - self.ske_rate_setpoint * self.ske_weighting;

        self.seb_rate_error = seb_rate_setpoint
            - (self.spe_rate * self.spe_weighting - self.ske_rate * self.ske_weighting);

        // Small-angle map from flight path angle to energy balance rate.
        // Guarded so a zero airspeed state cannot produce a division by
        // zero further down.
        let climb_angle_to_seb_rate = self.tas_state.max(f32::EPSILON) * ONE_G;

        if self.tuning.integrator_gain_pitch > 0.0 {
            let mut pitch_integ_input = self.seb_rate_error * self.tuning.integrator_gain_pitch;

            // Keep the integrator from pushing further into saturation of
            // the unconstrained setpoint.
            if self.pitch_setpoint_unc > self.pitch_setpoint_max {
                pitch_integ_input = pitch_integ_input.min(0.0);
            } else if self.pitch_setpoint_unc < self.pitch_setpoint_min {
                pitch_integ_input = pitch_integ_input.max(0.0);
            }

            self.pitch_integ_state += pitch_integ_input * self.dt;
        } else {
            self.pitch_integ_state = 0.0;
        }

        let mut seb_rate_correction = self.seb_rate_error * self.tuning.pitch_damping_gain
            + self.pitch_integ_state
            + self.tuning.seb_rate_ff * seb_rate_setpoint;

        // During climbout a zero speed error must map to the floor pitch,
        // so the nose can be held up without waiting for the integrator.
        if self.climbout_mode_active {
            seb_rate_correction += self.pitch_setpoint_min * climb_angle_to_seb_rate;
        }

        self.pitch_setpoint_unc = seb_rate_correction / climb_angle_to_seb_rate;

        let pitch_setpoint = self
            .pitch_setpoint_unc
            .clamp(self.pitch_setpoint_min, self.pitch_setpoint_max);

        // Vertical acceleration limit expressed as a pitch rate bound. At
        // very low airspeed the bound opens up.
        let pitch_increment =
            self.dt * self.tuning.vert_accel_limit / self.tas_state.max(f32::EPSILON);
        self.last_pitch_setpoint = pitch_setpoint.clamp(
            self.last_pitch_setpoint - pitch_increment,
            self.last_pitch_setpoint + pitch_increment,
        );
    }

    // -----------------------------------------------------------------------
    // Host inputs & outputs
    // -----------------------------------------------------------------------

    /// Normal load factor used for the turn drag compensation. The core
    /// never updates this; a host that stops writing it flies with stale
    /// compensation.
    pub fn set_load_factor(&mut self, load_factor: f32) {
        self.load_factor = load_factor;
    }

    /// Enable or disable the airspeed feedback paths. Disabled, the
    /// airspeed estimate locks to the trim speed and the throttle falls
    /// back to its feedforward prediction.
    pub fn set_airspeed_enabled(&mut self, enabled: bool) {
        self.airspeed_enabled = enabled;
    }

    /// Enable or disable the underspeed ramp.
    pub fn set_detect_underspeed_enabled(&mut self, enabled: bool) {
        self.detect_underspeed_enabled = enabled;
    }

    pub fn throttle_setpoint(&self) -> f32 {
        self.last_throttle_setpoint
    }

    pub fn pitch_setpoint(&self) -> f32 {
        self.last_pitch_setpoint
    }

    pub fn mode(&self) -> TecsMode {
        self.tecs_mode
    }

    pub fn eas_setpoint(&self) -> f32 {
        self.eas_setpoint
    }

    pub fn tas_state(&self) -> f32 {
        self.tas_state
    }

    pub fn tas_setpoint_adj(&self) -> f32 {
        self.tas_setpoint_adj
    }

    pub fn hgt_setpoint(&self) -> f32 {
        self.hgt_setpoint
    }

    pub fn hgt_rate_setpoint(&self) -> f32 {
        self.hgt_rate_setpoint
    }

    pub fn percent_undersped(&self) -> f32 {
        self.percent_undersped
    }

    pub fn uncommanded_descent(&self) -> bool {
        self.uncommanded_descent_recovery
    }

    pub fn spe_weighting(&self) -> f32 {
        self.spe_weighting
    }

    pub fn ske_weighting(&self) -> f32 {
        self.ske_weighting
    }

    pub fn ste_error(&self) -> f32 {
        self.ste_error
    }

    pub fn seb_error(&self) -> f32 {
        self.seb_error
    }

    /// Internal signals for host-side logging.
    pub fn diagnostics(&self) -> TecsDiagnostics {
        TecsDiagnostics {
            tas_state: self.tas_state,
            tas_rate_state: self.tas_rate_state,
            tas_innovation: self.tas_innov,
            tas_setpoint_adj: self.tas_setpoint_adj,
            tas_rate_setpoint: self.tas_rate_setpoint,
            hgt_setpoint: self.hgt_setpoint,
            hgt_rate_setpoint: self.hgt_rate_setpoint,
            spe_estimate: self.spe_estimate,
            ske_estimate: self.ske_estimate,
            spe_rate: self.spe_rate,
            ske_rate: self.ske_rate,
            ste_error: self.ste_error,
            ste_rate_error: self.ste_rate_error,
            seb_error: self.seb_error,
            seb_rate_error: self.seb_rate_error,
            throttle_integ: self.throttle_integ_state,
            pitch_integ: self.pitch_integ_state,
            percent_undersped: self.percent_undersped,
        }
    }
}
