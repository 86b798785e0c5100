//! Jerk-limited trajectory generation for the altitude and height-rate
//! reference paths.
//!
//! Both generators own a `(position, velocity, acceleration)` triple and
//! advance it with bounded jerk, so the references handed to the energy
//! loops are twice differentiable. The velocity generator carries
//! asymmetric limits selected by the current direction of motion and only
//! publishes a position once the rate demand has been released and the
//! profile has come to rest; the altitude generator brakes toward a
//! position target using the jerk-refined stopping-speed solution.

use libm::{fabsf, sqrtf};

fn sign_no_zero(v: f32) -> f32 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Maximum speed from which the vehicle can still brake to `final_speed`
/// within `braking_distance`, given acceleration and jerk limits.
///
/// Solves the constant-jerk braking profile; as `jerk` grows the result
/// approaches the familiar `sqrt(2 * accel * distance)` solution.
pub fn max_speed_from_distance(jerk: f32, accel: f32, braking_distance: f32, final_speed: f32) -> f32 {
    let jerk = jerk.max(f32::EPSILON);
    let b = 4.0 * accel * accel / jerk;
    let c = -2.0 * accel * braking_distance - final_speed * final_speed;
    let max_speed = 0.5 * (-b + sqrtf(b * b - 4.0 * c));

    max_speed.max(final_speed)
}

/// One jerk-limited integration step of `(accel, vel)` toward a velocity
/// setpoint.
///
/// The commanded acceleration is the largest one that can still be ramped
/// back to zero with the available jerk by the time the velocity error is
/// consumed, which is what produces the S-shaped velocity profile.
fn advance_velocity(
    accel: &mut f32,
    vel: &mut f32,
    dt: f32,
    vel_sp: f32,
    max_jerk: f32,
    max_accel: f32,
    max_vel: f32,
) {
    let vel_sp = vel_sp.clamp(-max_vel, max_vel);
    let delta_v = vel_sp - *vel;

    let mut accel_des = sign_no_zero(delta_v) * sqrtf(2.0 * max_jerk * fabsf(delta_v));
    accel_des = accel_des.clamp(-max_accel, max_accel);

    let max_delta_accel = max_jerk * dt;
    *accel += (accel_des - *accel).clamp(-max_delta_accel, max_delta_accel);

    *vel = (*vel + *accel * dt).clamp(-max_vel, max_vel);
}

// ---------------------------------------------------------------------------
// Velocity generator
// ---------------------------------------------------------------------------

/// Velocity below which the profile counts as at rest for position locking
/// (m/s, also used for acceleration in m/s^2).
const POSITION_LOCK_THRESHOLD: f32 = 0.1;

/// Rate-controlled smoothing generator with asymmetric limits.
///
/// While a rate is actively demanded the generator exposes no position
/// (`position()` is NaN) and the consumer is expected to hold against the
/// vehicle's own altitude. Once the demand drops to zero and the profile
/// has come to rest, the position locks onto the injected estimate so the
/// consumer can capture the altitude reached.
///
/// The limit naming follows the multicopter NED convention: the "up" caps
/// apply while the integrated velocity is negative. Fed with up-positive
/// height rates, as the controller does, a negative velocity means the
/// vehicle is sinking, so the sink-rate cap must be installed as the "up"
/// velocity limit and the climb-rate cap as the "down" limit.
#[derive(Debug, Clone, Copy)]
pub struct VelocitySmoothing {
    max_jerk: f32,
    max_accel_up: f32,
    max_accel_down: f32,
    max_vel_up: f32,
    max_vel_down: f32,

    accel: f32,
    vel: f32,
    position_locked: f32,
    position_estimate: f32,
}

impl Default for VelocitySmoothing {
    fn default() -> Self {
        Self {
            max_jerk: 1000.0,
            max_accel_up: 5.0,
            max_accel_down: 5.0,
            max_vel_up: 5.0,
            max_vel_down: 5.0,
            accel: 0.0,
            vel: 0.0,
            position_locked: f32::NAN,
            position_estimate: f32::NAN,
        }
    }
}

impl VelocitySmoothing {
    pub fn set_max_jerk(&mut self, max_jerk: f32) {
        self.max_jerk = max_jerk.max(f32::EPSILON);
    }

    pub fn set_max_accel_up(&mut self, max_accel: f32) {
        self.max_accel_up = max_accel.max(0.0);
    }

    pub fn set_max_accel_down(&mut self, max_accel: f32) {
        self.max_accel_down = max_accel.max(0.0);
    }

    pub fn set_max_vel_up(&mut self, max_vel: f32) {
        self.max_vel_up = max_vel.max(0.0);
    }

    pub fn set_max_vel_down(&mut self, max_vel: f32) {
        self.max_vel_down = max_vel.max(0.0);
    }

    /// Re-synchronize the internal velocity with the setpoint the consumer
    /// actually published last step, so an externally clamped setpoint does
    /// not wind up the generator.
    pub fn set_vel_sp_feedback(&mut self, vel_sp: f32) {
        self.vel = vel_sp;
    }

    /// Inject the current altitude estimate; this is the value the position
    /// output locks onto when the rate demand is released.
    pub fn set_current_position_estimate(&mut self, pos: f32) {
        self.position_estimate = pos;
    }

    /// Advance one step toward `vel_sp`.
    pub fn update(&mut self, dt: f32, vel_sp: f32) {
        self.check_position_lock(vel_sp);

        // Constraint selection by direction of motion (see type docs).
        let (max_accel, max_vel) = if self.vel < 0.0 {
            (self.max_accel_up, self.max_vel_up)
        } else {
            (self.max_accel_down, self.max_vel_down)
        };

        advance_velocity(
            &mut self.accel,
            &mut self.vel,
            dt,
            vel_sp,
            self.max_jerk,
            max_accel,
            max_vel,
        );
    }

    fn check_position_lock(&mut self, vel_sp: f32) {
        let at_rest = fabsf(self.accel) < POSITION_LOCK_THRESHOLD
            && fabsf(self.vel) < POSITION_LOCK_THRESHOLD
            && fabsf(vel_sp) < f32::EPSILON;

        if at_rest {
            if !self.position_locked.is_finite() {
                self.position_locked = self.position_estimate;
            }
        } else {
            self.position_locked = f32::NAN;
        }
    }

    /// Seed the profile state; the given position is treated as locked.
    pub fn reset(&mut self, accel: f32, vel: f32, pos: f32) {
        self.accel = accel;
        self.vel = vel;
        self.position_locked = pos;
    }

    pub fn velocity(&self) -> f32 {
        self.vel
    }

    /// Locked position, NaN while a rate is actively tracked.
    pub fn position(&self) -> f32 {
        self.position_locked
    }

    pub fn acceleration(&self) -> f32 {
        self.accel
    }
}

// ---------------------------------------------------------------------------
// Altitude generator
// ---------------------------------------------------------------------------

/// Position-controlled smoothing generator.
///
/// Each step computes the largest signed velocity that still permits
/// braking to a stop at the target altitude, clamps it to the caller's
/// climb/sink envelope, and integrates it through the jerk-limited core.
#[derive(Debug, Clone, Copy)]
pub struct AltitudeTrajectory {
    max_jerk: f32,
    max_accel: f32,
    max_vel: f32,

    accel: f32,
    vel: f32,
    pos: f32,
}

impl Default for AltitudeTrajectory {
    fn default() -> Self {
        Self {
            max_jerk: 1000.0,
            max_accel: 5.0,
            max_vel: 5.0,
            accel: 0.0,
            vel: 0.0,
            pos: 0.0,
        }
    }
}

impl AltitudeTrajectory {
    pub fn set_max_jerk(&mut self, max_jerk: f32) {
        self.max_jerk = max_jerk.max(f32::EPSILON);
    }

    pub fn set_max_accel(&mut self, max_accel: f32) {
        self.max_accel = max_accel.max(0.0);
    }

    pub fn set_max_vel(&mut self, max_vel: f32) {
        self.max_vel = max_vel.max(0.0);
    }

    /// Advance one step toward the altitude target `pos_sp`, with climb and
    /// sink rates additionally bounded by `target_climbrate` and
    /// `target_sinkrate` (both positive).
    pub fn track_position(
        &mut self,
        dt: f32,
        pos_sp: f32,
        target_climbrate: f32,
        target_sinkrate: f32,
    ) {
        let delta = pos_sp - self.pos;
        let vel_target = sign_no_zero(delta)
            * max_speed_from_distance(self.max_jerk, self.max_accel, fabsf(delta), 0.0);
        let vel_target = vel_target.clamp(-target_sinkrate.max(0.0), target_climbrate.max(0.0));

        advance_velocity(
            &mut self.accel,
            &mut self.vel,
            dt,
            vel_target,
            self.max_jerk,
            self.max_accel,
            self.max_vel,
        );
        self.pos += self.vel * dt;
    }

    pub fn set_current_velocity(&mut self, vel: f32) {
        self.vel = vel;
    }

    pub fn set_current_position(&mut self, pos: f32) {
        self.pos = pos;
    }

    pub fn reset(&mut self, pos: f32) {
        self.accel = 0.0;
        self.vel = 0.0;
        self.pos = pos;
    }

    pub fn velocity(&self) -> f32 {
        self.vel
    }

    pub fn position(&self) -> f32 {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_max_speed_reduces_to_kinematic_solution() {
        // With effectively unlimited jerk the braking solution approaches
        // sqrt(2 * a * d).
        let v = max_speed_from_distance(1.0e6, 5.0, 40.0, 0.0);
        assert_relative_eq!(v, (2.0f32 * 5.0 * 40.0).sqrt(), max_relative = 1e-2);
    }

    #[test]
    fn test_max_speed_respects_final_speed_floor() {
        let v = max_speed_from_distance(8.0, 5.0, 0.0, 3.0);
        assert!(v >= 3.0);
    }

    #[test]
    fn test_max_speed_shrinks_with_jerk() {
        let fast = max_speed_from_distance(1000.0, 5.0, 10.0, 0.0);
        let slow = max_speed_from_distance(2.0, 5.0, 10.0, 0.0);
        assert!(slow < fast);
    }

    #[test]
    fn test_velocity_smoothing_converges_and_respects_limits() {
        let mut gen = VelocitySmoothing::default();
        gen.set_max_jerk(8.0);
        gen.set_max_accel_down(3.0);
        gen.set_max_vel_down(4.0);
        gen.reset(0.0, 0.0, 0.0);

        let dt = 0.02;
        let mut prev_accel = 0.0;
        for _ in 0..500 {
            gen.update(dt, 10.0); // above the cap on purpose
            assert!(gen.velocity() <= 4.0 + 1e-3);
            assert!(gen.acceleration().abs() <= 3.0 + 1e-3);
            // jerk bound between consecutive steps
            assert!((gen.acceleration() - prev_accel).abs() <= 8.0 * dt + 1e-4);
            prev_accel = gen.acceleration();
        }
        assert_relative_eq!(gen.velocity(), 4.0, epsilon = 0.05);
    }

    #[test]
    fn test_velocity_smoothing_selects_up_caps_while_sinking() {
        let mut gen = VelocitySmoothing::default();
        gen.set_max_jerk(50.0);
        gen.set_max_vel_up(2.0); // sink-rate cap in the controller's wiring
        gen.set_max_vel_down(6.0);
        gen.reset(0.0, -1.0, 0.0);

        for _ in 0..500 {
            gen.update(0.02, -10.0);
        }
        assert_relative_eq!(gen.velocity(), -2.0, epsilon = 0.05);
    }

    #[test]
    fn test_position_unlocks_while_tracking_a_rate() {
        let mut gen = VelocitySmoothing::default();
        gen.reset(0.0, 0.0, 120.0);
        assert_relative_eq!(gen.position(), 120.0);

        gen.set_current_position_estimate(120.0);
        gen.update(0.02, 3.0);
        assert!(gen.position().is_nan());
    }

    #[test]
    fn test_position_locks_on_estimate_when_demand_released() {
        let mut gen = VelocitySmoothing::default();
        gen.set_max_jerk(20.0);
        gen.reset(0.0, 0.0, 100.0);

        // Climb for a while, then release the demand.
        let mut altitude = 100.0;
        for _ in 0..100 {
            gen.set_current_position_estimate(altitude);
            gen.update(0.02, 2.0);
            altitude += gen.velocity() * 0.02;
        }
        assert!(gen.position().is_nan());

        for _ in 0..200 {
            gen.set_current_position_estimate(altitude);
            gen.update(0.02, 0.0);
            altitude += gen.velocity() * 0.02;
        }
        // At rest again: the position output captured the altitude reached.
        assert_relative_eq!(gen.position(), altitude, epsilon = 0.5);
    }

    #[test]
    fn test_velocity_feedback_resync() {
        let mut gen = VelocitySmoothing::default();
        gen.reset(0.0, 3.0, 100.0);
        gen.set_vel_sp_feedback(1.5);
        assert_relative_eq!(gen.velocity(), 1.5);
    }

    #[test]
    fn test_altitude_trajectory_settles_on_target() {
        let mut gen = AltitudeTrajectory::default();
        gen.set_max_jerk(8.0);
        gen.set_max_accel(5.0);
        gen.set_max_vel(5.0);
        gen.reset(100.0);

        let dt = 0.02;
        for _ in 0..3000 {
            gen.track_position(dt, 120.0, 3.0, 2.0);
            assert!(gen.velocity() <= 3.0 + 1e-3);
            assert!(gen.velocity() >= -2.0 - 1e-3);
        }
        assert_relative_eq!(gen.position(), 120.0, epsilon = 0.2);
        assert_relative_eq!(gen.velocity(), 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_altitude_trajectory_descends_within_sink_envelope() {
        let mut gen = AltitudeTrajectory::default();
        gen.set_max_jerk(8.0);
        gen.set_max_accel(5.0);
        gen.set_max_vel(5.0);
        gen.reset(150.0);

        for _ in 0..3000 {
            gen.track_position(0.02, 100.0, 3.0, 2.5);
            assert!(gen.velocity() >= -2.5 - 1e-3);
        }
        assert_relative_eq!(gen.position(), 100.0, epsilon = 0.2);
    }
}
