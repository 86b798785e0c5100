// ---------------------------------------------------------------------------
// First-order IIR low-pass
// ---------------------------------------------------------------------------

/// Discrete first-order low-pass filter (alpha filter).
///
/// The smoothing factor is derived from the sample interval and the desired
/// time constant, `alpha = dt / (tau + dt)`, so a step input reaches ~63% of
/// its final value after `tau` seconds of samples.
#[derive(Debug, Clone, Copy)]
pub struct FirstOrderLpf {
    alpha: f32,
    state: f32,
}

impl Default for FirstOrderLpf {
    fn default() -> Self {
        Self::new()
    }
}

impl FirstOrderLpf {
    /// Create a pass-through filter (unit alpha, zero state).
    pub const fn new() -> Self {
        Self {
            alpha: 1.0,
            state: 0.0,
        }
    }

    /// Recompute the smoothing factor from a sample interval and time
    /// constant, both in seconds. A non-positive time constant degrades to
    /// pass-through.
    pub fn set_parameters(&mut self, sample_interval: f32, time_constant: f32) {
        let denom = time_constant + sample_interval;
        if denom > f32::EPSILON {
            self.alpha = sample_interval / denom;
        } else {
            self.alpha = 1.0;
        }
    }

    /// Feed one sample, returning the new filter state.
    pub fn update(&mut self, sample: f32) -> f32 {
        self.state += self.alpha * (sample - self.state);
        self.state
    }

    /// Force the filter state to a value.
    pub fn reset(&mut self, value: f32) {
        self.state = value;
    }

    /// Current filter state.
    pub fn state(&self) -> f32 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_passthrough_by_default() {
        let mut lpf = FirstOrderLpf::new();
        assert_relative_eq!(lpf.update(3.5), 3.5);
        assert_relative_eq!(lpf.update(-1.0), -1.0);
    }

    #[test]
    fn test_step_response_time_constant() {
        let dt = 0.02;
        let tau = 0.5;
        let mut lpf = FirstOrderLpf::new();
        lpf.set_parameters(dt, tau);
        lpf.reset(0.0);

        // After tau seconds of samples the state should be near 1 - 1/e.
        let steps = (tau / dt) as usize;
        let mut out = 0.0;
        for _ in 0..steps {
            out = lpf.update(1.0);
        }
        assert!(out > 0.55 && out < 0.70, "step response {out} out of band");
    }

    #[test]
    fn test_reset_overrides_state() {
        let mut lpf = FirstOrderLpf::new();
        lpf.set_parameters(0.02, 0.5);
        for _ in 0..100 {
            lpf.update(10.0);
        }
        lpf.reset(0.0);
        assert_relative_eq!(lpf.state(), 0.0);
    }
}
