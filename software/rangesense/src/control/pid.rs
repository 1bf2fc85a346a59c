//! A PID controller with simple saturation for anti-windup

use serde::{Deserialize, Serialize};

/// Stateful PID compute step with integrator clamping and
/// derivative-on-measurement.
///
/// The controller holds no notion of time: the integral and derivative
/// terms are per-call, so the caller must run `update` at a consistent
/// cadence appropriate to the controlled process. It is not internally
/// synchronized; one control loop owns it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PidControl {
    p_gain: f64,
    i_gain: f64,
    d_gain: f64,

    /// Integrator state, clamped to `[i_min, i_max]` after every update
    i_state: f64,
    /// Previous position input, for the derivative-on-measurement term
    d_state: f64,

    i_min: f64,
    i_max: f64,
}

impl Default for PidControl {
    /// Zeroed gains and state, with permissive integrator limits until
    /// they are set explicitly.
    fn default() -> Self {
        Self {
            p_gain: 0.0,
            i_gain: 0.0,
            d_gain: 0.0,
            i_state: 0.0,
            d_state: 0.0,
            i_min: f64::NEG_INFINITY,
            i_max: f64::INFINITY,
        }
    }
}

impl PidControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the proportional, integral, and derivative gains.
    ///
    /// No validation; effective from the next `update`.
    pub fn set_pid_gains(&mut self, p_gain: f64, i_gain: f64, d_gain: f64) {
        self.p_gain = p_gain;
        self.i_gain = i_gain;
        self.d_gain = d_gain;
    }

    /// Set the lower and upper integrator clamp bounds.
    ///
    /// The caller is responsible for `i_min <= i_max`.
    pub fn set_integrator_limits(&mut self, i_min: f64, i_max: f64) {
        self.i_min = i_min;
        self.i_max = i_max;
    }

    /// Get the next control output given the error signal and the current
    /// measured position.
    ///
    /// The derivative acts on the measurement rather than the error so that
    /// setpoint steps do not produce a derivative kick.
    pub fn update(&mut self, error: f64, position: f64) -> f64 {
        let p_term = self.p_gain * error;

        // Anti-windup saturation
        self.i_state += self.i_gain * error;
        self.i_state = self.i_state.max(self.i_min).min(self.i_max);

        let d_term = -self.d_gain * (position - self.d_state);
        self.d_state = position;

        p_term + self.i_state + d_term
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only_scales_error() {
        let mut pid = PidControl::new();
        pid.set_pid_gains(2.0, 0.0, 0.0);
        assert_eq!(pid.update(3.0, 0.0), 6.0);
        assert_eq!(pid.update(-1.5, 0.0), -3.0);
    }

    #[test]
    fn integrator_saturates_at_the_clamp() {
        let mut pid = PidControl::new();
        pid.set_pid_gains(0.0, 5.0, 0.0);
        pid.set_integrator_limits(-10.0, 10.0);

        // Sustained large error: the integrator must pin to the clamp
        // rather than winding up
        for _ in 0..20 {
            let out = pid.update(100.0, 0.0);
            assert!(out <= 10.0);
        }
        assert_eq!(pid.update(100.0, 0.0), 10.0);

        // Symmetric behavior on the low side
        for _ in 0..20 {
            pid.update(-100.0, 0.0);
        }
        assert_eq!(pid.update(-100.0, 0.0), -10.0);
    }

    #[test]
    fn clamp_leaves_p_and_d_terms_unaffected() {
        let mut pid = PidControl::new();
        pid.set_pid_gains(1.0, 5.0, 1.0);
        pid.set_integrator_limits(-10.0, 10.0);

        pid.update(100.0, 0.0);
        // Integrator is pinned at 10; P contributes 100, D contributes
        // -(1.0 - 0.0) for the position step
        let out = pid.update(100.0, 1.0);
        assert_eq!(out, 100.0 + 10.0 - 1.0);
    }

    #[test]
    fn derivative_acts_on_measurement_not_error() {
        let mut pid = PidControl::new();
        pid.set_pid_gains(0.0, 0.0, 1.0);

        let first = pid.update(4.0, 2.0);
        let second = pid.update(4.0, 3.0);
        // Identical error both calls: the whole difference is the
        // derivative of the position, negated
        assert_eq!(first, -2.0);
        assert_eq!(second, -1.0);
    }

    #[test]
    fn limits_default_permissive() {
        let mut pid = PidControl::new();
        pid.set_pid_gains(0.0, 1.0, 0.0);
        for _ in 0..1000 {
            pid.update(1e6, 0.0);
        }
        // No clamp has been set, so the integrator is free to grow
        assert_eq!(pid.update(0.0, 0.0), 1e9);
    }

    #[test]
    fn state_persists_across_gain_changes() {
        let mut pid = PidControl::new();
        pid.set_pid_gains(0.0, 1.0, 0.0);
        pid.update(5.0, 0.0);

        // Changing gains must not reset the integrator or position state
        pid.set_pid_gains(1.0, 0.0, 0.0);
        assert_eq!(pid.update(2.0, 0.0), 2.0 + 5.0);
    }
}
