//! Point source with a Ricker wavelet time function

use crate::error::{Result, SimulationError};
use std::f64::consts::PI;

/// Force components at the source node for one step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceForce {
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
}

/// Single-node transient source.
///
/// The time function is a Ricker wavelet delayed by `t0 = 1.2 / f0` so that
/// it starts close to zero:
///
/// `w(t) = A (1 - 2a(t - t0)^2) exp(-a(t - t0)^2)`, with `a = (pi f0)^2`.
///
/// Step `n` (1-based) samples the wavelet at `t = (n - 1) dt`. The force is
/// split with a fixed angle `theta` as `(sin theta, cos theta, sin theta) w`;
/// x and z share the same factor.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceModel {
    position: [usize; 3],
    frequency: f64,
    amplitude: f64,
    angle_deg: f64,
}

impl SourceModel {
    pub fn new(
        position: [usize; 3],
        frequency: f64,
        amplitude: f64,
        angle_deg: f64,
    ) -> Result<Self> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(SimulationError::config(format!(
                "source frequency must be positive, got {frequency}"
            )));
        }
        if !amplitude.is_finite() {
            return Err(SimulationError::config("source amplitude must be finite"));
        }
        if !angle_deg.is_finite() {
            return Err(SimulationError::config("source angle must be finite"));
        }
        Ok(Self {
            position,
            frequency,
            amplitude,
            angle_deg,
        })
    }

    pub fn position(&self) -> [usize; 3] {
        self.position
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    /// Wavelet delay `t0`
    pub fn delay(&self) -> f64 {
        1.2 / self.frequency
    }

    /// Simulated time sampled by a 1-based step
    pub fn time_at(step: usize, dt: f64) -> f64 {
        (step as f64 - 1.0) * dt
    }

    /// Ricker wavelet value at time `t`
    pub fn wavelet(&self, t: f64) -> f64 {
        let a = (PI * self.frequency).powi(2);
        let tau = t - self.delay();
        let arg = a * tau * tau;
        self.amplitude * (1.0 - 2.0 * arg) * (-arg).exp()
    }

    /// Force components for a 1-based step
    pub fn evaluate(&self, step: usize, dt: f64) -> SourceForce {
        let w = self.wavelet(Self::time_at(step, dt));
        let theta = self.angle_deg.to_radians();
        SourceForce {
            fx: theta.sin() * w,
            fy: theta.cos() * w,
            fz: theta.sin() * w,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn reference() -> SourceModel {
        SourceModel::new([12, 12, 12], 70.0, 1e10, 90.0).unwrap()
    }

    #[test]
    fn test_peak_equals_amplitude() {
        let src = reference();
        assert_relative_eq!(src.wavelet(src.delay()), 1e10);
    }

    #[test]
    fn test_wavelet_symmetric_about_delay() {
        let src = reference();
        let t0 = src.delay();
        for tau in [0.001, 0.004, 0.01, 0.03] {
            assert_relative_eq!(
                src.wavelet(t0 + tau),
                src.wavelet(t0 - tau),
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn test_step_one_is_time_zero() {
        let src = reference();
        let dt = 1e-3;
        assert_eq!(SourceModel::time_at(1, dt), 0.0);
        let f = src.evaluate(1, dt);
        assert_relative_eq!(f.fx, src.wavelet(0.0));
    }

    #[test]
    fn test_angle_decomposition() {
        let src = SourceModel::new([1, 1, 1], 10.0, 2.0, 30.0).unwrap();
        let dt = src.delay() / 4.0;
        let f = src.evaluate(5, dt);
        assert_relative_eq!(f.fx, 0.5 * 2.0, max_relative = 1e-12);
        assert_relative_eq!(f.fy, 3f64.sqrt() / 2.0 * 2.0, max_relative = 1e-12);
        // x and z use the same sin(theta) factor
        assert_eq!(f.fx, f.fz);

        let vertical = reference().evaluate(3, 1e-3);
        assert_abs_diff_eq!(vertical.fy / vertical.fx, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(SourceModel::new([0, 0, 0], 0.0, 1.0, 0.0).is_err());
        assert!(SourceModel::new([0, 0, 0], 1.0, f64::NAN, 0.0).is_err());
    }
}
