//! Stability and resolution helpers for time-domain runs

pub mod snapshot;

pub use snapshot::{
    create_sink, MatlabSnapshotSink, MemorySnapshotSink, NullSnapshotSink, SnapshotFormat,
    SnapshotSink,
};

/// Slack allowed above a Courant number of one; `dt = h / c` lands on 1.0
/// up to rounding
pub const CFL_TOLERANCE: f64 = 1e-12;

/// Courant number `c_max * dt / h_min`
pub fn cfl_number(max_velocity: f64, dt: f64, min_spacing: f64) -> f64 {
    max_velocity * dt / min_spacing
}

/// True when the Courant number does not exceed one
pub fn cfl_satisfied(cfl: f64) -> bool {
    cfl <= 1.0 + CFL_TOLERANCE
}

/// Largest timestep with Courant number one
pub fn stable_dt(min_spacing: f64, max_velocity: f64) -> f64 {
    min_spacing / max_velocity
}

/// Number of steps covering `tmax`, `floor(tmax / dt)`.
///
/// A quotient within 1e-9 of the next integer counts as that integer.
pub fn step_count(tmax: f64, dt: f64) -> usize {
    let ratio = tmax / dt;
    let nearest = ratio.round();
    if (ratio - nearest).abs() < 1e-9 {
        nearest as usize
    } else {
        ratio.floor() as usize
    }
}

/// Longest wavelength `c_max / f0`
pub fn max_wavelength(max_velocity: f64, frequency: f64) -> f64 {
    max_velocity / frequency
}

/// Grid points per longest wavelength
pub fn points_per_wavelength(max_velocity: f64, frequency: f64, spacing: f64) -> f64 {
    max_wavelength(max_velocity, frequency) / spacing
}
