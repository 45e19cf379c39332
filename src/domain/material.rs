//! Per-node material fields
//!
//! Two co-located scalar fields: a stencil coefficient and a density. How
//! the coefficient relates to the local wave speed depends on the
//! [`CoefficientModel`]. By default the coefficient is the wave speed itself
//! and enters the operator as `c·dt²/ρ`.

use crate::engine::array::WaveArray;
use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};

/// Meaning of the stencil coefficient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoefficientModel {
    /// Coefficient is the wave speed
    #[default]
    Velocity,
    /// Coefficient is an elastic modulus `ρc²`
    Modulus,
}

impl CoefficientModel {
    /// Coefficient giving wave speed `velocity` at `density`
    pub fn coefficient(self, velocity: f64, density: f64) -> f64 {
        match self {
            CoefficientModel::Velocity => velocity,
            CoefficientModel::Modulus => density * velocity * velocity,
        }
    }

    /// Wave speed of a node carrying `coefficient` and `density`
    pub fn wave_speed(self, coefficient: f64, density: f64) -> f64 {
        match self {
            CoefficientModel::Velocity => coefficient,
            CoefficientModel::Modulus => (coefficient / density).sqrt(),
        }
    }
}

impl std::fmt::Display for CoefficientModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoefficientModel::Velocity => write!(f, "velocity"),
            CoefficientModel::Modulus => write!(f, "modulus"),
        }
    }
}

impl std::str::FromStr for CoefficientModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "velocity" => Ok(CoefficientModel::Velocity),
            "modulus" => Ok(CoefficientModel::Modulus),
            other => Err(format!("unknown coefficient model '{other}'")),
        }
    }
}

/// Stencil coefficient and density sampled at every grid node
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialField {
    stiffness: WaveArray<f64>,
    density: WaveArray<f64>,
    model: CoefficientModel,
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulationError::config(format!(
            "{name} must be strictly positive, got {value}"
        )))
    }
}

impl MaterialField {
    /// Homogeneous material
    pub fn constant(
        shape: (usize, usize, usize),
        stiffness: f64,
        density: f64,
        model: CoefficientModel,
    ) -> Result<Self> {
        check_positive("stiffness", stiffness)?;
        check_positive("density", density)?;
        Ok(Self {
            stiffness: WaveArray::from_scalar(shape, stiffness),
            density: WaveArray::from_scalar(shape, density),
            model,
        })
    }

    /// Homogeneous material whose coefficient is the wave speed
    pub fn from_velocity(
        shape: (usize, usize, usize),
        velocity: f64,
        density: f64,
    ) -> Result<Self> {
        check_positive("velocity", velocity)?;
        Self::constant(shape, velocity, density, CoefficientModel::Velocity)
    }

    /// Heterogeneous material from per-node arrays
    pub fn from_fields(
        stiffness: WaveArray<f64>,
        density: WaveArray<f64>,
        model: CoefficientModel,
    ) -> Result<Self> {
        if stiffness.shape() != density.shape() {
            return Err(SimulationError::config(format!(
                "stiffness shape {:?} does not match density shape {:?}",
                stiffness.shape(),
                density.shape()
            )));
        }
        let material = Self {
            stiffness,
            density,
            model,
        };
        material.validate()?;
        Ok(material)
    }

    /// Every value must be finite and strictly positive
    pub fn validate(&self) -> Result<()> {
        for (name, field) in [("stiffness", &self.stiffness), ("density", &self.density)] {
            if !field.is_finite() || field.min() <= 0.0 {
                return Err(SimulationError::config(format!(
                    "{name} must be strictly positive everywhere (min {})",
                    field.min()
                )));
            }
        }
        Ok(())
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.stiffness.shape_tuple()
    }

    pub fn model(&self) -> CoefficientModel {
        self.model
    }

    pub fn stiffness(&self) -> &WaveArray<f64> {
        &self.stiffness
    }

    pub fn density(&self) -> &WaveArray<f64> {
        &self.density
    }

    #[inline]
    pub fn stiffness_at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.stiffness.data[[i, j, k]]
    }

    #[inline]
    pub fn density_at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.density.data[[i, j, k]]
    }

    /// Local wave speed
    pub fn velocity_at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.model
            .wave_speed(self.stiffness_at(i, j, k), self.density_at(i, j, k))
    }

    pub fn max_velocity(&self) -> f64 {
        self.velocity_extreme(f64::max, f64::NEG_INFINITY)
    }

    pub fn min_velocity(&self) -> f64 {
        self.velocity_extreme(f64::min, f64::INFINITY)
    }

    fn velocity_extreme(&self, pick: fn(f64, f64) -> f64, init: f64) -> f64 {
        self.stiffness
            .as_slice()
            .iter()
            .zip(self.density.as_slice())
            .map(|(&s, &d)| self.model.wave_speed(s, d))
            .fold(init, pick)
    }

    /// True when every node carries the same coefficient and density
    pub fn is_homogeneous(&self) -> bool {
        self.stiffness.max() == self.stiffness.min() && self.density.max() == self.density.min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_velocity_coefficient_is_used_directly() {
        let m = MaterialField::from_velocity((3, 3, 3), 1800.0, 1000.0).unwrap();
        assert_eq!(m.model(), CoefficientModel::Velocity);
        assert_eq!(m.stiffness_at(1, 1, 1), 1800.0);
        assert_eq!(m.velocity_at(0, 2, 1), 1800.0);
        assert!(m.is_homogeneous());
    }

    #[test]
    fn test_modulus_coefficient() {
        let modulus = CoefficientModel::Modulus.coefficient(1800.0, 1000.0);
        assert_relative_eq!(modulus, 3.24e9);
        let m = MaterialField::constant((3, 3, 3), modulus, 1000.0, CoefficientModel::Modulus)
            .unwrap();
        assert_relative_eq!(m.velocity_at(1, 1, 1), 1800.0, max_relative = 1e-12);
        assert_relative_eq!(m.max_velocity(), 1800.0, max_relative = 1e-12);
    }

    #[test]
    fn test_rejects_non_positive() {
        let model = CoefficientModel::Velocity;
        assert!(MaterialField::constant((3, 3, 3), 0.0, 1.0, model).is_err());
        assert!(MaterialField::constant((3, 3, 3), 1.0, -1.0, model).is_err());
        assert!(MaterialField::from_velocity((3, 3, 3), f64::NAN, 1.0).is_err());

        let mut density = WaveArray::from_scalar((3, 3, 3), 1.0);
        density.data[[1, 2, 0]] = 0.0;
        let stiffness = WaveArray::from_scalar((3, 3, 3), 1.0);
        assert!(matches!(
            MaterialField::from_fields(stiffness, density, model),
            Err(SimulationError::Configuration(_))
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let s = WaveArray::from_scalar((3, 3, 3), 1.0);
        let d = WaveArray::from_scalar((3, 3, 4), 1.0);
        assert!(MaterialField::from_fields(s, d, CoefficientModel::Velocity).is_err());
    }

    #[test]
    fn test_layered_velocity_extremes() {
        let mut s = WaveArray::from_scalar((4, 4, 6), 1500.0);
        let mut d = WaveArray::from_scalar((4, 4, 6), 1000.0);
        for k in 3..6 {
            for j in 0..4 {
                for i in 0..4 {
                    s.data[[i, j, k]] = 3000.0;
                    d.data[[i, j, k]] = 2000.0;
                }
            }
        }
        let m = MaterialField::from_fields(s, d, CoefficientModel::Velocity).unwrap();
        assert_eq!(m.velocity_at(1, 1, 2), 1500.0);
        assert_eq!(m.velocity_at(1, 1, 3), 3000.0);
        assert_eq!(m.max_velocity(), 3000.0);
        assert_eq!(m.min_velocity(), 1500.0);
        assert!(!m.is_homogeneous());
    }
}
