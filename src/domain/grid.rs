//! Structured grid geometry and the material it carries

use crate::domain::material::MaterialField;
use crate::error::{Result, SimulationError};

/// Smallest node count per axis for which the 7-point stencil is defined
pub const MIN_NODES: usize = 3;

/// Uniform 3-D structured grid with per-node material
#[derive(Debug, Clone, PartialEq)]
pub struct GridModel {
    nx: usize,
    ny: usize,
    nz: usize,
    extents: [f64; 3],
    spacing: [f64; 3],
    material: MaterialField,
}

impl GridModel {
    /// Derive spacing from node counts and domain extents.
    ///
    /// Spacing is `extent / node_count` per axis. The grid starts with unit
    /// wave speed and density until [`GridModel::set_material`] is called.
    pub fn initialize(node_counts: [usize; 3], extents: [f64; 3]) -> Result<Self> {
        for (axis, &n) in ["nx", "ny", "nz"].iter().zip(&node_counts) {
            if n < MIN_NODES {
                return Err(SimulationError::config(format!(
                    "{axis} = {n} is below the minimum of {MIN_NODES} nodes"
                )));
            }
        }
        for (axis, &e) in ["xmax", "ymax", "zmax"].iter().zip(&extents) {
            if !(e.is_finite() && e > 0.0) {
                return Err(SimulationError::config(format!(
                    "{axis} must be positive, got {e}"
                )));
            }
        }

        let [nx, ny, nz] = node_counts;
        let spacing = [
            extents[0] / nx as f64,
            extents[1] / ny as f64,
            extents[2] / nz as f64,
        ];
        let material = MaterialField::from_velocity((nx, ny, nz), 1.0, 1.0)?;

        Ok(Self {
            nx,
            ny,
            nz,
            extents,
            spacing,
            material,
        })
    }

    /// Replace the material; its shape must match the grid
    pub fn set_material(&mut self, material: MaterialField) -> Result<()> {
        if material.shape() != self.shape() {
            return Err(SimulationError::config(format!(
                "material shape {:?} does not match grid {:?}",
                material.shape(),
                self.shape()
            )));
        }
        material.validate()?;
        self.material = material;
        Ok(())
    }

    pub fn material(&self) -> &MaterialField {
        &self.material
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn node_counts(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extents(&self) -> [f64; 3] {
        self.extents
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn min_spacing(&self) -> f64 {
        self.spacing.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// dx·dy·dz
    pub fn cell_volume(&self) -> f64 {
        self.spacing[0] * self.spacing[1] * self.spacing[2]
    }

    /// Face-area over spacing per axis: `[dy·dz/dx, dx·dz/dy, dx·dy/dz]`
    pub fn face_ratios(&self) -> [f64; 3] {
        let [dx, dy, dz] = self.spacing;
        [dy * dz / dx, dx * dz / dy, dx * dy / dz]
    }

    /// Any index at its axis minimum or maximum
    #[inline]
    pub fn is_boundary(&self, i: usize, j: usize, k: usize) -> bool {
        i == 0 || j == 0 || k == 0 || i == self.nx - 1 || j == self.ny - 1 || k == self.nz - 1
    }

    /// Flat index in natural ordering (x fastest, then y, then z)
    #[inline]
    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nx * (j + self.ny * k)
    }

    /// Inverse of [`GridModel::flat_index`]
    #[inline]
    pub fn node_of(&self, n: usize) -> (usize, usize, usize) {
        let i = n % self.nx;
        let j = (n / self.nx) % self.ny;
        let k = n / (self.nx * self.ny);
        (i, j, k)
    }

    pub fn contains(&self, node: [usize; 3]) -> bool {
        node[0] < self.nx && node[1] < self.ny && node[2] < self.nz
    }

    /// Default source location: `n / 2` on every axis
    pub fn center(&self) -> [usize; 3] {
        [self.nx / 2, self.ny / 2, self.nz / 2]
    }
}
