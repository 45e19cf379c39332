//! Node-valued array type for wave simulations
//!
//! Wraps an ndarray `Array3` indexed `[i, j, k]` (x, y, z). The flat
//! "natural" ordering used by sparse operators has x varying fastest,
//! then y, then z: `n = i + nx * (j + ny * k)`.

use ndarray::{Array3, ShapeBuilder};
use num_traits::Zero;
use rayon::prelude::*;
use std::ops::{AddAssign, MulAssign, SubAssign};

/// The main array type for node-valued fields
#[derive(Debug, Clone, PartialEq)]
pub struct WaveArray<T = f64> {
    /// The underlying ndarray, column-major so that x varies fastest in memory
    pub data: Array3<T>,
}

impl<T> WaveArray<T>
where
    T: Clone + Zero,
{
    /// Create a new array with zeros
    pub fn zeros(shape: (usize, usize, usize)) -> Self {
        Self {
            data: Array3::zeros(shape.f()),
        }
    }

    /// Create a new array from a scalar value
    pub fn from_scalar(shape: (usize, usize, usize), value: T) -> Self {
        Self {
            data: Array3::from_elem(shape.f(), value),
        }
    }

    /// Get the shape of the array
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Get the shape as a tuple
    pub fn shape_tuple(&self) -> (usize, usize, usize) {
        let shape = self.shape();
        (shape[0], shape[1], shape[2])
    }

    /// Check if the array is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Flat index of node `(i, j, k)` in natural ordering
    #[inline]
    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        let (nx, ny, _) = self.shape_tuple();
        i + nx * (j + ny * k)
    }
}

impl WaveArray<f64> {
    /// Build an array from a flat vector in natural ordering.
    ///
    /// Returns `None` when the vector length does not match the shape.
    pub fn from_flat(shape: (usize, usize, usize), values: Vec<f64>) -> Option<Self> {
        Array3::from_shape_vec(shape.f(), values)
            .ok()
            .map(|data| Self { data })
    }

    /// Contiguous flat view in natural ordering
    pub fn as_slice(&self) -> &[f64] {
        self.data
            .as_slice_memory_order()
            .expect("WaveArray storage is always contiguous")
    }

    /// Mutable contiguous flat view in natural ordering
    pub fn as_slice_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_memory_order_mut()
            .expect("WaveArray storage is always contiguous")
    }

    /// Fill the array with a scalar value
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Overwrite this array with the contents of `other`
    pub fn copy_from(&mut self, other: &Self) {
        self.data.assign(&other.data);
    }

    /// Largest entry
    pub fn max(&self) -> f64 {
        self.as_slice()
            .par_iter()
            .copied()
            .reduce(|| f64::NEG_INFINITY, f64::max)
    }

    /// Smallest entry
    pub fn min(&self) -> f64 {
        self.as_slice()
            .par_iter()
            .copied()
            .reduce(|| f64::INFINITY, f64::min)
    }

    /// Sum of squares of all entries
    pub fn norm_squared(&self) -> f64 {
        self.as_slice().par_iter().map(|&v| v * v).sum()
    }

    /// Euclidean (2-)norm
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Arithmetic mean of all entries
    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.as_slice().par_iter().sum::<f64>() / self.len() as f64
    }

    /// Remove the component along the constant vector (subtract the mean).
    ///
    /// Returns the mean that was removed.
    pub fn remove_constant_mode(&mut self) -> f64 {
        let mean = self.mean();
        if mean != 0.0 {
            self.as_slice_mut().par_iter_mut().for_each(|v| *v -= mean);
        }
        mean
    }

    /// True when every entry is finite
    pub fn is_finite(&self) -> bool {
        self.as_slice().par_iter().all(|v| v.is_finite())
    }
}

impl AddAssign<&WaveArray<f64>> for WaveArray<f64> {
    fn add_assign(&mut self, other: &WaveArray<f64>) {
        self.data += &other.data;
    }
}

impl SubAssign<&WaveArray<f64>> for WaveArray<f64> {
    fn sub_assign(&mut self, other: &WaveArray<f64>) {
        self.data -= &other.data;
    }
}

impl MulAssign<f64> for WaveArray<f64> {
    fn mul_assign(&mut self, scalar: f64) {
        self.data *= scalar;
    }
}
