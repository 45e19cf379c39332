//! Assembly of the implicit 7-point stencil operator
//!
//! One row per node in natural ordering:
//!
//! - boundary nodes get an identity row (fixed zero boundary)
//! - interior nodes get
//!   `diag = c dt^2 / rho * 2 (rx + ry + rz) + 2 dx dy dz`
//!   and `-c dt^2 / rho * r_axis` for each face neighbour that lies strictly
//!   inside the domain, with `r = [dy dz / dx, dx dz / dy, dx dy / dz]`.
//!
//! The neighbour test is `i - 1 > 0` and `i + 1 < nx - 1` (likewise for j and
//! k): a node next to the boundary gets no coupling towards it, and the
//! boundary-adjacent node itself keeps only its diagonal on that side.
//! Coefficient and density are sampled at the row's node, so the matrix is
//! symmetric only for homogeneous material.

use crate::domain::grid::GridModel;
use crate::domain_decomposition::DomainDecomposition;
use crate::engine::sparse::{CsrBuilder, CsrMatrix};
use crate::error::{Result, SimulationError};
use crate::parallel_utils::par_map_subdomains;
use log::debug;

/// Nonzeros of one stencil row, at most self plus six neighbours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StencilRow {
    entries: [(usize, f64); 7],
    len: usize,
}

impl Default for StencilRow {
    fn default() -> Self {
        Self {
            entries: [(0, 0.0); 7],
            len: 0,
        }
    }
}

impl StencilRow {
    /// Row with a single unit diagonal
    pub fn identity(n: usize) -> Self {
        let mut row = Self::default();
        row.push(n, 1.0);
        row
    }

    fn push(&mut self, col: usize, value: f64) {
        self.entries[self.len] = (col, value);
        self.len += 1;
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds the step-invariant system matrix
#[derive(Debug, Clone)]
pub struct OperatorBuilder {
    decomposition: DomainDecomposition,
}

impl OperatorBuilder {
    pub fn new(decomposition: DomainDecomposition) -> Self {
        Self { decomposition }
    }

    pub fn decomposition(&self) -> &DomainDecomposition {
        &self.decomposition
    }

    /// Stencil row of node (i, j, k)
    pub fn row(grid: &GridModel, dt: f64, i: usize, j: usize, k: usize) -> Result<StencilRow> {
        let (nx, ny, nz) = grid.shape();
        let n = grid.flat_index(i, j, k);
        if i >= nx || j >= ny || k >= nz {
            return Err(SimulationError::Assembly {
                row: n,
                reason: format!("node ({i}, {j}, {k}) outside grid {nx}x{ny}x{nz}"),
            });
        }
        if grid.is_boundary(i, j, k) {
            return Ok(StencilRow::identity(n));
        }

        let material = grid.material();
        let coef = material.stiffness_at(i, j, k) * dt * dt / material.density_at(i, j, k);
        let [rx, ry, rz] = grid.face_ratios();

        let mut row = StencilRow::default();
        row.push(n, coef * 2.0 * (rx + ry + rz) + 2.0 * grid.cell_volume());

        let stride_y = nx;
        let stride_z = nx * ny;
        if i - 1 > 0 {
            row.push(n - 1, -coef * rx);
        }
        if i + 1 < nx - 1 {
            row.push(n + 1, -coef * rx);
        }
        if j - 1 > 0 {
            row.push(n - stride_y, -coef * ry);
        }
        if j + 1 < ny - 1 {
            row.push(n + stride_y, -coef * ry);
        }
        if k - 1 > 0 {
            row.push(n - stride_z, -coef * rz);
        }
        if k + 1 < nz - 1 {
            row.push(n + stride_z, -coef * rz);
        }
        Ok(row)
    }

    /// Assemble the full matrix, rows computed per subdomain in parallel
    pub fn build(&self, grid: &GridModel, dt: f64) -> Result<CsrMatrix> {
        let (nx, ny, nz) = grid.shape();
        if self.decomposition.global_shape != grid.shape() {
            return Err(SimulationError::config(format!(
                "partition shape {:?} does not match grid {:?}",
                self.decomposition.global_shape,
                grid.shape()
            )));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimulationError::config(format!(
                "timestep must be positive, got {dt}"
            )));
        }

        let blocks = par_map_subdomains(&self.decomposition, |sub| {
            sub.nodes()
                .map(|(i, j, k)| Ok((grid.flat_index(i, j, k), Self::row(grid, dt, i, j, k)?)))
                .collect::<Result<Vec<_>>>()
        });

        let len = nx * ny * nz;
        let mut rows = vec![StencilRow::default(); len];
        for block in blocks {
            for (n, row) in block? {
                rows[n] = row;
            }
        }

        let nnz = rows.iter().map(StencilRow::len).sum();
        let mut builder = CsrBuilder::new(len, len, nnz);
        for (n, row) in rows.iter().enumerate() {
            if row.is_empty() {
                return Err(SimulationError::Assembly {
                    row: n,
                    reason: "row not produced by any partition".to_string(),
                });
            }
            builder.push_row(row.entries())?;
        }
        let matrix = builder.build()?;

        debug!(
            "assembled operator: {} rows, {} nonzeros, {} partitions",
            matrix.n_rows(),
            matrix.nnz(),
            self.decomposition.num_subdomains()
        );
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::material::{CoefficientModel, MaterialField};
    use approx::assert_relative_eq;

    fn grid(n: [usize; 3], extents: [f64; 3], c: f64, rho: f64) -> GridModel {
        let mut g = GridModel::initialize(n, extents).unwrap();
        let (nx, ny, nz) = g.shape();
        g.set_material(MaterialField::from_velocity((nx, ny, nz), c, rho).unwrap())
            .unwrap();
        g
    }

    #[test]
    fn test_boundary_rows_are_identity() {
        let g = grid([5, 4, 6], [5.0, 4.0, 6.0], 2.0, 1.0);
        let row = OperatorBuilder::row(&g, 0.1, 0, 2, 3).unwrap();
        assert_eq!(row.entries(), &[(g.flat_index(0, 2, 3), 1.0)]);
    }

    #[test]
    fn test_interior_row_values() {
        // dx = dy = dz = 1, c = 2, rho = 1, dt = 0.1 -> coef = 0.02
        let g = grid([7, 7, 7], [7.0, 7.0, 7.0], 2.0, 1.0);
        let dt = 0.1;
        let coef = 2.0 * dt * dt;
        let row = OperatorBuilder::row(&g, dt, 3, 3, 3).unwrap();
        assert_eq!(row.len(), 7);

        let n = g.flat_index(3, 3, 3);
        let (col, diag) = row.entries()[0];
        assert_eq!(col, n);
        assert_relative_eq!(diag, coef * 6.0 + 2.0, max_relative = 1e-14);
        for &(_, off) in &row.entries()[1..] {
            assert_relative_eq!(off, -coef, max_relative = 1e-14);
        }
    }

    #[test]
    fn test_modulus_coefficient_row() {
        let mut g = GridModel::initialize([7, 7, 7], [7.0; 3]).unwrap();
        let material =
            MaterialField::constant(g.shape(), 4.0, 1.0, CoefficientModel::Modulus).unwrap();
        g.set_material(material).unwrap();
        assert_eq!(g.material().max_velocity(), 2.0);

        let dt = 0.1;
        let row = OperatorBuilder::row(&g, dt, 3, 3, 3).unwrap();
        assert_relative_eq!(row.entries()[0].1, 4.0 * dt * dt * 6.0 + 2.0, max_relative = 1e-14);
        assert_relative_eq!(row.entries()[1].1, -4.0 * dt * dt, max_relative = 1e-14);
    }

    #[test]
    fn test_strict_adjacency_drops_coupling() {
        let g = grid([6, 6, 6], [6.0; 3], 1.0, 1.0);
        // i = 1: i - 1 = 0 is not > 0, so no -x neighbour
        let row = OperatorBuilder::row(&g, 0.5, 1, 3, 3).unwrap();
        let cols: Vec<usize> = row.entries().iter().map(|e| e.0).collect();
        let n = g.flat_index(1, 3, 3);
        assert!(!cols.contains(&(n - 1)));
        assert!(cols.contains(&(n + 1)));
        assert_eq!(row.len(), 6);

        // i = nx - 2: i + 1 = nx - 1 is not < nx - 1
        let row = OperatorBuilder::row(&g, 0.5, 4, 3, 3).unwrap();
        let n = g.flat_index(4, 3, 3);
        let cols: Vec<usize> = row.entries().iter().map(|e| e.0).collect();
        assert!(!cols.contains(&(n + 1)));
        assert!(cols.contains(&(n - 1)));
    }

    #[test]
    fn test_three_node_axis_has_no_coupling() {
        let g = grid([3, 3, 3], [3.0; 3], 1.0, 1.0);
        let row = OperatorBuilder::row(&g, 0.5, 1, 1, 1).unwrap();
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_partitioned_build_matches_single() {
        let g = grid([9, 7, 8], [900.0, 700.0, 800.0], 1800.0, 1000.0);
        let dt = 0.02;
        let single = OperatorBuilder::new(DomainDecomposition::single(g.shape()))
            .build(&g, dt)
            .unwrap();
        let split = OperatorBuilder::new(DomainDecomposition::new(g.shape(), (2, 3, 2), 1).unwrap())
            .build(&g, dt)
            .unwrap();
        assert_eq!(single, split);
        assert!(single.is_symmetric(1e-9 * single.get(40, 40).abs()));
    }

    #[test]
    fn test_out_of_grid_node_is_assembly_failure() {
        let g = grid([4, 4, 4], [4.0; 3], 1.0, 1.0);
        let err = OperatorBuilder::row(&g, 0.1, 4, 1, 1).unwrap_err();
        assert!(matches!(err, SimulationError::Assembly { .. }));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let g = grid([4, 4, 4], [4.0; 3], 1.0, 1.0);
        let builder = OperatorBuilder::new(DomainDecomposition::single((4, 4, 5)));
        assert!(builder.build(&g, 0.1).is_err());

        let builder = OperatorBuilder::new(DomainDecomposition::single(g.shape()));
        assert!(builder.build(&g, 0.0).is_err());
    }
}
