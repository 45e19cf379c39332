//! Right-hand side of the per-step implicit system
//!
//! Interior nodes carry `dx dy dz (5 u[n-1] - 4 u[n-2] + u[n-3])`, the source
//! node additionally `dt^2 / rho * fx`. Boundary nodes are zero. The result
//! can be projected onto the zero-mean subspace afterwards.

use crate::domain::grid::GridModel;
use crate::domain::history::WavefieldHistory;
use crate::domain::source::SourceForce;
use crate::domain_decomposition::{DomainDecomposition, HaloView, Subdomain};
use crate::engine::array::WaveArray;
use crate::error::{Result, SimulationError};
use crate::parallel_utils::par_fill_blocks;
use log::debug;
use ndarray::Array3;

/// Builds the RHS vector from history and the current source force
#[derive(Debug, Clone)]
pub struct RhsBuilder {
    remove_constant_mode: bool,
}

impl Default for RhsBuilder {
    fn default() -> Self {
        Self {
            remove_constant_mode: true,
        }
    }
}

impl RhsBuilder {
    pub fn new(remove_constant_mode: bool) -> Self {
        Self {
            remove_constant_mode,
        }
    }

    /// Assemble into `rhs`, returning the mean removed by the projection
    /// (zero when projection is disabled).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        grid: &GridModel,
        decomposition: &DomainDecomposition,
        history: &WavefieldHistory,
        source_node: [usize; 3],
        force: SourceForce,
        dt: f64,
        rhs: &mut WaveArray<f64>,
    ) -> Result<f64> {
        if rhs.shape_tuple() != grid.shape() || history.shape() != grid.shape() {
            return Err(SimulationError::config(format!(
                "rhs {:?} / history {:?} do not match grid {:?}",
                rhs.shape_tuple(),
                history.shape(),
                grid.shape()
            )));
        }
        if decomposition.global_shape != grid.shape() {
            return Err(SimulationError::config(format!(
                "partition shape {:?} does not match grid {:?}",
                decomposition.global_shape,
                grid.shape()
            )));
        }

        let (u1, u2, u3) = history.lagged();
        par_fill_blocks(rhs, decomposition, |sub| {
            let halos = [
                decomposition.refresh_halo(sub, u1),
                decomposition.refresh_halo(sub, u2),
                decomposition.refresh_halo(sub, u3),
            ];
            Self::local_block(grid, sub, &halos, source_node, force, dt)
        })?;

        if !self.remove_constant_mode {
            return Ok(0.0);
        }
        let mean = rhs.remove_constant_mode();
        debug!("removed constant mode {:.6e} from rhs", mean);
        Ok(mean)
    }

    fn local_block(
        grid: &GridModel,
        sub: &Subdomain,
        halos: &[HaloView; 3],
        source_node: [usize; 3],
        force: SourceForce,
        dt: f64,
    ) -> Result<Array3<f64>> {
        let volume = grid.cell_volume();
        let material = grid.material();
        let mut block = Array3::zeros(sub.shape());

        for (i, j, k) in sub.nodes() {
            if grid.is_boundary(i, j, k) {
                continue;
            }
            let mut lagged = [0.0; 3];
            for (value, halo) in lagged.iter_mut().zip(halos) {
                *value = halo.get(i, j, k).ok_or_else(|| SimulationError::Assembly {
                    row: grid.flat_index(i, j, k),
                    reason: "node missing from halo view".to_string(),
                })?;
            }
            let [a, b, c] = lagged;

            let mut value = volume * (5.0 * a - 4.0 * b + c);
            if [i, j, k] == source_node {
                value += dt * dt / material.density_at(i, j, k) * force.fx;
            }
            block[[i - sub.start[0], j - sub.start[1], k - sub.start[2]]] = value;
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::material::MaterialField;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn setup() -> (GridModel, WavefieldHistory) {
        let mut grid = GridModel::initialize([5, 5, 5], [10.0; 3]).unwrap();
        grid.set_material(MaterialField::from_velocity((5, 5, 5), 8.0, 2.0).unwrap())
            .unwrap();
        let history = WavefieldHistory::zeros(grid.shape());
        (grid, history)
    }

    fn force(fx: f64) -> SourceForce {
        SourceForce {
            fx,
            fy: 0.0,
            fz: fx,
        }
    }

    #[test]
    fn test_history_combination_and_source() {
        let (grid, mut history) = setup();
        history.rotate(&WaveArray::from_scalar((5, 5, 5), 1.0));
        history.rotate(&WaveArray::from_scalar((5, 5, 5), 2.0));
        history.rotate(&WaveArray::from_scalar((5, 5, 5), 3.0));
        // n-1 = 3, n-2 = 2, n-3 = 1 -> 15 - 8 + 1 = 8
        let dd = DomainDecomposition::single(grid.shape());
        let mut rhs = WaveArray::zeros(grid.shape());
        let removed = RhsBuilder::new(false)
            .build(&grid, &dd, &history, [2, 2, 2], force(100.0), 0.5, &mut rhs)
            .unwrap();
        assert_eq!(removed, 0.0);

        let vol = 8.0;
        assert_relative_eq!(rhs.data[[1, 2, 3]], vol * 8.0);
        assert_relative_eq!(rhs.data[[2, 2, 2]], vol * 8.0 + 0.25 / 2.0 * 100.0);
        assert_eq!(rhs.data[[0, 2, 2]], 0.0);
        assert_eq!(rhs.data[[4, 4, 4]], 0.0);
    }

    #[test]
    fn test_projection_gives_zero_mean() {
        let (grid, history) = setup();
        let dd = DomainDecomposition::single(grid.shape());
        let mut rhs = WaveArray::zeros(grid.shape());
        let removed = RhsBuilder::default()
            .build(&grid, &dd, &history, [2, 2, 2], force(1250.0), 0.2, &mut rhs)
            .unwrap();
        // only the source node is non-zero before projection
        let injected = 0.04 / 2.0 * 1250.0;
        assert_relative_eq!(removed, injected / 125.0, max_relative = 1e-12);
        assert_abs_diff_eq!(rhs.mean(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(rhs.data[[2, 2, 2]], injected - removed, max_relative = 1e-12);
    }

    #[test]
    fn test_boundary_source_is_not_injected() {
        let (grid, history) = setup();
        let dd = DomainDecomposition::single(grid.shape());
        let mut rhs = WaveArray::zeros(grid.shape());
        RhsBuilder::new(false)
            .build(&grid, &dd, &history, [0, 2, 2], force(1.0), 0.1, &mut rhs)
            .unwrap();
        assert_eq!(rhs.norm(), 0.0);
    }

    #[test]
    fn test_partitioned_matches_single() {
        let (grid, mut history) = setup();
        let values: Vec<f64> = (0..125).map(|v| (v as f64 * 0.13).cos()).collect();
        history.rotate(&WaveArray::from_flat((5, 5, 5), values).unwrap());
        history.current_mut().data.mapv_inplace(|v| 2.0 * v);
        history.advance();

        let mut a = WaveArray::zeros(grid.shape());
        let mut b = WaveArray::zeros(grid.shape());
        let builder = RhsBuilder::default();
        let single = DomainDecomposition::single(grid.shape());
        builder
            .build(&grid, &single, &history, [2, 2, 2], force(3.0), 0.1, &mut a)
            .unwrap();
        builder
            .build(
                &grid,
                &DomainDecomposition::new(grid.shape(), (2, 2, 3), 1).unwrap(),
                &history,
                [2, 2, 2],
                force(3.0),
                0.1,
                &mut b,
            )
            .unwrap();
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let (grid, history) = setup();
        let dd = DomainDecomposition::single(grid.shape());
        let mut rhs = WaveArray::zeros((5, 5, 4));
        assert!(RhsBuilder::default()
            .build(&grid, &dd, &history, [2, 2, 2], force(1.0), 0.1, &mut rhs)
            .is_err());
    }

    #[test]
    fn test_partition_must_cover_the_grid() {
        let (grid, history) = setup();
        for shape in [(4, 4, 4), (6, 6, 6), (5, 5, 4)] {
            let dd = DomainDecomposition::single(shape);
            let mut rhs = WaveArray::from_scalar(grid.shape(), 999.0);
            let err = RhsBuilder::new(false)
                .build(&grid, &dd, &history, [2, 2, 2], force(1.0), 0.1, &mut rhs)
                .unwrap_err();
            assert!(matches!(err, SimulationError::Configuration(_)), "{shape:?}");
        }
    }
}
