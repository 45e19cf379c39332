//! Time-marching loop
//!
//! Each step evaluates the source, assembles the RHS from the history,
//! solves with the cached operator, shifts the history and, every
//! `diagnostic_interval` steps, reports global statistics and writes a
//! snapshot. The first error moves the marcher to [`MarchState::Failed`].

use crate::domain::grid::GridModel;
use crate::domain::history::WavefieldHistory;
use crate::domain::iteration::{
    create_solver, JacobiPreconditioner, LinearSolver, SolverConfig, SolverMethod,
};
use crate::domain::material::MaterialField;
use crate::domain::operator::OperatorBuilder;
use crate::domain::rhs::RhsBuilder;
use crate::domain::source::SourceModel;
use crate::domain_decomposition::DomainDecomposition;
use crate::engine::array::WaveArray;
use crate::engine::sparse::CsrMatrix;
use crate::error::{Result, SimulationError};
use crate::parallel_utils::{field_statistics, FieldStats};
use crate::utilities::{cfl_number, cfl_satisfied, SnapshotSink};
use log::{debug, info, warn};
use std::time::Instant;

/// Lifecycle of a [`TimeMarcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarchState {
    Uninitialized,
    Ready,
    Stepping,
    Completed,
    Failed,
}

impl MarchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarchState::Uninitialized => "Uninitialized",
            MarchState::Ready => "Ready",
            MarchState::Stepping => "Stepping",
            MarchState::Completed => "Completed",
            MarchState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MarchState::Completed | MarchState::Failed)
    }
}

/// Run parameters fixed before the loop starts
#[derive(Debug, Clone, PartialEq)]
pub struct MarchSettings {
    /// Timestep
    pub dt: f64,
    /// Number of steps `nt`
    pub steps: usize,
    /// Report and snapshot every this many steps
    pub diagnostic_interval: usize,
    /// Project the RHS onto zero mean before solving
    pub remove_constant_mode: bool,
    /// Accept a Courant number above one with a warning
    pub allow_cfl_violation: bool,
    pub solver: SolverConfig,
}

impl Default for MarchSettings {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            steps: 1,
            diagnostic_interval: 40,
            remove_constant_mode: true,
            allow_cfl_violation: false,
            solver: SolverConfig::default(),
        }
    }
}

/// Statistics reported at a diagnostic step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDiagnostics {
    pub step: usize,
    pub max: f64,
    pub min: f64,
    pub norm: f64,
    /// Wall time since the first step started, in seconds
    pub elapsed: f64,
}

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq)]
pub struct MarchSummary {
    pub steps: usize,
    pub diagnostics: Vec<StepDiagnostics>,
    /// Statistics of the final solution
    pub final_stats: FieldStats,
    /// Krylov iterations summed over all steps
    pub solver_iterations: usize,
    pub elapsed: f64,
}

#[derive(Debug, Clone)]
struct CachedOperator {
    matrix: CsrMatrix,
    preconditioner: JacobiPreconditioner,
}

/// Owns the wavefield history and drives the step loop
pub struct TimeMarcher {
    state: MarchState,
    grid: GridModel,
    source: SourceModel,
    settings: MarchSettings,
    operator_builder: OperatorBuilder,
    rhs_builder: RhsBuilder,
    solver: Box<dyn LinearSolver>,
    history: WavefieldHistory,
    rhs: WaveArray<f64>,
    operator: Option<CachedOperator>,
    completed: usize,
    solver_iterations: usize,
    started: Option<Instant>,
    diagnostics: Vec<StepDiagnostics>,
}

impl std::fmt::Debug for TimeMarcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeMarcher")
            .field("state", &self.state)
            .field("shape", &self.grid.shape())
            .field("solver", &self.solver.name())
            .field("completed", &self.completed)
            .field("steps", &self.settings.steps)
            .finish()
    }
}

impl TimeMarcher {
    pub fn new(
        grid: GridModel,
        source: SourceModel,
        decomposition: DomainDecomposition,
        settings: MarchSettings,
    ) -> Result<Self> {
        if !(settings.dt.is_finite() && settings.dt > 0.0) {
            return Err(SimulationError::config(format!(
                "timestep must be positive, got {}",
                settings.dt
            )));
        }
        if settings.steps == 0 {
            return Err(SimulationError::config("run must have at least one step"));
        }
        if settings.diagnostic_interval == 0 {
            return Err(SimulationError::config("diagnostic interval must be >= 1"));
        }
        if !grid.contains(source.position()) {
            return Err(SimulationError::config(format!(
                "source position {:?} outside grid {:?}",
                source.position(),
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
        let [si, sj, sk] = source.position();
        if grid.is_boundary(si, sj, sk) {
            warn!(
                "source at boundary node {:?} is never injected",
                source.position()
            );
        }

        let shape = grid.shape();
        Ok(Self {
            state: MarchState::Uninitialized,
            rhs_builder: RhsBuilder::new(settings.remove_constant_mode),
            solver: create_solver(&settings.solver),
            operator_builder: OperatorBuilder::new(decomposition),
            history: WavefieldHistory::zeros(shape),
            rhs: WaveArray::zeros(shape),
            operator: None,
            completed: 0,
            solver_iterations: 0,
            started: None,
            diagnostics: Vec::new(),
            grid,
            source,
            settings,
        })
    }

    /// Check stability and assemble the operator: `Uninitialized -> Ready`
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != MarchState::Uninitialized {
            return Err(SimulationError::InvalidState {
                expected: MarchState::Uninitialized.as_str(),
                found: self.state.as_str(),
            });
        }
        let prepared = self.check_cfl().and_then(|_| self.rebuild_operator());
        match prepared {
            Ok(()) => {
                self.state = MarchState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = MarchState::Failed;
                Err(e)
            }
        }
    }

    /// Advance one step; returns diagnostics on reporting steps
    pub fn step(&mut self, sink: &mut dyn SnapshotSink) -> Result<Option<StepDiagnostics>> {
        match self.state {
            MarchState::Ready => {
                self.state = MarchState::Stepping;
                self.started = Some(Instant::now());
            }
            MarchState::Stepping => {}
            other => {
                return Err(SimulationError::InvalidState {
                    expected: "Ready or Stepping",
                    found: other.as_str(),
                })
            }
        }

        match self.advance(sink) {
            Ok(diagnostics) => {
                if self.completed == self.settings.steps {
                    self.state = MarchState::Completed;
                    info!(
                        "completed {} steps in {:.3} s",
                        self.completed,
                        self.elapsed()
                    );
                }
                Ok(diagnostics)
            }
            Err(e) => {
                self.state = MarchState::Failed;
                Err(e)
            }
        }
    }

    /// Run every remaining step
    pub fn run(&mut self, sink: &mut dyn SnapshotSink) -> Result<MarchSummary> {
        if self.state == MarchState::Uninitialized {
            self.initialize()?;
        }
        while self.state != MarchState::Completed {
            self.step(sink)?;
        }
        Ok(self.summary())
    }

    fn advance(&mut self, sink: &mut dyn SnapshotSink) -> Result<Option<StepDiagnostics>> {
        let step = self.completed + 1;
        let dt = self.settings.dt;
        let force = self.source.evaluate(step, dt);

        if self.operator.is_none() {
            self.rebuild_operator()?;
        }

        self.rhs_builder.build(
            &self.grid,
            self.operator_builder.decomposition(),
            &self.history,
            self.source.position(),
            force,
            dt,
            &mut self.rhs,
        )?;

        let cached = self.operator.as_ref().ok_or(SimulationError::InvalidState {
            expected: "assembled operator",
            found: "no operator",
        })?;
        let result = self.solver.solve(
            &cached.matrix,
            self.rhs.as_slice(),
            self.history.current_mut().as_slice_mut(),
            &cached.preconditioner,
        );
        debug!(
            "step {}: {} {} iterations, residual {:.3e} ({:?})",
            step,
            self.solver.name(),
            result.iterations,
            result.residual_norm,
            result.status
        );
        self.solver_iterations += result.iterations;
        if !result.is_converged() {
            return Err(SimulationError::SolveNonConvergence {
                step,
                iterations: result.iterations,
                residual: result.residual_norm,
            });
        }

        self.history.advance();
        self.completed = step;

        if step % self.settings.diagnostic_interval != 0 {
            return Ok(None);
        }

        let stats = field_statistics(self.history.current(), self.operator_builder.decomposition());
        let diagnostics = StepDiagnostics {
            step,
            max: stats.max,
            min: stats.min,
            norm: stats.norm,
            elapsed: self.elapsed(),
        };
        info!("Time step: {} of {}", step, self.settings.steps);
        info!(
            "  max {:e}  min {:e}  norm {:e}  elapsed {:.3} s",
            diagnostics.max, diagnostics.min, diagnostics.norm, diagnostics.elapsed
        );
        sink.write(self.history.current(), step)?;
        self.diagnostics.push(diagnostics);
        Ok(Some(diagnostics))
    }

    fn rebuild_operator(&mut self) -> Result<()> {
        let homogeneous = self.grid.material().is_homogeneous();
        if self.settings.solver.method == SolverMethod::Cg && !homogeneous {
            warn!("heterogeneous material gives a non-symmetric operator; CG may not converge");
        }
        let matrix = self.operator_builder.build(&self.grid, self.settings.dt)?;
        let preconditioner = JacobiPreconditioner::from_matrix(&matrix);
        self.operator = Some(CachedOperator {
            matrix,
            preconditioner,
        });
        Ok(())
    }

    /// Courant number of the current grid, material and timestep.
    ///
    /// Fails above one unless violations are allowed, in which case a
    /// warning is logged.
    pub fn check_cfl(&self) -> Result<f64> {
        let cfl = self.cfl();
        if !cfl_satisfied(cfl) {
            if self.settings.allow_cfl_violation {
                warn!("CFL number {:.4} exceeds 1", cfl);
            } else {
                return Err(SimulationError::config(format!(
                    "CFL number {:.4} exceeds 1 (dt = {}, min spacing = {})",
                    cfl,
                    self.settings.dt,
                    self.grid.min_spacing()
                )));
            }
        }
        Ok(cfl)
    }

    pub fn cfl(&self) -> f64 {
        cfl_number(
            self.grid.material().max_velocity(),
            self.settings.dt,
            self.grid.min_spacing(),
        )
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(SimulationError::InvalidState {
                expected: "Uninitialized, Ready or Stepping",
                found: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Change the timestep; the operator is rebuilt before the next solve.
    /// The step count is left unchanged.
    pub fn set_timestep(&mut self, dt: f64) -> Result<()> {
        self.ensure_mutable()?;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimulationError::config(format!(
                "timestep must be positive, got {dt}"
            )));
        }
        let previous = self.settings.dt;
        self.settings.dt = dt;
        if let Err(e) = self.check_cfl() {
            self.settings.dt = previous;
            return Err(e);
        }
        self.operator = None;
        info!("timestep changed from {} to {}", previous, dt);
        Ok(())
    }

    /// Replace the material; the operator is rebuilt before the next solve
    pub fn set_material(&mut self, material: MaterialField) -> Result<()> {
        self.ensure_mutable()?;
        let previous = self.grid.material().clone();
        self.grid.set_material(material)?;
        if let Err(e) = self.check_cfl() {
            self.grid.set_material(previous)?;
            return Err(e);
        }
        self.operator = None;
        info!("material updated, operator will be reassembled");
        Ok(())
    }

    pub fn summary(&self) -> MarchSummary {
        MarchSummary {
            steps: self.completed,
            diagnostics: self.diagnostics.clone(),
            final_stats: field_statistics(
                self.history.current(),
                self.operator_builder.decomposition(),
            ),
            solver_iterations: self.solver_iterations,
            elapsed: self.elapsed(),
        }
    }

    fn elapsed(&self) -> f64 {
        self.started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn state(&self) -> MarchState {
        self.state
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    pub fn source(&self) -> &SourceModel {
        &self.source
    }

    pub fn settings(&self) -> &MarchSettings {
        &self.settings
    }

    pub fn history(&self) -> &WavefieldHistory {
        &self.history
    }

    /// Cached operator, `None` until assembled or after invalidation
    pub fn operator(&self) -> Option<&CsrMatrix> {
        self.operator.as_ref().map(|c| &c.matrix)
    }

    pub fn completed_steps(&self) -> usize {
        self.completed
    }

    pub fn diagnostics(&self) -> &[StepDiagnostics] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::{MemorySnapshotSink, NullSnapshotSink};

    fn marcher(n: usize, steps: usize, interval: usize) -> TimeMarcher {
        let extent = 10.0 * n as f64;
        let mut grid = GridModel::initialize([n; 3], [extent; 3]).unwrap();
        grid.set_material(MaterialField::from_velocity(grid.shape(), 100.0, 1.0).unwrap())
            .unwrap();
        let dt = 0.5 * grid.min_spacing() / 100.0;
        let source = SourceModel::new(grid.center(), 10.0, 1.0, 90.0).unwrap();
        let decomposition = DomainDecomposition::single(grid.shape());
        let settings = MarchSettings {
            dt,
            steps,
            diagnostic_interval: interval,
            ..Default::default()
        };
        TimeMarcher::new(grid, source, decomposition, settings).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut m = marcher(7, 3, 2);
        let mut sink = NullSnapshotSink;
        assert_eq!(m.state(), MarchState::Uninitialized);
        assert!(m.step(&mut sink).is_err());

        m.initialize().unwrap();
        assert_eq!(m.state(), MarchState::Ready);
        assert!(m.operator().is_some());

        assert!(m.step(&mut sink).unwrap().is_none());
        assert_eq!(m.state(), MarchState::Stepping);
        assert!(m.step(&mut sink).unwrap().is_some());
        m.step(&mut sink).unwrap();
        assert_eq!(m.state(), MarchState::Completed);

        let err = m.step(&mut sink).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::InvalidState {
                found: "Completed",
                ..
            }
        ));
    }

    #[test]
    fn test_run_reports_every_interval() {
        let mut m = marcher(7, 10, 4);
        let mut sink = MemorySnapshotSink::new();
        let summary = m.run(&mut sink).unwrap();
        assert_eq!(summary.steps, 10);
        assert_eq!(sink.steps(), vec![4, 8]);
        let steps: Vec<usize> = summary.diagnostics.iter().map(|d| d.step).collect();
        assert_eq!(steps, vec![4, 8]);
        assert!(summary.final_stats.norm.is_finite());
    }

    #[test]
    fn test_non_convergence_fails_the_run() {
        let mut m = marcher(9, 5, 40);
        m.settings.solver = SolverConfig {
            method: SolverMethod::BiCgStab,
            rtol: 1e-15,
            atol: 0.0,
            max_iterations: 1,
        };
        m.solver = create_solver(&m.settings.solver);

        let err = m.run(&mut NullSnapshotSink).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::SolveNonConvergence { step: 1, .. }
        ));
        assert_eq!(m.state(), MarchState::Failed);
        assert_eq!(m.completed_steps(), 0);
        assert!(m.step(&mut NullSnapshotSink).is_err());
    }

    #[test]
    fn test_set_timestep_invalidates_operator() {
        let mut m = marcher(7, 4, 40);
        m.initialize().unwrap();
        let before = m.operator().cloned().unwrap();
        m.set_timestep(m.settings().dt * 0.5).unwrap();
        assert!(m.operator().is_none());

        m.step(&mut NullSnapshotSink).unwrap();
        let after = m.operator().unwrap();
        let n = m.grid().flat_index(3, 3, 3);
        assert!(after.get(n, n) < before.get(n, n));
    }

    #[test]
    fn test_cfl_violation_is_rejected() {
        let mut m = marcher(7, 4, 40);
        let dt = m.settings().dt;
        assert!(m.set_timestep(dt * 4.0).is_err());
        assert_eq!(m.settings().dt, dt);

        m.settings.allow_cfl_violation = true;
        m.set_timestep(dt * 4.0).unwrap();
        assert!(m.cfl() > 1.0);
    }

    #[test]
    fn test_set_material_after_completion_is_rejected() {
        let mut m = marcher(5, 1, 40);
        m.run(&mut NullSnapshotSink).unwrap();
        let material = MaterialField::from_velocity((5, 5, 5), 50.0, 1.0).unwrap();
        assert!(m.set_material(material).is_err());
    }

    #[test]
    fn test_source_outside_grid() {
        let grid = GridModel::initialize([5; 3], [5.0; 3]).unwrap();
        let source = SourceModel::new([5, 0, 0], 10.0, 1.0, 0.0).unwrap();
        let err = TimeMarcher::new(
            grid,
            source,
            DomainDecomposition::single((5, 5, 5)),
            MarchSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }
}
