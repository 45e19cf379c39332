//! Run configuration
//!
//! Loaded from TOML; every section and field has a default so a partial file
//! (or none at all) describes the reference 25^3 run.

use crate::domain::grid::GridModel;
use crate::domain::iteration::{SolverConfig, SolverMethod};
use crate::domain::marcher::MarchSettings;
use crate::domain::material::{CoefficientModel, MaterialField};
use crate::domain::source::SourceModel;
use crate::domain_decomposition::DomainDecomposition;
use crate::error::{Result, SimulationError};
use crate::utilities::{cfl_number, cfl_satisfied, stable_dt, step_count, SnapshotFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Grid node counts and physical extents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub xmax: f64,
    pub ymax: f64,
    pub zmax: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nx: 25,
            ny: 25,
            nz: 25,
            xmax: 1000.0,
            ymax: 1000.0,
            zmax: 1000.0,
        }
    }
}

impl GridConfig {
    pub fn node_counts(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    pub fn extents(&self) -> [f64; 3] {
        [self.xmax, self.ymax, self.zmax]
    }

    pub fn min_spacing(&self) -> f64 {
        [
            self.xmax / self.nx as f64,
            self.ymax / self.ny as f64,
            self.zmax / self.nz as f64,
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
    }

    fn validate(&self) -> Result<()> {
        // node counts and extents are checked by GridModel::initialize
        GridModel::initialize(self.node_counts(), self.extents()).map(|_| ())
    }
}

/// Homogeneous material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    /// Wave speed
    pub velocity: f64,
    pub density: f64,
    /// How the stencil coefficient relates to the wave speed
    pub model: CoefficientModel,
    /// Stencil coefficient in units of `model`; overrides `velocity` when given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stiffness: Option<f64>,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            velocity: 1800.0,
            density: 1000.0,
            model: CoefficientModel::Velocity,
            stiffness: None,
        }
    }
}

impl MaterialConfig {
    /// Stencil coefficient, derived from `velocity` unless given directly
    pub fn stiffness(&self) -> f64 {
        self.stiffness
            .unwrap_or_else(|| self.model.coefficient(self.velocity, self.density))
    }

    pub fn wave_speed(&self) -> f64 {
        self.model.wave_speed(self.stiffness(), self.density)
    }

    fn validate(&self) -> Result<()> {
        if self.stiffness.is_none() && !(self.velocity.is_finite() && self.velocity > 0.0) {
            return Err(SimulationError::config(format!(
                "velocity must be positive, got {}",
                self.velocity
            )));
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(SimulationError::config(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        let stiffness = self.stiffness();
        if !(stiffness.is_finite() && stiffness > 0.0) {
            return Err(SimulationError::config(format!(
                "stiffness must be positive, got {stiffness}"
            )));
        }
        Ok(())
    }
}

/// Point source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Node indices; defaults to `n / 2` on every axis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<[usize; 3]>,
    /// Peak frequency f0
    pub frequency: f64,
    pub amplitude: f64,
    /// Force angle in degrees
    pub angle: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            position: None,
            frequency: 70.0,
            amplitude: 1e10,
            angle: 90.0,
        }
    }
}

/// Time stepping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Run duration
    pub tmax: f64,
    /// Timestep; defaults to `min_spacing / max_velocity`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    /// Accept a Courant number above one with a warning
    pub allow_cfl_violation: bool,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            tmax: 1.0,
            dt: None,
            allow_cfl_violation: false,
        }
    }
}

/// Linear solver options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub method: SolverMethod,
    pub rtol: f64,
    pub atol: f64,
    pub max_iterations: usize,
    /// Subtract the RHS mean before every solve
    pub remove_constant_mode: bool,
}

impl Default for SolverSection {
    fn default() -> Self {
        let solver = SolverConfig::default();
        Self {
            method: solver.method,
            rtol: solver.rtol,
            atol: solver.atol,
            max_iterations: solver.max_iterations,
            remove_constant_mode: true,
        }
    }
}

impl SolverSection {
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            method: self.method,
            rtol: self.rtol,
            atol: self.atol,
            max_iterations: self.max_iterations,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.rtol >= 0.0 && self.atol >= 0.0) || (self.rtol == 0.0 && self.atol == 0.0) {
            return Err(SimulationError::config(format!(
                "solver tolerances must be non-negative and not both zero (rtol={}, atol={})",
                self.rtol, self.atol
            )));
        }
        if self.max_iterations == 0 {
            return Err(SimulationError::config("max_iterations must be >= 1"));
        }
        Ok(())
    }
}

/// Diagnostics and snapshot output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Report and snapshot every this many steps
    pub interval: usize,
    /// Snapshot file name prefix, followed by the step number
    pub prefix: String,
    pub format: SnapshotFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            interval: 40,
            prefix: "tmp_Bvec_".to_string(),
            format: SnapshotFormat::Matlab,
        }
    }
}

/// Partition layout for parallel assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub blocks: [usize; 3],
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self { blocks: [1, 1, 1] }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub grid: GridConfig,
    pub material: MaterialConfig,
    pub source: SourceConfig,
    pub time: TimeConfig,
    pub solver: SolverSection,
    pub output: OutputConfig,
    pub partition: PartitionConfig,
}

impl RunConfig {
    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SimulationError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(contents)
            .map_err(|e| SimulationError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SimulationError::config(format!("failed to serialize configuration: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.material.validate()?;

        let counts = self.grid.node_counts();
        let position = self.source_position();
        if position.iter().zip(&counts).any(|(&p, &n)| p >= n) {
            return Err(SimulationError::config(format!(
                "source position {:?} outside grid {:?}",
                position, counts
            )));
        }
        SourceModel::new(
            position,
            self.source.frequency,
            self.source.amplitude,
            self.source.angle,
        )?;

        if !(self.time.tmax.is_finite() && self.time.tmax > 0.0) {
            return Err(SimulationError::config(format!(
                "tmax must be positive, got {}",
                self.time.tmax
            )));
        }
        if let Some(dt) = self.time.dt {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(SimulationError::config(format!(
                    "dt must be positive, got {dt}"
                )));
            }
        }
        if self.steps() == 0 {
            return Err(SimulationError::config(format!(
                "tmax {} is shorter than one timestep {}",
                self.time.tmax,
                self.dt()
            )));
        }
        if !cfl_satisfied(self.cfl()) && !self.time.allow_cfl_violation {
            return Err(SimulationError::config(format!(
                "CFL number {:.4} exceeds 1; reduce dt or set time.allow_cfl_violation",
                self.cfl()
            )));
        }

        self.solver.validate()?;
        if self.output.interval == 0 {
            return Err(SimulationError::config("output interval must be >= 1"));
        }
        if self.output.prefix.is_empty() && self.output.format != SnapshotFormat::None {
            return Err(SimulationError::config("snapshot prefix must not be empty"));
        }
        // block counts are checked against the node counts
        self.decomposition().map(|_| ())
    }

    pub fn source_position(&self) -> [usize; 3] {
        self.source.position.unwrap_or([
            self.grid.nx / 2,
            self.grid.ny / 2,
            self.grid.nz / 2,
        ])
    }

    /// Timestep, explicit or derived from the CFL limit
    pub fn dt(&self) -> f64 {
        self.time
            .dt
            .unwrap_or_else(|| stable_dt(self.grid.min_spacing(), self.material.wave_speed()))
    }

    /// `nt = floor(tmax / dt)`
    pub fn steps(&self) -> usize {
        step_count(self.time.tmax, self.dt())
    }

    pub fn cfl(&self) -> f64 {
        cfl_number(self.material.wave_speed(), self.dt(), self.grid.min_spacing())
    }

    /// Grid with the configured homogeneous material
    pub fn build_grid(&self) -> Result<GridModel> {
        let mut grid = GridModel::initialize(self.grid.node_counts(), self.grid.extents())?;
        let material = MaterialField::constant(
            grid.shape(),
            self.material.stiffness(),
            self.material.density,
            self.material.model,
        )?;
        grid.set_material(material)?;
        Ok(grid)
    }

    pub fn build_source(&self) -> Result<SourceModel> {
        SourceModel::new(
            self.source_position(),
            self.source.frequency,
            self.source.amplitude,
            self.source.angle,
        )
    }

    pub fn decomposition(&self) -> Result<DomainDecomposition> {
        let [px, py, pz] = self.partition.blocks;
        DomainDecomposition::new(
            (self.grid.nx, self.grid.ny, self.grid.nz),
            (px, py, pz),
            1,
        )
    }

    pub fn march_settings(&self) -> MarchSettings {
        MarchSettings {
            dt: self.dt(),
            steps: self.steps(),
            diagnostic_interval: self.output.interval,
            remove_constant_mode: self.solver.remove_constant_mode,
            allow_cfl_violation: self.time.allow_cfl_violation,
            solver: self.solver.solver_config(),
        }
    }
}
