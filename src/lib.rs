//! Acoustic3D - time-domain simulation of scalar acoustic waves on 3-D structured grids
//!
//! Each step solves an implicit multistep system assembled from a 7-point
//! stencil, with a Ricker point source injected through the right-hand side.

pub mod config;
pub mod domain;
pub mod domain_decomposition;
pub mod engine;
pub mod error;
pub mod parallel_utils;
pub mod utilities;

// Re-export commonly used types
pub use config::RunConfig;
pub use domain::simulation::{simulate, SetupSummary, Simulation};
pub use engine::array::WaveArray;
pub use error::{Result, SimulationError};

pub mod prelude {
    //! Common imports for using the Acoustic3D library
    pub use crate::config::RunConfig;
    pub use crate::domain::iteration::{SolverConfig, SolverMethod};
    pub use crate::domain::{
        simulate, CoefficientModel, GridModel, MarchSettings, MarchState, MarchSummary,
        MaterialField, OperatorBuilder, RhsBuilder, Simulation, SourceForce, SourceModel,
        StepDiagnostics, TimeMarcher, WavefieldHistory,
    };
    pub use crate::domain_decomposition::DomainDecomposition;
    pub use crate::engine::array::WaveArray;
    pub use crate::error::{Result, SimulationError};
    pub use crate::utilities::{
        MatlabSnapshotSink, MemorySnapshotSink, NullSnapshotSink, SnapshotFormat, SnapshotSink,
    };
}
