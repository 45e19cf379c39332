//! Domain module: grid, material, source and the implicit time-marching scheme

pub mod grid;
pub mod history;
pub mod iteration;
pub mod marcher;
pub mod material;
pub mod operator;
pub mod rhs;
pub mod simulation;
pub mod source;

pub use grid::GridModel;
pub use history::WavefieldHistory;
pub use marcher::{MarchSettings, MarchState, MarchSummary, StepDiagnostics, TimeMarcher};
pub use material::{CoefficientModel, MaterialField};
pub use operator::OperatorBuilder;
pub use rhs::RhsBuilder;
pub use simulation::{simulate, SetupSummary, Simulation};
pub use source::{SourceForce, SourceModel};
