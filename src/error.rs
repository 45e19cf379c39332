//! Error types for acoustic simulations
//!
//! Every error aborts the run. Nothing is retried or recovered locally.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised during setup, assembly, solve or output
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Invalid grid, material, source, time or output parameters
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A stencil row referenced an index outside the grid
    #[error("assembly failure at row {row}: {reason}")]
    Assembly { row: usize, reason: String },

    /// The linear solve did not reach tolerance within its iteration budget
    #[error(
        "linear solve did not converge at step {step} \
         ({iterations} iterations, residual {residual:.3e})"
    )]
    SolveNonConvergence {
        step: usize,
        iterations: usize,
        residual: f64,
    },

    /// Writing a snapshot artifact failed
    #[error("failed to write snapshot for step {step} to {}: {source}", path.display())]
    SnapshotIo {
        step: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An operation was requested in a state that does not allow it
    #[error("invalid state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
}

impl SimulationError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SimulationError::Configuration(msg.into())
    }

    /// Step index associated with the error, if any
    pub fn step(&self) -> Option<usize> {
        match self {
            SimulationError::SolveNonConvergence { step, .. }
            | SimulationError::SnapshotIo { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SimulationError>;
