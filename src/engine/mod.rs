//! Engine module containing array abstractions, sparse storage and vector kernels

pub mod array;
pub mod operations;
pub mod sparse;

pub use array::WaveArray;
pub use operations::*;
pub use sparse::{CsrBuilder, CsrMatrix};
