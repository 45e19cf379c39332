//! Compressed sparse row matrices for assembled stencil operators
//!
//! Rows are appended in order through [`CsrBuilder`]; column indices within a
//! row are kept sorted so lookups can binary search.

use crate::error::{Result, SimulationError};
use rayon::prelude::*;

/// Sparse matrix in CSR format
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    /// Row pointers, length n_rows + 1
    row_ptr: Vec<usize>,
    /// Column index of each stored entry
    col_idx: Vec<usize>,
    /// Value of each stored entry
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Identity matrix of size n
    pub fn identity(n: usize) -> Self {
        Self {
            n_rows: n,
            n_cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of one row
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        (&self.col_idx[start..end], &self.values[start..end])
    }

    /// Number of stored entries in one row
    pub fn row_nnz(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.row_ptr[row]
    }

    /// Entry (row, col), zero when not stored
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (cols, vals) = self.row(row);
        match cols.binary_search(&col) {
            Ok(idx) => vals[idx],
            Err(_) => 0.0,
        }
    }

    /// Diagonal entries (zero where no diagonal is stored)
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.get(i, i)).collect()
    }

    /// y = A * x
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n_cols, "x length must equal column count");
        assert_eq!(y.len(), self.n_rows, "y length must equal row count");

        for (row, yi) in y.iter_mut().enumerate() {
            *yi = self.row_dot(row, x);
        }
    }

    /// y = A * x with rows distributed over the rayon pool
    pub fn mul_vec_parallel(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n_cols, "x length must equal column count");
        assert_eq!(y.len(), self.n_rows, "y length must equal row count");

        y.par_iter_mut()
            .enumerate()
            .for_each(|(row, yi)| *yi = self.row_dot(row, x));
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &[f64]) -> f64 {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_idx[start..end]
            .iter()
            .zip(&self.values[start..end])
            .map(|(&col, &v)| v * x[col])
            .sum()
    }

    /// Check A == A^T within `tol` over all stored entries
    pub fn is_symmetric(&self, tol: f64) -> bool {
        if self.n_rows != self.n_cols {
            return false;
        }
        (0..self.n_rows).all(|row| {
            let (cols, vals) = self.row(row);
            cols.iter()
                .zip(vals)
                .all(|(&col, &v)| (v - self.get(col, row)).abs() <= tol)
        })
    }
}

/// Row-by-row CSR assembly
#[derive(Debug)]
pub struct CsrBuilder {
    n_rows: usize,
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrBuilder {
    /// Create a builder, reserving `nnz_hint` entries
    pub fn new(n_rows: usize, n_cols: usize, nnz_hint: usize) -> Self {
        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        row_ptr.push(0);
        Self {
            n_rows,
            n_cols,
            row_ptr,
            col_idx: Vec::with_capacity(nnz_hint),
            values: Vec::with_capacity(nnz_hint),
        }
    }

    /// Index of the next row to be pushed
    pub fn next_row(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Append the next row. Entries may come in any column order; duplicate
    /// columns are summed.
    pub fn push_row(&mut self, entries: &[(usize, f64)]) -> Result<()> {
        let row = self.next_row();
        if row >= self.n_rows {
            return Err(SimulationError::Assembly {
                row,
                reason: format!("matrix already has {} rows", self.n_rows),
            });
        }

        let mut sorted = entries.to_vec();
        sorted.sort_unstable_by_key(|&(col, _)| col);

        let row_start = self.col_idx.len();
        for (col, value) in sorted {
            if col >= self.n_cols {
                return Err(SimulationError::Assembly {
                    row,
                    reason: format!("column {} outside 0..{}", col, self.n_cols),
                });
            }
            if self.col_idx.len() > row_start && self.col_idx.last() == Some(&col) {
                if let Some(last) = self.values.last_mut() {
                    *last += value;
                }
            } else {
                self.col_idx.push(col);
                self.values.push(value);
            }
        }
        self.row_ptr.push(self.col_idx.len());
        Ok(())
    }

    /// Finish assembly; every row must have been pushed
    pub fn build(self) -> Result<CsrMatrix> {
        let pushed = self.next_row();
        if pushed != self.n_rows {
            return Err(SimulationError::Assembly {
                row: pushed,
                reason: format!("only {} of {} rows assembled", pushed, self.n_rows),
            });
        }
        Ok(CsrMatrix {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            row_ptr: self.row_ptr,
            col_idx: self.col_idx,
            values: self.values,
        })
    }
}
