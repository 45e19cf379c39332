//! Iterative linear solvers for the per-step implicit system
//!
//! The marcher assembles `A x = b` explicitly and hands it to a
//! [`LinearSolver`]. Two Krylov methods are provided, both taking the
//! caller's `x` as initial guess:
//!
//! - [`ConjugateGradient`]: preconditioned CG, valid when `A` is symmetric
//!   (homogeneous material).
//! - [`BiCgStab`]: BiCGStab, valid for the general non-symmetric operator
//!   produced by heterogeneous material.

use crate::engine::operations::{axpy, copy, dot, mix, norm2};
use crate::engine::sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

/// Krylov method used for the per-step solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverMethod {
    Cg,
    #[default]
    BiCgStab,
}

impl std::fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverMethod::Cg => write!(f, "cg"),
            SolverMethod::BiCgStab => write!(f, "bicgstab"),
        }
    }
}

impl std::str::FromStr for SolverMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cg" => Ok(SolverMethod::Cg),
            "bicgstab" => Ok(SolverMethod::BiCgStab),
            other => Err(format!("unknown solver method '{other}' (expected cg or bicgstab)")),
        }
    }
}

/// Configuration for the iterative solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Krylov method
    pub method: SolverMethod,
    /// Relative tolerance on ||b - A x|| / ||b||
    pub rtol: f64,
    /// Absolute tolerance on ||b - A x||
    pub atol: f64,
    /// Maximum number of iterations per solve
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::BiCgStab,
            rtol: 1e-10,
            atol: 1e-30,
            max_iterations: 1000,
        }
    }
}

impl SolverConfig {
    /// Residual threshold for a right-hand side of norm `b_norm`
    pub fn threshold(&self, b_norm: f64) -> f64 {
        (self.rtol * b_norm).max(self.atol)
    }
}

/// Outcome classification of one solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Converged,
    MaxIterationsReached,
    /// Residual became non-finite
    Diverged,
    /// A Krylov recurrence broke down (zero denominator)
    Stagnated,
}

/// Result of one solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolverResult {
    pub status: SolverStatus,
    /// Number of iterations performed
    pub iterations: usize,
    /// Final residual norm
    pub residual_norm: f64,
    /// Residual norm of the initial guess
    pub initial_residual_norm: f64,
}

impl SolverResult {
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    fn new(status: SolverStatus, iterations: usize, residual_norm: f64, initial: f64) -> Self {
        Self {
            status,
            iterations,
            residual_norm,
            initial_residual_norm: initial,
        }
    }
}

/// Preconditioner `z = M^-1 r`
pub trait Preconditioner: Send + Sync {
    fn apply(&self, r: &[f64], z: &mut [f64]);
}

/// No preconditioning
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        copy(r, z);
    }
}

/// Diagonal (Jacobi) preconditioner
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    /// Build from the matrix diagonal; zero diagonal entries pass through unscaled
    pub fn from_matrix(matrix: &CsrMatrix) -> Self {
        let inv_diag = matrix
            .diagonal()
            .into_iter()
            .map(|d| if d.abs() > f64::MIN_POSITIVE { 1.0 / d } else { 1.0 })
            .collect();
        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, &ri), &di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
    }
}

/// A solver for `A x = b` using `x` as initial guess
pub trait LinearSolver: Send {
    /// Short identifier used in log output
    fn name(&self) -> &'static str;

    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult;
}

/// Create the solver selected by `config.method`
pub fn create_solver(config: &SolverConfig) -> Box<dyn LinearSolver> {
    match config.method {
        SolverMethod::Cg => Box::new(ConjugateGradient::new(config.clone())),
        SolverMethod::BiCgStab => Box::new(BiCgStab::new(config.clone())),
    }
}

fn residual(matrix: &CsrMatrix, b: &[f64], x: &[f64], r: &mut [f64]) {
    matrix.mul_vec_parallel(x, r);
    for (ri, &bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
}

fn resize(buf: &mut Vec<f64>, n: usize) {
    buf.clear();
    buf.resize(n, 0.0);
}

/// Preconditioned conjugate gradient
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    config: SolverConfig,
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    ap: Vec<f64>,
}

impl ConjugateGradient {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            z: Vec::new(),
            p: Vec::new(),
            ap: Vec::new(),
        }
    }
}

impl LinearSolver for ConjugateGradient {
    fn name(&self) -> &'static str {
        "cg"
    }

    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = b.len();
        for buf in [&mut self.r, &mut self.z, &mut self.p, &mut self.ap] {
            resize(buf, n);
        }

        let tol = self.config.threshold(norm2(b));
        residual(matrix, b, x, &mut self.r);
        let r0 = norm2(&self.r);
        if r0 <= tol {
            return SolverResult::new(SolverStatus::Converged, 0, r0, r0);
        }

        precond.apply(&self.r, &mut self.z);
        copy(&self.z, &mut self.p);
        let mut rz = dot(&self.r, &self.z);
        let mut res = r0;

        for iter in 0..self.config.max_iterations {
            matrix.mul_vec_parallel(&self.p, &mut self.ap);
            let pap = dot(&self.p, &self.ap);
            if pap.abs() < f64::MIN_POSITIVE {
                return SolverResult::new(SolverStatus::Stagnated, iter, res, r0);
            }

            let alpha = rz / pap;
            axpy(alpha, &self.p, x);
            axpy(-alpha, &self.ap, &mut self.r);

            res = norm2(&self.r);
            log::trace!("CG iter {}: residual = {:.6e}", iter + 1, res);
            if !res.is_finite() {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res, r0);
            }
            if res <= tol {
                return SolverResult::new(SolverStatus::Converged, iter + 1, res, r0);
            }

            precond.apply(&self.r, &mut self.z);
            let rz_new = dot(&self.r, &self.z);
            let beta = rz_new / rz;
            rz = rz_new;
            for (pi, &zi) in self.p.iter_mut().zip(&self.z) {
                *pi = zi + beta * *pi;
            }
        }

        SolverResult::new(
            SolverStatus::MaxIterationsReached,
            self.config.max_iterations,
            res,
            r0,
        )
    }
}

/// Right-preconditioned BiCGStab
#[derive(Debug, Clone)]
pub struct BiCgStab {
    config: SolverConfig,
    r: Vec<f64>,
    r_hat: Vec<f64>,
    p: Vec<f64>,
    p_hat: Vec<f64>,
    v: Vec<f64>,
    s: Vec<f64>,
    s_hat: Vec<f64>,
    t: Vec<f64>,
}

impl BiCgStab {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            r_hat: Vec::new(),
            p: Vec::new(),
            p_hat: Vec::new(),
            v: Vec::new(),
            s: Vec::new(),
            s_hat: Vec::new(),
            t: Vec::new(),
        }
    }
}

impl LinearSolver for BiCgStab {
    fn name(&self) -> &'static str {
        "bicgstab"
    }

    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = b.len();
        for buf in [
            &mut self.r,
            &mut self.r_hat,
            &mut self.p,
            &mut self.p_hat,
            &mut self.v,
            &mut self.s,
            &mut self.s_hat,
            &mut self.t,
        ] {
            resize(buf, n);
        }

        let tol = self.config.threshold(norm2(b));
        residual(matrix, b, x, &mut self.r);
        let r0 = norm2(&self.r);
        if r0 <= tol {
            return SolverResult::new(SolverStatus::Converged, 0, r0, r0);
        }
        // Shadow residual stays fixed for the whole solve
        copy(&self.r, &mut self.r_hat);

        let mut rho_old = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut res = r0;

        for iter in 0..self.config.max_iterations {
            let rho = dot(&self.r_hat, &self.r);
            if rho.abs() < f64::MIN_POSITIVE {
                return SolverResult::new(SolverStatus::Stagnated, iter, res, r0);
            }

            if iter == 0 {
                copy(&self.r, &mut self.p);
            } else {
                let beta = (rho / rho_old) * (alpha / omega);
                for ((pi, &ri), &vi) in self.p.iter_mut().zip(&self.r).zip(&self.v) {
                    *pi = ri + beta * (*pi - omega * vi);
                }
            }

            precond.apply(&self.p, &mut self.p_hat);
            matrix.mul_vec_parallel(&self.p_hat, &mut self.v);
            let r_hat_v = dot(&self.r_hat, &self.v);
            if r_hat_v.abs() < f64::MIN_POSITIVE {
                return SolverResult::new(SolverStatus::Stagnated, iter, res, r0);
            }
            alpha = rho / r_hat_v;

            mix(1.0, &self.r, -alpha, &self.v, &mut self.s);
            let s_norm = norm2(&self.s);
            if s_norm <= tol {
                axpy(alpha, &self.p_hat, x);
                log::trace!("BiCGStab iter {}: residual = {:.6e}", iter + 1, s_norm);
                return SolverResult::new(SolverStatus::Converged, iter + 1, s_norm, r0);
            }

            precond.apply(&self.s, &mut self.s_hat);
            matrix.mul_vec_parallel(&self.s_hat, &mut self.t);
            let tt = dot(&self.t, &self.t);
            omega = if tt > f64::MIN_POSITIVE {
                dot(&self.t, &self.s) / tt
            } else {
                0.0
            };
            if omega.abs() < f64::MIN_POSITIVE {
                return SolverResult::new(SolverStatus::Stagnated, iter + 1, s_norm, r0);
            }

            axpy(alpha, &self.p_hat, x);
            axpy(omega, &self.s_hat, x);
            mix(1.0, &self.s, -omega, &self.t, &mut self.r);

            res = norm2(&self.r);
            log::trace!("BiCGStab iter {}: residual = {:.6e}", iter + 1, res);
            if !res.is_finite() {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res, r0);
            }
            if res <= tol {
                return SolverResult::new(SolverStatus::Converged, iter + 1, res, r0);
            }
            rho_old = rho;
        }

        SolverResult::new(
            SolverStatus::MaxIterationsReached,
            self.config.max_iterations,
            res,
            r0,
        )
    }
}
