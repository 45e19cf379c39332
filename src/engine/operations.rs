//! Vector kernels used by the Krylov solvers
//!
//! All kernels act on flat slices in natural ordering. Reductions and
//! updates run on the rayon pool once vectors are large enough to amortize
//! the fork/join cost.

use rayon::prelude::*;

/// Below this length kernels stay sequential
const PARALLEL_THRESHOLD: usize = 4096;

/// Dot product x·y
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    if x.len() < PARALLEL_THRESHOLD {
        x.iter().zip(y).map(|(&a, &b)| a * b).sum()
    } else {
        x.par_iter().zip(y.par_iter()).map(|(&a, &b)| a * b).sum()
    }
}

/// Euclidean norm ||x||
pub fn norm2(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

/// y = alpha * x + y
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    if x.len() < PARALLEL_THRESHOLD {
        for (yi, &xi) in y.iter_mut().zip(x) {
            *yi += alpha * xi;
        }
    } else {
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(yi, &xi)| *yi += alpha * xi);
    }
}

/// out = alpha * a + beta * b
pub fn mix(alpha: f64, a: &[f64], beta: f64, b: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    if a.len() < PARALLEL_THRESHOLD {
        for ((o, &ai), &bi) in out.iter_mut().zip(a).zip(b) {
            *o = alpha * ai + beta * bi;
        }
    } else {
        out.par_iter_mut()
            .zip(a.par_iter())
            .zip(b.par_iter())
            .for_each(|((o, &ai), &bi)| *o = alpha * ai + beta * bi);
    }
}

/// y = x
pub fn copy(x: &[f64], y: &mut [f64]) {
    y.copy_from_slice(x);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_dot_and_norm() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![4.0, 5.0, 6.0];
        assert_abs_diff_eq!(dot(&x, &y), 32.0, epsilon = 1e-12);
        assert_abs_diff_eq!(norm2(&x), 14.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_axpy() {
        let x = vec![1.0, 2.0, 3.0];
        let mut y = vec![4.0, 5.0, 6.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, vec![6.0, 9.0, 12.0]);
    }

    #[test]
    fn test_mix_operation() {
        let a = vec![1.0; 8];
        let b = vec![2.0; 8];
        let mut out = vec![0.0; 8];
        mix(2.0, &a, 3.0, &b, &mut out);
        assert!(out.iter().all(|&v| v == 8.0));
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let n = PARALLEL_THRESHOLD * 2 + 3;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = (0..n).map(|i| (i as f64 * 0.11).cos()).collect();
        let expected: f64 = x.iter().zip(&y).map(|(a, b)| a * b).sum();
        assert_abs_diff_eq!(dot(&x, &y), expected, epsilon = 1e-9);

        let mut z = y.clone();
        axpy(-0.5, &x, &mut z);
        for i in [0, n / 2, n - 1] {
            assert_abs_diff_eq!(z[i], y[i] - 0.5 * x[i], epsilon = 1e-14);
        }
    }
}
