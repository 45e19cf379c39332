//! Parallel helpers over a domain decomposition
//!
//! Per-subdomain work runs on the rayon pool; global reductions combine the
//! partial results of every subdomain and therefore act as a barrier.

use crate::domain_decomposition::{DomainDecomposition, Subdomain};
use crate::engine::array::WaveArray;
use crate::error::Result;
use ndarray::{s, Array3};
use rayon::prelude::*;

/// Global statistics of a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub max: f64,
    pub min: f64,
    /// Euclidean norm
    pub norm: f64,
}

#[derive(Debug, Clone, Copy)]
struct Partial {
    max: f64,
    min: f64,
    sum_sq: f64,
}

impl Partial {
    const EMPTY: Partial = Partial {
        max: f64::NEG_INFINITY,
        min: f64::INFINITY,
        sum_sq: 0.0,
    };

    fn merge(self, other: Partial) -> Partial {
        Partial {
            max: self.max.max(other.max),
            min: self.min.min(other.min),
            sum_sq: self.sum_sq + other.sum_sq,
        }
    }
}

fn local_partial(field: &WaveArray<f64>, sub: &Subdomain) -> Partial {
    let [ri, rj, rk] = sub.ranges();
    field
        .data
        .slice(s![ri, rj, rk])
        .fold(Partial::EMPTY, |acc, &v| Partial {
            max: acc.max.max(v),
            min: acc.min.min(v),
            sum_sq: acc.sum_sq + v * v,
        })
}

/// Max, min and 2-norm of `field` reduced across all subdomains
pub fn field_statistics(field: &WaveArray<f64>, decomposition: &DomainDecomposition) -> FieldStats {
    let total = decomposition
        .subdomains
        .par_iter()
        .map(|sub| local_partial(field, sub))
        .reduce(|| Partial::EMPTY, Partial::merge);

    FieldStats {
        max: total.max,
        min: total.min,
        norm: total.sum_sq.sqrt(),
    }
}

/// Run `work` on every subdomain in parallel, collecting results in
/// subdomain order
pub fn par_map_subdomains<R, F>(decomposition: &DomainDecomposition, work: F) -> Vec<R>
where
    R: Send,
    F: Fn(&Subdomain) -> R + Send + Sync,
{
    decomposition.subdomains.par_iter().map(work).collect()
}

/// Fill `field` block by block.
///
/// `local` computes the owned box of each subdomain in parallel; the blocks
/// are copied into place once all of them succeeded.
pub fn par_fill_blocks<F>(
    field: &mut WaveArray<f64>,
    decomposition: &DomainDecomposition,
    local: F,
) -> Result<()>
where
    F: Fn(&Subdomain) -> Result<Array3<f64>> + Send + Sync,
{
    let blocks = par_map_subdomains(decomposition, |sub| local(sub).map(|b| (sub.ranges(), b)));
    for block in blocks {
        let ([ri, rj, rk], values) = block?;
        field.data.slice_mut(s![ri, rj, rk]).assign(&values);
    }
    Ok(())
}
