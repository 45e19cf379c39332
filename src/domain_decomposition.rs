//! Grid partitioning for parallel assembly
//!
//! The global grid is split into a block of subdomains. Each subdomain owns a
//! half-open box of node indices; stencil work for those nodes runs on the
//! rayon pool. Values owned by a neighbouring subdomain are read through a
//! [`HaloView`], a ghosted copy of the local box refreshed from the global
//! field before evaluation.

use crate::engine::array::WaveArray;
use crate::error::{Result, SimulationError};
use ndarray::{s, Array3};
use std::ops::Range;

/// Information about a single subdomain
#[derive(Debug, Clone, PartialEq)]
pub struct Subdomain {
    /// ID of this subdomain
    pub id: usize,
    /// Starting indices in the global domain
    pub start: [usize; 3],
    /// Ending indices in the global domain (exclusive)
    pub end: [usize; 3],
    /// Indices of neighboring subdomains
    pub neighbors: Neighbors,
}

impl Subdomain {
    /// Owned index ranges per axis
    pub fn ranges(&self) -> [Range<usize>; 3] {
        [
            self.start[0]..self.end[0],
            self.start[1]..self.end[1],
            self.start[2]..self.end[2],
        ]
    }

    /// Local box shape
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.end[0] - self.start[0],
            self.end[1] - self.start[1],
            self.end[2] - self.start[2],
        )
    }

    /// Number of owned nodes
    pub fn len(&self) -> usize {
        let (a, b, c) = self.shape();
        a * b * c
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owns(&self, i: usize, j: usize, k: usize) -> bool {
        (self.start[0]..self.end[0]).contains(&i)
            && (self.start[1]..self.end[1]).contains(&j)
            && (self.start[2]..self.end[2]).contains(&k)
    }

    /// Owned nodes, x fastest
    pub fn nodes(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let [ri, rj, rk] = self.ranges();
        rk.flat_map(move |k| {
            let ri = ri.clone();
            rj.clone()
                .flat_map(move |j| ri.clone().map(move |i| (i, j, k)))
        })
    }
}

/// Neighbor information for a subdomain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub left: Option<usize>,   // -x direction
    pub right: Option<usize>,  // +x direction
    pub front: Option<usize>,  // -y direction
    pub back: Option<usize>,   // +y direction
    pub bottom: Option<usize>, // -z direction
    pub top: Option<usize>,    // +z direction
}

impl Neighbors {
    pub fn count(&self) -> usize {
        [
            self.left,
            self.right,
            self.front,
            self.back,
            self.bottom,
            self.top,
        ]
        .iter()
        .filter(|n| n.is_some())
        .count()
    }
}

/// Grid-partition descriptor
#[derive(Debug, Clone)]
pub struct DomainDecomposition {
    /// Global domain shape
    pub global_shape: (usize, usize, usize),
    /// Number of subdomains in each direction
    pub decomposition: (usize, usize, usize),
    /// List of all subdomains
    pub subdomains: Vec<Subdomain>,
    /// Ghost layer thickness for halo views
    pub ghost_cells: usize,
}

impl DomainDecomposition {
    /// Split `global_shape` into `decomposition` blocks.
    ///
    /// Every axis needs between 1 and `n` blocks; the last block on an axis
    /// absorbs the remainder.
    pub fn new(
        global_shape: (usize, usize, usize),
        decomposition: (usize, usize, usize),
        ghost_cells: usize,
    ) -> Result<Self> {
        let shape = [global_shape.0, global_shape.1, global_shape.2];
        let blocks = [decomposition.0, decomposition.1, decomposition.2];
        for axis in 0..3 {
            if blocks[axis] == 0 || blocks[axis] > shape[axis] {
                return Err(SimulationError::config(format!(
                    "cannot split {} nodes into {} blocks on axis {}",
                    shape[axis], blocks[axis], axis
                )));
            }
        }

        let subdomains = Self::create_subdomains(global_shape, decomposition);
        Ok(Self {
            global_shape,
            decomposition,
            subdomains,
            ghost_cells,
        })
    }

    /// Single subdomain covering the whole grid
    pub fn single(global_shape: (usize, usize, usize)) -> Self {
        Self {
            global_shape,
            decomposition: (1, 1, 1),
            subdomains: Self::create_subdomains(global_shape, (1, 1, 1)),
            ghost_cells: 1,
        }
    }

    fn subdomain_id(decomposition: (usize, usize, usize), i: usize, j: usize, k: usize) -> usize {
        k + j * decomposition.2 + i * decomposition.1 * decomposition.2
    }

    fn create_subdomains(
        global_shape: (usize, usize, usize),
        decomposition: (usize, usize, usize),
    ) -> Vec<Subdomain> {
        let shape = [global_shape.0, global_shape.1, global_shape.2];
        let blocks = [decomposition.0, decomposition.1, decomposition.2];
        let size = [
            shape[0] / blocks[0],
            shape[1] / blocks[1],
            shape[2] / blocks[2],
        ];
        let bounds = |axis: usize, b: usize| {
            let start = b * size[axis];
            let end = if b == blocks[axis] - 1 {
                shape[axis]
            } else {
                (b + 1) * size[axis]
            };
            (start, end)
        };
        let id = |i, j, k| Self::subdomain_id(decomposition, i, j, k);

        let mut subdomains = Vec::with_capacity(blocks.iter().product());
        for i in 0..blocks[0] {
            for j in 0..blocks[1] {
                for k in 0..blocks[2] {
                    let (x0, x1) = bounds(0, i);
                    let (y0, y1) = bounds(1, j);
                    let (z0, z1) = bounds(2, k);

                    let neighbors = Neighbors {
                        left: (i > 0).then(|| id(i - 1, j, k)),
                        right: (i + 1 < blocks[0]).then(|| id(i + 1, j, k)),
                        front: (j > 0).then(|| id(i, j - 1, k)),
                        back: (j + 1 < blocks[1]).then(|| id(i, j + 1, k)),
                        bottom: (k > 0).then(|| id(i, j, k - 1)),
                        top: (k + 1 < blocks[2]).then(|| id(i, j, k + 1)),
                    };

                    subdomains.push(Subdomain {
                        id: id(i, j, k),
                        start: [x0, y0, z0],
                        end: [x1, y1, z1],
                        neighbors,
                    });
                }
            }
        }
        subdomains
    }

    /// Get the subdomain for a given index
    pub fn get_subdomain(&self, index: usize) -> &Subdomain {
        &self.subdomains[index]
    }

    /// Get the number of subdomains
    pub fn num_subdomains(&self) -> usize {
        self.subdomains.len()
    }

    /// Global node counts
    pub fn global_counts(&self) -> [usize; 3] {
        [self.global_shape.0, self.global_shape.1, self.global_shape.2]
    }

    /// Ghosted copy of `field` around `subdomain`.
    ///
    /// The view spans the owned box widened by `ghost_cells` on every side,
    /// clipped to the global grid. With shared-memory partitions the halo
    /// exchange is a copy from the global field.
    pub fn refresh_halo(&self, subdomain: &Subdomain, field: &WaveArray<f64>) -> HaloView {
        let g = self.ghost_cells;
        let counts = self.global_counts();
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for axis in 0..3 {
            lo[axis] = subdomain.start[axis].saturating_sub(g);
            hi[axis] = (subdomain.end[axis] + g).min(counts[axis]);
        }
        let data = field
            .data
            .slice(s![lo[0]..hi[0], lo[1]..hi[1], lo[2]..hi[2]])
            .to_owned();
        HaloView { origin: lo, data }
    }
}

/// Ghosted local copy of a global field, addressed with global indices
#[derive(Debug, Clone)]
pub struct HaloView {
    origin: [usize; 3],
    data: Array3<f64>,
}

impl HaloView {
    /// Global index of the first stored node
    pub fn origin(&self) -> [usize; 3] {
        self.origin
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Value at global node (i, j, k), `None` outside the ghosted box
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        let li = i.checked_sub(self.origin[0])?;
        let lj = j.checked_sub(self.origin[1])?;
        let lk = k.checked_sub(self.origin[2])?;
        self.data.get([li, lj, lk]).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(dd: &DomainDecomposition, i: usize, j: usize, k: usize) -> Option<usize> {
        dd.subdomains.iter().find(|sub| sub.owns(i, j, k)).map(|sub| sub.id)
    }

    #[test]
    fn test_octant_split_of_reference_grid() {
        let dd = DomainDecomposition::new((25, 25, 25), (2, 2, 2), 1).unwrap();
        assert_eq!(dd.num_subdomains(), 8);
        assert_eq!(dd.global_counts(), [25, 25, 25]);

        let corner = dd.get_subdomain(0);
        assert_eq!(corner.start, [0, 0, 0]);
        assert_eq!(corner.end, [12, 12, 12]);
        assert_eq!(corner.neighbors.count(), 3);
        assert_eq!(corner.neighbors.right, owner(&dd, 12, 0, 0));
        assert!(corner.neighbors.left.is_none() && corner.neighbors.bottom.is_none());

        // the default source node lands in the far octant
        assert_eq!(owner(&dd, 12, 12, 12), Some(7));
        assert_eq!(owner(&dd, 25, 0, 0), None);
    }

    #[test]
    fn test_uneven_split_covers_grid() {
        let dd = DomainDecomposition::new((25, 25, 25), (2, 3, 1), 1).unwrap();
        let total: usize = dd.subdomains.iter().map(Subdomain::len).sum();
        assert_eq!(total, 25 * 25 * 25);

        for (i, j, k) in [(0, 0, 0), (12, 8, 3), (24, 24, 24), (11, 16, 20)] {
            let owners = dd
                .subdomains
                .iter()
                .filter(|sub| sub.owns(i, j, k))
                .count();
            assert_eq!(owners, 1);
        }
        assert_eq!(dd.get_subdomain(dd.num_subdomains() - 1).ranges()[0], 12..25);
    }

    #[test]
    fn test_invalid_block_counts() {
        assert!(DomainDecomposition::new((5, 5, 5), (0, 1, 1), 1).is_err());
        assert!(DomainDecomposition::new((5, 5, 5), (1, 6, 1), 1).is_err());
    }

    #[test]
    fn test_nodes_iterate_x_fastest() {
        let dd = DomainDecomposition::single((2, 2, 2));
        let nodes: Vec<_> = dd.get_subdomain(0).nodes().collect();
        assert_eq!(nodes.len(), 8);
        assert_eq!(nodes[0], (0, 0, 0));
        assert_eq!(nodes[1], (1, 0, 0));
        assert_eq!(nodes[2], (0, 1, 0));
        assert_eq!(nodes[4], (0, 0, 1));
    }

    #[test]
    fn test_halo_reads_neighbour_values() {
        let shape = (6, 4, 4);
        let values: Vec<f64> = (0..6 * 4 * 4).map(|v| v as f64).collect();
        let field = WaveArray::from_flat(shape, values).unwrap();
        let dd = DomainDecomposition::new(shape, (2, 1, 1), 1).unwrap();

        let left = dd.get_subdomain(0);
        let halo = dd.refresh_halo(left, &field);
        assert_eq!(halo.origin(), [0, 0, 0]);
        assert_eq!(halo.shape(), &[4, 4, 4]);
        // x = 3 belongs to the right subdomain but sits in the ghost layer
        assert_eq!(halo.get(3, 1, 2), Some(field.data[[3, 1, 2]]));
        assert_eq!(halo.get(4, 1, 2), None);

        let right = dd.get_subdomain(1);
        let halo = dd.refresh_halo(right, &field);
        assert_eq!(halo.origin(), [2, 0, 0]);
        assert_eq!(halo.get(2, 3, 3), Some(field.data[[2, 3, 3]]));
        assert_eq!(halo.get(1, 0, 0), None);
    }
}
