//! Four-level wavefield history for the multistep scheme

use crate::engine::array::WaveArray;

/// Solution levels `{current, n-1, n-2, n-3}`.
///
/// The solve writes into `current` only. [`WavefieldHistory::advance`] then
/// shifts `n-2 -> n-3`, `n-1 -> n-2` and copies `current -> n-1`; the old
/// `n-3` is discarded. `current` keeps the latest solution so it can serve as
/// the next initial guess.
#[derive(Debug, Clone, PartialEq)]
pub struct WavefieldHistory {
    levels: [WaveArray<f64>; 4],
    rotations: usize,
}

impl WavefieldHistory {
    /// All four levels zero
    pub fn zeros(shape: (usize, usize, usize)) -> Self {
        Self {
            levels: [
                WaveArray::zeros(shape),
                WaveArray::zeros(shape),
                WaveArray::zeros(shape),
                WaveArray::zeros(shape),
            ],
            rotations: 0,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.levels[0].shape_tuple()
    }

    pub fn current(&self) -> &WaveArray<f64> {
        &self.levels[0]
    }

    pub fn current_mut(&mut self) -> &mut WaveArray<f64> {
        &mut self.levels[0]
    }

    /// Level `n - lag` for `lag` in 1..=3
    pub fn previous(&self, lag: usize) -> Option<&WaveArray<f64>> {
        match lag {
            1..=3 => Some(&self.levels[lag]),
            _ => None,
        }
    }

    /// `(n-1, n-2, n-3)`
    pub fn lagged(&self) -> (&WaveArray<f64>, &WaveArray<f64>, &WaveArray<f64>) {
        (&self.levels[1], &self.levels[2], &self.levels[3])
    }

    /// Shift every level one slot back after a solve into `current`
    pub fn advance(&mut self) {
        // [cur, a, b, c] -> [cur, c, a, b], then overwrite slot 1
        self.levels[1..].rotate_right(1);
        let (head, tail) = self.levels.split_at_mut(1);
        tail[0].copy_from(&head[0]);
        self.rotations += 1;
    }

    /// Store `solution` as current and shift
    pub fn rotate(&mut self, solution: &WaveArray<f64>) {
        self.levels[0].copy_from(solution);
        self.advance();
    }

    /// Number of shifts performed so far
    pub fn rotations(&self) -> usize {
        self.rotations
    }
}
