//! Resource grid: a subframe's worth of demodulated/to-be-modulated REs,
//! indexed `(symbol_index_in_subframe, subcarrier_index)`.
//!
//! Deviates from the teacher's `ndarray::Array2<Complex32>` by using a flat
//! `Vec<Complex32>` with a stride accessor (see `SPEC_FULL.md` §9): the grid
//! is always indexed by exactly two axes known at construction time, so the
//! extra dependency buys nothing here.

use common::{CellConfig, NofPrb};
use num_complex::Complex32;

/// A `rows x cols` view over a contiguous buffer, row-major.
#[derive(Debug, Clone, Copy)]
pub struct MatrixView {
    pub rows: usize,
    pub cols: usize,
}

impl MatrixView {
    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }
}

/// One subframe (2 slots) of complex baseband resource elements.
#[derive(Debug, Clone)]
pub struct ResourceGrid {
    view: MatrixView,
    data: Vec<Complex32>,
}

impl ResourceGrid {
    pub fn new(cell: &CellConfig) -> Self {
        let rows = 2 * cell.nof_symbols_per_slot() as usize;
        let cols = cell.nof_prb.num_subcarriers();
        Self {
            view: MatrixView { rows, cols },
            data: vec![Complex32::new(0.0, 0.0); rows * cols],
        }
    }

    pub fn num_symbols(&self) -> usize {
        self.view.rows
    }

    pub fn num_subcarriers(&self) -> usize {
        self.view.cols
    }

    /// Index of the DC (center) subcarrier.
    pub fn dc_index(nof_prb: &NofPrb) -> usize {
        nof_prb.num_subcarriers() / 2
    }

    pub fn get(&self, symbol: usize, subcarrier: usize) -> Complex32 {
        self.data[self.view.index(symbol, subcarrier)]
    }

    pub fn set(&mut self, symbol: usize, subcarrier: usize, value: Complex32) {
        let idx = self.view.index(symbol, subcarrier);
        self.data[idx] = value;
    }

    pub fn symbol(&self, symbol: usize) -> &[Complex32] {
        let start = symbol * self.view.cols;
        &self.data[start..start + self.view.cols]
    }

    pub fn symbol_mut(&mut self, symbol: usize) -> &mut [Complex32] {
        let start = symbol * self.view.cols;
        &mut self.data[start..start + self.view.cols]
    }

    pub fn clear(&mut self) {
        for s in self.data.iter_mut() {
            *s = Complex32::new(0.0, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CyclicPrefix, NofPorts, PhysCellId};

    fn test_cell() -> CellConfig {
        CellConfig::new(
            PhysCellId::new(1).unwrap(),
            NofPrb::Prb6,
            NofPorts::One,
            CyclicPrefix::Normal,
        )
    }

    #[test]
    fn grid_dimensions() {
        let grid = ResourceGrid::new(&test_cell());
        assert_eq!(grid.num_symbols(), 14);
        assert_eq!(grid.num_subcarriers(), 72);
    }

    #[test]
    fn set_then_get() {
        let mut grid = ResourceGrid::new(&test_cell());
        let value = Complex32::new(1.0, -1.0);
        grid.set(3, 10, value);
        assert_eq!(grid.get(3, 10), value);
        assert_eq!(grid.get(0, 0), Complex32::new(0.0, 0.0));
    }

    #[test]
    fn dc_index_is_centered() {
        assert_eq!(ResourceGrid::dc_index(&NofPrb::Prb25), 150);
    }
}
