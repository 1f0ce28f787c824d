//! OFDM modem: per-symbol DFT/IDFT with cyclic-prefix insertion/removal,
//! per spec §4.2. Mirrors the teacher's `ofdm.rs` CP-length/sample-rate
//! calculations, generalized to LTE's fixed 15 kHz numerology.

use common::{CellConfig, CyclicPrefix};
use num_complex::Complex32;

use crate::phy::primitives::DftPlanCache;
use crate::phy::resource_grid::ResourceGrid;
use crate::{PhyError, PhyResult};

/// Cyclic prefix length, in samples, for `symbol_in_slot` (0-indexed) at the
/// given symbol size, per 36.211 §4.2.4.
pub fn cp_length(cp: CyclicPrefix, symbol_in_slot: usize, symbol_sz: usize) -> usize {
    match cp {
        CyclicPrefix::Normal => {
            if symbol_in_slot == 0 {
                160 * symbol_sz / 2048
            } else {
                144 * symbol_sz / 2048
            }
        }
        CyclicPrefix::Extended => 512 * symbol_sz / 2048,
    }
}

/// Total number of OFDM symbols in a subframe (2 slots).
pub fn symbols_per_subframe(cell: &CellConfig) -> usize {
    2 * cell.nof_symbols_per_slot() as usize
}

/// Total sample count of one subframe (CP + symbol, summed over all symbols).
pub fn subframe_length(cell: &CellConfig) -> usize {
    let symbol_sz = cell.symbol_sz();
    let per_slot = cell.nof_symbols_per_slot() as usize;
    (0..symbols_per_subframe(cell))
        .map(|s| cp_length(cell.cp, s % per_slot, symbol_sz) + symbol_sz)
        .sum()
}

/// Maps a 0-indexed grid subcarrier column onto the DFT bin carrying it,
/// skipping the unused DC bin (36.211 §5.6).
fn grid_col_to_fft_bin(col: usize, num_sc: usize, fft_size: usize) -> usize {
    let half = num_sc / 2;
    if col < half {
        col + fft_size - half
    } else {
        col - half
    }
}

pub struct OfdmModulator {
    dft: DftPlanCache,
}

impl OfdmModulator {
    pub fn new() -> Self {
        Self {
            dft: DftPlanCache::new(),
        }
    }

    /// `grid → subframe_samples`, inverse of `OfdmDemodulator::demod`.
    pub fn modulate(&mut self, cell: &CellConfig, grid: &ResourceGrid) -> PhyResult<Vec<Complex32>> {
        let symbol_sz = cell.symbol_sz();
        let num_sc = cell.nof_prb.num_subcarriers();
        let per_slot = cell.nof_symbols_per_slot() as usize;
        let nsym = symbols_per_subframe(cell);
        if grid.num_symbols() != nsym || grid.num_subcarriers() != num_sc {
            return Err(PhyError::InvalidInput("grid does not match cell config".into()));
        }

        let mut out = Vec::with_capacity(subframe_length(cell));
        for sym in 0..nsym {
            let mut buf = vec![Complex32::new(0.0, 0.0); symbol_sz];
            let row = grid.symbol(sym);
            for (col, &val) in row.iter().enumerate() {
                let bin = grid_col_to_fft_bin(col, num_sc, symbol_sz);
                buf[bin] = val;
            }
            self.dft.inverse(&mut buf);
            // rustfft's inverse already divides by N via our cache; LTE's
            // IDFT convention additionally scales by sqrt(N) to keep unit
            // average symbol energy, applied here.
            let norm = (symbol_sz as f32).sqrt();
            for s in buf.iter_mut() {
                *s *= norm;
            }
            let cp_len = cp_length(cell.cp, sym % per_slot, symbol_sz);
            out.extend_from_slice(&buf[symbol_sz - cp_len..]);
            out.extend_from_slice(&buf);
        }
        Ok(out)
    }
}

impl Default for OfdmModulator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OfdmDemodulator {
    dft: DftPlanCache,
}

impl OfdmDemodulator {
    pub fn new() -> Self {
        Self {
            dft: DftPlanCache::new(),
        }
    }

    /// `subframe_samples → grid`, per spec §4.2.
    pub fn demodulate(&mut self, cell: &CellConfig, samples: &[Complex32]) -> PhyResult<ResourceGrid> {
        let expected_len = subframe_length(cell);
        if samples.len() < expected_len {
            return Err(PhyError::InvalidInput(format!(
                "expected at least {} samples, got {}",
                expected_len,
                samples.len()
            )));
        }

        let symbol_sz = cell.symbol_sz();
        let num_sc = cell.nof_prb.num_subcarriers();
        let per_slot = cell.nof_symbols_per_slot() as usize;
        let nsym = symbols_per_subframe(cell);

        let mut grid = ResourceGrid::new(cell);
        let mut offset = 0usize;
        for sym in 0..nsym {
            let cp_len = cp_length(cell.cp, sym % per_slot, symbol_sz);
            offset += cp_len;
            let mut buf: Vec<Complex32> = samples[offset..offset + symbol_sz].to_vec();
            offset += symbol_sz;

            let norm = 1.0 / (symbol_sz as f32).sqrt();
            for s in buf.iter_mut() {
                *s *= norm;
            }
            self.dft.forward(&mut buf);

            let row = grid.symbol_mut(sym);
            for (col, slot) in row.iter_mut().enumerate() {
                let bin = grid_col_to_fft_bin(col, num_sc, symbol_sz);
                *slot = buf[bin];
            }
        }
        Ok(grid)
    }
}

impl Default for OfdmDemodulator {
    fn default() -> Self {
        Self::new()
    }
}
