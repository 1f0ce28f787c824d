//! Cell-specific reference signal generation and channel estimation,
//! per spec §4.3.

use common::{CellConfig, CyclicPrefix};
use num_complex::Complex32;

use crate::phy::primitives::GoldSequence;
use crate::phy::resource_grid::ResourceGrid;

/// One pilot RE: its position in the subframe and expected transmitted value.
#[derive(Debug, Clone, Copy)]
pub struct Pilot {
    pub symbol: usize,
    pub subcarrier: usize,
    pub value: Complex32,
}

/// v-shift offset per CRS antenna port, per spec §3 (simplified per-port
/// table `{0,3,3,6}`, not the `ns`-dependent table of full 36.211).
fn port_offset(port: u8) -> u16 {
    match port {
        0 => 0,
        1 => 3,
        2 => 3,
        3 => 6,
        _ => 0,
    }
}

/// True if `symbol_in_slot` carries CRS for `port`, per spec §3.
fn is_pilot_symbol(port: u8, symbol_in_slot: u8, nof_symbols_per_slot: u8) -> bool {
    match port {
        0 | 1 => symbol_in_slot == 0 || symbol_in_slot == nof_symbols_per_slot - 3,
        2 | 3 => symbol_in_slot == 1,
        _ => false,
    }
}

fn crs_cinit(cell_id: u16, ns: u16, l: u16, cp: CyclicPrefix) -> u32 {
    let n_cp = match cp {
        CyclicPrefix::Normal => 1,
        CyclicPrefix::Extended => 0,
    };
    let cell_id = cell_id as u32;
    (1u32 << 10) * (7 * (ns as u32 + 1) + l as u32 + 1) * (2 * cell_id + 1) + 2 * cell_id + n_cp
}

pub struct CrsGenerator;

impl CrsGenerator {
    /// Pilot list for `port` in absolute subframe symbol index `symbol`
    /// (`ns` = slot number 0..19 implied by the caller, `symbol_in_slot` =
    /// `symbol % nof_symbols_per_slot`).
    pub fn pilots_for_symbol(cell: &CellConfig, port: u8, ns: u16, symbol: usize) -> Vec<Pilot> {
        let per_slot = cell.nof_symbols_per_slot();
        let symbol_in_slot = (symbol % per_slot as usize) as u8;
        if !is_pilot_symbol(port, symbol_in_slot, per_slot) {
            return Vec::new();
        }

        let cell_id = cell.id.value();
        let v = port_offset(port);
        let v_shift = cell_id % 6;
        let initial_offset = (v + v_shift) % 6;
        let num_pilots = 2 * cell.nof_prb.count() as usize;

        let c_init = crs_cinit(cell_id, ns, symbol_in_slot as u16, cell.cp);
        let mut gold = GoldSequence::new(c_init);
        let symbols = gold.next_qpsk_symbols(num_pilots);

        symbols
            .into_iter()
            .enumerate()
            .map(|(m, value)| Pilot {
                symbol,
                subcarrier: 6 * m + initial_offset as usize,
                value,
            })
            .collect()
    }

    /// All pilots for `port` across an entire subframe.
    pub fn pilots_for_subframe(cell: &CellConfig, port: u8, subframe: u16) -> Vec<Pilot> {
        let per_slot = cell.nof_symbols_per_slot() as usize;
        let mut out = Vec::new();
        for slot_in_subframe in 0..2u16 {
            let ns = 2 * subframe + slot_in_subframe;
            for symbol_in_slot in 0..per_slot {
                let symbol = slot_in_subframe as usize * per_slot + symbol_in_slot;
                out.extend(Self::pilots_for_symbol(cell, port, ns, symbol));
            }
        }
        out
    }
}

/// Least-squares channel estimate at pilots, interpolated to the full grid
/// with a separable low-pass filter wide enough to span the CRS pilot
/// spacing (6 subcarriers, up to 4 symbols). Per spec §4.3: never returns
/// NaN for finite input; falls back to a grid-wide nearest neighbor for any
/// RE the kernel still doesn't reach.
pub struct ChannelEstimator {
    time_taps: usize,
    freq_taps: usize,
}

impl ChannelEstimator {
    pub fn new() -> Self {
        Self {
            // CRS pilots are 6 subcarriers apart in frequency and up to 4
            // OFDM symbols apart in time (symbols {0,4,7,11} for ports 0/1,
            // normal CP); the kernel must span both gaps, or most REs never
            // see a pilot and fall through to the zero default.
            time_taps: 9,
            freq_taps: 13,
        }
    }

    /// Estimate the channel for one antenna port from a received grid and
    /// the known pilot list for that port.
    pub fn estimate(&self, cell: &CellConfig, received: &ResourceGrid, pilots: &[Pilot]) -> ResourceGrid {
        let mut ls = ResourceGrid::new(cell);
        let mut has_estimate = vec![false; ls.num_symbols() * ls.num_subcarriers()];
        let cols = ls.num_subcarriers();

        for p in pilots {
            let y = received.get(p.symbol, p.subcarrier);
            let h = y / p.value;
            ls.set(p.symbol, p.subcarrier, h);
            has_estimate[p.symbol * cols + p.subcarrier] = true;
        }

        self.interpolate(&mut ls, &has_estimate)
    }

    fn interpolate(&self, grid: &mut ResourceGrid, has_estimate: &[bool]) -> ResourceGrid {
        let rows = grid.num_symbols();
        let cols = grid.num_subcarriers();
        let mut out = grid.clone();

        for s in 0..rows {
            for c in 0..cols {
                if has_estimate[s * cols + c] {
                    continue;
                }
                let mut acc = Complex32::new(0.0, 0.0);
                let mut weight = 0.0f32;

                let t_half = (self.time_taps / 2) as isize;
                let f_half = (self.freq_taps / 2) as isize;
                for dt in -t_half..=t_half {
                    let ss = s as isize + dt;
                    if ss < 0 || ss as usize >= rows {
                        continue;
                    }
                    for df in -f_half..=f_half {
                        let cc = c as isize + df;
                        if cc < 0 || cc as usize >= cols {
                            continue;
                        }
                        let (ss, cc) = (ss as usize, cc as usize);
                        if !has_estimate[ss * cols + cc] {
                            continue;
                        }
                        let tap = 1.0 / (1.0 + dt.unsigned_abs() as f32 + df.unsigned_abs() as f32);
                        acc += grid.get(ss, cc) * tap;
                        weight += tap;
                    }
                }

                let estimate = if weight > 0.0 {
                    acc / weight
                } else {
                    nearest_pilot_estimate(grid, has_estimate, cols, s, c).unwrap_or(Complex32::new(0.0, 0.0))
                };
                out.set(s, c, estimate);
            }
        }
        out
    }
}

/// Grid-wide nearest-neighbor fallback for REs the local kernel didn't
/// reach: the closest (Manhattan distance) RE with an estimate, if any.
fn nearest_pilot_estimate(grid: &ResourceGrid, has_estimate: &[bool], cols: usize, s: usize, c: usize) -> Option<Complex32> {
    let mut best: Option<(usize, Complex32)> = None;
    for (idx, &has) in has_estimate.iter().enumerate() {
        if !has {
            continue;
        }
        let (ss, cc) = (idx / cols, idx % cols);
        let dist = (ss as isize - s as isize).unsigned_abs() + (cc as isize - c as isize).unsigned_abs();
        if best.map_or(true, |(bd, _)| dist < bd) {
            best = Some((dist, grid.get(ss, cc)));
        }
    }
    best.map(|(_, v)| v)
}

impl Default for ChannelEstimator {
    fn default() -> Self {
        Self::new()
    }
}
