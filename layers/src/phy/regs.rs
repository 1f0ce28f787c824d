//! REG (Resource Element Group) and CCE (Control Channel Element) indexing
//! for the control region, per spec §4.6.
//!
//! Grounded in `original_source/lte/lib/phch/src/regs.c`: REG enumeration is
//! symbol-major, PHICH REG placement runs after PCFICH REGs are excluded,
//! and the canonical PHICH naming is `PhichLength::{Normal,Extended}` (the
//! source's alternate `PHICH_NORM`/`PHICH_EXT` convention, per `SPEC_FULL.md`
//! §9's open-question resolution).
//!
//! REG-per-PRB-per-symbol counts are derived directly from CRS pilot
//! occupancy rather than a hardcoded 3GPP lookup table: REGs are formed from
//! runs of CRS-free subcarriers within a symbol. This keeps the enumeration
//! internally consistent (REGs partition the control region, PCFICH/PHICH
//! REGs are disjoint subsets of it) without reproducing 36.211's full
//! per-symbol REG-count table from memory.

use common::{CellConfig, NofPorts, PhichLength, PhichResources};

use crate::phy::refsignal::CrsGenerator;
use crate::{PhyError, PhyResult};

/// One Resource Element Group: 4 REs in a single OFDM symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg {
    pub symbol: usize,
    pub subcarriers: [usize; 4],
}

impl Reg {
    pub fn contains_subcarrier(&self, sc: usize) -> bool {
        self.subcarriers.contains(&sc)
    }
}

pub fn max_ctrl_symbols(cell: &CellConfig) -> usize {
    if cell.nof_prb.count() <= 10 {
        4
    } else {
        3
    }
}

/// Enumerates every REG in the control region (symbol-major,
/// subcarrier-ascending), excluding CRS pilot REs for any active port.
pub struct RegTable {
    regs: Vec<Reg>,
}

impl RegTable {
    pub fn new(cell: &CellConfig) -> Self {
        let max_symbols = max_ctrl_symbols(cell);
        let num_sc = cell.nof_prb.num_subcarriers();
        let mut regs = Vec::new();

        for symbol in 0..max_symbols {
            let mut pilot_subcarriers = vec![false; num_sc];
            for port in 0..cell.nof_ports.count() {
                for p in CrsGenerator::pilots_for_symbol(cell, port, 0, symbol) {
                    pilot_subcarriers[p.subcarrier] = true;
                }
            }

            let free: Vec<usize> = (0..num_sc).filter(|&sc| !pilot_subcarriers[sc]).collect();
            for chunk in free.chunks(4) {
                if chunk.len() == 4 {
                    regs.push(Reg {
                        symbol,
                        subcarriers: [chunk[0], chunk[1], chunk[2], chunk[3]],
                    });
                }
            }
        }

        Self { regs }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Reg {
        &self.regs[idx]
    }

    pub fn all(&self) -> &[Reg] {
        &self.regs
    }

    /// Find the REG (in symbol 0) whose subcarrier set is closest to `target`.
    fn nearest_in_symbol(&self, symbol: usize, target: usize, excluded: &[bool]) -> Option<usize> {
        self.regs
            .iter()
            .enumerate()
            .filter(|(i, r)| r.symbol == symbol && !excluded[*i])
            .min_by_key(|(_, r)| {
                r.subcarriers
                    .iter()
                    .map(|&sc| (sc as i64 - target as i64).unsigned_abs())
                    .min()
                    .unwrap()
            })
            .map(|(i, _)| i)
    }

    /// The 4 PCFICH REG indices, per spec §3: `k_hat + i*(nof_prb/2)*6 mod (nof_prb*12)`.
    pub fn pcfich_regs(&self, cell: &CellConfig) -> PhyResult<[usize; 4]> {
        let nof_prb = cell.nof_prb.count() as usize;
        let num_sc = cell.nof_prb.num_subcarriers();
        let k_hat = 6 * (cell.id.value() as usize % (2 * nof_prb));
        let mut excluded = vec![false; self.regs.len()];
        let mut out = [0usize; 4];
        for i in 0..4 {
            let target = (k_hat + i * (nof_prb / 2) * 6) % num_sc;
            let idx = self
                .nearest_in_symbol(0, target, &excluded)
                .ok_or_else(|| PhyError::ResourceExhausted("no free REG for PCFICH".into()))?;
            excluded[idx] = true;
            out[i] = idx;
        }
        Ok(out)
    }

    /// PHICH group REG indices: `ngroups` groups of 3 REGs each.
    pub fn phich_regs(
        &self,
        cell: &CellConfig,
        phich_length: PhichLength,
        phich_resources: PhichResources,
        assigned: &mut [bool],
    ) -> PhyResult<Vec<[usize; 3]>> {
        let ngroups = phich_resources.num_groups(&cell.nof_prb);
        let mut groups = Vec::with_capacity(ngroups);

        for mi in 0..ngroups {
            let mut group = [0usize; 3];
            for i in 0..3usize {
                let symbol = match phich_length {
                    PhichLength::Extended => i,
                    PhichLength::Normal => 0,
                };
                let n_l = self.regs.iter().filter(|r| r.symbol == symbol).count().max(1);
                let n_0 = self.regs.iter().filter(|r| r.symbol == 0).count().max(1);
                let n_i = (cell.id.value() as usize * n_l / n_0 + mi + i * n_l / 3) % n_l;

                let candidates: Vec<usize> = self
                    .regs
                    .iter()
                    .enumerate()
                    .filter(|(idx, r)| r.symbol == symbol && !assigned[*idx])
                    .map(|(idx, _)| idx)
                    .collect();
                if candidates.is_empty() {
                    return Err(PhyError::ResourceExhausted("no free REG for PHICH".into()));
                }
                let pick = candidates[n_i % candidates.len()];
                assigned[pick] = true;
                group[i] = pick;
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

/// 36.212 Table 5.1.4-2 inter-column permutation for the 32-column
/// sub-block interleaver, shared by the REG interleaver and rate matching.
pub const SUBBLOCK_INTERLEAVER_PATTERN: [usize; 32] = [
    0, 16, 8, 24, 4, 20, 12, 28, 2, 18, 10, 26, 6, 22, 14, 30, 1, 17, 9, 25, 5, 21, 13, 29, 3, 19,
    11, 27, 7, 23, 15, 31,
];

/// Interleave the PDCCH REG pool (36.212's sub-block interleaver applied to
/// REG indices, rather than bits) and apply the cell-id cyclic shift.
pub fn interleave_pdcch_regs(pool: &[usize]) -> Vec<usize> {
    if pool.is_empty() {
        return Vec::new();
    }
    let cols = 32usize;
    let rows = (pool.len() + cols - 1) / cols;
    let padded_len = rows * cols;

    let mut matrix = vec![None; padded_len];
    for (i, &reg) in pool.iter().enumerate() {
        matrix[i] = Some(reg);
    }

    let mut out = Vec::with_capacity(pool.len());
    for col in SUBBLOCK_INTERLEAVER_PATTERN.iter() {
        for row in 0..rows {
            if let Some(reg) = matrix[row * cols + col] {
                out.push(reg);
            }
        }
    }
    out
}

pub fn cyclic_shift(items: &[usize], shift: usize) -> Vec<usize> {
    if items.is_empty() {
        return Vec::new();
    }
    let shift = shift % items.len();
    let mut out = items[shift..].to_vec();
    out.extend_from_slice(&items[..shift]);
    out
}

/// Builds the PDCCH REG pool (everything not claimed by PCFICH/PHICH),
/// interleaved and cyclic-shifted, then grouped into 9-REG CCEs.
pub fn pdcch_cces(
    cell: &CellConfig,
    reg_table: &RegTable,
    phich_length: PhichLength,
    phich_resources: PhichResources,
) -> PhyResult<Vec<Vec<usize>>> {
    let pcfich = reg_table.pcfich_regs(cell)?;
    let mut assigned = vec![false; reg_table.len()];
    for &i in &pcfich {
        assigned[i] = true;
    }
    let _ = reg_table.phich_regs(cell, phich_length, phich_resources, &mut assigned)?;

    let pool: Vec<usize> = (0..reg_table.len()).filter(|&i| !assigned[i]).collect();
    let interleaved = interleave_pdcch_regs(&pool);
    let shift = if interleaved.is_empty() {
        0
    } else {
        cell.id.value() as usize % interleaved.len()
    };
    let shifted = cyclic_shift(&interleaved, shift);

    Ok(shifted.chunks(9).filter(|c| c.len() == 9).map(|c| c.to_vec()).collect())
}
