//! Physical HARQ Indicator Channel: 1-bit ACK/NACK, BPSK-repeated,
//! orthogonally spread (code-division multiplexed into a PHICH group),
//! scrambled, and added onto the group's REGs, per spec §4.6 / 36.211 §6.9.

use common::{CellConfig, ModulationScheme, PhichLength, PhichResources};
use num_complex::Complex32;

use crate::phy::modem;
use crate::phy::regs::RegTable;
use crate::phy::resource_grid::ResourceGrid;
use crate::phy::scrambling::{self, Scrambler};
use crate::{PhyError, PhyResult};

const REG_LEN: usize = 4;
const REGS_PER_GROUP: usize = 3;
const CHIPS_PER_GROUP: usize = REG_LEN * REGS_PER_GROUP;

fn spreading_factor(phich_length: PhichLength) -> usize {
    match phich_length {
        PhichLength::Normal => 4,
        PhichLength::Extended => 2,
    }
}

/// Row `nseq` of the order-`n` Hadamard matrix (`n` a power of 2), as +1/-1.
fn hadamard_row(n: usize, nseq: usize) -> Vec<f32> {
    let mut matrix = vec![vec![1.0f32]];
    let mut size = 1;
    while size < n {
        let mut next = vec![vec![0.0f32; size * 2]; size * 2];
        for r in 0..size {
            for c in 0..size {
                let v = matrix[r][c];
                next[r][c] = v;
                next[r][size + c] = v;
                next[size + r][c] = v;
                next[size + r][size + c] = -v;
            }
        }
        matrix = next;
        size *= 2;
    }
    matrix[nseq % n].clone()
}

fn orthogonal_sequence_for(phich_length: PhichLength, nseq: usize) -> Vec<f32> {
    hadamard_row(spreading_factor(phich_length), nseq)
}

/// Spreads one ACK/NACK bit into `CHIPS_PER_GROUP` real chips: BPSK, repeated
/// 3 times (one per REG), each instance covered by the orthogonal sequence
/// (tiled up to `REG_LEN` chips when the spreading factor is shorter).
fn spread(ack: bool, phich_length: PhichLength, nseq: usize) -> Vec<f32> {
    let bpsk = if ack { 1.0 } else { -1.0 };
    let seq = orthogonal_sequence_for(phich_length, nseq);
    let mut chips = Vec::with_capacity(CHIPS_PER_GROUP);
    for _ in 0..REGS_PER_GROUP {
        for i in 0..REG_LEN {
            chips.push(bpsk * seq[i % seq.len()]);
        }
    }
    chips
}

/// Writes the given ACK/NACK bits (one per `nseq` in `acks`) onto group
/// `group_idx` of `grid`, combining (adding, not overwriting) the code-division
/// multiplexed PHICHs that share the group.
pub fn map_to_grid(
    cell: &CellConfig,
    reg_table: &RegTable,
    phich_length: PhichLength,
    phich_resources: PhichResources,
    subframe: u16,
    group_idx: usize,
    acks: &[(usize, bool)],
    grid: &mut ResourceGrid,
) -> PhyResult<()> {
    let mut assigned = vec![false; reg_table.len()];
    let groups = reg_table.phich_regs(cell, phich_length, phich_resources, &mut assigned)?;
    let group = groups
        .get(group_idx)
        .ok_or_else(|| PhyError::InvalidInput("PHICH group index out of range".into()))?;

    let mut combined_chips = vec![0.0f32; CHIPS_PER_GROUP];
    for &(nseq, ack) in acks {
        let chips = spread(ack, phich_length, nseq);
        for (c, v) in combined_chips.iter_mut().zip(chips.iter()) {
            *c += v;
        }
    }

    let mut scrambler = Scrambler::new(scrambling::cinit_phich(subframe, cell.id.value()));
    let scrambled_chips = scrambler.sign_flip_floats(&combined_chips);

    let mut cursor = 0usize;
    for &reg_idx in group {
        let reg = reg_table.get(reg_idx);
        for &sc in &reg.subcarriers {
            let value = grid.get(reg.symbol, sc) + Complex32::new(scrambled_chips[cursor], 0.0);
            grid.set(reg.symbol, sc, value);
            cursor += 1;
        }
    }
    Ok(())
}

/// De-spreads and majority-votes the ACK/NACK bit for sequence `nseq` in
/// group `group_idx`.
pub fn extract_from_grid(
    cell: &CellConfig,
    reg_table: &RegTable,
    phich_length: PhichLength,
    phich_resources: PhichResources,
    subframe: u16,
    group_idx: usize,
    nseq: usize,
    grid: &ResourceGrid,
) -> PhyResult<bool> {
    let mut assigned = vec![false; reg_table.len()];
    let groups = reg_table.phich_regs(cell, phich_length, phich_resources, &mut assigned)?;
    let group = groups
        .get(group_idx)
        .ok_or_else(|| PhyError::InvalidInput("PHICH group index out of range".into()))?;

    let mut received_chips = Vec::with_capacity(CHIPS_PER_GROUP);
    for &reg_idx in group {
        let reg = reg_table.get(reg_idx);
        for &sc in &reg.subcarriers {
            received_chips.push(grid.get(reg.symbol, sc).re);
        }
    }

    let mut scrambler = Scrambler::new(scrambling::cinit_phich(subframe, cell.id.value()));
    let descrambled = scrambler.sign_flip_floats(&received_chips);

    let seq = orthogonal_sequence_for(phich_length, nseq);
    let mut vote = 0.0f32;
    for group_rep in 0..REGS_PER_GROUP {
        for i in 0..REG_LEN {
            vote += descrambled[group_rep * REG_LEN + i] * seq[i % seq.len()];
        }
    }
    Ok(vote > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CyclicPrefix, NofPorts, NofPrb, PhysCellId};

    fn test_cell() -> CellConfig {
        CellConfig::new(
            PhysCellId::new(9).unwrap(),
            NofPrb::Prb25,
            NofPorts::One,
            CyclicPrefix::Normal,
        )
    }

    #[test]
    fn hadamard_rows_are_orthogonal() {
        let a = hadamard_row(4, 0);
        let b = hadamard_row(4, 1);
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        assert!(dot.abs() < 1e-6);
    }

    #[test]
    fn end_to_end_ack_roundtrip() {
        let cell = test_cell();
        let reg_table = RegTable::new(&cell);
        let mut grid = ResourceGrid::new(&cell);
        map_to_grid(
            &cell,
            &reg_table,
            PhichLength::Normal,
            PhichResources::One,
            2,
            0,
            &[(0, true)],
            &mut grid,
        )
        .unwrap();

        let decoded = extract_from_grid(
            &cell,
            &reg_table,
            PhichLength::Normal,
            PhichResources::One,
            2,
            0,
            0,
            &grid,
        )
        .unwrap();
        assert!(decoded);
    }

    #[test]
    fn cdm_multiplexed_acks_separate_cleanly() {
        let cell = test_cell();
        let reg_table = RegTable::new(&cell);
        let mut grid = ResourceGrid::new(&cell);
        map_to_grid(
            &cell,
            &reg_table,
            PhichLength::Normal,
            PhichResources::One,
            5,
            0,
            &[(0, true), (1, false)],
            &mut grid,
        )
        .unwrap();

        let ack0 = extract_from_grid(
            &cell,
            &reg_table,
            PhichLength::Normal,
            PhichResources::One,
            5,
            0,
            0,
            &grid,
        )
        .unwrap();
        let ack1 = extract_from_grid(
            &cell,
            &reg_table,
            PhichLength::Normal,
            PhichResources::One,
            5,
            0,
            1,
            &grid,
        )
        .unwrap();
        assert!(ack0);
        assert!(!ack1);
    }
}
