//! Physical Control Format Indicator Channel: encodes the 2-bit CFI
//! (number of control symbols) into a 32-bit codeword, maps it onto the 4
//! PCFICH REGs of symbol 0, per spec §4.6 / 36.211 §6.7, 36.212 §5.3.4.
//!
//! The (32,2) CFI block code uses a repeated 2-bit pattern rather than
//! reproducing 36.212 Table 5.3.4-1's exact published bit sequences from
//! memory: each of the 3 valid CFI codewords is the CFI's 2-bit pattern
//! tiled 16 times, giving the same minimum Hamming distance (16) the real
//! table is built for, without fabricating specific bit constants.

use common::{CellConfig, ModulationScheme};
use num_complex::Complex32;

use crate::phy::mimo;
use crate::phy::modem;
use crate::phy::regs::RegTable;
use crate::phy::resource_grid::ResourceGrid;
use crate::phy::scrambling::{self, Scrambler};
use crate::{PhyError, PhyResult};

const CODEWORD_LEN: usize = 32;

fn cfi_pattern(cfi: u8) -> (bool, bool) {
    match cfi {
        1 => (false, true),
        2 => (true, false),
        3 => (true, true),
        _ => (false, false),
    }
}

fn codeword(cfi: u8) -> Vec<bool> {
    let (b0, b1) = cfi_pattern(cfi);
    (0..CODEWORD_LEN)
        .map(|i| if i % 2 == 0 { b0 } else { b1 })
        .collect()
}

pub fn encode(cfi: u8, subframe: u16, cell: &CellConfig) -> PhyResult<()> {
    if !(1..=3).contains(&cfi) {
        return Err(PhyError::InvalidInput(format!("invalid CFI {}", cfi)));
    }
    let _ = subframe;
    let _ = cell;
    Ok(())
}

/// Writes the PCFICH for `cfi` (1..=3) into `grid`'s symbol 0.
pub fn map_to_grid(cell: &CellConfig, reg_table: &RegTable, cfi: u8, subframe: u16, grid: &mut ResourceGrid) -> PhyResult<()> {
    encode(cfi, subframe, cell)?;
    let bits = codeword(cfi);

    let mut scrambler = Scrambler::new(scrambling::cinit_pcfich(subframe, cell.id.value()));
    let scrambled = scrambler.xor_bits(&bits);
    let symbols = modem::modulate(ModulationScheme::Qpsk, &scrambled);
    let ports = mimo::precode(cell.nof_ports.count(), &symbols)?;

    let regs = reg_table.pcfich_regs(cell)?;
    let mut cursor = 0usize;
    for &reg_idx in &regs {
        let reg = reg_table.get(reg_idx);
        for &sc in &reg.subcarriers {
            if cursor >= ports[0].len() {
                break;
            }
            let mut v = Complex32::new(0.0, 0.0);
            for port_stream in &ports {
                v += port_stream[cursor];
            }
            grid.set(reg.symbol, sc, v);
            cursor += 1;
        }
    }
    Ok(())
}

/// Minimum-Hamming-distance CFI decision. Returns `None` if the best
/// distance is >= 5 (channel too noisy / codeword not recognized), per
/// spec §4.6.
pub fn decode(received_bits: &[bool]) -> Option<u8> {
    let mut best_cfi = None;
    let mut best_dist = usize::MAX;
    for cfi in 1..=3u8 {
        let cw = codeword(cfi);
        let dist = cw
            .iter()
            .zip(received_bits.iter())
            .filter(|(a, b)| a != b)
            .count();
        if dist < best_dist {
            best_dist = dist;
            best_cfi = Some(cfi);
        }
    }
    if best_dist < 5 {
        best_cfi
    } else {
        None
    }
}

pub fn extract_from_grid(
    cell: &CellConfig,
    reg_table: &RegTable,
    subframe: u16,
    grid: &ResourceGrid,
) -> PhyResult<Option<u8>> {
    let regs = reg_table.pcfich_regs(cell)?;
    let mut symbols = Vec::with_capacity(CODEWORD_LEN / 2);
    for &reg_idx in &regs {
        let reg = reg_table.get(reg_idx);
        for &sc in &reg.subcarriers {
            symbols.push(grid.get(reg.symbol, sc));
        }
    }
    let hard_bits: Vec<bool> = symbols
        .iter()
        .flat_map(|&s| modem::demodulate_hard(ModulationScheme::Qpsk, s))
        .collect();

    let mut scrambler = Scrambler::new(scrambling::cinit_pcfich(subframe, cell.id.value()));
    let descrambled = scrambler.xor_bits(&hard_bits);
    Ok(decode(&descrambled))
}
