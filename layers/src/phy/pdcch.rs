//! Physical Downlink Control Channel: DCI encode/decode over the
//! aggregation-level candidate search space, per spec §4.6 / 36.212 §5.3.3,
//! 36.213 §9.1.1.
//!
//! DCI payload sizes vary by format and aren't enumerated here; callers
//! supply the payload bits directly and this module handles CRC, coding,
//! rate matching to `72*L` bits, scrambling, and candidate placement.

use common::{CellConfig, ModulationScheme, PhichLength, PhichResources, Rnti};
use num_complex::Complex32;

use crate::phy::convcode::{ConvEncoder, ViterbiDecoder};
use crate::phy::mimo;
use crate::phy::modem;
use crate::phy::regs::{self, RegTable};
use crate::phy::resource_grid::ResourceGrid;
use crate::phy::scrambling::{self, Scrambler};
use crate::phy::turbo::subblock_interleave;
use crate::{PhyError, PhyResult};
use common::Crc;

const CRC_BITS: usize = 16;
const RES_PER_CCE: usize = 36;

/// Aggregation levels in ascending order.
pub const AGGREGATION_LEVELS: [usize; 4] = [1, 2, 4, 8];

fn num_candidates(l: usize) -> usize {
    match l {
        1 => 6,
        2 => 6,
        4 => 2,
        8 => 2,
        _ => 0,
    }
}

const YK_A: u64 = 39827;
const YK_D: u64 = 65537;

/// `Y_k` sequence for the UE-specific search space, per 36.213 §9.1.1:
/// `Y_{-1} = n_RNTI`, `Y_k = (A * Y_{k-1}) mod D`.
fn y_k(rnti: Rnti, subframe: u16) -> u64 {
    let mut y = rnti.value() as u64;
    for _ in 0..=subframe {
        y = (YK_A * y) % YK_D;
    }
    y
}

/// Starting CCE index of candidate `m` at aggregation level `l`.
fn candidate_start(n_cce_total: usize, l: usize, y: u64, m: usize) -> Option<usize> {
    let n_groups = n_cce_total / l;
    if n_groups == 0 {
        return None;
    }
    Some(l * ((y as usize + m) % n_groups))
}

/// Candidate CCE index lists for a UE's search space at `subframe`.
pub fn ue_search_space(n_cce_total: usize, rnti: Rnti, subframe: u16) -> Vec<(usize, Vec<usize>)> {
    let y = y_k(rnti, subframe);
    let mut out = Vec::new();
    for &l in &AGGREGATION_LEVELS {
        for m in 0..num_candidates(l) {
            if let Some(start) = candidate_start(n_cce_total, l, y, m) {
                out.push((l, (start..start + l).collect()));
            }
        }
    }
    out
}

/// Candidate CCE index lists for the common search space (`Y_k = 0`,
/// levels 4 and 8 only).
pub fn common_search_space(n_cce_total: usize) -> Vec<(usize, Vec<usize>)> {
    let mut out = Vec::new();
    for &l in &[4usize, 8usize] {
        for m in 0..num_candidates(l) {
            if let Some(start) = candidate_start(n_cce_total, l, 0, m) {
                out.push((l, (start..start + l).collect()));
            }
        }
    }
    out
}

/// Encode one DCI payload for RNTI-masked CRC, tail-biting 1/3 convcode,
/// and rate-match to `72*l` bits.
pub fn encode_dci(payload: &[bool], rnti: Rnti, l: usize, cell_id: u16, subframe: u16) -> Vec<bool> {
    let crc = Crc::crc16().compute(payload) as u16 ^ rnti.value();
    let mut with_crc = payload.to_vec();
    for i in (0..CRC_BITS).rev() {
        with_crc.push((crc >> i) & 1 != 0);
    }

    let coded = ConvEncoder::encode(&with_crc, true);
    let n = coded.len() / 3;
    let mut streams = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
    for (i, &b) in coded.iter().enumerate() {
        streams[i % 3].push(b);
    }
    let mut buffer = Vec::with_capacity(coded.len());
    for s in &streams {
        buffer.extend(subblock_interleave(s));
    }

    let target_len = RES_PER_CCE * 2 * l; // 36 RE/CCE * 2 bits/RE (QPSK) * l
    let rate_matched: Vec<bool> = (0..target_len).map(|i| buffer[i % buffer.len()]).collect();

    let mut scrambler = Scrambler::new(scrambling::cinit_pdcch(subframe, cell_id));
    scrambler.xor_bits(&rate_matched)
}

/// Write one DCI candidate into `grid` at the given CCE indices.
pub fn map_to_grid(
    cell: &CellConfig,
    reg_table: &RegTable,
    cces: &[Vec<usize>],
    cce_indices: &[usize],
    scrambled_bits: &[bool],
    grid: &mut ResourceGrid,
) -> PhyResult<()> {
    let symbols = modem::modulate(ModulationScheme::Qpsk, scrambled_bits);
    let ports = mimo::precode(cell.nof_ports.count(), &symbols)?;

    let mut cursor = 0usize;
    for &cce_idx in cce_indices {
        let cce = cces
            .get(cce_idx)
            .ok_or_else(|| PhyError::InvalidInput("CCE index out of range".into()))?;
        for &reg_idx in cce {
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
    }
    Ok(())
}

/// Extract and attempt to decode one candidate, returning the DCI payload on
/// a CRC match against `rnti`.
pub fn try_decode_candidate(
    cell: &CellConfig,
    reg_table: &RegTable,
    cces: &[Vec<usize>],
    cce_indices: &[usize],
    payload_len: usize,
    rnti: Rnti,
    subframe: u16,
    grid: &ResourceGrid,
) -> PhyResult<Option<Vec<bool>>> {
    let mut received = Vec::new();
    for &cce_idx in cce_indices {
        let cce = cces
            .get(cce_idx)
            .ok_or_else(|| PhyError::InvalidInput("CCE index out of range".into()))?;
        for &reg_idx in cce {
            let reg = reg_table.get(reg_idx);
            for &sc in &reg.subcarriers {
                received.push(grid.get(reg.symbol, sc));
            }
        }
    }

    let hard_bits: Vec<bool> = received
        .iter()
        .flat_map(|&s| modem::demodulate_hard(ModulationScheme::Qpsk, s))
        .collect();

    let mut scrambler = Scrambler::new(scrambling::cinit_pdcch(subframe, cell.id.value()));
    let descrambled = scrambler.xor_bits(&hard_bits);

    let coded_len = (payload_len + CRC_BITS) * 3;
    let mut stream_votes = vec![0i32; coded_len];
    for (i, &b) in descrambled.iter().enumerate() {
        let pos = i % coded_len;
        stream_votes[pos] += if b { 1 } else { -1 };
    }

    let soft: Vec<u8> = stream_votes
        .iter()
        .map(|&v| if v > 0 { 255 } else { 0 })
        .collect();

    let decoded = ViterbiDecoder::decode(&soft, true, payload_len + CRC_BITS);
    let (info, crc_bits) = decoded.split_at(payload_len);
    let mut received_crc: u16 = 0;
    for &b in crc_bits {
        received_crc = (received_crc << 1) | b as u16;
    }
    let computed = Crc::crc16().compute(info) as u16;

    if computed ^ rnti.value() == received_crc {
        Ok(Some(info.to_vec()))
    } else {
        Ok(None)
    }
}

/// Build the CCE table and blindly search every candidate in `search_space`
/// for a payload of `payload_len` bits addressed to `rnti`.
pub fn blind_search(
    cell: &CellConfig,
    reg_table: &RegTable,
    phich_length: PhichLength,
    phich_resources: PhichResources,
    search_space: &[(usize, Vec<usize>)],
    payload_len: usize,
    rnti: Rnti,
    subframe: u16,
    grid: &ResourceGrid,
) -> PhyResult<Option<Vec<bool>>> {
    let cces = regs::pdcch_cces(cell, reg_table, phich_length, phich_resources)?;
    for (_, cce_indices) in search_space {
        if let Some(payload) =
            try_decode_candidate(cell, reg_table, &cces, cce_indices, payload_len, rnti, subframe, grid)?
        {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CyclicPrefix, NofPorts, NofPrb, PhysCellId};

    fn test_cell() -> CellConfig {
        CellConfig::new(
            PhysCellId::new(17).unwrap(),
            NofPrb::Prb25,
            NofPorts::One,
            CyclicPrefix::Normal,
        )
    }

    #[test]
    fn y_k_is_deterministic() {
        let rnti = Rnti::new(1234);
        assert_eq!(y_k(rnti, 3), y_k(rnti, 3));
        assert_ne!(y_k(rnti, 3), y_k(rnti, 4));
    }

    #[test]
    fn search_space_candidates_fit_within_total_cces() {
        let n_cce = 20;
        let rnti = Rnti::new(100);
        let space = ue_search_space(n_cce, rnti, 0);
        for (l, indices) in &space {
            assert_eq!(indices.len(), *l);
            for &i in indices {
                assert!(i < n_cce);
            }
        }
    }

    #[test]
    fn end_to_end_dci_roundtrip() {
        let cell = test_cell();
        let reg_table = RegTable::new(&cell);
        let cces = regs::pdcch_cces(&cell, &reg_table, PhichLength::Normal, PhichResources::One).unwrap();
        assert!(!cces.is_empty());

        let rnti = Rnti::new(55);
        let payload: Vec<bool> = (0..20).map(|i| i % 3 == 0).collect();
        let l = 1usize;
        let scrambled = encode_dci(&payload, rnti, l, cell.id.value(), 4);

        let mut grid = ResourceGrid::new(&cell);
        let cce_indices = vec![0usize];
        map_to_grid(&cell, &reg_table, &cces, &cce_indices, &scrambled, &mut grid).unwrap();

        let decoded = try_decode_candidate(&cell, &reg_table, &cces, &cce_indices, payload.len(), rnti, 4, &grid)
            .unwrap();
        assert_eq!(decoded, Some(payload));
    }

    #[test]
    fn wrong_rnti_fails_crc() {
        let cell = test_cell();
        let reg_table = RegTable::new(&cell);
        let cces = regs::pdcch_cces(&cell, &reg_table, PhichLength::Normal, PhichResources::One).unwrap();

        let rnti = Rnti::new(55);
        let wrong_rnti = Rnti::new(56);
        let payload: Vec<bool> = (0..20).map(|i| i % 2 == 0).collect();
        let scrambled = encode_dci(&payload, rnti, 1, cell.id.value(), 4);

        let mut grid = ResourceGrid::new(&cell);
        let cce_indices = vec![0usize];
        map_to_grid(&cell, &reg_table, &cces, &cce_indices, &scrambled, &mut grid).unwrap();

        let decoded =
            try_decode_candidate(&cell, &reg_table, &cces, &cce_indices, payload.len(), wrong_rnti, 4, &grid)
                .unwrap();
        assert_eq!(decoded, None);
    }
}
