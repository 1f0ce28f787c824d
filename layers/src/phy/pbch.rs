//! Physical Broadcast Channel: MIB pack/CRC/encode/rate-match/scramble and
//! the reverse blind-decode path, per spec §4.11 / 36.211 §6.6, 36.212 §5.3.1.
//!
//! PBCH always reserves REs as if 4 CRS ports were present, regardless of
//! the cell's actual port count, so that the set of available PBCH REs (and
//! therefore the rate-matched codeword length) is independent of the
//! port-count hypothesis under blind decode.

use common::{CellConfig, CyclicPrefix, Mib, ModulationScheme, NofPorts, NofPrb};
use num_complex::Complex32;

use crate::phy::convcode::{ConvEncoder, ViterbiDecoder};
use crate::phy::mimo;
use crate::phy::modem;
use crate::phy::refsignal::CrsGenerator;
use crate::phy::resource_grid::ResourceGrid;
use crate::phy::scrambling::{self, Scrambler};
use crate::phy::turbo::subblock_interleave;
use crate::{PhyError, PhyResult};
use common::Crc;

const INFO_BITS: usize = 24;
const CRC_BITS: usize = 16;
const CODED_BITS: usize = (INFO_BITS + CRC_BITS) * 3;
const NUM_RADIO_FRAMES: usize = 4;

fn port_mask(nof_ports: NofPorts) -> u16 {
    match nof_ports {
        NofPorts::One => 0x0000,
        NofPorts::Two => 0xFFFF,
        NofPorts::Four => 0x5555,
    }
}

fn push_bits(out: &mut Vec<bool>, value: u32, width: u32) {
    for i in (0..width).rev() {
        out.push((value >> i) & 1 != 0);
    }
}

fn read_bits(bits: &[bool], value: &mut u32, width: u32) {
    for i in 0..width {
        *value = (*value << 1) | bits[i as usize] as u32;
    }
}

pub fn pack_mib(mib: &Mib) -> Vec<bool> {
    let mut out = Vec::with_capacity(INFO_BITS);
    let nof_prb_code = NofPrb::ALL
        .iter()
        .position(|p| *p == mib.nof_prb)
        .unwrap_or(0) as u32;
    push_bits(&mut out, nof_prb_code, 3);

    let phich_length_code = match mib.phich_length {
        common::PhichLength::Normal => 0,
        common::PhichLength::Extended => 1,
    };
    push_bits(&mut out, phich_length_code, 1);

    let phich_resources_code = match mib.phich_resources {
        common::PhichResources::Sixth => 0,
        common::PhichResources::Half => 1,
        common::PhichResources::One => 2,
        common::PhichResources::Two => 3,
    };
    push_bits(&mut out, phich_resources_code, 2);

    push_bits(&mut out, (mib.sfn >> 2) as u32 & 0xFF, 8);
    push_bits(&mut out, 0, 10);
    out
}

pub fn unpack_mib(bits: &[bool]) -> Option<Mib> {
    if bits.len() != INFO_BITS {
        return None;
    }
    let mut nof_prb_code = 0u32;
    read_bits(&bits[0..3], &mut nof_prb_code, 3);
    let nof_prb = *NofPrb::ALL.get(nof_prb_code as usize)?;

    let phich_length = if bits[3] {
        common::PhichLength::Extended
    } else {
        common::PhichLength::Normal
    };

    let mut phich_resources_code = 0u32;
    read_bits(&bits[4..6], &mut phich_resources_code, 2);
    let phich_resources = match phich_resources_code {
        0 => common::PhichResources::Sixth,
        1 => common::PhichResources::Half,
        2 => common::PhichResources::One,
        _ => common::PhichResources::Two,
    };

    let mut sfn_msb = 0u32;
    read_bits(&bits[6..14], &mut sfn_msb, 8);

    Some(Mib {
        nof_prb,
        phich_length,
        phich_resources,
        sfn: (sfn_msb as u16) << 2,
    })
}

fn target_coded_len(cp: CyclicPrefix) -> usize {
    match cp {
        CyclicPrefix::Normal => NUM_RADIO_FRAMES * 240,
        CyclicPrefix::Extended => NUM_RADIO_FRAMES * 216,
    }
}

/// Split the 120-bit tail-biting codeword into its 3 generator streams,
/// sub-block interleave each, concatenate, and circularly read `target_len`
/// bits.
fn rate_match(coded: &[bool], target_len: usize) -> Vec<bool> {
    let n = coded.len() / 3;
    let mut streams = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
    for (i, &b) in coded.iter().enumerate() {
        streams[i % 3].push(b);
    }
    let mut buffer = Vec::with_capacity(coded.len());
    for s in &streams {
        buffer.extend(subblock_interleave(s));
    }
    (0..target_len).map(|i| buffer[i % buffer.len()]).collect()
}

/// Encode one MIB into the full 4-radio-frame scrambled, rate-matched bit
/// stream (ready to split into quarters and modulate).
pub fn encode(mib: &Mib, nof_ports: NofPorts, cell_id: u16, cp: CyclicPrefix) -> Vec<bool> {
    let info = pack_mib(mib);
    let crc = Crc::crc16().compute(&info) as u16 ^ port_mask(nof_ports);
    let mut payload = info;
    for i in (0..16).rev() {
        payload.push((crc >> i) & 1 != 0);
    }

    let coded = ConvEncoder::encode(&payload, true);
    debug_assert_eq!(coded.len(), CODED_BITS);

    let target_len = target_coded_len(cp);
    let rate_matched = rate_match(&coded, target_len);

    let mut scrambler = Scrambler::new(scrambling::cinit_pbch(cell_id));
    scrambler.xor_bits(&rate_matched)
}

fn pbch_subcarrier_range(cell: &CellConfig) -> (usize, usize) {
    let num_sc = cell.nof_prb.num_subcarriers();
    let pbch_sc = 6 * 12;
    let start = (num_sc - pbch_sc) / 2;
    (start, start + pbch_sc)
}

/// Positions available for PBCH data in a given symbol: the central 6 PRBs,
/// minus CRS REs for all 4 possible ports (so capacity is port-independent).
fn free_subcarriers(cell: &CellConfig, symbol: usize, ns: u16) -> Vec<usize> {
    let (start, end) = pbch_subcarrier_range(cell);
    let mut excluded = vec![false; end - start];
    for port in 0..4u8 {
        for p in CrsGenerator::pilots_for_symbol(cell, port, ns, symbol) {
            if p.subcarrier >= start && p.subcarrier < end {
                excluded[p.subcarrier - start] = true;
            }
        }
    }
    (start..end).filter(|&sc| !excluded[sc - start]).collect()
}

/// Writes one radio frame's worth of a PBCH transmission (quarter `frame_idx`
/// of the 4-frame TTI) into `grid`'s symbols 0..=3 of slot 1.
pub fn map_to_grid(
    cell: &CellConfig,
    scrambled: &[bool],
    frame_idx: usize,
    grid: &mut ResourceGrid,
) -> PhyResult<()> {
    let chunk_len = scrambled.len() / NUM_RADIO_FRAMES;
    if frame_idx >= NUM_RADIO_FRAMES {
        return Err(PhyError::InvalidInput("PBCH frame_idx out of range".into()));
    }
    let chunk = &scrambled[frame_idx * chunk_len..(frame_idx + 1) * chunk_len];
    let symbols = modem::modulate(ModulationScheme::Qpsk, chunk);
    let ports = mimo::precode(cell.nof_ports.count(), &symbols)?;

    let base = cell.nof_symbols_per_slot() as usize;
    let mut cursor = 0usize;
    for s_off in 0..4usize {
        let symbol = base + s_off;
        let ns = 1u16;
        let positions = free_subcarriers(cell, symbol, ns);
        for sc in positions {
            if cursor >= ports[0].len() {
                break;
            }
            let mut v = Complex32::new(0.0, 0.0);
            for port_stream in &ports {
                v += port_stream[cursor];
            }
            grid.set(symbol, sc, v);
            cursor += 1;
        }
    }
    Ok(())
}

fn extract_from_grid(cell: &CellConfig, grid: &ResourceGrid) -> Vec<Complex32> {
    let base = cell.nof_symbols_per_slot() as usize;
    let mut out = Vec::new();
    for s_off in 0..4usize {
        let symbol = base + s_off;
        let ns = 1u16;
        for sc in free_subcarriers(cell, symbol, ns) {
            out.push(grid.get(symbol, sc));
        }
    }
    out
}

/// Accumulates soft PBCH symbols across up to 4 radio frames, sliding the
/// ring buffer when a 5th frame arrives before a decode succeeds.
pub struct PbchReceiver {
    frames: Vec<Vec<Complex32>>,
}

impl PbchReceiver {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn add_frame(&mut self, cell: &CellConfig, grid: &ResourceGrid) {
        let symbols = extract_from_grid(cell, grid);
        if self.frames.len() >= NUM_RADIO_FRAMES {
            self.frames.remove(0);
        }
        self.frames.push(symbols);
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Attempt to decode the accumulated frames, trying every rotation
    /// (which TTI quarter the oldest buffered frame corresponds to) and
    /// every port-count hypothesis. Returns the first passing MIB.
    pub fn try_decode(&self, cell_id: u16, cp: CyclicPrefix) -> Option<(Mib, NofPorts)> {
        if self.frames.is_empty() {
            return None;
        }
        let target_len = target_coded_len(cp);
        let chunk_len = target_len / NUM_RADIO_FRAMES;

        for rotation in 0..NUM_RADIO_FRAMES {
            let mut combined_llr = vec![0.0f32; target_len];
            let mut combined_mask = vec![false; target_len];

            for (k, frame_symbols) in self.frames.iter().enumerate() {
                let quarter = (rotation + k) % NUM_RADIO_FRAMES;
                let noise_var = 1.0;
                let llrs: Vec<f32> = frame_symbols
                    .iter()
                    .flat_map(|&s| modem::demodulate_soft_maxlog(ModulationScheme::Qpsk, s, noise_var))
                    .collect();
                if llrs.len() != chunk_len {
                    continue;
                }
                for (i, &l) in llrs.iter().enumerate() {
                    let pos = quarter * chunk_len + i;
                    combined_llr[pos] += l;
                    combined_mask[pos] = true;
                }
            }

            if !combined_mask.iter().any(|&m| m) {
                continue;
            }

            let mut scrambler = Scrambler::new(scrambling::cinit_pbch(cell_id));
            let descrambled = scrambler.sign_flip_floats(&combined_llr);

            if let Some(result) = try_unmatch_and_decode(&descrambled, cell_id) {
                return Some(result);
            }
        }
        None
    }
}

impl Default for PbchReceiver {
    fn default() -> Self {
        Self::new()
    }
}

fn try_unmatch_and_decode(descrambled: &[f32], cell_id: u16) -> Option<(Mib, NofPorts)> {
    let n = CODED_BITS / 3;
    let mut stream_llr = [vec![0.0f32; n], vec![0.0f32; n], vec![0.0f32; n]];
    for (i, &v) in descrambled.iter().enumerate() {
        let cw_pos = i % CODED_BITS;
        let stream = cw_pos % 3;
        stream_llr[stream][cw_pos / 3] += v;
    }

    let mut soft = Vec::with_capacity(CODED_BITS);
    for i in 0..n {
        for s in 0..3 {
            soft.push(llr_to_soft_u8(stream_llr[s][i]));
        }
    }

    let decoded = ViterbiDecoder::decode(&soft, true, INFO_BITS + CRC_BITS);
    let (info, crc_bits) = decoded.split_at(INFO_BITS);
    let mut received_crc: u16 = 0;
    for &b in crc_bits {
        received_crc = (received_crc << 1) | b as u16;
    }
    let computed = Crc::crc16().compute(info) as u16;

    for &nof_ports in &[NofPorts::One, NofPorts::Two, NofPorts::Four] {
        if computed ^ port_mask(nof_ports) == received_crc {
            if let Some(mib) = unpack_mib(info) {
                let _ = cell_id;
                return Some((mib, nof_ports));
            }
        }
    }
    None
}

fn llr_to_soft_u8(llr: f32) -> u8 {
    let scaled = (llr * 16.0).clamp(-127.0, 127.0);
    (scaled + 127.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{PhichLength, PhichResources, PhysCellId};

    fn test_cell() -> CellConfig {
        CellConfig::new(
            PhysCellId::new(42).unwrap(),
            NofPrb::Prb25,
            NofPorts::Two,
            CyclicPrefix::Normal,
        )
    }

    fn test_mib() -> Mib {
        Mib {
            nof_prb: NofPrb::Prb25,
            phich_length: PhichLength::Normal,
            phich_resources: PhichResources::One,
            sfn: 100,
        }
    }

    #[test]
    fn mib_pack_unpack_roundtrip() {
        let mib = test_mib();
        let bits = pack_mib(&mib);
        assert_eq!(bits.len(), INFO_BITS);
        let recovered = unpack_mib(&bits).unwrap();
        assert_eq!(recovered.nof_prb, mib.nof_prb);
        assert_eq!(recovered.phich_length, mib.phich_length);
        assert_eq!(recovered.phich_resources, mib.phich_resources);
        // only the 8 MSBs of sfn survive
        assert_eq!(recovered.sfn, mib.sfn & !0b11);
    }

    #[test]
    fn end_to_end_mib_roundtrip_at_infinite_snr() {
        let cell = test_cell();
        let mib = test_mib();
        let scrambled = encode(&mib, cell.nof_ports, cell.id.value(), cell.cp);

        let mut receiver = PbchReceiver::new();
        for frame_idx in 0..4 {
            let mut grid = ResourceGrid::new(&cell);
            map_to_grid(&cell, &scrambled, frame_idx, &mut grid).unwrap();
            receiver.add_frame(&cell, &grid);
        }

        let (decoded_mib, decoded_ports) = receiver.try_decode(cell.id.value(), cell.cp).unwrap();
        assert_eq!(decoded_mib.nof_prb, mib.nof_prb);
        assert_eq!(decoded_mib.phich_length, mib.phich_length);
        assert_eq!(decoded_mib.phich_resources, mib.phich_resources);
        assert_eq!(decoded_ports, cell.nof_ports);
    }

    #[test]
    fn rate_match_produces_requested_length() {
        let coded = vec![true; CODED_BITS];
        let matched = rate_match(&coded, 960);
        assert_eq!(matched.len(), 960);
    }
}
