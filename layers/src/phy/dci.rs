//! Downlink Control Information: message formats and PRB allocation types,
//! per spec §4.6/§6 and 36.212 §5.3.3, 36.213 §7.1.6/§8.1.
//!
//! This is pure bit-field packing: the payload produced here is what
//! `pdcch::encode_dci` treats as an opaque bit vector for CRC/coding/rate
//! matching. Type-2 (localized) RIV conversion and the Type-0 RBG bitmask
//! format are implemented bit-exactly against `ra_type2_{to,from}_riv`/
//! `ra_type0_P`; Type-1's RBG-subset shift is approximated (the exact
//! `n_rb_rbg_subset` term from 36.213 §7.1.6.2 isn't reproduced) and Type-2
//! distributed VRB-to-PRB permutation (36.211 §6.2.3.2) isn't implemented
//! at all — only localized scheduling is bit-packed for Format 0/1A/1C.
//! Same spirit as the TBS-table and QPP simplifications elsewhere in this
//! crate.

use common::NofPrb;

use crate::{PhyError, PhyResult};

/// DCI formats this crate packs/unpacks. Format 0 schedules uplink
/// (`PUSCH`); the rest schedule downlink (`PDSCH`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciFormat {
    Format0,
    Format1,
    Format1A,
    Format1C,
}

/// Downlink PRB allocation header, 36.213 §7.1.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrbAllocation {
    /// Bitmask over resource-block groups of size `P(nof_prb)`.
    Type0 { rbg_bitmask: u32 },
    /// Bitmask over one RBG subset's VRBs.
    Type1 { rbg_subset: u8, shift: bool, vrb_bitmask: u32 },
    /// Localized virtual resource blocks, packed as a Resource Indicator
    /// Value.
    Type2 { riv: u32 },
}

/// RBG size `P`, table 7.1.6.1-1.
pub fn type0_p(nof_prb: NofPrb) -> usize {
    match nof_prb.count() {
        n if n <= 10 => 1,
        n if n <= 26 => 2,
        n if n <= 63 => 3,
        _ => 4,
    }
}

fn num_rbg(nof_prb: NofPrb) -> usize {
    let n = nof_prb.count() as usize;
    let p = type0_p(nof_prb);
    (n + p - 1) / p
}

/// `N_RB^Type1`, 36.213 §7.1.6.2: the RBG count less the bits spent
/// selecting the subset and shift.
pub fn type1_n_rb(nof_prb: NofPrb) -> usize {
    let p = type0_p(nof_prb) as f64;
    num_rbg(nof_prb) - p.log2().ceil() as usize - 1
}

/// Resource Indicator Value from localized `(L_crb, RB_start)`, 36.213
/// §8.1, eq. 1.
pub fn riv_from_location(l_crb: u16, rb_start: u16, nof_prb: NofPrb) -> u32 {
    let n = nof_prb.count() as u32;
    let (l, s) = (l_crb as u32, rb_start as u32);
    if l <= n / 2 {
        n * (l - 1) + s
    } else {
        n * (n - l + 1) + n - 1 - s
    }
}

/// Inverse of [`riv_from_location`].
pub fn location_from_riv(riv: u32, nof_prb: NofPrb) -> (u16, u16) {
    let n = nof_prb.count() as u32;
    let mut l_crb = riv / n + 1;
    let mut rb_start = riv % n;
    if l_crb > n - rb_start {
        l_crb = n - l_crb + 2;
        rb_start = n - 1 - rb_start;
    }
    (l_crb as u16, rb_start as u16)
}

/// Bit width of the Type-2 RIV field, `ceil(log2(N*(N+1)/2))`.
fn riv_bits(nof_prb: NofPrb) -> usize {
    let n = nof_prb.count() as f64;
    (n * (n + 1.0) / 2.0).log2().ceil() as usize
}

/// Expand a [`PrbAllocation`] into the 0-based PRB indices it covers.
pub fn prb_indices(alloc: &PrbAllocation, nof_prb: NofPrb) -> Vec<usize> {
    let n = nof_prb.count() as usize;
    match alloc {
        PrbAllocation::Type0 { rbg_bitmask } => {
            let p = type0_p(nof_prb);
            let nb = num_rbg(nof_prb);
            let mut prbs = Vec::new();
            for i in 0..nb {
                if rbg_bitmask & (1 << (nb - i - 1)) != 0 {
                    for j in 0..p {
                        let prb = i * p + j;
                        if prb < n {
                            prbs.push(prb);
                        }
                    }
                }
            }
            prbs
        }
        PrbAllocation::Type1 { rbg_subset, shift, vrb_bitmask } => {
            let p = type0_p(nof_prb);
            let n_rb_type1 = type1_n_rb(nof_prb);
            // Approximated: uses n_rb_type1 as the shift distance instead of
            // the exact per-subset n_rb_rbg_subset term.
            let subset_shift = if *shift { n_rb_type1 } else { 0 };
            let mut prbs = Vec::new();
            for i in 0..n_rb_type1 {
                if vrb_bitmask & (1 << (n_rb_type1 - i - 1)) != 0 {
                    let idx = i + subset_shift;
                    let prb = (idx / p) * p * p + (*rbg_subset as usize) * p + idx % p;
                    if prb < n {
                        prbs.push(prb);
                    }
                }
            }
            prbs
        }
        PrbAllocation::Type2 { riv } => {
            let (l_crb, rb_start) = location_from_riv(*riv, nof_prb);
            (0..l_crb as usize).map(|i| rb_start as usize + i).collect()
        }
    }
}

/// One packed downlink scheduling assignment (Format 1/1A) or uplink grant
/// (Format 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DciMessage {
    pub format: DciFormat,
    pub alloc: PrbAllocation,
    pub mcs_idx: u8,
    pub harq_process: u8,
    pub ndi: bool,
    pub rv_idx: u8,
    pub tpc: u8,
}

fn push_bits(out: &mut Vec<bool>, value: u32, width: usize) {
    for i in (0..width).rev() {
        out.push((value >> i) & 1 != 0);
    }
}

fn read_bits(bits: &[bool], cursor: &mut usize, width: usize) -> u32 {
    let mut v = 0u32;
    for _ in 0..width {
        v = (v << 1) | bits[*cursor] as u32;
        *cursor += 1;
    }
    v
}

/// Bit width of a DCI message for `format` on a cell of `nof_prb`, per
/// 36.212 §5.3.3.1.
pub fn format_sizeof(format: DciFormat, nof_prb: NofPrb) -> usize {
    match format {
        DciFormat::Format0 => 1 + 1 + riv_bits(nof_prb) + 5 + 1 + 2 + 3 + 1,
        DciFormat::Format1 => {
            let header = if nof_prb.count() > 10 { 1 } else { 0 };
            header + num_rbg(nof_prb) + 5 + 3 + 1 + 2 + 2
        }
        DciFormat::Format1A => 1 + riv_bits(nof_prb) + 5 + 3 + 1 + 2 + 2,
        DciFormat::Format1C => riv_bits(nof_prb).max(1) + 5,
    }
}

/// Pack `msg` into exactly `format_sizeof(msg.format, nof_prb)` bits.
pub fn pack(msg: &DciMessage, nof_prb: NofPrb) -> PhyResult<Vec<bool>> {
    let mut out = Vec::with_capacity(format_sizeof(msg.format, nof_prb));
    match (msg.format, &msg.alloc) {
        (DciFormat::Format0, PrbAllocation::Type2 { riv }) => {
            out.push(false); // format-0/1A disambiguator
            out.push(false); // frequency hopping flag, unsupported
            push_bits(&mut out, *riv, riv_bits(nof_prb));
            push_bits(&mut out, msg.mcs_idx as u32, 5);
            out.push(msg.ndi);
            push_bits(&mut out, msg.tpc as u32, 2);
            push_bits(&mut out, msg.rv_idx as u32, 3);
            out.push(false); // DMRS cyclic shift, unsupported
        }
        (DciFormat::Format1, PrbAllocation::Type0 { rbg_bitmask }) => {
            if nof_prb.count() > 10 {
                out.push(false); // resource allocation header (Type 0)
            }
            push_bits(&mut out, *rbg_bitmask, num_rbg(nof_prb));
            push_bits(&mut out, msg.mcs_idx as u32, 5);
            push_bits(&mut out, msg.harq_process as u32, 3);
            out.push(msg.ndi);
            push_bits(&mut out, msg.rv_idx as u32, 2);
            push_bits(&mut out, msg.tpc as u32, 2);
        }
        (DciFormat::Format1, PrbAllocation::Type1 { .. }) => {
            return Err(PhyError::InvalidInput(
                "Format1 with Type-1 allocation needs a Type-0/1 header bit, not yet split out".into(),
            ));
        }
        (DciFormat::Format1A, PrbAllocation::Type2 { riv }) => {
            out.push(true); // format-0/1A disambiguator
            push_bits(&mut out, *riv, riv_bits(nof_prb));
            push_bits(&mut out, msg.mcs_idx as u32, 5);
            push_bits(&mut out, msg.harq_process as u32, 3);
            out.push(msg.ndi);
            push_bits(&mut out, msg.rv_idx as u32, 2);
            push_bits(&mut out, msg.tpc as u32, 2);
        }
        (DciFormat::Format1C, PrbAllocation::Type2 { riv }) => {
            push_bits(&mut out, *riv, riv_bits(nof_prb).max(1));
            push_bits(&mut out, msg.mcs_idx as u32, 5);
        }
        _ => {
            return Err(PhyError::InvalidInput("allocation type doesn't match DCI format".into()));
        }
    }
    Ok(out)
}

/// Inverse of [`pack`]. Returns `None` if `bits` doesn't have exactly
/// `format_sizeof(format, nof_prb)` bits.
pub fn unpack(bits: &[bool], format: DciFormat, nof_prb: NofPrb) -> Option<DciMessage> {
    if bits.len() != format_sizeof(format, nof_prb) {
        return None;
    }
    let mut cursor = 0usize;
    let msg = match format {
        DciFormat::Format0 => {
            cursor += 2; // disambiguator + hopping flag
            let riv = read_bits(bits, &mut cursor, riv_bits(nof_prb));
            let mcs_idx = read_bits(bits, &mut cursor, 5) as u8;
            let ndi = bits[cursor];
            cursor += 1;
            let tpc = read_bits(bits, &mut cursor, 2) as u8;
            let rv_idx = read_bits(bits, &mut cursor, 3) as u8;
            DciMessage {
                format,
                alloc: PrbAllocation::Type2 { riv },
                mcs_idx,
                harq_process: 0,
                ndi,
                rv_idx,
                tpc,
            }
        }
        DciFormat::Format1 => {
            if nof_prb.count() > 10 {
                cursor += 1;
            }
            let rbg_bitmask = read_bits(bits, &mut cursor, num_rbg(nof_prb));
            let mcs_idx = read_bits(bits, &mut cursor, 5) as u8;
            let harq_process = read_bits(bits, &mut cursor, 3) as u8;
            let ndi = bits[cursor];
            cursor += 1;
            let rv_idx = read_bits(bits, &mut cursor, 2) as u8;
            let tpc = read_bits(bits, &mut cursor, 2) as u8;
            DciMessage { format, alloc: PrbAllocation::Type0 { rbg_bitmask }, mcs_idx, harq_process, ndi, rv_idx, tpc }
        }
        DciFormat::Format1A => {
            cursor += 1; // disambiguator
            let riv = read_bits(bits, &mut cursor, riv_bits(nof_prb));
            let mcs_idx = read_bits(bits, &mut cursor, 5) as u8;
            let harq_process = read_bits(bits, &mut cursor, 3) as u8;
            let ndi = bits[cursor];
            cursor += 1;
            let rv_idx = read_bits(bits, &mut cursor, 2) as u8;
            let tpc = read_bits(bits, &mut cursor, 2) as u8;
            DciMessage { format, alloc: PrbAllocation::Type2 { riv }, mcs_idx, harq_process, ndi, rv_idx, tpc }
        }
        DciFormat::Format1C => {
            let riv = read_bits(bits, &mut cursor, riv_bits(nof_prb).max(1));
            let mcs_idx = read_bits(bits, &mut cursor, 5) as u8;
            DciMessage {
                format,
                alloc: PrbAllocation::Type2 { riv },
                mcs_idx,
                harq_process: 0,
                ndi: false,
                rv_idx: 0,
                tpc: 0,
            }
        }
    };
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::NofPrb;

    #[test]
    fn riv_roundtrips_every_localized_allocation() {
        for nof_prb in [NofPrb::Prb6, NofPrb::Prb25, NofPrb::Prb100] {
            let n = nof_prb.count();
            for l_crb in 1..=n {
                for rb_start in 0..=(n - l_crb) {
                    let riv = riv_from_location(l_crb, rb_start, nof_prb);
                    assert_eq!(location_from_riv(riv, nof_prb), (l_crb, rb_start));
                }
            }
        }
    }

    #[test]
    fn type2_prb_indices_are_contiguous() {
        let nof_prb = NofPrb::Prb25;
        let riv = riv_from_location(5, 10, nof_prb);
        let indices = prb_indices(&PrbAllocation::Type2 { riv }, nof_prb);
        assert_eq!(indices, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn format1a_pack_unpack_is_an_involution() {
        for nof_prb in [NofPrb::Prb6, NofPrb::Prb15, NofPrb::Prb25, NofPrb::Prb50, NofPrb::Prb75, NofPrb::Prb100] {
            let riv = riv_from_location(3, 1, nof_prb);
            let msg = DciMessage {
                format: DciFormat::Format1A,
                alloc: PrbAllocation::Type2 { riv },
                mcs_idx: 9,
                harq_process: 5,
                ndi: true,
                rv_idx: 2,
                tpc: 1,
            };
            let packed = pack(&msg, nof_prb).unwrap();
            assert_eq!(packed.len(), format_sizeof(DciFormat::Format1A, nof_prb));
            let unpacked = unpack(&packed, DciFormat::Format1A, nof_prb).unwrap();
            assert_eq!(unpacked, msg);
        }
    }

    #[test]
    fn format0_pack_unpack_is_an_involution() {
        let nof_prb = NofPrb::Prb25;
        let riv = riv_from_location(2, 4, nof_prb);
        let msg = DciMessage {
            format: DciFormat::Format0,
            alloc: PrbAllocation::Type2 { riv },
            mcs_idx: 12,
            harq_process: 0,
            ndi: false,
            rv_idx: 1,
            tpc: 3,
        };
        let packed = pack(&msg, nof_prb).unwrap();
        assert_eq!(packed.len(), format_sizeof(DciFormat::Format0, nof_prb));
        let unpacked = unpack(&packed, DciFormat::Format0, nof_prb).unwrap();
        assert_eq!(unpacked.alloc, msg.alloc);
        assert_eq!(unpacked.mcs_idx, msg.mcs_idx);
        assert_eq!(unpacked.ndi, msg.ndi);
        assert_eq!(unpacked.rv_idx, msg.rv_idx);
        assert_eq!(unpacked.tpc, msg.tpc);
    }

    #[test]
    fn format1_pack_unpack_is_an_involution() {
        let nof_prb = NofPrb::Prb25;
        let msg = DciMessage {
            format: DciFormat::Format1,
            alloc: PrbAllocation::Type0 { rbg_bitmask: 0b10110 },
            mcs_idx: 20,
            harq_process: 7,
            ndi: true,
            rv_idx: 3,
            tpc: 0,
        };
        let packed = pack(&msg, nof_prb).unwrap();
        assert_eq!(packed.len(), format_sizeof(DciFormat::Format1, nof_prb));
        let unpacked = unpack(&packed, DciFormat::Format1, nof_prb).unwrap();
        assert_eq!(unpacked, msg);
    }

    #[test]
    fn format1c_pack_unpack_is_an_involution() {
        let nof_prb = NofPrb::Prb6;
        let riv = riv_from_location(1, 2, nof_prb);
        let msg = DciMessage {
            format: DciFormat::Format1C,
            alloc: PrbAllocation::Type2 { riv },
            mcs_idx: 4,
            harq_process: 0,
            ndi: false,
            rv_idx: 0,
            tpc: 0,
        };
        let packed = pack(&msg, nof_prb).unwrap();
        assert_eq!(packed.len(), format_sizeof(DciFormat::Format1C, nof_prb));
        let unpacked = unpack(&packed, DciFormat::Format1C, nof_prb).unwrap();
        assert_eq!(unpacked.alloc, msg.alloc);
        assert_eq!(unpacked.mcs_idx, msg.mcs_idx);
    }

    #[test]
    fn wrong_length_fails_to_unpack() {
        let nof_prb = NofPrb::Prb25;
        let too_short = vec![false; format_sizeof(DciFormat::Format1A, nof_prb) - 1];
        assert!(unpack(&too_short, DciFormat::Format1A, nof_prb).is_none());
    }
}
