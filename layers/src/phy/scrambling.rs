//! Gold-sequence scrambling, per spec §4.10 / 36.211 §6.3.1.

use crate::phy::primitives::GoldSequence;

/// `c_init` for a PDSCH/PUSCH codeword, per 36.211 eq. 6.3.1-1:
/// `n_RNTI*2^14 + q*2^13 + floor(subframe/2)*2^9 + N_id_cell`.
pub fn cinit_pdsch(rnti: u16, codeword: u8, subframe: u16, cell_id: u16) -> u32 {
    (rnti as u32) * (1 << 14)
        + (codeword as u32) * (1 << 13)
        + (subframe as u32 / 2) * (1 << 9)
        + cell_id as u32
}

/// `c_init` for PBCH, per 36.211 §6.6.1: `c_init = N_id_cell`.
pub fn cinit_pbch(cell_id: u16) -> u32 {
    cell_id as u32
}

/// `c_init` for PCFICH, per 36.211 §6.7.1: `c_init = (floor(ns/2)+1)*(2*N_id_cell+1)*2^9 + N_id_cell`.
pub fn cinit_pcfich(subframe: u16, cell_id: u16) -> u32 {
    let cell_id = cell_id as u32;
    ((subframe as u32 / 2) + 1) * (2 * cell_id + 1) * (1 << 9) + cell_id
}

/// `c_init` for PHICH, per 36.211 §6.9.1: `c_init = (floor(ns/2)+1)*(2*N_id_cell+1)*2^9 + N_id_cell`
/// (identical form to PCFICH, distinct sequence instance per channel).
pub fn cinit_phich(subframe: u16, cell_id: u16) -> u32 {
    cinit_pcfich(subframe, cell_id)
}

/// `c_init` for PDCCH, per 36.211 §6.8.2: `c_init = floor(ns/2)*2^9 + N_id_cell`.
pub fn cinit_pdcch(subframe: u16, cell_id: u16) -> u32 {
    (subframe as u32 / 2) * (1 << 9) + cell_id as u32
}

/// A stateless-per-subframe scrambler: construct fresh for each `c_init`.
pub struct Scrambler {
    gold: GoldSequence,
}

impl Scrambler {
    pub fn new(c_init: u32) -> Self {
        Self {
            gold: GoldSequence::new(c_init),
        }
    }

    /// XOR-scramble (or descramble, involutive) a hard bit stream.
    pub fn xor_bits(&mut self, data: &[bool]) -> Vec<bool> {
        let chips = self.gold.next_bits(data.len());
        data.iter().zip(chips.iter()).map(|(&d, &c)| d ^ c).collect()
    }

    /// Sign-flip LLR scrambling: multiply each soft value by +1/-1 per chip.
    pub fn sign_flip_floats(&mut self, data: &[f32]) -> Vec<f32> {
        let chips = self.gold.next_bits(data.len());
        data.iter()
            .zip(chips.iter())
            .map(|(&d, &c)| if c { -d } else { d })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scramble_is_involutive() {
        let data = vec![true, false, true, true, false, false, true];
        let mut s1 = Scrambler::new(1234);
        let scrambled = s1.xor_bits(&data);
        let mut s2 = Scrambler::new(1234);
        let descrambled = s2.xor_bits(&scrambled);
        assert_eq!(descrambled, data);
    }

    #[test]
    fn sign_flip_is_involutive() {
        let data = vec![1.5f32, -2.0, 0.25, -0.75];
        let mut s1 = Scrambler::new(42);
        let scrambled = s1.sign_flip_floats(&data);
        let mut s2 = Scrambler::new(42);
        let descrambled = s2.sign_flip_floats(&scrambled);
        for (a, b) in data.iter().zip(descrambled.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn different_keys_diverge() {
        let data = vec![true; 32];
        let mut s1 = Scrambler::new(1);
        let mut s2 = Scrambler::new(2);
        assert_ne!(s1.xor_bits(&data), s2.xor_bits(&data));
    }
}
