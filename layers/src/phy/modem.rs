//! Modulation mapping: BPSK/QPSK/16QAM/64QAM Gray-coded constellations with
//! hard slicers and soft LLR demappers, per spec §4.9 / 36.211 §7.1.

use common::ModulationScheme;
use num_complex::Complex32;

const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;
const INV_SQRT10: f32 = 0.316_227_77;
const INV_SQRT42: f32 = 0.154_303_35;

/// Map a bit slice onto one symbol for `scheme`, per 36.211 §7.1's Gray
/// constellation tables.
pub fn modulate_symbol(scheme: ModulationScheme, bits: &[bool]) -> Complex32 {
    match scheme {
        ModulationScheme::Bpsk => {
            let v = if bits[0] { -INV_SQRT2 } else { INV_SQRT2 };
            Complex32::new(v, 0.0)
        }
        ModulationScheme::Qpsk => {
            let re = if bits[0] { -INV_SQRT2 } else { INV_SQRT2 };
            let im = if bits[1] { -INV_SQRT2 } else { INV_SQRT2 };
            Complex32::new(re, im)
        }
        ModulationScheme::Qam16 => {
            let re = qam16_axis(bits[0], bits[2]);
            let im = qam16_axis(bits[1], bits[3]);
            Complex32::new(re, im)
        }
        ModulationScheme::Qam64 => {
            let re = qam64_axis(bits[0], bits[2], bits[4]);
            let im = qam64_axis(bits[1], bits[3], bits[5]);
            Complex32::new(re, im)
        }
    }
}

fn qam16_axis(b0: bool, b1: bool) -> f32 {
    let sign = if b0 { -1.0 } else { 1.0 };
    let mag = if b1 { 1.0 } else { 3.0 };
    sign * mag * INV_SQRT10
}

fn qam64_axis(b0: bool, b1: bool, b2: bool) -> f32 {
    let sign = if b0 { -1.0 } else { 1.0 };
    let mag = match (b1, b2) {
        (false, false) => 3.0,
        (false, true) => 1.0,
        (true, true) => 5.0,
        (true, false) => 7.0,
    };
    sign * mag * INV_SQRT42
}

/// Modulate a whole bit stream, MSB-first grouping per symbol.
pub fn modulate(scheme: ModulationScheme, bits: &[bool]) -> Vec<Complex32> {
    let bps = scheme.bits_per_symbol();
    bits.chunks(bps).map(|c| modulate_symbol(scheme, c)).collect()
}

/// Hard-decide the bits carried by one received symbol (no noise model).
pub fn demodulate_hard(scheme: ModulationScheme, symbol: Complex32) -> Vec<bool> {
    match scheme {
        ModulationScheme::Bpsk => vec![symbol.re < 0.0],
        ModulationScheme::Qpsk => vec![symbol.re < 0.0, symbol.im < 0.0],
        ModulationScheme::Qam16 => {
            vec![
                symbol.re < 0.0,
                symbol.im < 0.0,
                symbol.re.abs() < 2.0 * INV_SQRT10,
                symbol.im.abs() < 2.0 * INV_SQRT10,
            ]
        }
        ModulationScheme::Qam64 => {
            let axis_bits = |v: f32| {
                let sign = v < 0.0;
                let a = v.abs();
                let (b1, b2) = if a < 2.0 * INV_SQRT42 {
                    (false, true)
                } else if a < 4.0 * INV_SQRT42 {
                    (false, false)
                } else if a < 6.0 * INV_SQRT42 {
                    (true, false)
                } else {
                    (true, true)
                };
                (sign, b1, b2)
            };
            let (s_re, b1_re, b2_re) = axis_bits(symbol.re);
            let (s_im, b1_im, b2_im) = axis_bits(symbol.im);
            vec![s_re, s_im, b1_re, b1_im, b2_re, b2_im]
        }
    }
}

/// Soft per-bit LLR demap via the max-log approximation, per spec §4.9:
/// `LLR(b) = min_{s in S0} |r-s|^2/sigma2 - min_{s in S1} |r-s|^2/sigma2`.
pub fn demodulate_soft_maxlog(scheme: ModulationScheme, symbol: Complex32, noise_var: f32) -> Vec<f32> {
    let bps = scheme.bits_per_symbol();
    let constellation = full_constellation(scheme);
    let sigma2 = noise_var.max(1e-6);

    (0..bps)
        .map(|bit_idx| {
            let mut min0 = f32::INFINITY;
            let mut min1 = f32::INFINITY;
            for (bits, point) in &constellation {
                let dist2 = (symbol - point).norm_sqr();
                if bits[bit_idx] {
                    min1 = min1.min(dist2);
                } else {
                    min0 = min0.min(dist2);
                }
            }
            (min0 - min1) / sigma2
        })
        .collect()
}

/// Exact (log-sum) soft demap.
pub fn demodulate_soft_exact(scheme: ModulationScheme, symbol: Complex32, noise_var: f32) -> Vec<f32> {
    let bps = scheme.bits_per_symbol();
    let constellation = full_constellation(scheme);
    let sigma2 = noise_var.max(1e-6);

    (0..bps)
        .map(|bit_idx| {
            let mut p0 = 0.0f32;
            let mut p1 = 0.0f32;
            for (bits, point) in &constellation {
                let dist2 = (symbol - point).norm_sqr();
                let likelihood = (-dist2 / sigma2).exp();
                if bits[bit_idx] {
                    p1 += likelihood;
                } else {
                    p0 += likelihood;
                }
            }
            (p0.max(f32::MIN_POSITIVE) / p1.max(f32::MIN_POSITIVE)).ln()
        })
        .collect()
}

fn full_constellation(scheme: ModulationScheme) -> Vec<(Vec<bool>, Complex32)> {
    let bps = scheme.bits_per_symbol();
    let n = 1usize << bps;
    (0..n)
        .map(|i| {
            let bits: Vec<bool> = (0..bps).map(|b| (i >> (bps - 1 - b)) & 1 != 0).collect();
            (bits.clone(), modulate_symbol(scheme, &bits))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qpsk_roundtrip_all_combos() {
        for b0 in [false, true] {
            for b1 in [false, true] {
                let bits = vec![b0, b1];
                let sym = modulate_symbol(ModulationScheme::Qpsk, &bits);
                let decoded = demodulate_hard(ModulationScheme::Qpsk, sym);
                assert_eq!(decoded, bits);
            }
        }
    }

    #[test]
    fn qam16_roundtrip() {
        let bits = vec![true, false, false, true];
        let sym = modulate_symbol(ModulationScheme::Qam16, &bits);
        assert_eq!(demodulate_hard(ModulationScheme::Qam16, sym), bits);
    }

    #[test]
    fn qam64_roundtrip() {
        let bits = vec![false, true, true, false, true, false];
        let sym = modulate_symbol(ModulationScheme::Qam64, &bits);
        assert_eq!(demodulate_hard(ModulationScheme::Qam64, sym), bits);
    }

    #[test]
    fn constellation_energy_is_normalized() {
        for scheme in [
            ModulationScheme::Qpsk,
            ModulationScheme::Qam16,
            ModulationScheme::Qam64,
        ] {
            let avg: f32 = full_constellation(scheme)
                .iter()
                .map(|(_, p)| p.norm_sqr())
                .sum::<f32>()
                / (1usize << scheme.bits_per_symbol()) as f32;
            assert!((avg - 1.0).abs() < 0.05, "{:?} avg energy {}", scheme, avg);
        }
    }

    #[test]
    fn soft_llr_sign_matches_hard_decision() {
        let sym = modulate_symbol(ModulationScheme::Qpsk, &[true, false]);
        let llr = demodulate_soft_maxlog(ModulationScheme::Qpsk, sym, 0.1);
        // bit0 = true -> LLR should be negative (min0 > min1)
        assert!(llr[0] < 0.0);
        assert!(llr[1] > 0.0);
    }
}
