//! Numeric primitives: complex vector ops, the LTE Gold pseudorandom
//! sequence generator, and a DFT plan cache.
//!
//! The Gold sequence generator follows the two length-31 LFSRs of 36.211
//! §7.2 (`x^31+x^3+1`, `x^31+x^3+x^2+x+1`), the same construction the
//! teacher's `dmrs.rs` uses for its NR pseudorandom sequence.

use std::collections::HashMap;
use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};

/// Elementwise complex multiply-accumulate dot product.
pub fn dot(a: &[Complex32], b: &[Complex32]) -> Complex32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Elementwise conjugate.
pub fn conj(a: &[Complex32]) -> Vec<Complex32> {
    a.iter().map(|x| x.conj()).collect()
}

/// Elementwise scale by a real factor.
pub fn scale(a: &[Complex32], factor: f32) -> Vec<Complex32> {
    a.iter().map(|x| x * factor).collect()
}

/// Running (mean) magnitude of a complex buffer.
pub fn mean_magnitude(a: &[Complex32]) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().map(|x| x.norm()).sum::<f32>() / a.len() as f32
}

/// The LTE/NR length-31 Gold pseudorandom sequence generator, 36.211 §7.2.
///
/// `x1` is fixed-seeded; `x2` is seeded from `c_init`. Both run a 1600-step
/// warm-up before the first output bit, per the standard's definition.
pub struct GoldSequence {
    x1: u32,
    x2: u32,
}

const GOLD_WARMUP: usize = 1600;

impl GoldSequence {
    pub fn new(c_init: u32) -> Self {
        let mut seq = Self {
            x1: 1,
            x2: c_init,
        };
        for _ in 0..GOLD_WARMUP {
            seq.step();
        }
        seq
    }

    fn step(&mut self) -> (u32, u32) {
        let x1_out = self.x1 & 1;
        let x2_out = self.x2 & 1;
        let x1_new_bit = ((self.x1 >> 3) ^ self.x1) & 1;
        let x2_new_bit = ((self.x2 >> 3) ^ (self.x2 >> 2) ^ (self.x2 >> 1) ^ self.x2) & 1;
        self.x1 = (self.x1 >> 1) | (x1_new_bit << 30);
        self.x2 = (self.x2 >> 1) | (x2_new_bit << 30);
        (x1_out, x2_out)
    }

    /// Next chip of the sequence, as a bool (true == 1).
    pub fn next_bit(&mut self) -> bool {
        let (x1, x2) = self.step();
        (x1 ^ x2) != 0
    }

    /// Skip `n` chips without materializing them.
    pub fn skip(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Next `n` chips as bools.
    pub fn next_bits(&mut self, n: usize) -> Vec<bool> {
        (0..n).map(|_| self.next_bit()).collect()
    }

    /// Next QPSK symbol per 36.211 7.2: `(1-2c(2m))/sqrt(2) + j(1-2c(2m+1))/sqrt(2)`.
    pub fn next_qpsk_symbol(&mut self) -> Complex32 {
        const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;
        let c0 = self.next_bit();
        let c1 = self.next_bit();
        let re = if c0 { -INV_SQRT2 } else { INV_SQRT2 };
        let im = if c1 { -INV_SQRT2 } else { INV_SQRT2 };
        Complex32::new(re, im)
    }

    /// `n` QPSK symbols.
    pub fn next_qpsk_symbols(&mut self, n: usize) -> Vec<Complex32> {
        (0..n).map(|_| self.next_qpsk_symbol()).collect()
    }
}

/// A cache of forward/inverse FFT plans keyed by (size, direction), sized
/// once at init and reused without per-call allocation for the plan itself
/// (scratch buffers are still caller-provided per `process`).
pub struct DftPlanCache {
    planner: FftPlanner<f32>,
    plans: HashMap<(usize, bool), Arc<dyn Fft<f32>>>,
}

impl DftPlanCache {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    fn plan(&mut self, size: usize, forward: bool) -> Arc<dyn Fft<f32>> {
        let key = (size, forward);
        if let Some(p) = self.plans.get(&key) {
            return Arc::clone(p);
        }
        let direction = if forward {
            FftDirection::Forward
        } else {
            FftDirection::Inverse
        };
        let plan = self.planner.plan_fft(size, direction);
        self.plans.insert(key, Arc::clone(&plan));
        plan
    }

    /// Forward DFT, in place. Does not normalize.
    pub fn forward(&mut self, buf: &mut [Complex32]) {
        let plan = self.plan(buf.len(), true);
        plan.process(buf);
    }

    /// Inverse DFT, in place, normalized by 1/N.
    pub fn inverse(&mut self, buf: &mut [Complex32]) {
        let n = buf.len();
        let plan = self.plan(n, false);
        plan.process(buf);
        let scale = 1.0 / n as f32;
        for s in buf.iter_mut() {
            *s *= scale;
        }
    }
}

impl Default for DftPlanCache {
    fn default() -> Self {
        Self::new()
    }
}
