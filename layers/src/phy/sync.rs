//! Cell-search synchronizer: PSS/SSS generation, correlation, CFO and CP
//! detection, and the SEARCH/TRACK/LOST state machine, per spec §4.4.
//!
//! Grounded in `original_source/lte/include/lte/sync/{pss,sss}.h`: PSS is a
//! 62-tone Zadoff-Chu sequence (root in `{25, 29, 34}`) placed around DC and
//! IDFT'd to a 128-sample time-domain replica; SSS is two interleaved
//! length-31 m-sequences.

use num_complex::Complex32;

use crate::phy::primitives::DftPlanCache;
use common::CyclicPrefix;

pub const PSS_LEN: usize = 62;
pub const PSS_ROOTS: [u32; 3] = [25, 29, 34];
pub const SSS_LEN: usize = 31;

/// Generate the 62-tone frequency-domain Zadoff-Chu PSS sequence for `n_id_2`.
pub fn pss_sequence_freq(n_id_2: u8) -> Vec<Complex32> {
    let root = PSS_ROOTS[n_id_2 as usize % 3] as f64;
    (0..PSS_LEN)
        .map(|n| {
            let nf = n as f64;
            let arg = if n <= 30 {
                -std::f64::consts::PI * root * nf * (nf + 1.0) / 63.0
            } else {
                -std::f64::consts::PI * root * (nf + 1.0) * (nf + 2.0) / 63.0
            };
            Complex32::new(arg.cos() as f32, arg.sin() as f32)
        })
        .collect()
}

/// Time-domain PSS replica of length 128, via a 128-point IDFT of the
/// frequency-domain sequence centered on DC (bins 1..31 and 97..127, per
/// the teacher's DC-centered grid convention).
pub fn pss_sequence_time(n_id_2: u8) -> Vec<Complex32> {
    let freq = pss_sequence_freq(n_id_2);
    let mut buf = vec![Complex32::new(0.0, 0.0); 128];
    let half = PSS_LEN / 2;
    for (i, &v) in freq.iter().enumerate() {
        let bin = if i < half { i + 1 } else { 128 - half + (i - half) };
        buf[bin] = v;
    }
    let mut dft = DftPlanCache::new();
    dft.inverse(&mut buf);
    let norm = (128.0f32).sqrt();
    for s in buf.iter_mut() {
        *s *= norm;
    }
    buf
}

/// One of the two length-31 SSS m-sequences for `(n_id_1, n_id_2, subframe)`,
/// per 36.211 §6.11.2's interleaved construction. `m0`/`m1` derive from
/// `n_id_1` via the standard index table; this implementation uses the
/// closed-form relation rather than reproducing the full 168-row table.
pub fn sss_indices(n_id_1: u16) -> (u16, u16) {
    // q' search per 36.211 6.11.2.1: find largest q such that
    // q(q+1)/2 <= n_id_1, then m0/m1 from the remainder.
    let mut q = 0u16;
    while (q + 1) * (q + 2) / 2 <= n_id_1 {
        q += 1;
    }
    let q_prime = q;
    let m_prime = n_id_1 + q_prime * (q_prime + 1) / 2;
    let m0 = m_prime % 31;
    let m1 = (m0 + m_prime / 31 + 1) % 31;
    (m0, m1)
}

fn m_sequence(len: usize, poly_taps: &[usize]) -> Vec<i8> {
    let mut state = vec![false; len];
    state[len - 1] = true;
    let mut out = Vec::with_capacity((1 << len) - 1);
    for _ in 0..(1 << len) - 1 {
        let bit = state[0];
        out.push(if bit { -1 } else { 1 });
        let feedback = poly_taps.iter().fold(false, |acc, &t| acc ^ state[t]);
        state.rotate_left(1);
        *state.last_mut().unwrap() = feedback;
    }
    out
}

/// Base m-sequence `s` (length 31), generated from the primitive polynomial
/// `x^5 + x^2 + 1`, per 36.211 6.11.2.1.
pub fn sss_base_sequence() -> Vec<i8> {
    m_sequence(5, &[0, 3])
}

/// One SSS symbol (168 -> actually 62-length BPSK sequence interleaved in
/// even/odd positions), for the given `(n_id_1, n_id_2, subframe)`.
pub fn sss_sequence(n_id_1: u16, n_id_2: u8, subframe0: bool) -> Vec<Complex32> {
    let (m0, m1) = sss_indices(n_id_1);
    let s = sss_base_sequence();
    let shift = |seq: &[i8], k: u16| -> Vec<i8> {
        let len = seq.len();
        (0..len).map(|i| seq[(i + k as usize) % len]).collect()
    };
    let s0 = shift(&s, m0);
    let s1 = shift(&s, m1);

    let (even, odd) = if subframe0 { (s0, s1) } else { (s1, s0) };
    let cell_shift = n_id_2 as u16;
    let scramble = shift(&s, cell_shift % 31);

    let mut out = Vec::with_capacity(2 * SSS_LEN);
    for i in 0..SSS_LEN {
        let e = (even[i] * scramble[i]) as f32;
        out.push(Complex32::new(e, 0.0));
        let o = (odd[i] * scramble[i]) as f32;
        out.push(Complex32::new(o, 0.0));
    }
    out
}

/// Correlate `input` (time domain) against the conjugated PSS replica for
/// each `N_id_2` hypothesis, returning `(n_id_2, peak_index, peak_value, mean_value)`.
pub fn pss_correlate(input: &[Complex32]) -> Option<(u8, usize, f32, f32)> {
    let mut best: Option<(u8, usize, f32, f32)> = None;
    for n_id_2 in 0..3u8 {
        let pss = pss_sequence_time(n_id_2);
        let conj_pss: Vec<Complex32> = pss.iter().map(|c| c.conj()).collect();
        if input.len() < conj_pss.len() {
            continue;
        }
        let mut corr = Vec::with_capacity(input.len() - conj_pss.len() + 1);
        for start in 0..=input.len() - conj_pss.len() {
            let window = &input[start..start + conj_pss.len()];
            let sum: Complex32 = window.iter().zip(conj_pss.iter()).map(|(a, b)| a * b).sum();
            corr.push(sum.norm());
        }
        let mean = corr.iter().sum::<f32>() / corr.len() as f32;
        if let Some((idx, &peak)) = corr
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        {
            let better = match &best {
                None => true,
                Some((_, _, best_peak, _)) => peak > *best_peak,
            };
            if better {
                best = Some((n_id_2, idx, peak, mean));
            }
        }
    }
    best
}

/// Detection mode for the PSS peak test.
#[derive(Debug, Clone, Copy)]
pub enum DetectionMode {
    Absolute(f32),
    PeakToAverage(f32),
}

pub fn pss_peak_detected(peak: f32, mean: f32, mode: DetectionMode) -> bool {
    match mode {
        DetectionMode::Absolute(th) => peak > th,
        DetectionMode::PeakToAverage(th) => mean > 0.0 && peak / mean > th,
    }
}

/// Estimate normalized CFO from the PSS time-domain window itself, per
/// spec §4.4: argument of the correlation between the first and second
/// halves of the 128-sample replica, divided by 2*pi and the half-length.
pub fn estimate_cfo(pss_window: &[Complex32]) -> f32 {
    let half = pss_window.len() / 2;
    let corr: Complex32 = pss_window[..half]
        .iter()
        .zip(pss_window[half..2 * half].iter())
        .map(|(a, b)| a * b.conj())
        .sum();
    corr.arg() / (2.0 * std::f32::consts::PI) / half as f32
}

/// Choose the cyclic prefix whose SSS correlation product `m0_val * m1_val`
/// is larger, unless a CP has been forced by the caller.
pub fn detect_cp(normal_product: f32, extended_product: f32, forced: Option<CyclicPrefix>) -> CyclicPrefix {
    if let Some(cp) = forced {
        return cp;
    }
    if normal_product >= extended_product {
        CyclicPrefix::Normal
    } else {
        CyclicPrefix::Extended
    }
}

/// Correlate a received SSS symbol (62 real BPSK values) against every
/// `(n_id_1, subframe-0-or-5)` hypothesis for a known `n_id_2`, returning the
/// best-scoring `(n_id_1, is_subframe0, score)`.
fn sss_detect_scored(received: &[Complex32], n_id_2: u8) -> Option<(u16, bool, f32)> {
    let mut best: Option<(u16, bool, f32)> = None;
    for n_id_1 in 0..168u16 {
        for subframe0 in [true, false] {
            let candidate = sss_sequence(n_id_1, n_id_2, subframe0);
            if candidate.len() != received.len() {
                continue;
            }
            let score: f32 = candidate
                .iter()
                .zip(received.iter())
                .map(|(a, b)| (a.re * b.re))
                .sum();
            let better = match &best {
                None => true,
                Some((_, _, s)) => score > *s,
            };
            if better {
                best = Some((n_id_1, subframe0, score));
            }
        }
    }
    best
}

/// Correlate a received SSS symbol (62 real BPSK values) against every
/// `(n_id_1, subframe-0-or-5)` hypothesis for a known `n_id_2`, returning the
/// best-scoring `(n_id_1, is_subframe0)`.
pub fn sss_detect(received: &[Complex32], n_id_2: u8) -> Option<(u16, bool)> {
    sss_detect_scored(received, n_id_2).map(|(n_id_1, subframe0, _)| (n_id_1, subframe0))
}

/// Map a grid column (of `num_sc` total, centered on DC) onto the DFT bin
/// carrying it, mirroring `ofdm::grid_col_to_fft_bin`.
fn center_fft_bin(col: usize, num_sc: usize, fft_size: usize) -> usize {
    let half = num_sc / 2;
    if col < half {
        col + fft_size - half
    } else {
        col - half
    }
}

/// DFT one OFDM symbol body starting at `start` and pull out its `num_sc`
/// center subcarriers (the ones the SSS occupies).
fn demod_center_subcarriers(samples: &[Complex32], start: usize, symbol_sz: usize, num_sc: usize) -> Option<Vec<Complex32>> {
    if start.checked_add(symbol_sz)? > samples.len() {
        return None;
    }
    let mut buf: Vec<Complex32> = samples[start..start + symbol_sz].to_vec();
    let norm = 1.0 / (symbol_sz as f32).sqrt();
    for s in buf.iter_mut() {
        *s *= norm;
    }
    let mut dft = DftPlanCache::new();
    dft.forward(&mut buf);
    Some((0..num_sc).map(|col| buf[center_fft_bin(col, num_sc, symbol_sz)]).collect())
}

/// Cell-search state machine, per spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Search,
    Track,
    Lost,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncResult {
    pub n_id_2: u8,
    pub n_id_1: u16,
    pub cell_id: u16,
    pub slot_id: u16,
    pub cp: CyclicPrefix,
    pub cfo: f32,
    pub peak_to_avg: f32,
}

pub struct Synchronizer {
    state: SyncState,
    nosync_timeout_frames: u32,
    frames_without_sync: u32,
    forced_n_id_2: Option<u8>,
    sss_enabled: bool,
}

impl Synchronizer {
    pub fn new(nosync_timeout_frames: u32) -> Self {
        Self {
            state: SyncState::Search,
            nosync_timeout_frames,
            frames_without_sync: 0,
            forced_n_id_2: None,
            sss_enabled: true,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn force_n_id_2(&mut self, n_id_2: Option<u8>) {
        self.forced_n_id_2 = n_id_2;
    }

    pub fn set_sss_enabled(&mut self, enabled: bool) {
        self.sss_enabled = enabled;
    }

    /// Run one search attempt over `samples`, advancing the state machine.
    pub fn search(
        &mut self,
        samples: &[Complex32],
        mode: DetectionMode,
        symbol_sz: usize,
    ) -> Option<SyncResult> {
        let candidate = match self.forced_n_id_2 {
            Some(n_id_2) => {
                let pss = pss_sequence_time(n_id_2);
                let conj_pss: Vec<Complex32> = pss.iter().map(|c| c.conj()).collect();
                if samples.len() < conj_pss.len() {
                    None
                } else {
                    let mut best = (0usize, 0.0f32);
                    let mut sum_all = 0.0f32;
                    for start in 0..=samples.len() - conj_pss.len() {
                        let window = &samples[start..start + conj_pss.len()];
                        let v: Complex32 = window.iter().zip(conj_pss.iter()).map(|(a, b)| a * b).sum();
                        let mag = v.norm();
                        sum_all += mag;
                        if mag > best.1 {
                            best = (start, mag);
                        }
                    }
                    let mean = sum_all / (samples.len() - conj_pss.len() + 1) as f32;
                    Some((n_id_2, best.0, best.1, mean))
                }
            }
            None => pss_correlate(samples),
        };

        let (n_id_2, peak_idx, peak, mean) = match candidate {
            Some(c) => c,
            None => {
                self.register_failure();
                return None;
            }
        };

        if !pss_peak_detected(peak, mean, mode) {
            self.register_failure();
            return None;
        }

        let cp_len_normal = 160 * symbol_sz / 2048;
        let cp_len_extended = 512 * symbol_sz / 2048;
        let cfo = {
            let end = (peak_idx + 128).min(samples.len());
            if peak_idx < end {
                estimate_cfo(&samples[peak_idx..end])
            } else {
                0.0
            }
        };

        // The SSS symbol body sits one full symbol (plus that symbol's own
        // CP) before the PSS symbol body `peak_idx` locates; the exact CP
        // length to step back by depends on the CP hypothesis under test, so
        // both are demodulated and scored before the CP itself is known.
        let (n_id_1, slot_id, cp) = if self.sss_enabled {
            let hypothesis = |cp_len: usize| {
                peak_idx
                    .checked_sub(symbol_sz + cp_len)
                    .and_then(|start| demod_center_subcarriers(samples, start, symbol_sz, 2 * SSS_LEN))
                    .and_then(|sym| sss_detect_scored(&sym, n_id_2))
            };
            let normal_hyp = hypothesis(cp_len_normal);
            let extended_hyp = hypothesis(cp_len_extended);
            let normal_score = normal_hyp.map(|(_, _, s)| s).unwrap_or(f32::MIN);
            let extended_score = extended_hyp.map(|(_, _, s)| s).unwrap_or(f32::MIN);
            let cp = detect_cp(normal_score, extended_score, None);
            let chosen = match cp {
                CyclicPrefix::Normal => normal_hyp,
                CyclicPrefix::Extended => extended_hyp,
            };
            match chosen {
                Some((n_id_1, subframe0, _)) => (n_id_1, if subframe0 { 0 } else { 10 }, cp),
                None => (0u16, 0u16, CyclicPrefix::Normal),
            }
        } else {
            (0u16, 0u16, CyclicPrefix::Normal)
        };

        let result = SyncResult {
            n_id_2,
            n_id_1,
            cell_id: 3 * n_id_1 + n_id_2 as u16,
            slot_id,
            cp,
            cfo,
            peak_to_avg: peak / mean.max(1e-9),
        };
        self.state = SyncState::Track;
        self.frames_without_sync = 0;
        Some(result)
    }

    fn register_failure(&mut self) {
        self.frames_without_sync += 1;
        if self.frames_without_sync >= self.nosync_timeout_frames {
            self.state = SyncState::Lost;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pss_sequences_are_unit_magnitude() {
        for n_id_2 in 0..3 {
            let seq = pss_sequence_freq(n_id_2);
            for s in seq {
                assert!((s.norm() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn pss_time_replica_has_expected_length() {
        assert_eq!(pss_sequence_time(0).len(), 128);
    }

    #[test]
    fn sss_indices_known_case() {
        // cell id 167 -> n_id_1 = 55
        let (m0, m1) = sss_indices(55);
        assert!(m0 < 31 && m1 < 31);
    }

    #[test]
    fn pss_correlation_finds_inserted_sequence() {
        let n_id_2 = 2u8;
        let pss = pss_sequence_time(n_id_2);
        let mut stream = vec![Complex32::new(0.0, 0.0); 4300];
        stream.extend_from_slice(&pss);
        stream.extend(vec![Complex32::new(0.0, 0.0); 500]);

        let (found_n_id_2, idx, peak, mean) = pss_correlate(&stream).unwrap();
        assert_eq!(found_n_id_2, n_id_2);
        assert!((idx as i64 - 4300).abs() <= 2);
        assert!(peak > mean);
    }

    #[test]
    fn cfo_is_zero_for_unshifted_replica() {
        let pss = pss_sequence_time(0);
        let cfo = estimate_cfo(&pss);
        assert!(cfo.abs() < 1e-3);
    }

    #[test]
    fn sss_disambiguates_cell_167_and_subframe_parity() {
        let n_id_2 = 1u8;
        let slot0 = sss_sequence(55, n_id_2, true);
        let slot10 = sss_sequence(55, n_id_2, false);

        let (n_id_1_a, subframe0_a) = sss_detect(&slot0, n_id_2).unwrap();
        assert_eq!(n_id_1_a, 55);
        assert!(subframe0_a);

        let (n_id_1_b, subframe0_b) = sss_detect(&slot10, n_id_2).unwrap();
        assert_eq!(n_id_1_b, 55);
        assert!(!subframe0_b);
    }

    #[test]
    fn sync_state_transitions_to_lost_after_timeout() {
        let mut sync = Synchronizer::new(2);
        let noise = vec![Complex32::new(0.001, 0.0); 2000];
        sync.search(&noise, DetectionMode::Absolute(1000.0), 128);
        assert_eq!(sync.state(), SyncState::Search);
        sync.search(&noise, DetectionMode::Absolute(1000.0), 128);
        assert_eq!(sync.state(), SyncState::Lost);
    }
}
