//! Scenarios 1-2 (spec §8): PSS acquisition on a noisy capture, and SSS
//! disambiguation of the two slots carrying the secondary sync signal.

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use layers::phy::sync::{pss_sequence_time, sss_detect, sss_sequence, DetectionMode, Synchronizer};

/// Approximate complex AWGN at the given per-component standard deviation,
/// summing a few uniform draws (CLT) rather than pulling in a normal
/// distribution crate for test-only noise.
fn awgn(rng: &mut StdRng, std: f32) -> Complex32 {
    let sample = |rng: &mut StdRng| -> f32 {
        let sum: f32 = (0..4).map(|_| rng.gen_range(-1.0f32..1.0f32)).sum();
        sum * std / 4.0f32.sqrt()
    };
    Complex32::new(sample(rng), sample(rng))
}

#[test]
fn pss_acquisition_survives_noise_at_the_inserted_offset() {
    let mut rng = StdRng::seed_from_u64(42);
    let n_id_2 = 2u8;
    let pss = pss_sequence_time(n_id_2);

    let insert_at = 4300usize;
    let total_len = insert_at + pss.len() + 1500;
    let mut stream = vec![Complex32::new(0.0, 0.0); total_len];
    for (i, v) in pss.iter().enumerate() {
        stream[insert_at + i] = *v;
    }
    for s in stream.iter_mut() {
        *s += awgn(&mut rng, 0.3);
    }

    let mut sync = Synchronizer::new(10);
    let result = sync
        .search(&stream, DetectionMode::PeakToAverage(2.0), 128)
        .expect("PSS should be acquired despite noise");

    assert_eq!(result.n_id_2, n_id_2);
}

#[test]
fn sss_disambiguates_subframe_0_from_subframe_5() {
    let n_id_1 = 55u16;
    let n_id_2 = 2u8; // 167 = 3*55 + 2
    let subframe0 = sss_sequence(n_id_1, n_id_2, true);
    let subframe5 = sss_sequence(n_id_1, n_id_2, false);

    let (id1_a, is_subframe0_a) = sss_detect(&subframe0, n_id_2).expect("subframe 0 SSS should be found");
    assert_eq!(id1_a, n_id_1);
    assert!(is_subframe0_a);

    let (id1_b, is_subframe0_b) = sss_detect(&subframe5, n_id_2).expect("subframe 5 SSS should be found");
    assert_eq!(id1_b, n_id_1);
    assert!(!is_subframe0_b);
}
