//! Scenario 6 (spec §8): encode a 40-bit alternating vector with the
//! tail-biting K=7, generators `{0x6D,0x4F,0x57}` convolutional code, and
//! confirm the Viterbi decoder recovers it exactly from soft values `±127`.

use layers::phy::convcode::{ConvEncoder, ViterbiDecoder};

#[test]
fn tail_biting_recovers_alternating_vector_from_signed_soft_values() {
    let input: Vec<bool> = (0..40).map(|i| i % 2 == 1).collect();
    let coded = ConvEncoder::encode(&input, true);

    // +127 / -127 confidence, rescaled into the decoder's unsigned 0..255
    // soft-metric convention (0 = strong zero, 255 = strong one).
    let soft: Vec<u8> = coded
        .iter()
        .map(|&b| if b { (128 + 127) as u8 } else { (128 - 127) as u8 })
        .collect();

    let decoded = ViterbiDecoder::decode(&soft, true, input.len());
    assert_eq!(decoded, input);
}
