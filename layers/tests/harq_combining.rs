//! Scenario 5 (spec §8): a transport block's first HARQ attempt fails CRC,
//! a second retransmission at a different redundancy version is
//! soft-combined into the same HARQ buffer, and the combined decode
//! recovers the transport block within 8 turbo iterations.

use common::{CellConfig, CyclicPrefix, ModulationScheme, NofPorts, NofPrb, PhysCellId, Rnti};
use layers::phy::modem;
use layers::phy::pdsch::{
    decode_transport_block, encode_transport_block, map_to_grid, modulate_and_precode, pdsch_res,
    rate_match_and_scramble, segment_transport_block, extract_from_grid,
};
use layers::phy::resource_grid::ResourceGrid;

fn test_cell() -> CellConfig {
    CellConfig::new(
        PhysCellId::new(7).unwrap(),
        NofPrb::Prb25,
        NofPorts::One,
        CyclicPrefix::Normal,
    )
}

#[test]
fn harq_combining_recovers_after_first_attempt_fails_crc() {
    let cell = test_cell();
    let rnti = Rnti::new(0x1234);
    let subframe = 1u16;
    let res = pdsch_res(&cell, subframe, 2);

    let tb: Vec<bool> = (0..16).map(|i| i % 3 == 0).collect();
    let mut encoded = encode_transport_block(&tb);
    let cb_lengths: Vec<usize> = {
        let segmented = segment_transport_block(&tb);
        segmented.code_blocks.iter().map(|b| b.len()).collect()
    };

    // First attempt: rv_idx=0, systematic-only coverage with one corrupted
    // LLR, standing in for a reception that fails CRC.
    let k = cb_lengths[0];
    let e_first = k.min(res.len());
    let scrambled = rate_match_and_scramble(&encoded, 0, e_first, rnti, 0, subframe, cell.id.value());
    let layers0 = modulate_and_precode(&cell, ModulationScheme::Qpsk, &scrambled).unwrap();

    let mut grid0 = ResourceGrid::new(&cell);
    map_to_grid(&cell, &layers0, &res, &mut grid0).unwrap();
    let received0 = extract_from_grid(&res, layers0[0].len(), &grid0);
    let mut soft0: Vec<f32> = received0
        .iter()
        .flat_map(|&s| modem::demodulate_soft_maxlog(ModulationScheme::Qpsk, s, 1e-3))
        .collect();
    soft0[0] = -soft0[0];

    let first_attempt =
        decode_transport_block(&mut encoded, &cb_lengths, &soft0, 0, rnti, 0, subframe, cell.id.value());
    assert_eq!(first_attempt, None, "corrupted first HARQ attempt should fail CRC");

    // Second attempt: rv_idx=2, full buffer coverage, combined on top of the
    // first attempt's accumulated soft values.
    let e_total = encoded.buffers[0].ncb().min(res.len());
    let scrambled2 = rate_match_and_scramble(&encoded, 2, e_total, rnti, 0, subframe, cell.id.value());
    let layers2 = modulate_and_precode(&cell, ModulationScheme::Qpsk, &scrambled2).unwrap();

    let mut grid2 = ResourceGrid::new(&cell);
    map_to_grid(&cell, &layers2, &res, &mut grid2).unwrap();
    let received2 = extract_from_grid(&res, layers2[0].len(), &grid2);
    let soft2: Vec<f32> = received2
        .iter()
        .flat_map(|&s| modem::demodulate_soft_maxlog(ModulationScheme::Qpsk, s, 1e-3))
        .collect();

    let combined =
        decode_transport_block(&mut encoded, &cb_lengths, &soft2, 2, rnti, 0, subframe, cell.id.value());
    assert_eq!(combined, Some(tb));
}
