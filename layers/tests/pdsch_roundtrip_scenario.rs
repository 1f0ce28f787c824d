//! Scenario 4 (spec §8): a 2792-bit transport block (representative of TBS
//! index 15 on 25 PRBs), QPSK-modulated, scrambled with RNTI=0x1234,
//! precoded for 1 port, mapped to subframe 1, decodes to the identical bit
//! vector at infinite SNR.

use common::{CellConfig, CyclicPrefix, ModulationScheme, NofPorts, NofPrb, PhysCellId, Rnti};
use layers::phy::modem;
use layers::phy::pdsch::{
    decode_transport_block, encode_transport_block, extract_from_grid, map_to_grid, modulate_and_precode,
    pdsch_res, rate_match_and_scramble, segment_transport_block,
};
use layers::phy::resource_grid::ResourceGrid;

#[test]
fn large_transport_block_roundtrips_at_infinite_snr() {
    let cell = CellConfig::new(
        PhysCellId::new(3).unwrap(),
        NofPrb::Prb25,
        NofPorts::One,
        CyclicPrefix::Normal,
    );
    let rnti = Rnti::new(0x1234);
    let subframe = 1u16;
    let res = pdsch_res(&cell, subframe, 2);

    let tb: Vec<bool> = (0..2792).map(|i| (i * 31) % 7 < 3).collect();
    let mut encoded = encode_transport_block(&tb);
    let cb_lengths: Vec<usize> = {
        let segmented = segment_transport_block(&tb);
        segmented.code_blocks.iter().map(|b| b.len()).collect()
    };

    let e_total = encoded
        .buffers
        .iter()
        .map(|b| b.ncb())
        .sum::<usize>()
        .min(res.len());
    let scrambled = rate_match_and_scramble(&encoded, 0, e_total, rnti, 0, subframe, cell.id.value());
    let layers = modulate_and_precode(&cell, ModulationScheme::Qpsk, &scrambled).unwrap();

    let mut grid = ResourceGrid::new(&cell);
    map_to_grid(&cell, &layers, &res, &mut grid).unwrap();

    let received = extract_from_grid(&res, layers[0].len(), &grid);
    let soft: Vec<f32> = received
        .iter()
        .flat_map(|&s| modem::demodulate_soft_maxlog(ModulationScheme::Qpsk, s, 1e-3))
        .collect();

    let decoded = decode_transport_block(&mut encoded, &cb_lengths, &soft, 0, rnti, 0, subframe, cell.id.value());
    assert_eq!(decoded, Some(tb));
}
