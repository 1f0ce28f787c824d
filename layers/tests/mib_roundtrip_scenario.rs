//! Scenario 3 (spec §8): MIB `{nof_prb=25, phich_length=Normal,
//! phich_resources=1/6, sfn=512}` round-trips over 4 noiseless radio frames
//! with `nof_ports=1` recovered.

use common::{CellConfig, CyclicPrefix, Mib, NofPorts, NofPrb, PhichLength, PhichResources, PhysCellId};
use layers::phy::ofdm::{OfdmDemodulator, OfdmModulator};
use layers::phy::pbch::{self, PbchReceiver};
use layers::phy::resource_grid::ResourceGrid;

#[test]
fn mib_roundtrips_over_four_radio_frames() {
    let cell = CellConfig::new(
        PhysCellId::new(1).unwrap(),
        NofPrb::Prb25,
        NofPorts::One,
        CyclicPrefix::Normal,
    );
    let mib = Mib {
        nof_prb: NofPrb::Prb25,
        phich_length: PhichLength::Normal,
        phich_resources: PhichResources::Sixth,
        sfn: 512,
    };

    let coded = pbch::encode(&mib, cell.nof_ports, cell.id.value(), cell.cp);

    let mut receiver = PbchReceiver::new();
    let mut demod = OfdmDemodulator::new();
    for frame_idx in 0..4 {
        let mut grid = ResourceGrid::new(&cell);
        pbch::map_to_grid(&cell, &coded, frame_idx, &mut grid).unwrap();

        // Round-trip through the OFDM modulator/demodulator to exercise the
        // full channel, not just the resource grid.
        let modulated = {
            let mut modulator = OfdmModulator::new();
            modulator.modulate(&cell, &grid).unwrap()
        };
        let reconstructed = demod.demodulate(&cell, &modulated).unwrap();
        receiver.add_frame(&cell, &reconstructed);
    }

    let (decoded_mib, nof_ports) = receiver.try_decode(cell.id.value(), cell.cp).expect("MIB should decode");
    assert_eq!(decoded_mib, mib);
    assert_eq!(nof_ports, NofPorts::One);
}
