//! Common Types for the LTE PHY Core
//!
//! Defines the cell descriptor and other fundamental types shared across
//! the DSP and control-channel modules, per 3GPP TS 36.211/36.212/36.213.

use serde::{Deserialize, Serialize};

/// Radio Network Temporary Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Physical Cell Identity, 0..=503
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysCellId(u16);

impl PhysCellId {
    pub const MAX: u16 = 503;

    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// N_id_1 = id / 3 (cell-identity group, 0..=167)
    pub fn n_id_1(&self) -> u16 {
        self.0 / 3
    }

    /// N_id_2 = id mod 3 (sector id within group)
    pub fn n_id_2(&self) -> u8 {
        (self.0 % 3) as u8
    }

    /// Reconstruct a PCI from its N_id_1/N_id_2 decomposition
    pub fn from_group(n_id_1: u16, n_id_2: u8) -> Option<Self> {
        Self::new(3 * n_id_1 + n_id_2 as u16)
    }
}

/// Number of downlink resource blocks for the cell bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NofPrb {
    Prb6,
    Prb15,
    Prb25,
    Prb50,
    Prb75,
    Prb100,
}

impl NofPrb {
    /// All valid PRB counts, ascending
    pub const ALL: [NofPrb; 6] = [
        NofPrb::Prb6,
        NofPrb::Prb15,
        NofPrb::Prb25,
        NofPrb::Prb50,
        NofPrb::Prb75,
        NofPrb::Prb100,
    ];

    pub fn count(&self) -> u16 {
        match self {
            NofPrb::Prb6 => 6,
            NofPrb::Prb15 => 15,
            NofPrb::Prb25 => 25,
            NofPrb::Prb50 => 50,
            NofPrb::Prb75 => 75,
            NofPrb::Prb100 => 100,
        }
    }

    /// OFDM symbol (IDFT/DFT) size used at this bandwidth, per spec 4.2
    pub fn symbol_size(&self) -> usize {
        match self {
            NofPrb::Prb6 => 128,
            NofPrb::Prb15 => 256,
            NofPrb::Prb25 => 512,
            NofPrb::Prb50 => 1024,
            NofPrb::Prb75 => 1536,
            NofPrb::Prb100 => 2048,
        }
    }

    pub fn from_count(count: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.count() == count)
    }

    pub fn num_subcarriers(&self) -> usize {
        self.count() as usize * 12
    }
}

/// Number of cell-specific reference signal antenna ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NofPorts {
    One,
    Two,
    Four,
}

impl NofPorts {
    pub fn count(&self) -> u8 {
        match self {
            NofPorts::One => 1,
            NofPorts::Two => 2,
            NofPorts::Four => 4,
        }
    }

    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(NofPorts::One),
            2 => Some(NofPorts::Two),
            4 => Some(NofPorts::Four),
            _ => None,
        }
    }
}

/// Cyclic prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclicPrefix {
    Normal,
    Extended,
}

impl CyclicPrefix {
    pub fn nof_symbols_per_slot(&self) -> u8 {
        match self {
            CyclicPrefix::Normal => 7,
            CyclicPrefix::Extended => 6,
        }
    }
}

/// Modulation scheme used on a physical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModulationScheme {
    Bpsk,
    Qpsk,
    Qam16,
    Qam64,
}

impl ModulationScheme {
    pub fn bits_per_symbol(&self) -> usize {
        match self {
            ModulationScheme::Bpsk => 1,
            ModulationScheme::Qpsk => 2,
            ModulationScheme::Qam16 => 4,
            ModulationScheme::Qam64 => 6,
        }
    }
}

/// PHICH duration, 36.211 §6.9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhichLength {
    Normal,
    Extended,
}

/// PHICH group density Ng, 36.211 §6.9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhichResources {
    Sixth,
    Half,
    One,
    Two,
}

impl PhichResources {
    pub fn ng(&self) -> f32 {
        match self {
            PhichResources::Sixth => 1.0 / 6.0,
            PhichResources::Half => 0.5,
            PhichResources::One => 1.0,
            PhichResources::Two => 2.0,
        }
    }

    /// Number of PHICH groups per subframe, 36.211 eq. 6.9-1: ceil(Ng * nof_prb / 8)
    pub fn num_groups(&self, nof_prb: &NofPrb) -> usize {
        let raw = self.ng() * nof_prb.count() as f32 / 8.0;
        (raw.ceil() as usize).max(1)
    }
}

/// Immutable cell descriptor, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellConfig {
    pub id: PhysCellId,
    pub nof_prb: NofPrb,
    pub nof_ports: NofPorts,
    pub cp: CyclicPrefix,
}

impl CellConfig {
    pub fn new(id: PhysCellId, nof_prb: NofPrb, nof_ports: NofPorts, cp: CyclicPrefix) -> Self {
        Self {
            id,
            nof_prb,
            nof_ports,
            cp,
        }
    }

    pub fn symbol_sz(&self) -> usize {
        self.nof_prb.symbol_size()
    }

    pub fn nof_symbols_per_slot(&self) -> u8 {
        self.cp.nof_symbols_per_slot()
    }

    pub fn n_id_1(&self) -> u16 {
        self.id.n_id_1()
    }

    pub fn n_id_2(&self) -> u8 {
        self.id.n_id_2()
    }
}

/// Master Information Block contents, per spec §3 and §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mib {
    pub nof_prb: NofPrb,
    pub phich_length: PhichLength,
    pub phich_resources: PhichResources,
    /// 8 MSBs of the system frame number (0..=1023, only top 8 bits carried)
    pub sfn: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pci_group_roundtrip() {
        let pci = PhysCellId::new(167).unwrap();
        assert_eq!(pci.n_id_1(), 55);
        assert_eq!(pci.n_id_2(), 2);
        assert_eq!(PhysCellId::from_group(55, 2).unwrap(), pci);
    }

    #[test]
    fn pci_out_of_range() {
        assert!(PhysCellId::new(504).is_none());
        assert!(PhysCellId::new(503).is_some());
    }

    #[test]
    fn symbol_size_table() {
        assert_eq!(NofPrb::Prb6.symbol_size(), 128);
        assert_eq!(NofPrb::Prb25.symbol_size(), 512);
        assert_eq!(NofPrb::Prb100.symbol_size(), 2048);
    }

    #[test]
    fn phich_group_count() {
        // Ng=1/6, 6 PRB -> ceil(1) = 1
        assert_eq!(PhichResources::Sixth.num_groups(&NofPrb::Prb6), 1);
        // Ng=2, 25 PRB -> ceil(6.25) = 7
        assert_eq!(PhichResources::Two.num_groups(&NofPrb::Prb25), 7);
    }
}
