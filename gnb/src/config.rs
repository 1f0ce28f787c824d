//! TOML configuration for the `albor_lte_phy` CLI driver.
//!
//! Scoped to what the driver needs to build a `CellConfig` and pick sample
//! formats; nothing here is part of the PHY core itself.

use serde::{Deserialize, Serialize};

use common::{CellConfig, CyclicPrefix, Mib, NofPorts, NofPrb, PhichLength, PhichResources, PhysCellId};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellFileConfig {
    pub pci: u16,
    pub nof_prb: u16,
    pub nof_ports: u8,
    #[serde(default)]
    pub extended_cp: bool,
    #[serde(default = "default_phich_length")]
    pub phich_length: String,
    #[serde(default = "default_phich_resources")]
    pub phich_resources: String,
}

fn default_phich_length() -> String {
    "normal".to_string()
}

fn default_phich_resources() -> String {
    "one".to_string()
}

impl CellFileConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: CellFileConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_cell_config(&self) -> anyhow::Result<CellConfig> {
        let id = PhysCellId::new(self.pci).ok_or_else(|| anyhow::anyhow!("invalid PCI {}", self.pci))?;
        let nof_prb = NofPrb::from_count(self.nof_prb)
            .ok_or_else(|| anyhow::anyhow!("invalid nof_prb {}", self.nof_prb))?;
        let nof_ports =
            NofPorts::from_count(self.nof_ports).ok_or_else(|| anyhow::anyhow!("invalid nof_ports {}", self.nof_ports))?;
        let cp = if self.extended_cp {
            CyclicPrefix::Extended
        } else {
            CyclicPrefix::Normal
        };
        Ok(CellConfig::new(id, nof_prb, nof_ports, cp))
    }

    pub fn phich_length(&self) -> anyhow::Result<PhichLength> {
        match self.phich_length.as_str() {
            "normal" => Ok(PhichLength::Normal),
            "extended" => Ok(PhichLength::Extended),
            other => Err(anyhow::anyhow!("invalid phich_length {}", other)),
        }
    }

    pub fn phich_resources(&self) -> anyhow::Result<PhichResources> {
        match self.phich_resources.as_str() {
            "sixth" => Ok(PhichResources::Sixth),
            "half" => Ok(PhichResources::Half),
            "one" => Ok(PhichResources::One),
            "two" => Ok(PhichResources::Two),
            other => Err(anyhow::anyhow!("invalid phich_resources {}", other)),
        }
    }

    pub fn to_mib(&self, sfn: u16) -> anyhow::Result<Mib> {
        Ok(Mib {
            nof_prb: NofPrb::from_count(self.nof_prb)
                .ok_or_else(|| anyhow::anyhow!("invalid nof_prb {}", self.nof_prb))?,
            phich_length: self.phich_length()?,
            phich_resources: self.phich_resources()?,
            sfn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
            pci = 42
            nof_prb = 25
            nof_ports = 2
        "#;
        let config: CellFileConfig = toml::from_str(toml_str).unwrap();
        let cell = config.to_cell_config().unwrap();
        assert_eq!(cell.id.value(), 42);
        assert_eq!(cell.nof_prb, NofPrb::Prb25);
        assert_eq!(cell.nof_ports, NofPorts::Two);
        assert_eq!(cell.cp, CyclicPrefix::Normal);
    }
}
