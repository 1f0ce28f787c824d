//! LTE PHY signal-processing core.
//!
//! Submodules map directly onto the component table of the design: numeric
//! primitives at the bottom, channel coding and control/shared channels at
//! the top. Every function here is synchronous.

pub mod primitives;

pub mod ofdm;
pub mod refsignal;
pub mod sync;

pub mod modem;
pub mod mimo;
pub mod regs;
pub mod resource_grid;
pub mod scrambling;

pub mod convcode;
pub mod turbo;

pub mod dci;
pub mod pbch;
pub mod pcfich;
pub mod phich;
pub mod pdcch;
pub mod pdsch;

pub use common::{CellConfig, CyclicPrefix, Mib, ModulationScheme, NofPorts, NofPrb, PhichLength, PhichResources, PhysCellId, Rnti};
