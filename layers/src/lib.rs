//! LTE PHY Core
//!
//! Implements the physical-layer signal-processing chain of an LTE downlink
//! receiver/transmitter per 3GPP TS 36.211/36.212/36.213: cell search,
//! OFDM modulation, reference-signal channel estimation, MIMO diversity,
//! channel coding and the control/shared-channel pipelines.
//!
//! The entire `phy` module is synchronous: no `async fn`, no suspension
//! points. Real-time I/O and scheduling belong to a driver built on top of
//! this crate, not inside it.

pub mod phy;

use thiserror::Error;

/// Errors raised by the PHY core.
#[derive(Error, Debug)]
pub enum PhyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type PhyResult<T> = Result<T, PhyError>;
