//! Sample Stream I/O Adapters
//!
//! Thin, synchronous adapters between a raw IQ sample stream (file or other
//! byte source) and the PHY core's `Complex32` buffers.

pub mod io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of stream")]
    Eof,

    #[error("invalid sample format: {0}")]
    InvalidFormat(String),
}
