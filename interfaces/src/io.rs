//! Sample source/sink traits and raw-file implementations, per spec §6.
//!
//! Grounded in `original_source/include/io/{filesource,filesink}.h`: LTE
//! test tooling reads/writes raw IQ captures in one of three formats.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_complex::Complex32;

use crate::InterfaceError;

/// Raw IQ sample encoding on disk/wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Interleaved 32-bit float I/Q pairs
    Float32,
    /// Interleaved 16-bit signed integer I/Q pairs
    Short16,
    /// Same layout as `Float32`; kept distinct for call-site intent
    ComplexFloat,
}

impl SampleFormat {
    fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Float32 | SampleFormat::ComplexFloat => 8,
            SampleFormat::Short16 => 4,
        }
    }
}

/// A synchronous source of baseband IQ samples.
pub trait SampleSource {
    /// Fill `buf` completely, or return `Err(InterfaceError::Eof)` if fewer
    /// than `buf.len()` samples remain.
    fn read_samples(&mut self, buf: &mut [Complex32]) -> Result<(), InterfaceError>;
}

/// A synchronous sink for baseband IQ samples.
pub trait SampleSink {
    fn write_samples(&mut self, samples: &[Complex32]) -> Result<(), InterfaceError>;
}

pub struct FileSampleSource {
    reader: BufReader<File>,
    format: SampleFormat,
}

impl FileSampleSource {
    pub fn open<P: AsRef<Path>>(path: P, format: SampleFormat) -> Result<Self, InterfaceError> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            format,
        })
    }
}

impl SampleSource for FileSampleSource {
    fn read_samples(&mut self, buf: &mut [Complex32]) -> Result<(), InterfaceError> {
        for slot in buf.iter_mut() {
            let (re, im) = match self.format {
                SampleFormat::Float32 | SampleFormat::ComplexFloat => {
                    let re = self.reader.read_f32::<LittleEndian>().map_err(eof_or_io)?;
                    let im = self.reader.read_f32::<LittleEndian>().map_err(eof_or_io)?;
                    (re, im)
                }
                SampleFormat::Short16 => {
                    let re = self.reader.read_i16::<LittleEndian>().map_err(eof_or_io)?;
                    let im = self.reader.read_i16::<LittleEndian>().map_err(eof_or_io)?;
                    (re as f32 / 32768.0, im as f32 / 32768.0)
                }
            };
            *slot = Complex32::new(re, im);
        }
        Ok(())
    }
}

pub struct FileSampleSink {
    writer: BufWriter<File>,
    format: SampleFormat,
}

impl FileSampleSink {
    pub fn create<P: AsRef<Path>>(path: P, format: SampleFormat) -> Result<Self, InterfaceError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            format,
        })
    }
}

impl SampleSink for FileSampleSink {
    fn write_samples(&mut self, samples: &[Complex32]) -> Result<(), InterfaceError> {
        for s in samples {
            match self.format {
                SampleFormat::Float32 | SampleFormat::ComplexFloat => {
                    self.writer.write_f32::<LittleEndian>(s.re)?;
                    self.writer.write_f32::<LittleEndian>(s.im)?;
                }
                SampleFormat::Short16 => {
                    self.writer
                        .write_i16::<LittleEndian>((s.re * 32768.0) as i16)?;
                    self.writer
                        .write_i16::<LittleEndian>((s.im * 32768.0) as i16)?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn eof_or_io(e: std::io::Error) -> InterfaceError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        InterfaceError::Eof
    } else {
        InterfaceError::Io(e)
    }
}
