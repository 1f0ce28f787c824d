//! LTE PHY CLI driver.
//!
//! A thin synchronous wrapper around `layers::phy`: reads an IQ capture
//! through `interfaces::io::SampleSource`, runs cell search and downlink
//! decode, and (in `tx` mode) synthesizes a reference downlink subframe
//! carrying the MIB. Out of scope per the PHY core's own spec; kept as the
//! example consumer of the library the way the original gNodeB binary was.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::CyclicPrefix;
use interfaces::io::{FileSampleSink, FileSampleSource, SampleFormat, SampleSink, SampleSource};
use layers::phy::ofdm::{self, OfdmDemodulator, OfdmModulator};
use layers::phy::pbch::{self, PbchReceiver};
use layers::phy::pcfich;
use layers::phy::regs::RegTable;
use layers::phy::resource_grid::ResourceGrid;
use layers::phy::sync::{DetectionMode, SyncState, Synchronizer};

use config::CellFileConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "LTE downlink PHY cell search and decode driver")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search an IQ capture for a cell, acquire PSS/SSS and decode the MIB.
    Scan {
        /// Path to the raw IQ capture file
        #[arg(long)]
        input: String,

        /// Sample format of the capture: float32, short16
        #[arg(long, default_value = "float32")]
        format: String,

        /// OFDM symbol size (must match the cell's bandwidth hypothesis)
        #[arg(long, default_value = "512")]
        symbol_size: usize,
    },

    /// Synthesize one frame's worth of downlink samples carrying the MIB
    /// for the cell described by a TOML config file.
    Tx {
        /// Path to the cell TOML config
        #[arg(long)]
        cell: String,

        /// Path to write the raw IQ capture
        #[arg(long)]
        output: String,

        /// Sample format to write: float32, short16
        #[arg(long, default_value = "float32")]
        format: String,

        /// System frame number carried in the MIB
        #[arg(long, default_value = "0")]
        sfn: u16,
    },
}

fn parse_format(s: &str) -> Result<SampleFormat> {
    match s {
        "float32" => Ok(SampleFormat::Float32),
        "short16" => Ok(SampleFormat::Short16),
        other => anyhow::bail!("unknown sample format '{other}'"),
    }
}

fn run_scan(input: &str, format: &str, symbol_size: usize) -> Result<()> {
    let format = parse_format(format)?;
    let mut source = FileSampleSource::open(input, format).context("opening IQ capture")?;

    let mut sync = Synchronizer::new(50);
    let window_len = symbol_size * 16;
    let mut window = vec![num_complex::Complex32::new(0.0, 0.0); window_len];

    loop {
        if source.read_samples(&mut window).is_err() {
            warn!("end of capture reached before sync completed");
            return Ok(());
        }

        let Some(result) = sync.search(&window, DetectionMode::PeakToAverage(2.0), symbol_size) else {
            continue;
        };

        info!(
            cell_id = result.cell_id,
            n_id_1 = result.n_id_1,
            n_id_2 = result.n_id_2,
            cfo = result.cfo,
            cp = ?result.cp,
            "physical-layer cell ID acquired"
        );

        if sync.state() == SyncState::Track {
            info!("synchronizer locked (TRACK)");
            attempt_mib_decode(&mut source, result.cell_id, result.cp, symbol_size)?;
            return Ok(());
        }
    }
}

fn attempt_mib_decode(
    source: &mut FileSampleSource,
    cell_id: u16,
    cp: CyclicPrefix,
    symbol_size: usize,
) -> Result<()> {
    let nof_prb = match symbol_size {
        128 => common::NofPrb::Prb6,
        256 => common::NofPrb::Prb15,
        512 => common::NofPrb::Prb25,
        1024 => common::NofPrb::Prb50,
        1536 => common::NofPrb::Prb75,
        2048 => common::NofPrb::Prb100,
        _ => anyhow::bail!("unsupported symbol size {symbol_size}"),
    };
    let pci = common::PhysCellId::new(cell_id).context("invalid cell id from sync")?;
    // Port count is unknown until PBCH decodes; the probe cell's port count
    // doesn't affect PBCH's RE layout, since it reserves REs for all 4
    // hypothetical ports regardless.
    let probe_cell = common::CellConfig::new(pci, nof_prb, common::NofPorts::One, cp);

    let subframe_len = ofdm::subframe_length(&probe_cell);
    let mut demod = OfdmDemodulator::new();
    let mut receiver = PbchReceiver::new();

    for frame in 0..4 {
        let mut samples = vec![num_complex::Complex32::new(0.0, 0.0); subframe_len];
        if source.read_samples(&mut samples).is_err() {
            warn!("end of capture before MIB decode completed");
            return Ok(());
        }
        let grid = demod.demodulate(&probe_cell, &samples)?;
        receiver.add_frame(&probe_cell, &grid);
        info!(frame, "accumulated subframe for PBCH combining");
    }

    match receiver.try_decode(cell_id, cp) {
        Some((mib, nof_ports)) => {
            info!(
                nof_prb = mib.nof_prb.count(),
                sfn = mib.sfn,
                nof_ports = nof_ports.count(),
                "MIB decoded"
            );
        }
        None => warn!("PBCH decode failed"),
    }
    Ok(())
}

fn run_tx(cell_path: &str, output: &str, format: &str, sfn: u16) -> Result<()> {
    let format = parse_format(format)?;
    let cell_config = CellFileConfig::load(cell_path).context("loading cell config")?;
    let cell = cell_config.to_cell_config()?;
    let mib = cell_config.to_mib(sfn)?;

    let reg_table = RegTable::new(&cell);
    let mut grid = ResourceGrid::new(&cell);

    let coded = pbch::encode(&mib, cell.nof_ports, cell.id.value(), cell.cp);
    pbch::map_to_grid(&cell, &coded, 0, &mut grid)?;

    let cfi = 1u8;
    pcfich::map_to_grid(&cell, &reg_table, cfi, 0, &mut grid)?;

    let mut modulator = OfdmModulator::new();
    let samples = modulator.modulate(&cell, &grid)?;

    let mut sink = FileSampleSink::create(output, format).context("creating output capture")?;
    sink.write_samples(&samples)?;

    info!(
        pci = cell.id.value(),
        nof_prb = cell.nof_prb.count(),
        sfn,
        samples = samples.len(),
        "wrote synthesized subframe"
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(env_filter).with_target(true).init();

    match args.command {
        Command::Scan {
            input,
            format,
            symbol_size,
        } => run_scan(&input, &format, symbol_size),
        Command::Tx {
            cell,
            output,
            format,
            sfn,
        } => run_tx(&cell, &output, &format, sfn),
    }
}
