use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::fs;
use std::sync::Arc;

use synchroframe_core::bpa_pdcstream::BpaPdcStreamCodec;
use synchroframe_core::channel::frame::ConfigurationFrame;
use synchroframe_core::channel::parser::{ProtocolCodec, StreamParser};
use synchroframe_core::fnet::FnetCodec;
use synchroframe_core::ieee_1344::Ieee1344Codec;
use synchroframe_core::ieee_c37_118::codec::C37Codec;
use synchroframe_core::ieee_c37_118::common::{FrameKind, Version};
use synchroframe_core::ieee_c37_118::config::encode_configuration;
use synchroframe_core::ieee_c37_118::data::encode_data;
use synchroframe_core::ieee_c37_118::random::{random_configuration, random_data};

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "sframe")]
#[command(about = "Generate and inspect synchrophasor capture files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    C37118,
    Ieee1344,
    BpaPdcstream,
    Fnet,
}

impl ProtocolArg {
    fn codec(&self) -> Box<dyn ProtocolCodec> {
        match self {
            ProtocolArg::C37118 => Box::new(C37Codec::default()),
            ProtocolArg::Ieee1344 => Box::new(Ieee1344Codec::new()),
            ProtocolArg::BpaPdcstream => Box::new(BpaPdcStreamCodec::new()),
            ProtocolArg::Fnet => Box::new(FnetCodec::new()),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a C37.118 capture file: one configuration frame followed by a
    /// run of random data frames
    Gen {
        #[arg(long, default_value = "capture.bin")]
        output: String,

        #[arg(long, default_value_t = 60)]
        frames: usize,

        #[arg(long, default_value_t = 2)]
        num_pmus: usize,

        #[arg(long, default_value_t = 7734)]
        idcode: u16,
    },
    /// Parse a capture file through the streaming parser and print every
    /// frame it delivers
    Dump {
        #[arg(long)]
        input: String,

        #[arg(long, value_enum, default_value = "c37118")]
        protocol: ProtocolArg,

        /// Feed the parser in chunks of this many bytes, as a transport
        /// would
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,

        /// Print configuration frames as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn generate(output: &str, frames: usize, num_pmus: usize, idcode: u16) -> Result<(), Box<dyn Error>> {
    let mut rng = rand::rng();
    let configuration = Arc::new(random_configuration(&mut rng, idcode, num_pmus)?);
    let mut capture = encode_configuration(&configuration, Version::V2011, FrameKind::Config2)?;
    for _ in 0..frames {
        let data = random_data(&mut rng, &configuration)?;
        capture.extend_from_slice(&encode_data(&data, Version::V2011)?);
    }
    fs::write(output, &capture)?;
    log::info!(
        "Wrote {} data frames ({} bytes) to {}",
        frames,
        capture.len(),
        output
    );
    Ok(())
}

fn print_configuration(configuration: &ConfigurationFrame, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", configuration.to_json()?);
        return Ok(());
    }
    println!(
        "configuration frame: id {} at {} frames/sec, {} cells",
        configuration.id_code(),
        configuration.frame_rate(),
        configuration.cells.len()
    );
    for cell in configuration.cells.iter() {
        println!(
            "  {} ({}): {} phasors, {} analogs, {} digitals, {}",
            cell.station_name(),
            cell.id_code(),
            cell.phasor_definitions.len(),
            cell.analog_definitions.len(),
            cell.digital_definitions.len(),
            cell.nominal_frequency()
        );
    }
    Ok(())
}

fn dump(
    input: &str,
    protocol: ProtocolArg,
    chunk_size: usize,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let capture = fs::read(input)?;
    let (mut parser, channels) = StreamParser::new(protocol.codec());
    for chunk in capture.chunks(chunk_size.max(1)) {
        parser.write(chunk);
    }

    while let Ok(configuration) = channels.configuration_frames.try_recv() {
        print_configuration(&configuration, json)?;
    }
    let mut data_frames = 0usize;
    while let Ok(frame) = channels.data_frames.try_recv() {
        data_frames += 1;
        if let (Some(cell), Some(configuration_cell)) =
            (frame.cells.get(0), frame.configuration.cells.get(0))
        {
            let timestamp = frame.ticks.to_datetime().format("%Y-%m-%d %H:%M:%S%.6f");
            println!(
                "data frame at {}: {} measurements from {}",
                timestamp,
                cell.measurements(configuration_cell).len(),
                configuration_cell.station_name()
            );
        }
    }
    while let Ok(frame) = channels.header_frames.try_recv() {
        println!("header frame: {}", frame.header_data());
    }
    while let Ok(frame) = channels.command_frames.try_recv() {
        println!("command frame: {}", frame.command);
    }
    while let Ok(bytes) = channels.undetermined_frames.try_recv() {
        println!("undetermined frame of {} bytes", bytes.len());
    }
    while let Ok(error) = channels.stream_errors.try_recv() {
        println!("stream error: {}", error);
    }

    println!();
    println!("{} data frames total", data_frames);
    print!("{}", parser.status());
    parser.stop();
    Ok(())
}

fn main() {
    // Initialize logging early to ensure all log messages are captured
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let result = match args.command {
        Commands::Gen {
            output,
            frames,
            num_pmus,
            idcode,
        } => generate(&output, frames, num_pmus, idcode),
        Commands::Dump {
            input,
            protocol,
            chunk_size,
            json,
        } => dump(&input, protocol, chunk_size, json),
    };

    if let Err(error) = result {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}
