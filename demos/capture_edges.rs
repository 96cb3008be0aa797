// Streaming edge capture example
//
// Arms a one- to four-channel capture, lets it run, fetches every channel
// and prints (or saves) the reconstructed timestamps.

use clap::Parser;
use logicstamp_rs::{
    channels_to_dataframe, CaptureConfig, DigitalInput, EdgeMode, LogicAnalyzer, TransportConfig,
    TriggerSpec,
};
use polars::prelude::*;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "capture_edges")]
#[command(version = "1.0")]
#[command(about = "Timestamp digital edges with the logic analyzer")]
struct Args {
    /// Serial port of the instrument
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Number of channels to capture
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    channels: u8,

    /// Edge mode code: 1 every edge, 2 falling, 3 rising, 4 every 4th rising, 5 every 16th rising
    #[arg(short, long, default_value_t = 1)]
    mode: u8,

    /// First input for one- and two-channel captures
    #[arg(short, long, default_value = "ID1")]
    input: String,

    /// Trigger on a rising edge of this input before capturing
    #[arg(short, long)]
    trigger: Option<String>,

    /// Capture duration in milliseconds
    #[arg(short, long, default_value_t = 200)]
    duration: u64,

    /// Write timestamps to this CSV file instead of printing them
    #[arg(short, long)]
    output: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let mode = EdgeMode::try_from(args.mode)?;
    let input: DigitalInput = args.input.parse()?;

    let mut config = match args.channels {
        1 => CaptureConfig::one_channel(input, mode),
        2 => CaptureConfig::two_channels([input, DigitalInput::Id2], [mode; 2]),
        3 => CaptureConfig::three_channels([mode; 3]),
        _ => CaptureConfig::four_channels([mode; 4])
            .with_maximum_time(Duration::from_millis(args.duration)),
    };
    if let Some(source) = &args.trigger {
        config = config.with_trigger(TriggerSpec::start_capturing_when(source.parse()?).rises());
    }

    println!("Logic Analyzer Edge Capture");
    println!("===========================");
    println!("Port: {}", args.port);
    println!("Inputs: {:?}", config.inputs());
    println!("Mode: {:?}\n", mode);

    let mut la = LogicAnalyzer::connect(&TransportConfig::new(&args.port))?;
    let mut session = la.arm(&config)?;
    println!("✓ Armed, capturing for {} ms", args.duration);

    std::thread::sleep(Duration::from_millis(args.duration));
    let progress = la.fetch_channels(&mut session)?;
    la.stop()?;

    for channel in session.channels() {
        println!(
            "{}: {} edges, {} rollovers, starts {}",
            channel.name(),
            channel.len(),
            channel.rollovers,
            if channel.initial_level { "HIGH" } else { "LOW" }
        );
    }
    log::debug!("Fill counts {:?}", progress.fill_counts);

    let mut df = channels_to_dataframe(session.channels())?;
    match &args.output {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            CsvWriter::new(&mut file).finish(&mut df)?;
            println!("\n✓ Wrote {} timestamps to {}", df.height(), path);
        }
        None => println!("\n{}", df),
    }

    Ok(())
}
