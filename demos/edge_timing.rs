// Edge timing example
//
// Uses the one-shot timer and the derived measurements on a periodic
// signal, e.g. SQR1 wired to the measured input, or a light barrier.

use clap::Parser;
use logicstamp_rs::{
    DigitalInput, EdgeTimingRequest, LogicAnalyzer, PulseLevel, TimerEdge, TransportConfig,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "edge_timing")]
#[command(version = "1.0")]
#[command(about = "Measure periods, pulse widths and intervals on a digital input")]
struct Args {
    /// Serial port of the instrument
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Input carrying the signal
    #[arg(short, long, default_value = "ID1")]
    input: String,

    /// Timeout per measurement in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout: u64,

    /// Skip this many edges when measuring the rising edge interval
    #[arg(short, long, default_value_t = 0)]
    skip: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_result(label: &str, value: Option<f64>, unit: &str) {
    match value {
        Some(v) => println!("   {:<24} {:.9} {}", label, v, unit),
        None => println!("   {:<24} timed out", label),
    }
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

    let input: DigitalInput = args.input.parse()?;
    let timeout = Duration::from_millis(args.timeout);

    println!("Logic Analyzer Edge Timing");
    println!("==========================");
    println!("Port: {}", args.port);
    println!("Input: {}\n", input);

    let mut la = LogicAnalyzer::connect(&TransportConfig::new(&args.port))?;

    println!("1. Four consecutive rising edges");
    let request = EdgeTimingRequest::new(input, input)
        .edges(TimerEdge::Rising, TimerEdge::Falling)
        .points(4, 4)
        .timeout(timeout);
    match la.measure_edges(&request)? {
        Some(times) => {
            println!("   rising:  {:?}", times.first);
            println!("   falling: {:?}", times.second);
        }
        None => println!("   timed out"),
    }

    println!("\n2. Derived measurements");
    print_result("frequency", la.frequency(input, timeout)?, "Hz");
    match la.duty_cycle(input, timeout)? {
        Some((period, duty)) => {
            println!("   {:<24} {:.9} s", "period", period);
            println!("   {:<24} {:.1} %", "duty cycle", duty * 100.0);
        }
        None => println!("   {:<24} timed out", "duty cycle"),
    }
    print_result(
        "high pulse",
        la.pulse_time(input, PulseLevel::High, timeout)?,
        "s",
    );
    print_result(
        "low pulse",
        la.pulse_time(input, PulseLevel::Low, timeout)?,
        "s",
    );

    println!("\n3. Streaming edge interval");
    print_result(
        "rising edge interval",
        la.rising_edge_interval(input, args.skip, timeout)?,
        "s",
    );

    Ok(())
}
