//! # LogicStamp RS
//!
//! A Rust library for capturing edge timestamps with the logic analyzer and
//! timer engine of PSLab-style measurement instruments.
//!
//! The device timestamps rising and/or falling edges on up to four digital
//! inputs into a shared on-board buffer. This library arms those captures,
//! polls their progress, fetches the raw counter values and turns them into
//! monotonic timestamps in seconds, correcting for counter rollover.
//!
//! ## Features
//!
//! - **Streaming captures**: one to four channels with per-channel edge modes and triggers
//! - **Rollover correction**: 16- and 32-bit counter values become monotonic timestamps
//! - **Bounded edge timing**: up to four timestamps on each of two inputs in one shot
//! - **Derived measurements**: frequency, duty cycle, pulse width and edge intervals
//! - **DataFrame output**: Uses `polars` for timestamps and plottable logic traces
//! - **Type safety**: Strong typing and error handling throughout
//!
//! ## Examples
//!
//! ### Capturing Edges on Two Inputs
//!
//! ```rust,no_run
//! use logicstamp_rs::{CaptureConfig, DigitalInput, EdgeMode, LogicAnalyzer, TransportConfig};
//! use std::time::Duration;
//!
//! let mut la = LogicAnalyzer::connect(&TransportConfig::new("/dev/ttyACM0"))?;
//!
//! let config = CaptureConfig::two_channels(
//!     [DigitalInput::Id1, DigitalInput::Id2],
//!     [EdgeMode::EveryRisingEdge, EdgeMode::EveryEdge],
//! );
//! let mut session = la.arm(&config)?;
//! std::thread::sleep(Duration::from_millis(100));
//! la.fetch_channels(&mut session)?;
//!
//! for channel in session.channels() {
//!     println!("{}: {} edges", channel.name(), channel.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Triggers
//!
//! ```rust
//! use logicstamp_rs::{CaptureConfig, DigitalInput, EdgeMode, TriggerSpec};
//!
//! let trigger = TriggerSpec::start_capturing_when(DigitalInput::Id1)
//!     .or(DigitalInput::Id2)
//!     .falls();
//!
//! let config = CaptureConfig::four_channels([EdgeMode::EveryEdge; 4]).with_trigger(trigger);
//! assert_eq!(config.inputs().len(), 4);
//! ```
//!
//! ### Timing Edges
//!
//! ```rust,no_run
//! use logicstamp_rs::{DigitalInput, EdgeTimingRequest, LogicAnalyzer, TimerEdge, TransportConfig};
//! use std::time::Duration;
//!
//! let mut la = LogicAnalyzer::connect(&TransportConfig::default())?;
//!
//! let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
//!     .edges(TimerEdge::Rising, TimerEdge::Rising)
//!     .points(1, 1)
//!     .timeout(Duration::from_secs(1));
//!
//! match la.measure_edges(&request)? {
//!     Some(times) => println!("ID2 fired {} s after ID1", times.second[0]),
//!     None => println!("No edges within the timeout"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Open a Tracy zone for the rest of the enclosing block when the
/// `cpu-profiling` feature is on.
macro_rules! profile_scope {
    ($name:literal) => {
        #[cfg(feature = "cpu-profiling")]
        let _profile_span = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!($name), 0));
    };
}

pub mod analyzer;
pub mod capture;
pub mod digital_channel;
pub mod digital_io;
pub mod edges;
pub mod fetch;
pub mod frequency;
pub mod interval;
pub mod poll;
pub mod progress;
pub mod protocol;
pub mod reconstruct;
pub mod transport;
pub mod trigger_config;

// Re-export the main types for convenience
pub use analyzer::{CaptureError, LogicAnalyzer};

pub use capture::{CaptureConfig, CaptureConfigError, CaptureSession, ChannelCount, Prescaler};

pub use digital_channel::{channels_to_dataframe, DigitalChannel, TimeAxis};

pub use digital_io::{DigitalOutput, OutputStates};

pub use interval::{EdgeTimes, EdgeTimingRequest, PulseLevel};

pub use poll::PollSchedule;

pub use progress::{CaptureProgress, InputLevels};

pub use protocol::DeviceConstants;

pub use reconstruct::{reconstruct, Reconstruction, SampleWidth};

pub use transport::{ByteOrder, SerialTransport, Transport, TransportConfig, TransportError};

pub use trigger_config::{DigitalInput, EdgeMode, TimerEdge, TriggerPolarity, TriggerSpec};
