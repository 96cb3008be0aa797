use crate::capture::Prescaler;
use crate::progress::InputLevels;
use crate::reconstruct::{reconstruct, SampleWidth};
use crate::trigger_config::{DigitalInput, EdgeMode};
use polars::prelude::*;
use std::time::Duration;

const TIMESTAMP_COLUMN_NAME: &str = "timestamp";
const CHANNEL_COLUMN_NAME: &str = "channel";
const TIME_COLUMN_NAME: &str = "time";
const LEVEL_COLUMN_NAME: &str = "level";

/// State of one captured input within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalChannel {
    pub input: DigitalInput,
    pub mode: EdgeMode,
    /// Partition index inside the capture buffer.
    pub channel_index: usize,
    pub prescaler: Prescaler,
    pub width: SampleWidth,
    pub partition_capacity: usize,
    /// Largest expected gap between edges; only used to pick the prescaler.
    pub maximum_time: Duration,
    pub initial_level: bool,
    pub(crate) initial_level_override: Option<bool>,
    /// Raw counter values as fetched, trailing padding included.
    pub raw_ticks: Vec<u32>,
    /// Tick counts after rollover correction.
    pub ticks: Vec<u64>,
    /// Seconds since the counter started.
    pub timestamps: Vec<f64>,
    pub rollovers: usize,
}

impl DigitalChannel {
    pub fn new(
        input: DigitalInput,
        mode: EdgeMode,
        channel_index: usize,
        width: SampleWidth,
        partition_capacity: usize,
    ) -> Self {
        Self {
            input,
            mode,
            channel_index,
            prescaler: Prescaler::Div1,
            width,
            partition_capacity,
            maximum_time: Duration::ZERO,
            initial_level: false,
            initial_level_override: None,
            raw_ticks: Vec::new(),
            ticks: Vec::new(),
            timestamps: Vec::new(),
            rollovers: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.input.as_str()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Store freshly fetched raw ticks and rebuild the timestamps.
    pub fn load_data(&mut self, levels: &InputLevels, raw_ticks: Vec<u32>, clock_hz: f64) {
        self.initial_level = match self.initial_level_override {
            Some(level) => level,
            None => levels.level(self.input).unwrap_or_else(|| {
                log::debug!("No initial level reported for {}, assuming LOW", self.input);
                false
            }),
        };

        let result = reconstruct(&raw_ticks, self.width, clock_hz, self.prescaler);
        self.raw_ticks = raw_ticks;
        self.ticks = result.ticks;
        self.timestamps = result.timestamps;
        self.rollovers = result.rollovers;
    }

    /// Build a plottable logic trace from the timestamps.
    ///
    /// Each recorded edge becomes a vertical step; the trace starts at the
    /// initial level at time zero.
    pub fn generate_axes(&self) -> TimeAxis {
        let mut axis = TimeAxis::default();
        match self.mode {
            EdgeMode::Disabled => axis.push(0.0, self.initial_level),
            EdgeMode::EveryEdge => {
                let mut state = self.initial_level;
                axis.push(0.0, state);
                for &t in &self.timestamps {
                    axis.push(t, state);
                    state = !state;
                    axis.push(t, state);
                }
            }
            EdgeMode::EveryFallingEdge => {
                axis.push(0.0, true);
                for &t in &self.timestamps {
                    axis.push(t, true);
                    axis.push(t, false);
                    axis.push(t, true);
                }
            }
            EdgeMode::EveryRisingEdge
            | EdgeMode::EveryFourthRisingEdge
            | EdgeMode::EverySixteenthRisingEdge => {
                axis.push(0.0, false);
                for &t in &self.timestamps {
                    axis.push(t, false);
                    axis.push(t, true);
                    axis.push(t, false);
                }
            }
        }
        axis
    }

    /// Intervals between consecutive recorded edges, in seconds.
    pub fn intervals(&self) -> Vec<f64> {
        self.timestamps.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let column: Column =
            Series::new(TIMESTAMP_COLUMN_NAME.into(), self.timestamps.as_slice()).into();
        DataFrame::new(vec![column])
    }
}

/// Long-format table of every channel: one row per timestamp.
pub fn channels_to_dataframe(channels: &[DigitalChannel]) -> Result<DataFrame, PolarsError> {
    let names: Vec<&str> = channels
        .iter()
        .flat_map(|c| std::iter::repeat(c.name()).take(c.len()))
        .collect();
    let timestamps: Vec<f64> = channels
        .iter()
        .flat_map(|c| c.timestamps.iter().copied())
        .collect();

    DataFrame::new(vec![
        Series::new(CHANNEL_COLUMN_NAME.into(), names.as_slice()).into(),
        Series::new(TIMESTAMP_COLUMN_NAME.into(), timestamps.as_slice()).into(),
    ])
}

/// Step trace of one channel: paired time and logic level samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeAxis {
    pub time: Vec<f64>,
    pub level: Vec<bool>,
}

impl TimeAxis {
    fn push(&mut self, time: f64, level: bool) {
        self.time.push(time);
        self.level.push(level);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        DataFrame::new(vec![
            Series::new(TIME_COLUMN_NAME.into(), self.time.as_slice()).into(),
            Series::new(LEVEL_COLUMN_NAME.into(), self.level.as_slice()).into(),
        ])
    }
}
