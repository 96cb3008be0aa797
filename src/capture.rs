use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::digital_channel::DigitalChannel;
use crate::protocol::{common, group, timing, DeviceConstants};
use crate::reconstruct::SampleWidth;
use crate::transport::Transport;
use crate::trigger_config::{DigitalInput, EdgeMode, TriggerPolarity, TriggerSpec};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CaptureConfigError {
    #[error("Unknown digital channel '{name}'")]
    UnknownChannel { name: String },

    #[error("Invalid edge mode code {code} (expected 0..=5)")]
    InvalidEdgeMode { code: u8 },

    #[error("Input {input} cannot be routed in the {channels}-channel capture mode")]
    UnroutableInput { input: DigitalInput, channels: usize },
}

/// Reference clock divider of the four-channel counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prescaler {
    #[default]
    Div1,
    Div8,
    Div64,
    Div256,
}

impl Prescaler {
    pub const ALL: [Prescaler; 4] = [
        Prescaler::Div1,
        Prescaler::Div8,
        Prescaler::Div64,
        Prescaler::Div256,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Prescaler::Div1 => 0,
            Prescaler::Div8 => 1,
            Prescaler::Div64 => 2,
            Prescaler::Div256 => 3,
        }
    }

    pub fn divisor(&self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
        }
    }

    /// Longest interval a counter of `width` can represent at this divider.
    pub fn max_interval(&self, width: SampleWidth, clock_hz: f64) -> Duration {
        Duration::from_secs_f64(width.range() as f64 * f64::from(self.divisor()) / clock_hz)
    }

    /// Smallest divider whose counter range still covers `maximum_time`.
    ///
    /// Gaps beyond the largest divider's range are only known modulo that
    /// range; the largest divider is used and a warning logged.
    pub fn for_maximum_interval(
        maximum_time: Duration,
        width: SampleWidth,
        clock_hz: f64,
    ) -> Prescaler {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.max_interval(width, clock_hz) >= maximum_time)
            .unwrap_or_else(|| {
                log::warn!(
                    "Maximum interval {:?} exceeds the counter range; intervals above {:?} wrap. \
                     Use the one or two channel modes for long intervals",
                    maximum_time,
                    Prescaler::Div256.max_interval(width, clock_hz)
                );
                Prescaler::Div256
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCount {
    One,
    Two,
    Three,
    Four,
}

impl ChannelCount {
    pub fn get(&self) -> usize {
        match self {
            ChannelCount::One => 1,
            ChannelCount::Two => 2,
            ChannelCount::Three => 3,
            ChannelCount::Four => 4,
        }
    }

    /// Counter width the firmware uses in this mode.
    pub fn sample_width(&self) -> SampleWidth {
        match self {
            ChannelCount::One | ChannelCount::Two => SampleWidth::Bits32,
            ChannelCount::Three | ChannelCount::Four => SampleWidth::Bits16,
        }
    }

    fn command(&self) -> u8 {
        match self {
            ChannelCount::One => timing::START_ALTERNATE_ONE_CHAN_LA,
            ChannelCount::Two => timing::START_TWO_CHAN_LA,
            ChannelCount::Three => timing::START_THREE_CHAN_LA,
            ChannelCount::Four => timing::START_FOUR_CHAN_LA,
        }
    }

    fn default_maximum_time(&self) -> Duration {
        match self {
            // full range of the 32-bit counter at 64 MHz
            ChannelCount::One | ChannelCount::Two => Duration::from_secs(67),
            ChannelCount::Three | ChannelCount::Four => Duration::from_millis(1),
        }
    }
}

/// A capture request: which inputs to timestamp, how, and when to start.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    count: ChannelCount,
    inputs: Vec<DigitalInput>,
    modes: Vec<EdgeMode>,
    trigger: TriggerSpec,
    maximum_time: Duration,
}

impl CaptureConfig {
    fn new(count: ChannelCount, inputs: Vec<DigitalInput>, modes: Vec<EdgeMode>) -> Self {
        Self {
            count,
            inputs,
            modes,
            trigger: TriggerSpec::disabled(),
            maximum_time: count.default_maximum_time(),
        }
    }

    /// Single input, 32-bit timestamps.
    pub fn one_channel(input: DigitalInput, mode: EdgeMode) -> Self {
        Self::new(ChannelCount::One, vec![input], vec![mode])
    }

    /// Two arbitrary inputs, 32-bit timestamps.
    pub fn two_channels(inputs: [DigitalInput; 2], modes: [EdgeMode; 2]) -> Self {
        Self::new(ChannelCount::Two, inputs.to_vec(), modes.to_vec())
    }

    /// ID1..ID3 with 16-bit timestamps; consecutive edges must be less than
    /// one counter range apart.
    pub fn three_channels(modes: [EdgeMode; 3]) -> Self {
        let inputs = vec![DigitalInput::Id1, DigitalInput::Id2, DigitalInput::Id3];
        Self::new(ChannelCount::Three, inputs, modes.to_vec())
    }

    /// ID1..ID4 with 16-bit timestamps and a prescaler chosen from
    /// [`CaptureConfig::with_maximum_time`].
    pub fn four_channels(modes: [EdgeMode; 4]) -> Self {
        let inputs = vec![
            DigitalInput::Id1,
            DigitalInput::Id2,
            DigitalInput::Id3,
            DigitalInput::Id4,
        ];
        Self::new(ChannelCount::Four, inputs, modes.to_vec())
    }

    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger = trigger;
        self
    }

    /// Largest gap expected between two consecutive edges.
    pub fn with_maximum_time(mut self, maximum_time: Duration) -> Self {
        self.maximum_time = maximum_time;
        self
    }

    pub fn channel_count(&self) -> ChannelCount {
        self.count
    }

    pub fn inputs(&self) -> &[DigitalInput] {
        &self.inputs
    }

    pub fn modes(&self) -> &[EdgeMode] {
        &self.modes
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    pub fn maximum_time(&self) -> Duration {
        self.maximum_time
    }

    pub fn sample_width(&self) -> SampleWidth {
        self.count.sample_width()
    }

    /// Prescaler needed to cover `maximum_time`; only the four-channel
    /// counters are divided.
    pub fn prescaler(&self, clock_hz: f64) -> Prescaler {
        match self.count {
            ChannelCount::Four => {
                Prescaler::for_maximum_interval(self.maximum_time, SampleWidth::Bits16, clock_hz)
            }
            _ => Prescaler::Div1,
        }
    }

    fn validate(&self) -> Result<(), CaptureConfigError> {
        if self.count == ChannelCount::Four && self.trigger.is_active() {
            if let Some(input) = self
                .trigger
                .sources
                .iter()
                .copied()
                .find(|s| !matches!(s, DigitalInput::Id1 | DigitalInput::Id2 | DigitalInput::Id3))
            {
                return Err(CaptureConfigError::UnroutableInput { input, channels: 4 });
            }
        }
        Ok(())
    }

    fn trigger_byte(&self) -> u8 {
        match self.count {
            ChannelCount::One | ChannelCount::Three => self.trigger.mode_byte(),
            ChannelCount::Two => {
                if !self.trigger.is_active() {
                    return 0;
                }
                let source = self.trigger.primary_source().unwrap_or(self.inputs[0]);
                let falling = u8::from(self.trigger.polarity == TriggerPolarity::Falling);
                1 | (falling << 1) | (source.index() << 4)
            }
            ChannelCount::Four => {
                if !self.trigger.enabled {
                    return 0;
                }
                let mut byte = 1u8;
                if self.trigger.polarity == TriggerPolarity::Rising {
                    byte |= 2;
                }
                let mut sources = 0u8;
                for source in &self.trigger.sources {
                    sources |= 1 << (source.index() + 2);
                }
                if sources == 0 {
                    sources = 1 << 2;
                }
                byte | sources
            }
        }
    }

    fn packed_modes(&self) -> u16 {
        self.modes
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, mode)| acc | (u16::from(mode.code()) << (4 * i)))
    }
}

/// The armed configuration and the per-channel state it owns.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub(crate) generation: u64,
    count: ChannelCount,
    width: SampleWidth,
    prescaler: Prescaler,
    trigger: TriggerSpec,
    partition_capacity: usize,
    pub(crate) channels: Vec<DigitalChannel>,
    /// Last fill count seen per buffer slot, to tell "empty" from "full".
    pub(crate) last_fill: [usize; DeviceConstants::SLOTS],
}

impl CaptureSession {
    pub fn channel_count(&self) -> ChannelCount {
        self.count
    }

    pub fn sample_width(&self) -> SampleWidth {
        self.width
    }

    pub fn prescaler(&self) -> Prescaler {
        self.prescaler
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    pub fn partition_capacity(&self) -> usize {
        self.partition_capacity
    }

    pub fn channels(&self) -> &[DigitalChannel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&DigitalChannel> {
        self.channels.get(index)
    }

    pub fn into_channels(self) -> Vec<DigitalChannel> {
        self.channels
    }

    /// 16-bit words of device buffer this session occupies.
    pub fn footprint_words(&self) -> usize {
        self.partition_capacity * self.width.words() * self.count.get()
    }

    /// First buffer slot holding channel `index`.
    pub(crate) fn slot_of(&self, index: usize) -> usize {
        index * self.width.words()
    }
}

impl<T: Transport> LogicAnalyzer<T> {
    /// Zero `count` words of the device buffer starting at `start`.
    pub fn clear_buffer(&mut self, start: u16, count: u16) -> Result<(), CaptureError> {
        self.command(group::COMMON, common::CLEAR_BUFFER)?;
        self.transport.send_int(start)?;
        self.transport.send_int(count)?;
        self.transport.get_ack()?;
        Ok(())
    }

    /// Clear the buffer region, configure the counters and start capturing.
    ///
    /// Any earlier session becomes stale: its buffer region is wiped here.
    #[tracing::instrument(level = "debug", skip(self), fields(channels = config.channel_count().get()))]
    pub fn arm(&mut self, config: &CaptureConfig) -> Result<CaptureSession, CaptureError> {
        config.validate()?;

        let count = config.channel_count();
        let width = config.sample_width();
        let prescaler = config.prescaler(self.device.clock_hz);
        let partition_capacity = self.device.partition_capacity();
        let footprint = partition_capacity * width.words() * count.get();
        debug_assert!(footprint <= self.device.buffer_words);

        // the clear destroys whatever an earlier session captured
        let generation = self.begin_session();
        self.clear_buffer(0, footprint as u16)?;

        log::debug!(
            "Arming {}-channel capture on {:?} with modes {:?}",
            count.get(),
            config.inputs(),
            config.modes()
        );
        self.command(group::TIMING, count.command())?;
        self.transport.send_int(partition_capacity as u16)?;
        match count {
            ChannelCount::One => {
                let input = config.inputs()[0];
                self.transport
                    .send_byte((input.index() << 4) | config.modes()[0].code())?;
                self.transport.send_byte(config.trigger_byte())?;
            }
            ChannelCount::Two => {
                let inputs = config.inputs();
                let modes = config.modes();
                self.transport.send_byte(config.trigger_byte())?;
                self.transport
                    .send_byte((modes[1].code() << 4) | modes[0].code())?;
                self.transport
                    .send_byte((inputs[1].index() << 4) | inputs[0].index())?;
            }
            ChannelCount::Three => {
                self.transport.send_int(config.packed_modes())?;
                self.transport.send_byte(config.trigger_byte())?;
            }
            ChannelCount::Four => {
                self.transport.send_int(config.packed_modes())?;
                self.transport.send_byte(prescaler.code())?;
                self.transport.send_byte(config.trigger_byte())?;
            }
        }
        self.transport.get_ack()?;

        // Only the single-source modes know the level right after the trigger.
        let level_override = match count {
            ChannelCount::One | ChannelCount::Three => config.trigger().level_after_trigger(),
            _ => None,
        };

        let channels = config
            .inputs()
            .iter()
            .zip(config.modes())
            .enumerate()
            .map(|(index, (&input, &mode))| {
                let mut channel = DigitalChannel::new(input, mode, index, width, partition_capacity);
                channel.prescaler = prescaler;
                channel.maximum_time = config.maximum_time();
                channel.initial_level_override = level_override;
                channel
            })
            .collect();

        Ok(CaptureSession {
            generation,
            count,
            width,
            prescaler,
            trigger: config.trigger().clone(),
            partition_capacity,
            channels,
            last_fill: [0; DeviceConstants::SLOTS],
        })
    }

    /// Halt any running capture. The buffer is left as it is.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        log::debug!("Stopping logic analyzer");
        self.command(group::TIMING, timing::STOP_LA)?;
        self.transport.get_ack()?;
        Ok(())
    }
}
