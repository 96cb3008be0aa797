use crate::capture::CaptureConfigError;
use std::fmt;
use std::str::FromStr;

/// Digital inputs the timing engine can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigitalInput {
    Id1,
    Id2,
    Id3,
    Id4,
    /// Inverted comparator output.
    Sen,
    Ext,
    Cntr,
}

impl DigitalInput {
    pub const ALL: [DigitalInput; 7] = [
        DigitalInput::Id1,
        DigitalInput::Id2,
        DigitalInput::Id3,
        DigitalInput::Id4,
        DigitalInput::Sen,
        DigitalInput::Ext,
        DigitalInput::Cntr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DigitalInput::Id1 => "ID1",
            DigitalInput::Id2 => "ID2",
            DigitalInput::Id3 => "ID3",
            DigitalInput::Id4 => "ID4",
            DigitalInput::Sen => "SEN",
            DigitalInput::Ext => "EXT",
            DigitalInput::Cntr => "CNTR",
        }
    }

    /// Index used on the wire.
    pub fn index(&self) -> u8 {
        match self {
            DigitalInput::Id1 => 0,
            DigitalInput::Id2 => 1,
            DigitalInput::Id3 => 2,
            DigitalInput::Id4 => 3,
            DigitalInput::Sen => 4,
            DigitalInput::Ext => 5,
            DigitalInput::Cntr => 6,
        }
    }

    /// Lenient lookup: an unknown name selects ID1 and logs a warning.
    ///
    /// Channel selection only decides which signal gets timestamped, so a
    /// typo never endangers the capture buffer. Use [`str::parse`] when the
    /// caller would rather see the error.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            log::warn!("Invalid digital channel '{}', selecting ID1 instead", name);
            DigitalInput::Id1
        })
    }
}

impl FromStr for DigitalInput {
    type Err = CaptureConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|input| input.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CaptureConfigError::UnknownChannel {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for DigitalInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transitions the hardware counter latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeMode {
    Disabled,
    #[default]
    EveryEdge,
    EveryFallingEdge,
    EveryRisingEdge,
    EveryFourthRisingEdge,
    EverySixteenthRisingEdge,
}

impl EdgeMode {
    pub fn code(&self) -> u8 {
        match self {
            EdgeMode::Disabled => 0,
            EdgeMode::EveryEdge => 1,
            EdgeMode::EveryFallingEdge => 2,
            EdgeMode::EveryRisingEdge => 3,
            EdgeMode::EveryFourthRisingEdge => 4,
            EdgeMode::EverySixteenthRisingEdge => 5,
        }
    }

    pub fn is_rising(&self) -> bool {
        matches!(
            self,
            EdgeMode::EveryRisingEdge
                | EdgeMode::EveryFourthRisingEdge
                | EdgeMode::EverySixteenthRisingEdge
        )
    }
}

impl TryFrom<u8> for EdgeMode {
    type Error = CaptureConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EdgeMode::Disabled),
            1 => Ok(EdgeMode::EveryEdge),
            2 => Ok(EdgeMode::EveryFallingEdge),
            3 => Ok(EdgeMode::EveryRisingEdge),
            4 => Ok(EdgeMode::EveryFourthRisingEdge),
            5 => Ok(EdgeMode::EverySixteenthRisingEdge),
            _ => Err(CaptureConfigError::InvalidEdgeMode { code }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPolarity {
    #[default]
    Rising,
    Falling,
}

/// Hold the counter until a transition occurs on one of the source inputs.
///
/// Single- and three-channel captures trigger on the first source only; the
/// two-channel mode uses the first source; the four-channel mode accepts any
/// combination of ID1, ID2 and ID3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub sources: Vec<DigitalInput>,
    pub polarity: TriggerPolarity,
    pub enabled: bool,
}

impl TriggerSpec {
    pub fn new(sources: Vec<DigitalInput>, polarity: TriggerPolarity) -> Self {
        Self {
            sources,
            polarity,
            enabled: true,
        }
    }

    pub fn start_capturing_when(source: DigitalInput) -> TriggerSpecBuilder {
        TriggerSpecBuilder {
            sources: vec![source],
        }
    }

    pub fn disabled() -> Self {
        Self {
            sources: Vec::new(),
            polarity: TriggerPolarity::Rising,
            enabled: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.sources.is_empty()
    }

    /// The source used by modes that support a single trigger input.
    pub fn primary_source(&self) -> Option<DigitalInput> {
        if self.sources.len() > 1 {
            log::warn!(
                "Only one trigger source is supported in this mode, using {}",
                self.sources[0]
            );
        }
        self.sources.first().copied()
    }

    /// Trigger field as the edge-mode code used by the one- and
    /// three-channel commands: `(source << 4) | mode`.
    pub(crate) fn mode_byte(&self) -> u8 {
        if !self.is_active() {
            return 0;
        }
        let source = self.primary_source().unwrap_or(DigitalInput::Id1);
        let mode = match self.polarity {
            TriggerPolarity::Rising => EdgeMode::EveryRisingEdge,
            TriggerPolarity::Falling => EdgeMode::EveryFallingEdge,
        };
        (source.index() << 4) | mode.code()
    }

    /// Logic level the input must be at right after the trigger fired.
    pub fn level_after_trigger(&self) -> Option<bool> {
        if !self.is_active() {
            return None;
        }
        Some(self.polarity == TriggerPolarity::Rising)
    }
}

impl Default for TriggerSpec {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug)]
pub struct TriggerSpecBuilder {
    sources: Vec<DigitalInput>,
}

impl TriggerSpecBuilder {
    /// Add another source, for modes that accept several.
    pub fn or(mut self, source: DigitalInput) -> Self {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
        self
    }

    pub fn rises(self) -> TriggerSpec {
        TriggerSpec::new(self.sources, TriggerPolarity::Rising)
    }

    pub fn falls(self) -> TriggerSpec {
        TriggerSpec::new(self.sources, TriggerPolarity::Falling)
    }
}

/// Edge filter of the bounded interval timer (a 3-bit field on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerEdge {
    Rising,
    Falling,
    #[default]
    FourRising,
}

impl TimerEdge {
    pub fn code(&self) -> u8 {
        match self {
            TimerEdge::Falling => 2,
            TimerEdge::Rising => 3,
            TimerEdge::FourRising => 4,
        }
    }
}
