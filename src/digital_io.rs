//! Static digital I/O, mostly used to stimulate or check a setup around a
//! timing measurement.

use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::progress::InputLevels;
use crate::protocol::{din, dout, group};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalOutput {
    Sqr1,
    Sqr2,
    Sqr3,
    Sqr4,
}

impl DigitalOutput {
    pub const ALL: [DigitalOutput; 4] = [
        DigitalOutput::Sqr1,
        DigitalOutput::Sqr2,
        DigitalOutput::Sqr3,
        DigitalOutput::Sqr4,
    ];

    fn bit(&self) -> u8 {
        match self {
            DigitalOutput::Sqr1 => 0,
            DigitalOutput::Sqr2 => 1,
            DigitalOutput::Sqr3 => 2,
            DigitalOutput::Sqr4 => 3,
        }
    }
}

/// Requested output levels; outputs left as `None` keep their level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputStates {
    levels: [Option<bool>; 4],
}

impl OutputStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, output: DigitalOutput, level: bool) -> Self {
        self.levels[usize::from(output.bit())] = Some(level);
        self
    }

    pub fn high(self, output: DigitalOutput) -> Self {
        self.set(output, true)
    }

    pub fn low(self, output: DigitalOutput) -> Self {
        self.set(output, false)
    }

    pub fn get(&self, output: DigitalOutput) -> Option<bool> {
        self.levels[usize::from(output.bit())]
    }

    /// Update mask in the high nibble, levels in the low nibble.
    pub(crate) fn data_byte(&self) -> u8 {
        DigitalOutput::ALL.iter().fold(0u8, |data, output| {
            match self.get(*output) {
                Some(level) => data | (0x10 << output.bit()) | (u8::from(level) << output.bit()),
                None => data,
            }
        })
    }
}

impl<T: Transport> LogicAnalyzer<T> {
    /// Instantaneous logic levels of the digital inputs.
    pub fn read_input_states(&mut self) -> Result<InputLevels, CaptureError> {
        self.command(group::DIN, din::GET_STATES)?;
        let states = self.transport.get_byte()?;
        self.transport.get_ack()?;
        Ok(InputLevels::from_bits(states))
    }

    pub fn set_output_states(&mut self, states: &OutputStates) -> Result<(), CaptureError> {
        log::debug!("Setting digital outputs {:?}", states);
        self.command(group::DOUT, dout::SET_STATE)?;
        self.transport.send_byte(states.data_byte())?;
        self.transport.get_ack()?;
        Ok(())
    }
}
