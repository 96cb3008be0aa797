use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::capture::CaptureSession;
use crate::protocol::{group, timing, DeviceConstants};
use crate::transport::Transport;
use crate::trigger_config::DigitalInput;

/// Snapshot of the digital input levels as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputLevels {
    bits: u8,
}

impl InputLevels {
    pub fn from_bits(bits: u8) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Level of `input`, or `None` when the device does not report it.
    pub fn level(&self, input: DigitalInput) -> Option<bool> {
        match input {
            DigitalInput::Id1 => Some(self.bits & 0x01 != 0),
            DigitalInput::Id2 => Some(self.bits & 0x02 != 0),
            DigitalInput::Id3 => Some(self.bits & 0x04 != 0),
            DigitalInput::Id4 => Some(self.bits & 0x08 != 0),
            // the comparator output is inverted
            DigitalInput::Sen => Some(self.bits & 0x10 == 0),
            DigitalInput::Ext | DigitalInput::Cntr => None,
        }
    }
}

/// Result of one progress query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureProgress {
    /// Entries captured so far per session channel; unused channels read 0.
    pub fill_counts: [usize; DeviceConstants::SLOTS],
    pub initial_levels: InputLevels,
}

impl CaptureProgress {
    pub fn fill_count(&self, channel: usize) -> usize {
        self.fill_counts.get(channel).copied().unwrap_or(0)
    }
}

/// Raw words written per slot since arming, before folding.
pub(crate) fn slot_words(base: u16, pointers: [u16; 4], slot_words: usize) -> [i64; 4] {
    let mut words = [0i64; 4];
    for (slot, pointer) in pointers.iter().enumerate() {
        words[slot] =
            (i64::from(*pointer) - i64::from(base)) / 2 - (slot * slot_words) as i64;
    }
    words
}

/// Turn a raw entry count into a fill count in `[0, capacity]`.
///
/// The write pointer of a full partition is back at the partition start, so
/// a zero after some data was seen means full. A zero before anything was
/// seen means nothing captured yet.
pub(crate) fn fold_fill(raw: i64, previous: usize, capacity: usize) -> usize {
    if raw < 0 {
        return 0;
    }
    if raw == 0 {
        return if previous > 0 { capacity } else { 0 };
    }
    (raw as usize).min(capacity)
}

impl<T: Transport> LogicAnalyzer<T> {
    /// Ask the device how far every buffer slot has been filled.
    ///
    /// Returns the raw pointer base, the four slot pointers and the input
    /// level snapshot. Side-effect free; may be polled.
    fn read_initial_states(&mut self) -> Result<(u16, [u16; 4], InputLevels), CaptureError> {
        self.command(group::TIMING, timing::GET_INITIAL_DIGITAL_STATES)?;
        let base = self.transport.get_int()?;
        let mut pointers = [0u16; 4];
        for pointer in pointers.iter_mut() {
            *pointer = self.transport.get_int()?;
        }
        let states = self.transport.get_byte()?;
        let state_errors = self.transport.get_byte()?;
        self.transport.get_ack()?;
        if state_errors != 0 {
            log::debug!("Device reported digital state error flags 0x{:02x}", state_errors);
        }
        Ok((base, pointers, InputLevels::from_bits(states)))
    }

    /// Fill counts of the session's channels and the input levels sampled
    /// by the device just before answering.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn progress(&mut self, session: &mut CaptureSession) -> Result<CaptureProgress, CaptureError> {
        self.check_session(session)?;
        let (base, pointers, initial_levels) = self.read_initial_states()?;
        let words = slot_words(base, pointers, session.partition_capacity());

        let width_words = session.sample_width().words() as i64;
        let mut fill_counts = [0usize; DeviceConstants::SLOTS];
        for index in 0..session.channels().len() {
            let slot = session.slot_of(index);
            let raw = if words[slot] < 0 {
                -1
            } else {
                words[slot] / width_words
            };
            let fill = fold_fill(raw, session.last_fill[slot], session.partition_capacity());
            session.last_fill[slot] = fill;
            fill_counts[index] = fill;
        }

        log::trace!("Capture progress {:?}", fill_counts);
        Ok(CaptureProgress {
            fill_counts,
            initial_levels,
        })
    }
}
