//! Command table of the instrument firmware.
//!
//! Every command is a group byte followed by a command byte, then typed
//! parameters, and is terminated by an acknowledgement byte.

pub mod group {
    pub const DOUT: u8 = 8;
    pub const DIN: u8 = 9;
    pub const TIMING: u8 = 10;
    pub const COMMON: u8 = 11;
}

pub mod timing {
    pub const START_TWO_CHAN_LA: u8 = 5;
    pub const START_FOUR_CHAN_LA: u8 = 6;
    pub const FETCH_INT_DMA_DATA: u8 = 8;
    pub const FETCH_LONG_DMA_DATA: u8 = 9;
    pub const GET_INITIAL_DIGITAL_STATES: u8 = 11;
    pub const TIMING_MEASUREMENTS: u8 = 12;
    pub const INTERVAL_MEASUREMENTS: u8 = 13;
    pub const START_ALTERNATE_ONE_CHAN_LA: u8 = 15;
    pub const START_THREE_CHAN_LA: u8 = 16;
    pub const STOP_LA: u8 = 17;
}

pub mod common {
    pub const GET_FREQUENCY: u8 = 3;
    pub const CLEAR_BUFFER: u8 = 10;
    pub const GET_ALTERNATE_HIGH_FREQUENCY: u8 = 20;
    pub const START_COUNTING: u8 = 25;
    pub const FETCH_COUNT: u8 = 26;
}

pub mod din {
    pub const GET_STATES: u8 = 2;
}

pub mod dout {
    pub const SET_STATE: u8 = 1;
}

/// Fixed properties of the instrument that the timing engine depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConstants {
    /// Reference clock feeding the capture counters.
    pub clock_hz: f64,
    /// Size of the shared capture buffer in 16-bit words.
    pub buffer_words: usize,
}

impl DeviceConstants {
    /// The buffer is always handed out in four equal slots.
    pub const SLOTS: usize = 4;

    /// Entries per channel partition, as sent with every arm command.
    pub fn partition_capacity(&self) -> usize {
        self.buffer_words / Self::SLOTS
    }

    /// Encode a timeout budget the way the firmware compares it: the upper
    /// 16 bits of the timeout expressed in clock ticks.
    pub fn timeout_msb(&self, timeout: std::time::Duration) -> u16 {
        let ticks = (timeout.as_secs_f64() * self.clock_hz) as u64;
        (ticks >> 16).min(u64::from(u16::MAX)) as u16
    }
}

impl Default for DeviceConstants {
    fn default() -> Self {
        Self {
            clock_hz: 64e6,
            buffer_words: 10_000,
        }
    }
}
