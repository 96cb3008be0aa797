use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::protocol::{common, group};
use crate::transport::Transport;
use crate::trigger_config::DigitalInput;
use std::time::Duration;

/// Rising edges the firmware counts per frequency measurement.
const FREQUENCY_EDGES: f64 = 16.0;

/// Gate time of the high-frequency counter.
const HIGH_FREQUENCY_GATE_SECONDS: f64 = 0.1;

impl<T: Transport> LogicAnalyzer<T> {
    /// Frequency in Hz from the time the input needs for 16 rising edges.
    ///
    /// `None` when the edges did not arrive within `timeout`.
    pub fn frequency(
        &mut self,
        channel: DigitalInput,
        timeout: Duration,
    ) -> Result<Option<f64>, CaptureError> {
        let timeout_msb = self.timeout_budget(timeout);
        self.command(group::COMMON, common::GET_FREQUENCY)?;
        self.transport.send_int(timeout_msb)?;
        self.transport.send_byte(channel.index())?;

        self.await_answer(timeout, "frequency measurement")?;

        let timed_out = self.transport.get_byte()?;
        let start = self.transport.get_long()?;
        let stop = self.transport.get_long()?;
        self.transport.get_ack()?;

        if timed_out != 0 {
            log::debug!("Frequency measurement on {} timed out", channel);
            return Ok(None);
        }
        let ticks = stop.wrapping_sub(start);
        if ticks == 0 {
            return Ok(None);
        }
        Ok(Some(FREQUENCY_EDGES * self.device.clock_hz / f64::from(ticks)))
    }

    /// Frequency in Hz from a 100 ms gated counter. Suited for signals above
    /// about 1 MHz.
    pub fn high_frequency(&mut self, channel: DigitalInput) -> Result<f64, CaptureError> {
        self.command(group::COMMON, common::GET_ALTERNATE_HIGH_FREQUENCY)?;
        self.transport.send_byte(channel.index())?;
        let scale = self.transport.get_byte()?;
        let count = self.transport.get_long()?;
        self.transport.get_ack()?;
        Ok(f64::from(scale) * f64::from(count) / HIGH_FREQUENCY_GATE_SECONDS)
    }

    /// Start counting rising edges on `channel`. Read the total with
    /// [`LogicAnalyzer::read_pulse_count`].
    pub fn count_pulses(&mut self, channel: DigitalInput) -> Result<(), CaptureError> {
        log::debug!("Counting pulses on {}", channel);
        self.command(group::COMMON, common::START_COUNTING)?;
        self.transport.send_byte(channel.index())?;
        self.transport.get_ack()?;
        Ok(())
    }

    pub fn read_pulse_count(&mut self) -> Result<u16, CaptureError> {
        self.command(group::COMMON, common::FETCH_COUNT)?;
        let count = self.transport.get_int()?;
        self.transport.get_ack()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;

    #[test]
    fn test_frequency() {
        let mut transport = ScriptedTransport::new();
        // 16 edges in 256_000 ticks of 64 MHz: 4 kHz
        transport
            .respond_byte(0)
            .respond_long(1_000)
            .respond_long(257_000)
            .ack();
        let mut la = LogicAnalyzer::new(transport);

        let freq = la
            .frequency(DigitalInput::Cntr, Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert!((freq - 4000.0).abs() < 1e-9);
        assert_eq!(
            la.transport.written,
            vec![group::COMMON, common::GET_FREQUENCY, 0xa1, 0x07, 6]
        );
    }

    #[test]
    fn test_frequency_across_counter_wrap() {
        let mut transport = ScriptedTransport::new();
        transport
            .respond_byte(0)
            .respond_long(u32::MAX - 127_999)
            .respond_long(128_000)
            .ack();
        let mut la = LogicAnalyzer::new(transport);
        let freq = la
            .frequency(DigitalInput::Id1, Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert!((freq - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_timeout() {
        let mut transport = ScriptedTransport::new();
        transport.respond_byte(1).respond_long(0).respond_long(0).ack();
        let mut la = LogicAnalyzer::new(transport);
        assert_eq!(
            la.frequency(DigitalInput::Id1, Duration::from_millis(100))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_high_frequency() {
        let mut transport = ScriptedTransport::new();
        transport.respond_byte(2).respond_long(500_000).ack();
        let mut la = LogicAnalyzer::new(transport);
        let freq = la.high_frequency(DigitalInput::Id1).unwrap();
        assert!((freq - 10e6).abs() < 1e-3);
        assert_eq!(
            la.transport.written,
            vec![group::COMMON, common::GET_ALTERNATE_HIGH_FREQUENCY, 0]
        );
    }

    #[test]
    fn test_pulse_counting() {
        let mut transport = ScriptedTransport::new();
        transport.ack().respond_int(1234).ack();
        let mut la = LogicAnalyzer::new(transport);

        la.count_pulses(DigitalInput::Sen).unwrap();
        assert_eq!(la.read_pulse_count().unwrap(), 1234);
        assert_eq!(
            la.transport.written,
            vec![
                group::COMMON,
                common::START_COUNTING,
                4,
                group::COMMON,
                common::FETCH_COUNT
            ]
        );
    }
}
