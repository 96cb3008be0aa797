//! One-shot edge timing with two independent edge detectors.
//!
//! Unlike the streaming captures, the device collects at most four 32-bit
//! timestamps per input and answers once, either with all of them or with
//! its timeout flag raised.

use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::protocol::{group, timing};
use crate::reconstruct::{unwrap_rollovers, zero_reference, SampleWidth};
use crate::transport::Transport;
use crate::trigger_config::{DigitalInput, TimerEdge};
use std::time::Duration;

/// Hardware limit of timestamps per input.
pub const MAX_POINTS: u8 = 4;

/// Offset the firmware needs added to single interval measurements.
const INTERVAL_CORRECTION_TICKS: i64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTimingRequest {
    pub channels: [DigitalInput; 2],
    pub edges: [TimerEdge; 2],
    pub points: [u8; 2],
    pub timeout: Duration,
    /// Drive SQR1 to this level right before the timers start.
    pub sqr1: Option<bool>,
    /// Subtract the first timestamp of the first input from every value.
    pub zero: bool,
}

impl EdgeTimingRequest {
    pub fn new(first: DigitalInput, second: DigitalInput) -> Self {
        Self {
            channels: [first, second],
            edges: [TimerEdge::FourRising; 2],
            points: [1, 1],
            timeout: Duration::from_millis(100),
            sqr1: None,
            zero: true,
        }
    }

    pub fn edges(mut self, first: TimerEdge, second: TimerEdge) -> Self {
        self.edges = [first, second];
        self
    }

    /// Points per input; values above [`MAX_POINTS`] are clamped.
    pub fn points(mut self, first: u8, second: u8) -> Self {
        self.points = [first, second];
        self
    }

    /// Device-side time budget. Anything below about 1 ms (65 536 clock
    /// ticks) cannot be encoded and always times out.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn toggle_sqr1(mut self, level: bool) -> Self {
        self.sqr1 = Some(level);
        self
    }

    pub fn zero(mut self, zero: bool) -> Self {
        self.zero = zero;
        self
    }

    fn clamped_points(&self) -> [u8; 2] {
        self.points.map(|p| {
            if p > MAX_POINTS {
                log::warn!("At most {} points per input can be timed, got {}", MAX_POINTS, p);
            }
            p.min(MAX_POINTS)
        })
    }

    fn params_byte(&self) -> u8 {
        let mut params = self.edges[0].code() | (self.edges[1].code() << 3);
        if let Some(level) = self.sqr1 {
            params |= 1 << 6;
            if level {
                params |= 1 << 7;
            }
        }
        params
    }
}

/// Timestamps in seconds from both edge detectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeTimes {
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseLevel {
    High,
    Low,
}

fn channel_pair(first: DigitalInput, second: DigitalInput) -> u8 {
    first.index() | (second.index() << 4)
}

impl<T: Transport> LogicAnalyzer<T> {
    /// Timestamp up to four edges on each of two inputs.
    ///
    /// Returns `Ok(None)` when the device reports that its timeout budget
    /// ran out; partial point lists are never returned.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn measure_edges(
        &mut self,
        request: &EdgeTimingRequest,
    ) -> Result<Option<EdgeTimes>, CaptureError> {
        let timeout_msb = self.timeout_budget(request.timeout);
        let points = request.clamped_points();

        self.command(group::TIMING, timing::TIMING_MEASUREMENTS)?;
        self.transport.send_int(timeout_msb)?;
        self.transport
            .send_byte(channel_pair(request.channels[0], request.channels[1]))?;
        self.transport.send_byte(request.params_byte())?;
        self.transport.send_byte(points[0] | (points[1] << 4))?;

        self.await_answer(request.timeout, "edge timing")?;

        let mut first = Vec::with_capacity(usize::from(points[0]));
        for _ in 0..points[0] {
            first.push(self.transport.get_long()?);
        }
        let mut second = Vec::with_capacity(usize::from(points[1]));
        for _ in 0..points[1] {
            second.push(self.transport.get_long()?);
        }
        let timed_out = self.transport.get_int()?;
        self.transport.get_ack()?;

        if timed_out >= timeout_msb {
            log::debug!(
                "Edge timing timed out ({} >= {})",
                timed_out,
                timeout_msb
            );
            return Ok(None);
        }

        let mut times = EdgeTimes {
            first: self.timer_seconds(&first),
            second: self.timer_seconds(&second),
        };
        if request.zero {
            zero_reference(&mut times.first, &mut times.second);
        }
        Ok(Some(times))
    }

    fn timer_seconds(&self, raw: &[u32]) -> Vec<f64> {
        let clock_hz = self.device.clock_hz;
        unwrap_rollovers(raw, SampleWidth::Bits32)
            .ticks
            .iter()
            .map(|&t| t as f64 / clock_hz)
            .collect()
    }

    /// Time from an edge on `first` to an edge on `second`, in seconds.
    ///
    /// Negative when the second event happened first.
    pub fn measure_interval(
        &mut self,
        first: DigitalInput,
        second: DigitalInput,
        edges: [TimerEdge; 2],
        timeout: Duration,
    ) -> Result<Option<f64>, CaptureError> {
        let timeout_msb = self.timeout_budget(timeout);

        self.command(group::TIMING, timing::INTERVAL_MEASUREMENTS)?;
        self.transport.send_int(timeout_msb)?;
        self.transport.send_byte(channel_pair(first, second))?;
        self.transport
            .send_byte(edges[0].code() | (edges[1].code() << 3))?;

        self.await_answer(timeout, "interval measurement")?;

        let start = self.transport.get_long()?;
        let stop = self.transport.get_long()?;
        let timed_out = self.transport.get_int()?;
        self.transport.get_ack()?;

        if timed_out >= timeout_msb || stop == 0 {
            return Ok(None);
        }
        let ticks = i64::from(stop) - i64::from(start) + INTERVAL_CORRECTION_TICKS;
        Ok(Some(ticks as f64 / self.device.clock_hz))
    }

    /// Period and high fraction of a square-ish signal on `channel`.
    pub fn duty_cycle(
        &mut self,
        channel: DigitalInput,
        timeout: Duration,
    ) -> Result<Option<(f64, f64)>, CaptureError> {
        let Some(times) = self.rising_falling_pairs(channel, timeout)? else {
            return Ok(None);
        };
        let (rising, falling) = (&times.first, &times.second);

        let high_time = if falling[0] > 0.0 {
            falling[0]
        } else {
            if falling[1] > rising[1] {
                log::debug!("Dropped an edge while measuring duty cycle on {}", channel);
                return Ok(None);
            }
            falling[1]
        };
        let period = rising[1];
        if period <= 0.0 {
            return Ok(None);
        }
        Ok(Some((period, high_time / period)))
    }

    /// Width of the first complete high or low pulse on `channel`.
    pub fn pulse_time(
        &mut self,
        channel: DigitalInput,
        level: PulseLevel,
        timeout: Duration,
    ) -> Result<Option<f64>, CaptureError> {
        let Some(times) = self.rising_falling_pairs(channel, timeout)? else {
            return Ok(None);
        };
        let (rising, falling) = (&times.first, &times.second);

        let width = if falling[0] > 0.0 {
            // rising edge came first
            match level {
                PulseLevel::High => falling[0],
                PulseLevel::Low => rising[1] - falling[0],
            }
        } else {
            match level {
                PulseLevel::High => falling[1],
                PulseLevel::Low => falling[0].abs(),
            }
        };
        Ok(Some(width))
    }

    /// Two rising and two falling edges on the same input, zeroed on the
    /// first rising edge.
    fn rising_falling_pairs(
        &mut self,
        channel: DigitalInput,
        timeout: Duration,
    ) -> Result<Option<EdgeTimes>, CaptureError> {
        let request = EdgeTimingRequest::new(channel, channel)
            .edges(TimerEdge::Rising, TimerEdge::Falling)
            .points(2, 2)
            .timeout(timeout);
        Ok(self
            .measure_edges(&request)?
            .filter(|t| t.first.len() == 2 && t.second.len() == 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceConstants;
    use crate::transport::mock::ScriptedTransport;

    const CLOCK: f64 = 64e6;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn respond_edges(
        transport: &mut ScriptedTransport,
        first: &[u32],
        second: &[u32],
        timed_out: u16,
    ) {
        for &t in first.iter().chain(second) {
            transport.respond_long(t);
        }
        transport.respond_int(timed_out).ack();
    }

    #[test]
    fn test_request_wire_format() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[10, 20], &[30, 40, 50], 0);
        let mut la = LogicAnalyzer::new(transport);

        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
            .edges(TimerEdge::Rising, TimerEdge::Falling)
            .points(2, 3)
            .timeout(Duration::from_millis(100))
            .toggle_sqr1(false);
        la.measure_edges(&request).unwrap().unwrap();

        assert_eq!(
            la.transport.written,
            vec![
                group::TIMING,
                timing::TIMING_MEASUREMENTS,
                97,
                0,
                0x10,
                0b0101_0011,
                0x32,
            ]
        );
    }

    #[test]
    fn test_sqr1_high_sets_level_bit() {
        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id1)
            .edges(TimerEdge::FourRising, TimerEdge::FourRising)
            .toggle_sqr1(true);
        assert_eq!(request.params_byte(), 0b1110_0100);
    }

    #[test]
    fn test_points_are_clamped() {
        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2).points(9, 4);
        assert_eq!(request.clamped_points(), [4, 4]);
    }

    #[test]
    fn test_zero_referencing_scenario() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[1000, 2000], &[1500, 2500], 3);
        let mut la = LogicAnalyzer::new(transport);

        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
            .points(2, 2)
            .zero(true);
        let times = la.measure_edges(&request).unwrap().unwrap();
        assert_eq!(times.first[0], 0.0);
        assert!(close(times.first[1], 1000.0 / CLOCK));
        assert!(close(times.second[0], 500.0 / CLOCK));
        assert!(close(times.second[1], 1500.0 / CLOCK));
    }

    #[test]
    fn test_absolute_times_without_zero() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[1000], &[4_294_967_000, 200], 0);
        let mut la = LogicAnalyzer::new(transport);

        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
            .points(1, 2)
            .zero(false);
        let times = la.measure_edges(&request).unwrap().unwrap();
        assert!(close(times.first[0], 1000.0 / CLOCK));
        // second list wrapped once
        assert!(close(times.second[1], (4_294_967_296.0 + 200.0) / CLOCK));
    }

    #[test]
    fn test_timeout_yields_none() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[0, 0], &[0, 0], 97);
        let mut la = LogicAnalyzer::new(transport);

        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
            .points(2, 2)
            .timeout(Duration::from_millis(100));
        assert_eq!(la.measure_edges(&request).unwrap(), None);
        assert_eq!(la.transport.pending(), 0);
    }

    #[test]
    fn test_sub_resolution_timeout_always_times_out() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[1000], &[2000], 0);
        let mut la = LogicAnalyzer::new(transport);

        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
            .timeout(Duration::from_micros(500));
        assert_eq!(la.measure_edges(&request).unwrap(), None);
        assert_eq!(&la.transport.written[2..4], &[0, 0]);
    }

    #[test]
    fn test_lost_link_is_an_error_not_a_timeout() {
        let mut transport = ScriptedTransport::new();
        transport.respond_long(5);
        let mut la = LogicAnalyzer::new(transport);
        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2).points(2, 2);
        assert!(matches!(
            la.measure_edges(&request),
            Err(CaptureError::Transport(_))
        ));
    }

    /// Device model: the stimulus completes the requested points after
    /// `needed` seconds; the device gives up once its timeout budget is
    /// exhausted and reports how far its timeout counter got.
    fn run_against_stimulus(needed: Duration, timeout: Duration) -> usize {
        let device = DeviceConstants::default();
        let timeout_msb = device.timeout_msb(timeout);
        let needed_msb = device.timeout_msb(needed);

        let mut transport = ScriptedTransport::new();
        if needed_msb < timeout_msb {
            respond_edges(&mut transport, &[64_000, 128_000], &[96_000, 160_000], needed_msb);
        } else {
            respond_edges(&mut transport, &[0, 0], &[0, 0], timeout_msb);
        }
        let mut la = LogicAnalyzer::with_constants(transport, device);
        let request = EdgeTimingRequest::new(DigitalInput::Id1, DigitalInput::Id2)
            .points(2, 2)
            .timeout(timeout);
        la.measure_edges(&request)
            .unwrap()
            .map_or(0, |t| t.first.len() + t.second.len())
    }

    #[test]
    fn test_longer_timeout_never_returns_fewer_points() {
        let needed = Duration::from_millis(250);
        let mut previous = 0;
        for ms in [1u64, 10, 100, 249, 260, 500, 1000, 5000] {
            let points = run_against_stimulus(needed, Duration::from_millis(ms));
            assert!(points >= previous, "timeout {} ms returned {} points", ms, points);
            previous = points;
        }
        assert_eq!(previous, 4);
    }

    #[test]
    fn test_measure_interval() {
        let mut transport = ScriptedTransport::new();
        transport.respond_long(1000).respond_long(1620).respond_int(0).ack();
        let mut la = LogicAnalyzer::new(transport);

        let interval = la
            .measure_interval(
                DigitalInput::Id1,
                DigitalInput::Id3,
                [TimerEdge::Rising, TimerEdge::Falling],
                Duration::from_millis(100),
            )
            .unwrap()
            .unwrap();
        assert!(close(interval, 640.0 / CLOCK));
        assert_eq!(
            la.transport.written,
            vec![
                group::TIMING,
                timing::INTERVAL_MEASUREMENTS,
                97,
                0,
                0x20,
                0b0001_0011
            ]
        );
    }

    #[test]
    fn test_measure_interval_without_stop_edge() {
        let mut transport = ScriptedTransport::new();
        transport.respond_long(1000).respond_long(0).respond_int(0).ack();
        let mut la = LogicAnalyzer::new(transport);
        let interval = la
            .measure_interval(
                DigitalInput::Id1,
                DigitalInput::Id2,
                [TimerEdge::Rising; 2],
                Duration::from_millis(100),
            )
            .unwrap();
        assert_eq!(interval, None);
    }

    #[test]
    fn test_duty_cycle_rising_first() {
        // rising at 0 and 6400 ticks, falling at 1600 and 8000
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[1000, 7400], &[2600, 9000], 0);
        let mut la = LogicAnalyzer::new(transport);

        let (period, duty) = la
            .duty_cycle(DigitalInput::Id1, Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert!(close(period, 6400.0 / CLOCK));
        assert!((duty - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_duty_cycle_falling_first() {
        // falling before the first rising edge
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[2000, 8400], &[1000, 3600], 0);
        let mut la = LogicAnalyzer::new(transport);

        let (period, duty) = la
            .duty_cycle(DigitalInput::Id1, Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert!(close(period, 6400.0 / CLOCK));
        assert!((duty - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_pulse_time() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[1000, 7400], &[2600, 9000], 0);
        respond_edges(&mut transport, &[1000, 7400], &[2600, 9000], 0);
        let mut la = LogicAnalyzer::new(transport);

        let high = la
            .pulse_time(DigitalInput::Id1, PulseLevel::High, Duration::from_millis(100))
            .unwrap()
            .unwrap();
        let low = la
            .pulse_time(DigitalInput::Id1, PulseLevel::Low, Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert!(close(high, 1600.0 / CLOCK));
        assert!(close(low, 4800.0 / CLOCK));
    }

    #[test]
    fn test_duty_cycle_timeout() {
        let mut transport = ScriptedTransport::new();
        respond_edges(&mut transport, &[0, 0], &[0, 0], u16::MAX);
        let mut la = LogicAnalyzer::new(transport);
        assert_eq!(
            la.duty_cycle(DigitalInput::Id2, Duration::from_secs(1)).unwrap(),
            None
        );
    }
}
