use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::capture::CaptureConfig;
use crate::digital_channel::DigitalChannel;
use crate::poll::{poll_until, PollSchedule};
use crate::transport::Transport;
use crate::trigger_config::{DigitalInput, EdgeMode};
use std::time::Duration;

impl<T: Transport> LogicAnalyzer<T> {
    /// Arm `config`, let it run for `waiting_time` and return the first
    /// channel with its timestamps.
    pub fn capture_edges(
        &mut self,
        config: &CaptureConfig,
        waiting_time: Duration,
    ) -> Result<DigitalChannel, CaptureError> {
        let mut session = self.arm(config)?;
        std::thread::sleep(waiting_time);
        let progress = self.progress(&mut session)?;
        self.fetch_channel(&mut session, 0, &progress)?;
        session
            .into_channels()
            .into_iter()
            .next()
            .ok_or(CaptureError::ChannelUnavailable {
                index: 0,
                active: 0,
            })
    }

    /// Time between the first rising edge and the one `skip_cycles + 1`
    /// edges later.
    ///
    /// A pendulum crossing a light barrier twice per period needs
    /// `skip_cycles = 1`. Waits at most `min(timeout, 60 s)`.
    pub fn rising_edge_interval(
        &mut self,
        channel: DigitalInput,
        skip_cycles: usize,
        timeout: Duration,
    ) -> Result<Option<f64>, CaptureError> {
        let config = CaptureConfig::one_channel(channel, EdgeMode::EveryRisingEdge);
        self.edge_interval(&config, skip_cycles, PollSchedule::with_deadline(timeout))
    }

    /// Falling edge counterpart of [`LogicAnalyzer::rising_edge_interval`].
    pub fn falling_edge_interval(
        &mut self,
        channel: DigitalInput,
        skip_cycles: usize,
        timeout: Duration,
    ) -> Result<Option<f64>, CaptureError> {
        let config = CaptureConfig::one_channel(channel, EdgeMode::EveryFallingEdge);
        self.edge_interval(&config, skip_cycles, PollSchedule::with_deadline(timeout))
    }

    pub(crate) fn edge_interval(
        &mut self,
        config: &CaptureConfig,
        skip_cycles: usize,
        schedule: PollSchedule,
    ) -> Result<Option<f64>, CaptureError> {
        let mut session = self.arm(config)?;
        let needed = skip_cycles + 2;

        poll_until(schedule, || -> Result<Option<f64>, CaptureError> {
            let progress = self.progress(&mut session)?;
            if progress.fill_count(0) < needed {
                return Ok(None);
            }
            let channel = self.fetch_channel(&mut session, 0, &progress)?;
            let timestamps = &channel.timestamps;
            Ok(match (timestamps.first(), timestamps.get(skip_cycles + 1)) {
                (Some(first), Some(last)) => Some(last - first),
                _ => None,
            })
        })
    }
}
