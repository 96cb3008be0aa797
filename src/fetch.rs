use crate::analyzer::{CaptureError, LogicAnalyzer};
use crate::capture::CaptureSession;
use crate::digital_channel::DigitalChannel;
use crate::progress::CaptureProgress;
use crate::protocol::{group, timing};
use crate::reconstruct::SampleWidth;
use crate::transport::Transport;

impl<T: Transport> LogicAnalyzer<T> {
    /// Read `count` raw counter values of `width` from buffer partition
    /// `partition`.
    ///
    /// The device zero-pads partitions that hold fewer values. If the final
    /// acknowledgement does not arrive the whole block is discarded.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn fetch_raw(
        &mut self,
        partition: u8,
        count: usize,
        width: SampleWidth,
    ) -> Result<Vec<u32>, CaptureError> {
        profile_scope!("fetch_raw");

        if count == 0 {
            return Ok(Vec::new());
        }
        let count = count.min(usize::from(u16::MAX));
        let command = match width {
            SampleWidth::Bits16 => timing::FETCH_INT_DMA_DATA,
            SampleWidth::Bits32 => timing::FETCH_LONG_DMA_DATA,
        };

        self.command(group::TIMING, command)?;
        self.transport.send_int(count as u16)?;
        self.transport.send_byte(partition)?;
        let bytes = self.transport.read_raw(count * width.bytes())?;
        self.transport.get_ack()?;

        let order = self.transport.byte_order();
        let ticks = match width {
            SampleWidth::Bits16 => bytes
                .chunks_exact(2)
                .map(|b| u32::from(order.read_u16([b[0], b[1]])))
                .collect(),
            SampleWidth::Bits32 => bytes
                .chunks_exact(4)
                .map(|b| order.read_u32([b[0], b[1], b[2], b[3]]))
                .collect(),
        };
        Ok(ticks)
    }

    /// Fetch and reconstruct one channel using the fill counts in `progress`.
    pub fn fetch_channel<'s>(
        &mut self,
        session: &'s mut CaptureSession,
        index: usize,
        progress: &CaptureProgress,
    ) -> Result<&'s DigitalChannel, CaptureError> {
        self.check_session(session)?;
        let active = session.channels().len();
        if index >= active {
            return Err(CaptureError::ChannelUnavailable { index, active });
        }

        let count = progress
            .fill_count(index)
            .min(session.partition_capacity());
        let raw = self.fetch_raw(index as u8, count, session.sample_width())?;

        let clock_hz = self.device.clock_hz;
        let channel = &mut session.channels[index];
        channel.load_data(&progress.initial_levels, raw, clock_hz);
        log::debug!(
            "Fetched {} timestamps from {} ({} rollovers)",
            channel.len(),
            channel.input,
            channel.rollovers
        );
        Ok(channel)
    }

    /// Query progress once, then fetch every channel of the session.
    pub fn fetch_channels(
        &mut self,
        session: &mut CaptureSession,
    ) -> Result<CaptureProgress, CaptureError> {
        let progress = self.progress(session)?;
        for index in 0..session.channels().len() {
            self.fetch_channel(session, index, &progress)?;
        }
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureConfig;
    use crate::progress::InputLevels;
    use crate::protocol::DeviceConstants;
    use crate::transport::mock::ScriptedTransport;
    use crate::transport::TransportError;
    use crate::trigger_config::{DigitalInput, EdgeMode};

    fn progress(counts: [usize; 4]) -> CaptureProgress {
        CaptureProgress {
            fill_counts: counts,
            initial_levels: InputLevels::from_bits(0),
        }
    }

    #[test]
    fn test_fetch_int_wire_format() {
        let mut transport = ScriptedTransport::new();
        transport.respond_int(100).respond_int(65535).respond_int(0).ack();
        let mut la = LogicAnalyzer::new(transport);

        let ticks = la.fetch_raw(3, 3, SampleWidth::Bits16).unwrap();
        assert_eq!(ticks, vec![100, 65535, 0]);
        assert_eq!(
            la.transport.written,
            vec![group::TIMING, timing::FETCH_INT_DMA_DATA, 3, 0, 3]
        );
    }

    #[test]
    fn test_fetch_long_wire_format() {
        let mut transport = ScriptedTransport::new();
        transport.respond_long(70_000).respond_long(1).ack();
        let mut la = LogicAnalyzer::new(transport);

        let ticks = la.fetch_raw(1, 2, SampleWidth::Bits32).unwrap();
        assert_eq!(ticks, vec![70_000, 1]);
        assert_eq!(
            la.transport.written,
            vec![group::TIMING, timing::FETCH_LONG_DMA_DATA, 2, 0, 1]
        );
    }

    #[test]
    fn test_fetch_without_ack_returns_no_partial_result() {
        let mut transport = ScriptedTransport::new();
        transport.respond_long(5).respond_long(6);
        let mut la = LogicAnalyzer::new(transport);

        let err = la.fetch_raw(0, 2, SampleWidth::Bits32).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Transport(TransportError::Timeout { .. })
        ));
    }

    #[test]
    fn test_fetch_zero_points_skips_device() {
        let mut la = LogicAnalyzer::new(ScriptedTransport::new());
        assert!(la.fetch_raw(0, 0, SampleWidth::Bits16).unwrap().is_empty());
        assert!(la.transport.written.is_empty());
    }

    #[test]
    fn test_fetch_channel_reconstructs() {
        let mut transport = ScriptedTransport::new();
        transport.ack().ack();
        let mut la = LogicAnalyzer::with_constants(transport, DeviceConstants::default());
        let config = CaptureConfig::three_channels([EdgeMode::EveryRisingEdge; 3]);
        let mut session = la.arm(&config).unwrap();

        for tick in [100u16, 500, 65500, 300, 1200, 0] {
            la.transport.respond_int(tick);
        }
        la.transport.ack();
        let channel = la
            .fetch_channel(&mut session, 1, &progress([0, 6, 0, 0]))
            .unwrap();
        assert_eq!(channel.ticks, vec![100, 500, 65500, 65836, 66736]);
        assert_eq!(channel.rollovers, 1);
        assert_eq!(channel.raw_ticks.len(), 6);
    }

    #[test]
    fn test_fetch_channel_out_of_range() {
        let mut transport = ScriptedTransport::new();
        transport.ack().ack();
        let mut la = LogicAnalyzer::new(transport);
        let config = CaptureConfig::one_channel(DigitalInput::Id1, EdgeMode::EveryEdge);
        let mut session = la.arm(&config).unwrap();
        assert!(matches!(
            la.fetch_channel(&mut session, 1, &progress([0; 4])),
            Err(CaptureError::ChannelUnavailable {
                index: 1,
                active: 1
            })
        ));
    }

    #[test]
    fn test_fetch_channels_queries_progress_first() {
        let mut transport = ScriptedTransport::new();
        transport.ack().ack();
        let mut la = LogicAnalyzer::new(transport);
        let config = CaptureConfig::two_channels(
            [DigitalInput::Id1, DigitalInput::Id2],
            [EdgeMode::EveryEdge; 2],
        );
        let mut session = la.arm(&config).unwrap();
        la.transport.take_written();

        // progress: channel 1 has 2 longs, channel 2 nothing
        la.transport.respond_int(0);
        for pointer in [8u16, 0, 10_000, 0] {
            la.transport.respond_int(pointer);
        }
        la.transport.respond_byte(0b01).respond_byte(0).ack();
        la.transport.respond_long(64).respond_long(128).ack();

        let progress = la.fetch_channels(&mut session).unwrap();
        assert_eq!(progress.fill_count(0), 2);
        assert_eq!(progress.fill_count(1), 0);
        assert_eq!(session.channels()[0].len(), 2);
        assert!(session.channels()[0].initial_level);
        assert!(session.channels()[1].is_empty());
        assert_eq!(la.transport.pending(), 0);
    }
}
