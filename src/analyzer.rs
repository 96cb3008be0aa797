use crate::capture::{CaptureConfigError, CaptureSession};
use crate::protocol::DeviceConstants;
use crate::transport::{SerialTransport, Transport, TransportConfig, TransportError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Communication with the device failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid capture configuration: {0}")]
    Config(#[from] CaptureConfigError),

    #[error("Capture session was replaced by a newer one")]
    StaleSession,

    #[error("Channel {index} is not part of this session ({active} active)")]
    ChannelUnavailable { index: usize, active: usize },
}

impl CaptureError {
    /// True when the link went quiet, as opposed to the device rejecting a
    /// command.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CaptureError::Transport(e) if e.is_timeout())
    }
}

/// Logic analyzer and timer front end of one device.
///
/// Every operation takes `&mut self`, so requests never interleave on the
/// link. Share one analyzer between threads by wrapping it in a `Mutex`.
#[derive(Debug)]
pub struct LogicAnalyzer<T: Transport> {
    pub(crate) transport: T,
    pub(crate) device: DeviceConstants,
    generation: u64,
}

impl LogicAnalyzer<SerialTransport> {
    /// Open the serial port described by `config`.
    pub fn connect(config: &TransportConfig) -> Result<Self, TransportError> {
        let transport = SerialTransport::open(config)?;
        log::info!("Connected to logic analyzer on {}", config.port);
        Ok(Self::new(transport))
    }
}

impl<T: Transport> LogicAnalyzer<T> {
    pub fn new(transport: T) -> Self {
        Self::with_constants(transport, DeviceConstants::default())
    }

    pub fn with_constants(transport: T, device: DeviceConstants) -> Self {
        Self {
            transport,
            device,
            generation: 0,
        }
    }

    pub fn device(&self) -> &DeviceConstants {
        &self.device
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Invalidate all earlier sessions and return the new generation.
    pub(crate) fn begin_session(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(crate) fn check_session(&self, session: &CaptureSession) -> Result<(), CaptureError> {
        if session.generation != self.generation {
            log::warn!(
                "Rejecting session {} (current is {})",
                session.generation,
                self.generation
            );
            return Err(CaptureError::StaleSession);
        }
        Ok(())
    }

    pub(crate) fn command(&mut self, group: u8, command: u8) -> Result<(), TransportError> {
        self.transport.send_byte(group)?;
        self.transport.send_byte(command)
    }

    /// Timeout in the firmware's encoding. Budgets shorter than 65 536 clock
    /// ticks (about 1 ms at 64 MHz) encode as zero, which the device always
    /// reports as timed out.
    pub(crate) fn timeout_budget(&self, timeout: Duration) -> u16 {
        let msb = self.device.timeout_msb(timeout);
        if msb == 0 {
            log::warn!(
                "Timeout {:?} is below the timer resolution, the measurement will time out",
                timeout
            );
        }
        msb
    }

    /// Wait up to `timeout` for a long-running measurement to answer.
    ///
    /// The reads that follow still run when nothing arrived; they then end
    /// in a communication timeout.
    pub(crate) fn await_answer(
        &mut self,
        timeout: Duration,
        measurement: &str,
    ) -> Result<bool, TransportError> {
        let pending = self.transport.wait_for_data(timeout)?;
        if !pending {
            log::debug!(
                "Device sent nothing within {:?} of starting {}",
                timeout,
                measurement
            );
        }
        Ok(pending)
    }
}
