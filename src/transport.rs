use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Order in which multi-byte integers travel over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: expected {expected} from the device but the read did not complete")]
    Timeout { expected: &'static str },

    #[error("Device rejected the command (ack byte 0x{code:02x})")]
    Nack { code: u8 },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Byte-granular request/response channel to the instrument.
///
/// Writes are fire-and-forget; reads block until the device answers or the
/// transport's own timeout elapses. Every command ends with [`Transport::get_ack`].
pub trait Transport {
    fn byte_order(&self) -> ByteOrder;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read exactly `n` bytes.
    fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, TransportError>;

    /// Block until the device has started answering or `timeout` elapsed.
    /// Returns whether data is pending.
    fn wait_for_data(&mut self, _timeout: Duration) -> Result<bool, TransportError> {
        Ok(true)
    }

    fn send_byte(&mut self, value: u8) -> Result<(), TransportError> {
        self.write_bytes(&[value])
    }

    fn send_int(&mut self, value: u16) -> Result<(), TransportError> {
        let bytes = self.byte_order().u16_bytes(value);
        self.write_bytes(&bytes)
    }

    fn send_long(&mut self, value: u32) -> Result<(), TransportError> {
        let bytes = self.byte_order().u32_bytes(value);
        self.write_bytes(&bytes)
    }

    fn get_byte(&mut self) -> Result<u8, TransportError> {
        let [value] = read_array::<1, _>(self, "byte")?;
        Ok(value)
    }

    fn get_int(&mut self) -> Result<u16, TransportError> {
        let raw = read_array::<2, _>(self, "integer")?;
        Ok(self.byte_order().read_u16(raw))
    }

    fn get_long(&mut self) -> Result<u32, TransportError> {
        let raw = read_array::<4, _>(self, "long integer")?;
        Ok(self.byte_order().read_u32(raw))
    }

    /// Confirm the device processed the previous command.
    fn get_ack(&mut self) -> Result<(), TransportError> {
        let [code] = read_array::<1, _>(self, "acknowledgement").map_err(|e| match e {
            TransportError::Timeout { .. } => TransportError::Timeout {
                expected: "acknowledgement",
            },
            other => other,
        })?;
        if code & 0x01 == 0 {
            return Err(TransportError::Nack { code });
        }
        if code >> 1 != 0 {
            log::debug!("Ack carried status bits 0x{:02x}", code >> 1);
        }
        Ok(())
    }
}

/// Read exactly `N` bytes; a short answer counts as a timeout.
fn read_array<const N: usize, T: Transport + ?Sized>(
    transport: &mut T,
    expected: &'static str,
) -> Result<[u8; N], TransportError> {
    let raw = transport.read_raw(N)?;
    <[u8; N]>::try_from(raw.as_slice()).map_err(|_| {
        log::debug!("Expected {} bytes for a {}, got {}", N, expected, raw.len());
        TransportError::Timeout { expected }
    })
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub byte_order: ByteOrder,
}

impl TransportConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            ..Self::default()
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 1_000_000,
            read_timeout: Duration::from_millis(500),
            byte_order: ByteOrder::Little,
        }
    }
}

pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
    byte_order: ByteOrder,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.serial.name())
            .field("byte_order", &self.byte_order)
            .finish()
    }
}

impl SerialTransport {
    /// Open the serial port described by `config` and drop any stale bytes.
    pub fn open(config: &TransportConfig) -> Result<Self, TransportError> {
        log::debug!(
            "Opening instrument on {} at {} baud",
            config.port,
            config.baud_rate
        );
        let serial = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;

        let mut transport = Self {
            serial,
            byte_order: config.byte_order,
        };
        transport.flush()?;
        Ok(transport)
    }

    /// Flush the serial buffer
    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.serial.write_all(bytes)?;
        Ok(())
    }

    fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0u8; n];
        match self.serial.read_exact(&mut buffer) {
            Ok(()) => Ok(buffer),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Err(TransportError::Timeout { expected: "data" })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn wait_for_data(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let start = Instant::now();
        loop {
            if self.serial.bytes_to_read()? > 0 {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
