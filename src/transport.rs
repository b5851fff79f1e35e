//! Byte channels carrying GAIA packets to the device.
//!
//! The upgrade driver only ever writes; received bytes are fed back through
//! [`crate::driver::UpgradeHandle::receive`] by whoever owns the read side.

use std::io::Read;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{SERIAL_BAUD_RATE, SERIAL_READ_TIMEOUT};
use crate::driver::UpgradeHandle;
use crate::error::{TransportError, TransportResult};
use crate::gaia::FrameDecoder;

#[cfg(test)]
use mockall::automock;

/// Outbound side of a link to the device.
#[cfg_attr(test, automock)]
pub trait Transport: Send {
    /// Write one encoded GAIA packet.
    fn write(&mut self, data: &[u8]) -> TransportResult<()>;
}

/// Serial (RFCOMM) transport implementation.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at the standard baud rate.
    pub fn open(port_name: &str) -> TransportResult<Self> {
        Self::open_with_baud(port_name, SERIAL_BAUD_RATE)
    }

    /// Open a serial port with a specific baud rate.
    ///
    /// RFCOMM ports can briefly report themselves busy right after the
    /// Bluetooth link comes up; transient failures are retried.
    pub fn open_with_baud(port_name: &str, baud_rate: u32) -> TransportResult<Self> {
        const MAX_OPEN_RETRIES: u32 = 10;
        const RETRY_DELAY_MS: u64 = 200;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match serialport::new(port_name, baud_rate)
                .timeout(SERIAL_READ_TIMEOUT)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .open()
            {
                Ok(port) => {
                    port.clear(serialport::ClearBuffer::Input).ok();
                    debug!("Opened {} at {} baud", port_name, baud_rate);
                    return Ok(Self { port });
                }
                Err(e) => {
                    let err_str = e.to_string().to_lowercase();
                    let is_transient = err_str.contains("temporarily unavailable")
                        || err_str.contains("interrupted")
                        || err_str.contains("busy");

                    if !is_transient || attempt >= MAX_OPEN_RETRIES {
                        return Err(TransportError::Serial(e));
                    }

                    warn!(
                        "Opening {} failed ({}), retrying ({}/{})",
                        port_name, e, attempt, MAX_OPEN_RETRIES
                    );
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
    }

    /// Second handle on the same port, for reading while this one writes.
    pub fn try_clone(&self) -> TransportResult<Self> {
        Ok(Self {
            port: self.port.try_clone()?,
        })
    }

    /// Read with a timeout. Returns 0 when nothing arrived in time.
    pub fn read(&mut self, buffer: &mut [u8], timeout_ms: u64) -> TransportResult<usize> {
        self.port.set_timeout(Duration::from_millis(timeout_ms))?;

        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    /// Read serial frames on a blocking thread and hand each one to `handle`.
    ///
    /// Stops when the port fails or the driver has shut down.
    pub fn spawn_reader(mut self, handle: UpgradeHandle) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            let mut decoder = FrameDecoder::new();
            let mut buffer = [0u8; 256];

            loop {
                let n = match self.read(&mut buffer, SERIAL_READ_TIMEOUT.as_millis() as u64) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Serial read failed: {}", e);
                        return;
                    }
                };

                for frame in decoder.push(&buffer[..n]) {
                    match frame {
                        Ok(packet) => {
                            if handle.receive(packet.to_bytes().to_vec()).is_err() {
                                debug!("Driver stopped, closing serial reader");
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping serial frame: {}", e),
                    }
                }

                if handle.is_closed() {
                    return;
                }
            }
        })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        use std::io::Write;

        self.port.write_all(data)?;
        Ok(())
    }
}

/// Transport that forwards every packet to a channel.
///
/// For hosts whose link lives elsewhere (a BLE stack, a test).
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(sender: UnboundedSender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl Transport for ChannelTransport {
    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        self.sender
            .send(data.to_vec())
            .map_err(|_| TransportError::Closed)
    }
}
