//! Byte transport beneath the wire protocol

use crate::error::Result;
use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Fixed link speed of the rover firmware
pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// How long one read may block before reporting no data
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Transport trait for the microcontroller link
pub trait Transport: Send {
    /// Read available bytes, `Ok(0)` when the read timed out without data
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush pending writes
    fn flush(&mut self) -> Result<()>;

    /// Second handle to the same link, used to read and write from different threads
    fn try_clone(&self) -> Result<Box<dyn Transport>>;
}

/// Serial port transport (115200 8N1, no flow control)
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port with the firmware's line settings
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, SERIAL_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(SERIAL_READ_TIMEOUT)
            .open()?;

        info!("Opened serial port: {} at {} baud", path, SERIAL_BAUD_RATE);

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(SerialTransport { port }))
    }
}
