//! Serial port transport (115200 baud, 8N1).

use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::info;

use crate::error::Result;

/// Line speed of the serial API.
pub const BAUD_RATE: u32 = 115_200;

/// Open `path` configured for the serial API.
pub fn open_serial(path: &str) -> Result<SerialStream> {
    let port = tokio_serial::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()?;
    info!(path, baud = BAUD_RATE, "Opened serial port");
    Ok(port)
}
