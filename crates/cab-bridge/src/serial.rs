//! Serial port helpers
//!
//! Every cabinet link is a plain 8N1 serial line; only the baud rate differs
//! between devices.

use std::time::Duration;

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::error::BridgeError;

/// Default baud rate of the legacy touch panel
pub const LEGACY_BAUD: u32 = 9600;

/// Default baud rate the game host uses for modern touch panels
pub const MODERN_BAUD: u32 = 115_200;

/// Default baud rate of the JVS bus
pub const JVS_BAUD: u32 = 115_200;

/// Open a serial port for async use
pub fn open_port(port_name: &str, baud_rate: u32) -> Result<SerialStream, BridgeError> {
    let stream = tokio_serial::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|source| BridgeError::Serial {
            port: port_name.to_string(),
            source,
        })?;
    info!("Opened {} at {} baud", port_name, baud_rate);
    Ok(stream)
}
