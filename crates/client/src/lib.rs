//! Async client for RfPlayer RF gateways.
//!
//! The client owns the serial link: it plays the init script on connect,
//! decodes incoming frames into [`RfDeviceEvent`]s and reports them, along
//! with disconnections, as [`ClientEvent`]s on an unbounded channel.
//!
//! [`RfDeviceEvent`]: rfplayer_protocol::RfDeviceEvent

mod client;
mod error;
mod transport;

pub use client::{ClientConfig, ClientEvent, RfPlayerClient, DEFAULT_BAUD, DEFAULT_PORT};
pub use error::{ClientError, Result};
pub use transport::{BoxedReader, BoxedWriter, Transport, SIMULATOR_PORT};

/// Serial ports visible on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(|err| ClientError::Connection {
        port: "*".to_string(),
        message: err.to_string(),
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
