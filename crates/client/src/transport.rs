use crate::{ClientError, Result};
use log::{debug, info};
use rfplayer_protocol::{COMMAND_HEADER, END_OF_LINE};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, DuplexStream};
use tokio_serial::SerialPortBuilderExt;

/// Port name that opens an in-memory gateway instead of a serial device.
pub const SIMULATOR_PORT: &str = "simulator";

const SIMULATOR_BUFFER: usize = 64 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte stream to a gateway, split into its read and write halves.
pub struct Transport {
    pub(crate) reader: BoxedReader,
    pub(crate) writer: BoxedWriter,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

impl Transport {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn from_parts(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }

    /// Open `port` at `baud`, or the in-memory simulator.
    pub fn open(port: &str, baud: u32) -> Result<Self> {
        if port == SIMULATOR_PORT {
            info!("Opening simulated RfPlayer gateway");
            return Ok(Self::from_stream(spawn_simulator()));
        }

        let stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|err| ClientError::Connection {
                port: port.to_string(),
                message: err.to_string(),
            })?;
        info!("Opened serial port {port} at {baud} baud");
        Ok(Self::from_stream(stream))
    }
}

/// Gateway side of the simulator: accepts and logs commands, never emits
/// frames on its own. Events are injected with `simulate_event`.
fn spawn_simulator() -> DuplexStream {
    let (client_side, gateway_side) = tokio::io::duplex(SIMULATOR_BUFFER);
    tokio::spawn(async move {
        let mut lines = BufReader::new(gateway_side).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = line
                .trim_matches(|c: char| END_OF_LINE.contains(c))
                .trim_start_matches(COMMAND_HEADER);
            if !command.is_empty() {
                debug!("simulator received command: {command}");
            }
        }
        debug!("simulator stopped");
    });
    client_side
}
