use crate::transport::{BoxedReader, BoxedWriter, Transport};
use crate::{ClientError, Result};
use log::{debug, info, warn};
use rfplayer_protocol::{
    encode_command, init_script, pairing_command, FrameDecoder, RfDeviceEvent,
    RfDeviceEventAdapter, RfPlayerPacket,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub port: String,
    pub baud: u32,
    /// Receivers enabled on connect; empty keeps the gateway's setting.
    pub receiver_protocols: Vec<String>,
    /// Extra commands played after the receiver selection, `;` or newline
    /// separated.
    pub init_commands: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            receiver_protocols: Vec::new(),
            init_commands: None,
        }
    }
}

impl ClientConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn init_script(&self) -> Vec<String> {
        init_script(
            Some(self.receiver_protocols.as_slice()),
            self.init_commands.as_deref(),
        )
    }
}

/// Notifications emitted by a connected client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Event(RfDeviceEvent),
    Disconnected(String),
}

struct Connection {
    commands: mpsc::UnboundedSender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn shutdown(self) {
        self.alive.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.writer.abort();
    }

    /// Let the writer drain queued commands, then stop.
    async fn finish(self) {
        self.alive.store(false, Ordering::SeqCst);
        drop(self.commands);
        if let Err(err) = self.writer.await {
            debug!("writer task ended abnormally: {err}");
        }
        self.reader.abort();
    }
}

/// Client to one RfPlayer gateway.
///
/// Events and disconnections are delivered on the receiver returned by
/// [`RfPlayerClient::new`].
pub struct RfPlayerClient {
    config: ClientConfig,
    adapter: RfDeviceEventAdapter,
    events: mpsc::UnboundedSender<ClientEvent>,
    connection: Option<Connection>,
}

impl RfPlayerClient {
    pub fn new(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let adapter = RfDeviceEventAdapter::new(config.port.clone());
        let client = Self {
            config,
            adapter,
            events,
            connection: None,
        };
        (client, receiver)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.alive.load(Ordering::SeqCst))
    }

    /// Open the configured port and play the init script.
    pub async fn connect(&mut self) -> Result<()> {
        let transport = Transport::open(&self.config.port, self.config.baud)?;
        self.connect_with(transport)
    }

    /// Start reading from and writing to an already opened transport.
    pub fn connect_with(&mut self, transport: Transport) -> Result<()> {
        self.close();

        let (commands, command_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let Transport { reader, writer } = transport;

        let writer = tokio::spawn(write_loop(writer, command_rx));
        let reader = tokio::spawn(read_loop(
            reader,
            self.adapter.clone(),
            self.events.clone(),
            Arc::clone(&alive),
        ));

        self.connection = Some(Connection {
            commands,
            alive,
            reader,
            writer,
        });

        for command in self.config.init_script() {
            self.send_raw_command(&command)?;
        }
        info!("Connected to RfPlayer on {}", self.config.port);
        Ok(())
    }

    pub fn send_raw_command(&self, command: &str) -> Result<()> {
        let connection = self
            .connection
            .as_ref()
            .filter(|c| c.alive.load(Ordering::SeqCst))
            .ok_or(ClientError::NotConnected)?;
        debug!("sending raw packet: {command}");
        connection
            .commands
            .send(encode_command(command))
            .map_err(|_| ClientError::NotConnected)
    }

    /// `ASSOC <protocol> ID <address>`.
    pub fn send_pairing_command(&self, protocol: &str, address: &str) -> Result<()> {
        let command = pairing_command(protocol, address)?;
        self.send_raw_command(&command)
    }

    /// Deliver a JSON frame as if the gateway had sent it.
    pub fn simulate_event(&self, event: Value) -> Result<()> {
        if !self.connected() {
            return Err(ClientError::NotConnected);
        }
        let event = self.adapter.adapt(RfPlayerPacket::Json(event))?;
        debug!("simulating event from {}", event.id_string());
        self.events
            .send(ClientEvent::Event(event))
            .map_err(|_| ClientError::NotConnected)
    }

    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
            info!("Closed connection to {}", self.config.port);
        }
    }

    /// Close after every queued command has been written.
    pub async fn flush_and_close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.finish().await;
            info!("Closed connection to {}", self.config.port);
        }
    }
}

impl Drop for RfPlayerClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }
    }
}

async fn write_loop(mut writer: BoxedWriter, mut commands: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = commands.recv().await {
        let written = async {
            writer.write_all(&data).await?;
            writer.flush().await
        }
        .await;
        if let Err(err) = written {
            warn!("failed to write to gateway: {err}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: BoxedReader,
    adapter: RfDeviceEventAdapter,
    events: mpsc::UnboundedSender<ClientEvent>,
    alive: Arc<AtomicBool>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break "connection closed".to_string(),
            Ok(n) => n,
            Err(err) => break err.to_string(),
        };
        for packet in decoder.decode(&buf[..n]) {
            match adapter.adapt(packet) {
                Ok(event) => {
                    if events.send(ClientEvent::Event(event)).is_err() {
                        debug!("event receiver dropped, stopping reader");
                        alive.store(false, Ordering::SeqCst);
                        return;
                    }
                }
                Err(err) => warn!("dropping event: {err}"),
            }
        }
    };

    alive.store(false, Ordering::SeqCst);
    warn!("connection lost: {reason}");
    let _ = events.send(ClientEvent::Disconnected(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::DuplexStream;

    fn connected_client(config: ClientConfig) -> (RfPlayerClient, mpsc::UnboundedReceiver<ClientEvent>, DuplexStream) {
        let (mut client, events) = RfPlayerClient::new(config);
        let (client_side, gateway_side) = tokio::io::duplex(4096);
        client
            .connect_with(Transport::from_stream(client_side))
            .unwrap();
        (client, events, gateway_side)
    }

    async fn read_exactly(gateway: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        gateway.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn send_without_connection_fails() {
        let (client, _events) = RfPlayerClient::new(ClientConfig::default());
        assert!(!client.connected());
        assert!(matches!(
            client.send_raw_command("HELLO"),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.simulate_event(json!({})),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn init_script_includes_receivers_and_commands() {
        let config = ClientConfig {
            receiver_protocols: vec!["X2D".to_string(), "RTS".to_string()],
            init_commands: Some("LEDACTIVITY 0; STATUS".to_string()),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.init_script(),
            vec![
                "FORMAT JSON",
                "RECEIVER -* +X2D +RTS",
                "LEDACTIVITY 0",
                "STATUS"
            ]
        );
    }

    #[tokio::test]
    async fn connect_writes_init_script_then_commands() {
        let (client, _events, mut gateway) = connected_client(ClientConfig::new("test"));
        assert!(client.connected());
        let expected = "ZIA++FORMAT JSON\n\r";
        assert_eq!(read_exactly(&mut gateway, expected.len()).await, expected);

        client.send_raw_command("HELLO").unwrap();
        let expected = "ZIA++HELLO\n\r";
        assert_eq!(read_exactly(&mut gateway, expected.len()).await, expected);

        client.send_pairing_command("BLYSS", "12345").unwrap();
        let expected = "ZIA++ASSOC BLYSS ID 12345\n\r";
        assert_eq!(read_exactly(&mut gateway, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn pairing_rejects_unknown_protocol() {
        let (client, _events, _gateway) = connected_client(ClientConfig::new("test"));
        assert!(matches!(
            client.send_pairing_command("BOGUS", "1"),
            Err(ClientError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn received_frames_become_events() {
        let (_client, mut events, mut gateway) = connected_client(ClientConfig::new("/dev/ttyACM0"));
        gateway
            .write_all(b"ZIA--Welcome to Ziblue Dooya!\n\rZIA33{\"frame\":{\"header\":{\"protocolMeaning\":\"BLYSS\",\"infoType\":\"1\"},\"infos\":{\"id\":\"256\"}}}\n\r")
            .await
            .unwrap();

        let Some(ClientEvent::Event(welcome)) = events.recv().await else {
            panic!("expected gateway event");
        };
        assert_eq!(welcome.id_string(), "gateway_/dev/ttyACM0");
        assert_eq!(
            welcome.data.as_simple(),
            Some("Welcome to Ziblue Dooya!")
        );

        let Some(ClientEvent::Event(blyss)) = events.recv().await else {
            panic!("expected device event");
        };
        assert_eq!(blyss.id_string(), "BLYSS_256");
        assert_eq!(blyss.device.model.as_deref(), Some("switch"));
    }

    #[tokio::test]
    async fn end_of_stream_disconnects() {
        let (client, mut events, gateway) = connected_client(ClientConfig::new("test"));
        drop(gateway);
        match events.recv().await {
            Some(ClientEvent::Disconnected(reason)) => assert_eq!(reason, "connection closed"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!client.connected());
        assert!(matches!(
            client.send_raw_command("HELLO"),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn simulated_event_is_delivered() {
        let (client, mut events, _gateway) = connected_client(ClientConfig::new("test"));
        client
            .simulate_event(json!({
                "frame": {"header": {"protocolMeaning": "X2D", "infoType": "10"}, "infos": {"id": "1054806"}}
            }))
            .unwrap();
        let Some(ClientEvent::Event(event)) = events.recv().await else {
            panic!("expected simulated event");
        };
        assert_eq!(event.id_string(), "X2D_1054806");
    }

    #[tokio::test]
    async fn flush_and_close_writes_pending_commands() {
        let (mut client, _events, mut gateway) = connected_client(ClientConfig::new("test"));
        client.send_raw_command("PING").unwrap();
        client.flush_and_close().await;
        assert!(!client.connected());

        let mut written = String::new();
        gateway.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "ZIA++FORMAT JSON\n\rZIA++PING\n\r");
    }

    #[tokio::test]
    async fn close_disconnects() {
        let (mut client, _events, _gateway) = connected_client(ClientConfig::new("test"));
        client.close();
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn simulator_port_connects() {
        let (mut client, mut events) = RfPlayerClient::new(ClientConfig::new(crate::SIMULATOR_PORT));
        client.connect().await.unwrap();
        client.send_raw_command("HELLO").unwrap();
        client
            .simulate_event(json!({
                "frame": {"header": {"protocolMeaning": "RTS", "infoType": "3"}, "infos": {"id": "7"}}
            }))
            .unwrap();
        let Some(ClientEvent::Event(event)) = events.recv().await else {
            panic!("expected simulated event");
        };
        assert_eq!(event.id_string(), "RTS_7");
    }
}
