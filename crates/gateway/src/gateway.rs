use crate::config::{DeviceConfig, GatewayConfig};
use crate::entity::{build_entities, Entity, EntityCommand, EntitySnapshot};
use crate::{GatewayError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rfplayer_client::{ClientConfig, ClientEvent, RfPlayerClient};
use rfplayer_profiles::ProfileRegistry;
use rfplayer_protocol::{validate_command_protocol, RfDeviceEvent, GATEWAY_PROTOCOL};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const SIGNAL_CAPACITY: usize = 256;

/// Notifications broadcast to gateway subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewaySignal {
    Event(RfDeviceEvent),
    Availability(bool),
    DeviceAdded(String),
    DeviceRemoved(String),
    EntityUpdated(EntitySnapshot),
}

/// Opens client connections. The serial implementation is
/// [`SerialConnector`]; tests plug in in-memory transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &ClientConfig,
    ) -> rfplayer_client::Result<(RfPlayerClient, mpsc::UnboundedReceiver<ClientEvent>)>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(
        &self,
        config: &ClientConfig,
    ) -> rfplayer_client::Result<(RfPlayerClient, mpsc::UnboundedReceiver<ClientEvent>)> {
        let (mut client, events) = RfPlayerClient::new(config.clone());
        client.connect().await?;
        Ok((client, events))
    }
}

struct Inner {
    config: Mutex<GatewayConfig>,
    config_path: Option<PathBuf>,
    save_lock: Mutex<()>,
    registry: Arc<ProfileRegistry>,
    connector: Box<dyn Connector>,
    client: Mutex<Option<RfPlayerClient>>,
    entities: Mutex<BTreeMap<String, Entity>>,
    signals: broadcast::Sender<GatewaySignal>,
    shutdown: watch::Sender<bool>,
}

/// Runtime of one RfPlayer gateway: keeps the connection alive, tracks
/// devices and their entities, and exposes services.
///
/// Cloning is cheap; clones share the same gateway.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, registry: Arc<ProfileRegistry>) -> Self {
        Self::with_connector(config, registry, Box::new(SerialConnector))
    }

    pub fn with_connector(
        config: GatewayConfig,
        registry: Arc<ProfileRegistry>,
        connector: Box<dyn Connector>,
    ) -> Self {
        let entities = config
            .devices
            .values()
            .flat_map(|device| build_entities(device, &registry))
            .map(|entity| (entity.unique_id().to_string(), entity))
            .collect();
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config: Mutex::new(config),
                config_path: None,
                save_lock: Mutex::new(()),
                registry,
                connector,
                client: Mutex::new(None),
                entities: Mutex::new(entities),
                signals,
                shutdown,
            }),
        }
    }

    /// Load the config at `path`; device changes are saved back to it.
    /// A `profiles_file` in the config is registered ahead of the built-in
    /// profiles.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = GatewayConfig::load(path)?;
        let registry = load_registry(&config, path.parent())?;
        let mut gateway = Self::new(config, Arc::new(registry));
        gateway.set_config_path(path.to_path_buf());
        Ok(gateway)
    }

    /// Only valid before the gateway is cloned or started.
    pub fn set_config_path(&mut self, path: PathBuf) {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.config_path = Some(path);
        } else {
            warn!("config path ignored: gateway already shared");
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewaySignal> {
        self.inner.signals.subscribe()
    }

    pub async fn connected(&self) -> bool {
        self.inner
            .client
            .lock()
            .await
            .as_ref()
            .is_some_and(RfPlayerClient::connected)
    }

    pub async fn config(&self) -> GatewayConfig {
        self.inner.config.lock().await.clone()
    }

    pub async fn entities(&self) -> Vec<EntitySnapshot> {
        self.inner
            .entities
            .lock()
            .await
            .values()
            .map(Entity::snapshot)
            .collect()
    }

    /// Ask [`Gateway::run`] to stop.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    /// Connect and process events until [`Gateway::shutdown`] is called,
    /// reconnecting whenever the link fails.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown = self.inner.shutdown.subscribe();
        while !*shutdown.borrow() {
            let (client_config, reconnect_interval) = {
                let config = self.inner.config.lock().await;
                (config.client_config(), config.reconnect_interval())
            };

            info!("Initiating RfPlayer connection on {}", client_config.port);
            let connected = tokio::time::timeout(
                CONNECTION_TIMEOUT,
                self.inner.connector.connect(&client_config),
            )
            .await
            .map_err(|_| GatewayError::ConnectTimeout(CONNECTION_TIMEOUT.as_secs()))
            .and_then(|result| result.map_err(GatewayError::from));

            let events = match connected {
                Ok((client, events)) => {
                    *self.inner.client.lock().await = Some(client);
                    self.signal(GatewaySignal::Availability(true));
                    info!("Connected to RfPlayer");
                    events
                }
                Err(err) => {
                    error!(
                        "Error connecting to RfPlayer, reconnecting in {}s: {err}",
                        reconnect_interval.as_secs()
                    );
                    self.signal(GatewaySignal::Availability(false));
                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            };

            let disconnected = self.pump(events, &mut shutdown).await;
            let client = self.inner.client.lock().await.take();
            if let Some(mut client) = client {
                if disconnected.is_some() {
                    client.close();
                } else {
                    client.flush_and_close().await;
                }
            }
            self.signal(GatewaySignal::Availability(false));
            match disconnected {
                Some(reason) => warn!("Disconnected from RfPlayer ({reason}), reconnecting"),
                None => break,
            }
        }
        info!("RfPlayer gateway stopped");
        Ok(())
    }

    /// Dispatch client events. Returns the disconnect reason, or `None` on
    /// shutdown.
    async fn pump(
        &self,
        mut events: mpsc::UnboundedReceiver<ClientEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<String> {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ClientEvent::Event(event)) => self.handle_receive(event).await,
                    Some(ClientEvent::Disconnected(reason)) => return Some(reason),
                    None => return Some("event channel closed".to_string()),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                }
            }
        }
    }

    /// Register unknown devices, apply redirects, then dispatch the event to
    /// subscribers and entities.
    pub async fn handle_receive(&self, mut event: RfDeviceEvent) {
        let id = event.id_string();
        debug!("Received event from {id}");

        let mut added = None;
        {
            let mut config = self.inner.config.lock().await;
            if config.automatic_add
                && event.device.protocol != GATEWAY_PROTOCOL
                && config.device(&id).is_none()
                && config.redirect_target(&id).is_none()
            {
                let device = self.device_from_event(&event);
                info!(
                    "Added device {id} (Proto: {} Addr: {} Model: {})",
                    device.protocol,
                    device.address,
                    device.model.as_deref().unwrap_or("-")
                );
                config.add_device(device.clone());
                added = Some(device);
            }

            if let Some(target) = config.redirect_target(&id) {
                debug!("Redirecting {id} to {}", target.id_string());
                event.device.address = target.address.clone();
            }
        }

        if let Some(device) = added {
            self.persist().await;
            self.insert_entities(&device).await;
            self.signal(GatewaySignal::DeviceAdded(device.id_string()));
        }

        self.signal(GatewaySignal::Event(event.clone()));

        let mut entities = self.inner.entities.lock().await;
        for entity in entities.values_mut() {
            if entity.applies_to(&event) && entity.apply_event(&event) {
                self.signal(GatewaySignal::EntityUpdated(entity.snapshot()));
            }
        }
    }

    pub async fn send_raw_command(&self, command: &str) -> Result<()> {
        let client = self.inner.client.lock().await;
        let client = connected_client(&client)?;
        client.send_raw_command(command)?;
        Ok(())
    }

    pub async fn send_pairing_command(&self, protocol: &str, address: &str) -> Result<()> {
        let client = self.inner.client.lock().await;
        let client = connected_client(&client)?;
        client.send_pairing_command(protocol, address)?;
        Ok(())
    }

    pub async fn simulate_event(&self, event: Value) -> Result<()> {
        let client = self.inner.client.lock().await;
        let client = connected_client(&client)?;
        client.simulate_event(event)?;
        Ok(())
    }

    /// Manually add a device. Without a profile name the device has no
    /// entities until one is set.
    pub async fn add_device(
        &self,
        protocol: &str,
        address: &str,
        profile_name: Option<&str>,
    ) -> Result<String> {
        validate_command_protocol(protocol)?;
        let address = address.trim();
        if address.is_empty() {
            return Err(GatewayError::InvalidConfig("device address must not be empty".to_string()));
        }
        if let Some(name) = profile_name {
            if self.inner.registry.profile(name).is_none() {
                return Err(GatewayError::UnknownProfile(name.to_string()));
            }
        }

        let mut device = DeviceConfig::new(protocol, address);
        device.profile_name = profile_name.map(str::to_string);
        let id = {
            let mut config = self.inner.config.lock().await;
            config.add_device(device.clone())
        };
        self.persist().await;
        self.remove_entities(&id).await;
        self.insert_entities(&device).await;
        info!("Added device {id}");
        self.signal(GatewaySignal::DeviceAdded(id.clone()));
        Ok(id)
    }

    pub async fn remove_device(&self, id_string: &str) -> Result<()> {
        self.inner
            .config
            .lock()
            .await
            .remove_device(id_string)?;
        self.persist().await;
        self.remove_entities(id_string).await;
        info!("Removed device {id_string}");
        self.signal(GatewaySignal::DeviceRemoved(id_string.to_string()));
        Ok(())
    }

    pub async fn set_redirect_address(&self, id_string: &str, redirect: Option<String>) -> Result<()> {
        self.inner
            .config
            .lock()
            .await
            .set_redirect_address(id_string, redirect)?;
        self.persist().await;
        Ok(())
    }

    /// Send the command built by an entity and apply its optimistic state.
    pub async fn entity_command(&self, unique_id: &str, command: EntityCommand) -> Result<()> {
        let mut entities = self.inner.entities.lock().await;
        let entity = entities
            .get_mut(unique_id)
            .ok_or_else(|| GatewayError::UnknownEntity(unique_id.to_string()))?;
        let line = entity.build_command(&command)?;
        info!("{command} {unique_id}");
        self.send_raw_command(&line).await?;
        entity.apply_command(&command);
        self.signal(GatewaySignal::EntityUpdated(entity.snapshot()));
        Ok(())
    }

    fn device_from_event(&self, event: &RfDeviceEvent) -> DeviceConfig {
        let mut device = DeviceConfig::new(&event.device.protocol, &event.device.address);
        device.model = event.device.model.clone();
        device.profile_name = event
            .json()
            .and_then(|json| self.inner.registry.profile_name_for_event(json))
            .map(str::to_string);
        device
    }

    async fn insert_entities(&self, device: &DeviceConfig) {
        let mut entities = self.inner.entities.lock().await;
        for entity in build_entities(device, &self.inner.registry) {
            entities.insert(entity.unique_id().to_string(), entity);
        }
    }

    async fn remove_entities(&self, id_string: &str) {
        self.inner
            .entities
            .lock()
            .await
            .retain(|_, entity| entity.device().id_string() != id_string);
    }

    /// Save a snapshot of the config off the runtime threads. Saves are
    /// serialised and each one snapshots the latest config.
    async fn persist(&self) {
        let Some(path) = self.inner.config_path.clone() else {
            return;
        };
        let _saving = self.inner.save_lock.lock().await;
        let config = self.inner.config.lock().await.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || config.save(&target)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("Failed to save config {}: {err}", path.display()),
            Err(err) => error!("Config save task failed: {err}"),
        }
    }

    fn signal(&self, signal: GatewaySignal) {
        // No subscriber is not an error.
        let _ = self.inner.signals.send(signal);
    }
}

fn connected_client(client: &Option<RfPlayerClient>) -> Result<&RfPlayerClient> {
    client
        .as_ref()
        .filter(|c| c.connected())
        .ok_or(GatewayError::NotConnected)
}

/// Custom profiles from the config first, then the built-in ones.
/// A relative `profiles_file` is resolved against `base_dir`.
pub fn load_registry(config: &GatewayConfig, base_dir: Option<&Path>) -> Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::new();
    if let Some(file) = &config.profiles_file {
        let path = match base_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        };
        let added = registry.register_file(&path)?;
        info!("Loaded {added} profiles from {}", path.display());
    }
    registry.extend(ProfileRegistry::builtin()?)?;
    Ok(registry)
}
