use crate::{GatewayError, Result};
use log::{debug, info};
use rfplayer_client::{ClientConfig, DEFAULT_BAUD, DEFAULT_PORT};
use rfplayer_protocol::{id_string, validate_receiver_protocol, RfDeviceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RECONNECT_INTERVAL: u64 = 10;

pub const JAMMING_DEVICE_ID: &str = "JAMMING_0";
pub const JAMMING_PROTOCOL: &str = "JAMMING";
pub const JAMMING_ADDRESS: &str = "0";
pub const JAMMING_PROFILE: &str = "Jamming Detector";

/// One RF device known to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub protocol: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    /// Another address of the same protocol whose events are merged into
    /// this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_address: Option<String>,
}

impl DeviceConfig {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            address: address.into(),
            model: None,
            profile_name: None,
            redirect_address: None,
        }
    }

    pub fn with_profile(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = Some(profile_name.into());
        self
    }

    pub fn id_string(&self) -> String {
        id_string(&self.protocol, &self.address)
    }

    pub fn device_id(&self) -> RfDeviceId {
        RfDeviceId {
            protocol: self.protocol.clone(),
            address: self.address.clone(),
            model: self.model.clone(),
        }
    }

    fn jamming() -> Self {
        Self::new(JAMMING_PROTOCOL, JAMMING_ADDRESS).with_profile(JAMMING_PROFILE)
    }
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval() -> u64 {
    DEFAULT_RECONNECT_INTERVAL
}

/// Gateway configuration, stored as TOML.
///
/// ```toml
/// port = "/dev/ttyUSB0"
/// automatic_add = true
/// receiver_protocols = ["X2D", "RTS"]
///
/// [devices.BLYSS_256]
/// protocol = "BLYSS"
/// address = "256"
/// profile_name = "Blyss Switch"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_true")]
    pub automatic_add: bool,
    /// Seconds between connection attempts.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    #[serde(default)]
    pub receiver_protocols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_commands: Option<String>,
    /// Extra profile file tried before the built-in profiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles_file: Option<PathBuf>,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
    #[serde(skip)]
    redirect_address: BTreeMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut config = Self {
            port: default_port(),
            baud: DEFAULT_BAUD,
            automatic_add: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            receiver_protocols: Vec::new(),
            init_commands: None,
            profiles_file: None,
            devices: BTreeMap::new(),
            redirect_address: BTreeMap::new(),
        };
        config.normalize();
        config
    }
}

impl GatewayConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            "Loaded config {} with {} devices",
            path.display(),
            config.devices.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the config, replacing the file in one rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconnect_interval == 0 {
            return Err(GatewayError::InvalidConfig(
                "reconnect_interval must be greater than 0".to_string(),
            ));
        }
        if self.port.trim().is_empty() {
            return Err(GatewayError::InvalidConfig("port must not be empty".to_string()));
        }
        for protocol in &self.receiver_protocols {
            validate_receiver_protocol(protocol)?;
        }
        for (key, device) in &self.devices {
            let expected = device.id_string();
            if *key != expected {
                return Err(GatewayError::InvalidConfig(format!(
                    "device key {key} does not match {expected}"
                )));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.devices
            .entry(JAMMING_DEVICE_ID.to_string())
            .or_insert_with(DeviceConfig::jamming);
        self.rebuild_redirects();
    }

    fn rebuild_redirects(&mut self) {
        self.redirect_address = self
            .devices
            .iter()
            .filter_map(|(id, device)| {
                let redirect = device.redirect_address.as_deref()?;
                Some((id_string(&device.protocol, redirect), id.clone()))
            })
            .collect();
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            port: self.port.clone(),
            baud: self.baud,
            receiver_protocols: self.receiver_protocols.clone(),
            init_commands: self.init_commands.clone(),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval)
    }

    /// Device an event id is redirected to.
    pub fn redirect_target(&self, id_string: &str) -> Option<&DeviceConfig> {
        let target = self.redirect_address.get(id_string)?;
        self.devices.get(target)
    }

    pub fn redirects(&self) -> &BTreeMap<String, String> {
        &self.redirect_address
    }

    pub fn device(&self, id_string: &str) -> Option<&DeviceConfig> {
        self.devices.get(id_string)
    }

    /// Insert or replace a device, returning its id string.
    pub fn add_device(&mut self, device: DeviceConfig) -> String {
        let id = device.id_string();
        self.devices.insert(id.clone(), device);
        self.rebuild_redirects();
        id
    }

    pub fn remove_device(&mut self, id_string: &str) -> Result<DeviceConfig> {
        if id_string == JAMMING_DEVICE_ID {
            return Err(GatewayError::ProtectedDevice(id_string.to_string()));
        }
        let removed = self
            .devices
            .remove(id_string)
            .ok_or_else(|| GatewayError::UnknownDevice(id_string.to_string()))?;
        self.rebuild_redirects();
        Ok(removed)
    }

    pub fn set_redirect_address(&mut self, id_string: &str, redirect: Option<String>) -> Result<()> {
        let redirect = redirect
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let device = self
            .devices
            .get_mut(id_string)
            .ok_or_else(|| GatewayError::UnknownDevice(id_string.to_string()))?;
        if redirect.as_deref() == Some(device.address.as_str()) {
            return Err(GatewayError::InvalidConfig(format!(
                "device {id_string} cannot redirect to its own address"
            )));
        }
        device.redirect_address = redirect;
        self.rebuild_redirects();
        Ok(())
    }
}
