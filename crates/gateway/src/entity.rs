//! Entities: the per-device values a profile exposes, kept up to date from
//! incoming events and able to build outgoing commands.

use crate::config::DeviceConfig;
use crate::{GatewayError, Result};
use log::{debug, info};
use rfplayer_profiles::{
    AnyPlatformConfig, ClimateConfig, ClimateEventType, CommandParams, CoverConfig, CoverState,
    LightConfig, Platform, ProfileRegistry, SensorConfig, SwitchConfig,
};
use rfplayer_protocol::{RfDeviceEvent, RfDeviceId};
use serde::Serialize;
use serde_json::Value;

pub const COMMAND_ON_LIST: [&str; 3] = ["on", "all_on", "dim"];
pub const COMMAND_OFF_LIST: [&str; 2] = ["off", "all_off"];
pub const COMMAND_GROUP_LIST: [&str; 2] = ["all_on", "all_off"];
const BINARY_ON_LIST: [&str; 3] = ["1", "on", "true"];

pub const HVAC_MODE_OFF: &str = "off";
pub const HVAC_MODE_HEAT: &str = "heat";

/// Owned platform configuration of one entity.
#[derive(Debug, Clone)]
pub enum EntityConfig {
    BinarySensor(SensorConfig),
    Climate(ClimateConfig),
    Cover(CoverConfig),
    Light(LightConfig),
    Sensor(SensorConfig),
    Switch(SwitchConfig),
}

impl From<AnyPlatformConfig<'_>> for EntityConfig {
    fn from(config: AnyPlatformConfig<'_>) -> Self {
        match config {
            AnyPlatformConfig::BinarySensor(c) => Self::BinarySensor(c.clone()),
            AnyPlatformConfig::Climate(c) => Self::Climate(c.clone()),
            AnyPlatformConfig::Cover(c) => Self::Cover(c.clone()),
            AnyPlatformConfig::Light(c) => Self::Light(c.clone()),
            AnyPlatformConfig::Sensor(c) => Self::Sensor(c.clone()),
            AnyPlatformConfig::Switch(c) => Self::Switch(c.clone()),
        }
    }
}

impl EntityConfig {
    pub fn platform(&self) -> Platform {
        match self {
            Self::BinarySensor(_) => Platform::BinarySensor,
            Self::Climate(_) => Platform::Climate,
            Self::Cover(_) => Platform::Cover,
            Self::Light(_) => Platform::Light,
            Self::Sensor(_) => Platform::Sensor,
            Self::Switch(_) => Platform::Switch,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::BinarySensor(c) | Self::Sensor(c) => &c.info.name,
            Self::Climate(c) => &c.info.name,
            Self::Cover(c) => &c.info.name,
            Self::Light(c) => &c.info.name,
            Self::Switch(c) => &c.info.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityState {
    Unknown,
    /// Sensor reading; NaN when the event carries no usable value.
    Measurement { value: f64, unit: Option<String> },
    OnOff { on: bool },
    Cover { state: CoverState },
    Climate {
        hvac_mode: Option<String>,
        preset_mode: Option<String>,
    },
}

/// Commands an entity can turn into a gateway command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityCommand {
    TurnOn,
    TurnOff,
    /// Light brightness, 0 to 100.
    SetLevel(u8),
    Open,
    Close,
    Stop,
    SetPresetMode(String),
    SetHvacMode(String),
}

impl std::fmt::Display for EntityCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TurnOn => f.write_str("turn_on"),
            Self::TurnOff => f.write_str("turn_off"),
            Self::SetLevel(level) => write!(f, "set_level {level}"),
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
            Self::Stop => f.write_str("stop"),
            Self::SetPresetMode(mode) => write!(f, "set_preset_mode {mode}"),
            Self::SetHvacMode(mode) => write!(f, "set_hvac_mode {mode}"),
        }
    }
}

/// Serializable view of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub unique_id: String,
    pub name: String,
    pub platform: Platform,
    pub device: String,
    pub state: EntityState,
}

#[derive(Debug, Clone)]
pub struct Entity {
    unique_id: String,
    device: RfDeviceId,
    config: EntityConfig,
    state: EntityState,
}

/// `Rf Level` -> `rf_level`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Entities of one configured device, in platform order.
pub fn build_entities(device: &DeviceConfig, registry: &ProfileRegistry) -> Vec<Entity> {
    let device_id = device.device_id();
    let profile_name = device.profile_name.as_deref();
    Platform::ALL
        .into_iter()
        .flat_map(|platform| registry.platform_configs(profile_name, platform))
        .map(|config| Entity::new(device_id.clone(), EntityConfig::from(config)))
        .collect()
}

impl Entity {
    pub fn new(device: RfDeviceId, config: EntityConfig) -> Self {
        let unique_id = format!("{}_{}", device.id_string(), slugify(config.name()));
        Self {
            unique_id,
            device,
            config,
            state: EntityState::Unknown,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn platform(&self) -> Platform {
        self.config.platform()
    }

    pub fn device(&self) -> &RfDeviceId {
        &self.device
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            unique_id: self.unique_id.clone(),
            name: self.name().to_string(),
            platform: self.platform(),
            device: self.device.id_string(),
            state: self.state.clone(),
        }
    }

    /// The event comes from this device, or is a group command addressed to
    /// this switch or light's group.
    pub fn applies_to(&self, event: &RfDeviceEvent) -> bool {
        if event.device.id_string() == self.device.id_string() {
            return true;
        }
        let status = match &self.config {
            EntityConfig::Switch(c) => &c.status,
            EntityConfig::Light(c) => &c.status,
            _ => return false,
        };
        let Some(json) = event.json() else {
            return false;
        };
        let is_group = status
            .get_value(json)
            .is_some_and(|v| COMMAND_GROUP_LIST.contains(&v.to_lowercase().as_str()));
        is_group
            && event.device.protocol == self.device.protocol
            && event.device.group_code().is_some()
            && event.device.group_code() == self.device.group_code()
    }

    /// Update the state from an applicable event. Returns whether the state
    /// was set.
    pub fn apply_event(&mut self, event: &RfDeviceEvent) -> bool {
        let Some(json) = event.json() else {
            return false;
        };
        let next = match &self.config {
            EntityConfig::Sensor(c) => Some(measurement(c, json)),
            EntityConfig::BinarySensor(c) => {
                let on = c
                    .state
                    .get_value(json)
                    .is_some_and(|v| BINARY_ON_LIST.contains(&v.to_lowercase().as_str()));
                Some(EntityState::OnOff { on })
            }
            EntityConfig::Switch(c) => switch_state(&self.unique_id, c.status.get_value(json)),
            EntityConfig::Light(c) => switch_state(&self.unique_id, c.status.get_value(json)),
            EntityConfig::Cover(c) => cover_state(c, json),
            EntityConfig::Climate(c) => climate_state(c, json, &self.state),
        };
        match next {
            Some(state) => {
                debug!("{} update: {state:?}", self.unique_id);
                self.state = state;
                true
            }
            None => false,
        }
    }

    pub fn command_params(&self) -> CommandParams {
        let mut params = CommandParams::new()
            .with("address", self.device.address.clone())
            .with("protocol", self.device.protocol.clone());
        if let Some(group) = self.device.group_code() {
            params.set("group_code", group);
        }
        if let Some(unit) = self.device.unit_code() {
            params.set("unit_code", unit);
        }
        params
    }

    /// Gateway command line for `command`.
    pub fn build_command(&self, command: &EntityCommand) -> Result<String> {
        let params = self.command_params();
        let unsupported = || GatewayError::UnsupportedCommand {
            entity: self.unique_id.clone(),
            command: command.to_string(),
        };
        let line = match (&self.config, command) {
            (EntityConfig::Switch(c), EntityCommand::TurnOn) => c.make_cmd_turn_on(&params)?,
            (EntityConfig::Switch(c), EntityCommand::TurnOff) => c.make_cmd_turn_off(&params)?,
            (EntityConfig::Light(c), EntityCommand::TurnOn) => c.make_cmd_turn_on(&params)?,
            (EntityConfig::Light(c), EntityCommand::TurnOff) => c.make_cmd_turn_off(&params)?,
            (EntityConfig::Light(c), EntityCommand::SetLevel(level)) => {
                let params = params.with("brightness", (*level).min(100).to_string());
                c.make_cmd_set_level(&params)?
            }
            (EntityConfig::Cover(c), EntityCommand::Open) => c.make_cmd_open(&params)?,
            (EntityConfig::Cover(c), EntityCommand::Close) => c.make_cmd_close(&params)?,
            (EntityConfig::Cover(c), EntityCommand::Stop) => c.make_cmd_stop(&params)?,
            (EntityConfig::Climate(c), EntityCommand::TurnOn) => {
                c.make_cmd_turn_on(&params, self.preset_mode())?
            }
            (EntityConfig::Climate(c), EntityCommand::TurnOff) => {
                c.make_cmd_turn_off(&params, self.preset_mode())?
            }
            (EntityConfig::Climate(c), EntityCommand::SetPresetMode(mode)) => {
                if c.cmd_set_mode.is_some() {
                    c.make_cmd_set_mode(&params, Some(mode))?
                } else {
                    c.make_cmd_turn_on(&params, Some(mode))?
                }
            }
            (EntityConfig::Climate(c), EntityCommand::SetHvacMode(mode)) => match mode.as_str() {
                HVAC_MODE_OFF => c.make_cmd_turn_off(&params, self.preset_mode())?,
                HVAC_MODE_HEAT => c.make_cmd_turn_on(&params, self.preset_mode())?,
                _ => return Err(unsupported()),
            },
            _ => return Err(unsupported()),
        };
        Ok(line)
    }

    /// Optimistic state after a command was sent.
    pub fn apply_command(&mut self, command: &EntityCommand) {
        let next = match (&self.config, command) {
            (EntityConfig::Switch(_) | EntityConfig::Light(_), EntityCommand::TurnOn) => {
                Some(EntityState::OnOff { on: true })
            }
            (EntityConfig::Light(_), EntityCommand::SetLevel(level)) => {
                Some(EntityState::OnOff { on: *level > 0 })
            }
            (EntityConfig::Switch(_) | EntityConfig::Light(_), EntityCommand::TurnOff) => {
                Some(EntityState::OnOff { on: false })
            }
            (EntityConfig::Cover(_), EntityCommand::Open) => Some(EntityState::Cover {
                state: CoverState::Open,
            }),
            (EntityConfig::Cover(_), EntityCommand::Close) => Some(EntityState::Cover {
                state: CoverState::Closed,
            }),
            (EntityConfig::Climate(_), EntityCommand::TurnOn) => {
                Some(self.climate_with(Some(HVAC_MODE_HEAT), None))
            }
            (EntityConfig::Climate(_), EntityCommand::TurnOff) => {
                Some(self.climate_with(Some(HVAC_MODE_OFF), None))
            }
            (EntityConfig::Climate(_), EntityCommand::SetPresetMode(mode)) => {
                Some(self.climate_with(Some(HVAC_MODE_HEAT), Some(mode)))
            }
            (EntityConfig::Climate(_), EntityCommand::SetHvacMode(mode)) => {
                Some(self.climate_with(Some(mode), None))
            }
            _ => None,
        };
        if let Some(state) = next {
            self.state = state;
        }
    }

    fn preset_mode(&self) -> Option<&str> {
        match &self.state {
            EntityState::Climate { preset_mode, .. } => preset_mode.as_deref(),
            _ => None,
        }
    }

    fn climate_with(&self, hvac_mode: Option<&str>, preset_mode: Option<&str>) -> EntityState {
        let (current_hvac, current_preset) = match &self.state {
            EntityState::Climate {
                hvac_mode,
                preset_mode,
            } => (hvac_mode.clone(), preset_mode.clone()),
            _ => (None, None),
        };
        EntityState::Climate {
            hvac_mode: hvac_mode.map(str::to_string).or(current_hvac),
            preset_mode: preset_mode.map(str::to_string).or(current_preset),
        }
    }
}

fn measurement(config: &SensorConfig, json: &Value) -> EntityState {
    let value = config
        .state
        .get_value(json)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN);
    EntityState::Measurement {
        value,
        unit: config.event_unit(Some(json)),
    }
}

fn switch_state(unique_id: &str, status: Option<String>) -> Option<EntityState> {
    let command = status.map(|s| s.to_lowercase());
    match command.as_deref() {
        Some(c) if COMMAND_ON_LIST.contains(&c) => Some(EntityState::OnOff { on: true }),
        Some(c) if COMMAND_OFF_LIST.contains(&c) => Some(EntityState::OnOff { on: false }),
        other => {
            info!("Unsupported switch command {other:?} for {unique_id}");
            None
        }
    }
}

fn cover_state(config: &CoverConfig, json: &Value) -> Option<EntityState> {
    config
        .cover_state(json)
        .map(|state| EntityState::Cover { state })
}

fn climate_state(config: &ClimateConfig, json: &Value, current: &EntityState) -> Option<EntityState> {
    let event_type = config.event_type(json)?;
    let (mut hvac_mode, mut preset_mode) = match current {
        EntityState::Climate {
            hvac_mode,
            preset_mode,
        } => (hvac_mode.clone(), preset_mode.clone()),
        _ => (None, None),
    };
    if matches!(event_type, ClimateEventType::State | ClimateEventType::All) {
        hvac_mode = config.state.get_value(json);
    }
    if matches!(event_type, ClimateEventType::PresetMode | ClimateEventType::All) {
        preset_mode = config
            .preset_mode
            .get_value(json)
            .and_then(|code| config.code_to_mode(&code).map(str::to_string));
    }
    Some(EntityState::Climate {
        hvac_mode,
        preset_mode,
    })
}
