use crate::ordered::OrderedMap;
use crate::template::{CommandParams, CommandTemplate};
use crate::value::JsonValueConfig;
use crate::{ProfileError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Entity platforms a profile can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Climate,
    Cover,
    Light,
    Sensor,
    Switch,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::BinarySensor,
        Platform::Climate,
        Platform::Cover,
        Platform::Light,
        Platform::Sensor,
        Platform::Switch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Climate => "climate",
            Platform::Cover => "cover",
            Platform::Light => "light",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform {s:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// Fields shared by every platform configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub category: Option<EntityCategory>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Sensor and binary sensor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(flatten)]
    pub info: EntityInfo,
    pub state: JsonValueConfig,
    #[serde(default)]
    pub state_class: Option<String>,
}

impl SensorConfig {
    /// Unit carried by the event when the profile extracts one, else the
    /// static unit.
    pub fn event_unit(&self, event: Option<&Value>) -> Option<String> {
        event
            .and_then(|e| self.state.get_unit(e))
            .or_else(|| self.info.unit.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    #[serde(flatten)]
    pub info: EntityInfo,
    pub status: JsonValueConfig,
    pub cmd_turn_on: CommandTemplate,
    pub cmd_turn_off: CommandTemplate,
}

impl SwitchConfig {
    pub fn make_cmd_turn_on(&self, params: &CommandParams) -> Result<String> {
        self.cmd_turn_on.render(params)
    }

    pub fn make_cmd_turn_off(&self, params: &CommandParams) -> Result<String> {
        self.cmd_turn_off.render(params)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightConfig {
    #[serde(flatten)]
    pub info: EntityInfo,
    pub status: JsonValueConfig,
    pub cmd_turn_on: CommandTemplate,
    pub cmd_turn_off: CommandTemplate,
    #[serde(default)]
    pub cmd_set_level: Option<CommandTemplate>,
}

impl LightConfig {
    pub fn make_cmd_turn_on(&self, params: &CommandParams) -> Result<String> {
        self.cmd_turn_on.render(params)
    }

    pub fn make_cmd_turn_off(&self, params: &CommandParams) -> Result<String> {
        self.cmd_turn_off.render(params)
    }

    pub fn make_cmd_set_level(&self, params: &CommandParams) -> Result<String> {
        self.cmd_set_level
            .as_ref()
            .ok_or(ProfileError::UnsupportedCommand("set_level"))?
            .render(params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverConfig {
    #[serde(flatten)]
    pub info: EntityInfo,
    #[serde(default)]
    pub state: Option<JsonValueConfig>,
    #[serde(default)]
    pub states: OrderedMap<CoverState>,
    pub cmd_open: CommandTemplate,
    pub cmd_close: CommandTemplate,
    #[serde(default)]
    pub cmd_stop: Option<CommandTemplate>,
}

impl CoverConfig {
    pub fn cover_state(&self, event: &Value) -> Option<CoverState> {
        let code = self.state.as_ref()?.get_value(event)?;
        self.states.get(&code).copied()
    }

    pub fn make_cmd_open(&self, params: &CommandParams) -> Result<String> {
        self.cmd_open.render(params)
    }

    pub fn make_cmd_close(&self, params: &CommandParams) -> Result<String> {
        self.cmd_close.render(params)
    }

    pub fn make_cmd_stop(&self, params: &CommandParams) -> Result<String> {
        self.cmd_stop
            .as_ref()
            .ok_or(ProfileError::UnsupportedCommand("stop"))?
            .render(params)
    }
}

/// Which part of the climate state an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateEventType {
    State,
    PresetMode,
    All,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClimateConfig {
    #[serde(flatten)]
    pub info: EntityInfo,
    pub event_code: JsonValueConfig,
    pub event_types: OrderedMap<ClimateEventType>,
    pub state: JsonValueConfig,
    pub preset_mode: JsonValueConfig,
    pub preset_modes: OrderedMap<String>,
    pub cmd_turn_on: CommandTemplate,
    pub cmd_turn_off: CommandTemplate,
    #[serde(default)]
    pub cmd_set_mode: Option<CommandTemplate>,
}

impl ClimateConfig {
    pub fn event_type(&self, event: &Value) -> Option<ClimateEventType> {
        let code = self.event_code.get_value(event)?;
        self.event_types.get(&code).copied()
    }

    /// Preset name for a gateway code.
    pub fn code_to_mode(&self, code: &str) -> Option<&str> {
        self.preset_modes.get(code).map(String::as_str)
    }

    /// Gateway code for a preset name; no preset selects the first declared one.
    pub fn mode_to_code(&self, mode: Option<&str>) -> Result<String> {
        match mode {
            Some(mode) => self
                .preset_modes
                .key_of(&mode.to_string())
                .map(str::to_string)
                .ok_or_else(|| ProfileError::UnknownPresetMode(mode.to_string())),
            None => self
                .preset_modes
                .first()
                .map(|(code, _)| code.to_string())
                .ok_or_else(|| ProfileError::UnknownPresetMode("<none>".to_string())),
        }
    }

    pub fn preset_mode_names(&self) -> Vec<&str> {
        self.preset_modes.iter().map(|(_, name)| name.as_str()).collect()
    }

    pub fn make_cmd_turn_on(&self, params: &CommandParams, preset_mode: Option<&str>) -> Result<String> {
        self.cmd_turn_on.render(&self.with_preset(params, preset_mode)?)
    }

    pub fn make_cmd_turn_off(&self, params: &CommandParams, preset_mode: Option<&str>) -> Result<String> {
        self.cmd_turn_off.render(&self.with_preset(params, preset_mode)?)
    }

    pub fn make_cmd_set_mode(&self, params: &CommandParams, preset_mode: Option<&str>) -> Result<String> {
        self.cmd_set_mode
            .as_ref()
            .ok_or(ProfileError::UnsupportedCommand("set_mode"))?
            .render(&self.with_preset(params, preset_mode)?)
    }

    fn with_preset(&self, params: &CommandParams, preset_mode: Option<&str>) -> Result<CommandParams> {
        let mut params = params.clone();
        params.set("preset_mode", self.mode_to_code(preset_mode)?);
        Ok(params)
    }
}

/// Per-platform entity lists of a profile. Absent and `null` lists are empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfigMap {
    #[serde(default)]
    pub binary_sensor: Option<Vec<SensorConfig>>,
    #[serde(default)]
    pub climate: Option<Vec<ClimateConfig>>,
    #[serde(default)]
    pub cover: Option<Vec<CoverConfig>>,
    #[serde(default)]
    pub light: Option<Vec<LightConfig>>,
    #[serde(default)]
    pub sensor: Option<Vec<SensorConfig>>,
    #[serde(default)]
    pub switch: Option<Vec<SwitchConfig>>,
}

impl PlatformConfigMap {
    pub fn get(&self, platform: Platform) -> Vec<AnyPlatformConfig<'_>> {
        fn wrap<'a, T>(
            list: &'a Option<Vec<T>>,
            f: impl Fn(&'a T) -> AnyPlatformConfig<'a>,
        ) -> Vec<AnyPlatformConfig<'a>> {
            list.iter().flatten().map(f).collect()
        }

        match platform {
            Platform::BinarySensor => wrap(&self.binary_sensor, AnyPlatformConfig::BinarySensor),
            Platform::Climate => wrap(&self.climate, AnyPlatformConfig::Climate),
            Platform::Cover => wrap(&self.cover, AnyPlatformConfig::Cover),
            Platform::Light => wrap(&self.light, AnyPlatformConfig::Light),
            Platform::Sensor => wrap(&self.sensor, AnyPlatformConfig::Sensor),
            Platform::Switch => wrap(&self.switch, AnyPlatformConfig::Switch),
        }
    }

    /// Platforms with at least one entity.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| !self.get(*p).is_empty())
            .collect()
    }

    pub fn all(&self) -> Vec<AnyPlatformConfig<'_>> {
        Platform::ALL.into_iter().flat_map(|p| self.get(p)).collect()
    }
}

/// Borrowed view of one platform configuration.
#[derive(Debug, Clone, Copy)]
pub enum AnyPlatformConfig<'a> {
    BinarySensor(&'a SensorConfig),
    Climate(&'a ClimateConfig),
    Cover(&'a CoverConfig),
    Light(&'a LightConfig),
    Sensor(&'a SensorConfig),
    Switch(&'a SwitchConfig),
}

impl<'a> AnyPlatformConfig<'a> {
    pub fn platform(&self) -> Platform {
        match *self {
            Self::BinarySensor(_) => Platform::BinarySensor,
            Self::Climate(_) => Platform::Climate,
            Self::Cover(_) => Platform::Cover,
            Self::Light(_) => Platform::Light,
            Self::Sensor(_) => Platform::Sensor,
            Self::Switch(_) => Platform::Switch,
        }
    }

    pub fn info(&self) -> &'a EntityInfo {
        match *self {
            Self::BinarySensor(c) | Self::Sensor(c) => &c.info,
            Self::Climate(c) => &c.info,
            Self::Cover(c) => &c.info,
            Self::Light(c) => &c.info,
            Self::Switch(c) => &c.info,
        }
    }

    pub fn name(&self) -> &'a str {
        &self.info().name
    }
}
