use crate::ordered::{option_scalar_string, scalar_string};
use crate::platform::{AnyPlatformConfig, Platform, PlatformConfigMap};
use crate::{ProfileError, Result};
use log::{debug, warn};
use once_cell::sync::OnceCell;
use regex::Regex;
use rfplayer_protocol::{header_field, infos_field, value_to_string};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const BUILTIN_PROFILES: &str = include_str!("../../../profiles/device-profiles.yaml");

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDeviceMatch {
    #[serde(default, deserialize_with = "option_scalar_string")]
    protocol: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    info_type: String,
    #[serde(default, deserialize_with = "option_scalar_string")]
    sub_type: Option<String>,
    #[serde(default, deserialize_with = "option_scalar_string")]
    id_phy: Option<String>,
}

/// Frame matching rule used to detect which profile applies to an event.
///
/// `protocol` and `id_phy` are regular expressions anchored at the start of
/// the field; `info_type` and `sub_type` must be equal.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawDeviceMatch")]
pub struct DeviceMatch {
    protocol: Option<AnchoredRegex>,
    info_type: String,
    sub_type: Option<String>,
    id_phy: Option<AnchoredRegex>,
}

#[derive(Debug, Clone)]
struct AnchoredRegex {
    source: String,
    regex: Regex,
}

impl AnchoredRegex {
    fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|err| {
            ProfileError::InvalidRegex {
                pattern: pattern.to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl TryFrom<RawDeviceMatch> for DeviceMatch {
    type Error = ProfileError;

    fn try_from(raw: RawDeviceMatch) -> Result<Self> {
        Ok(Self {
            protocol: raw.protocol.as_deref().map(AnchoredRegex::new).transpose()?,
            info_type: raw.info_type,
            sub_type: raw.sub_type,
            id_phy: raw.id_phy.as_deref().map(AnchoredRegex::new).transpose()?,
        })
    }
}

impl DeviceMatch {
    pub fn info_type(&self) -> &str {
        &self.info_type
    }

    pub fn matches(&self, profile_name: &str, event: &Value) -> bool {
        if let Some(expected) = &self.protocol {
            let actual = header_field(event, "protocolMeaning").and_then(value_to_string);
            if !actual.as_deref().is_some_and(|p| expected.is_match(p)) {
                debug!(
                    "profile {profile_name} not matching: expected protocol {}, actual {actual:?}",
                    expected.source
                );
                return false;
            }
        }

        let info_type = header_field(event, "infoType").and_then(value_to_string);
        if info_type.as_deref() != Some(self.info_type.as_str()) {
            debug!(
                "profile {profile_name} not matching: expected info type {}, actual {info_type:?}",
                self.info_type
            );
            return false;
        }

        if let Some(expected) = &self.sub_type {
            let actual = infos_field(event, "subType").and_then(value_to_string);
            if actual.as_deref() != Some(expected.as_str()) {
                debug!(
                    "profile {profile_name} not matching: expected sub type {expected}, actual {actual:?}"
                );
                return false;
            }
        }

        if let Some(expected) = &self.id_phy {
            let actual = infos_field(event, "id_PHY").and_then(value_to_string);
            if !actual.as_deref().is_some_and(|id| expected.is_match(id)) {
                debug!(
                    "profile {profile_name} not matching: expected id phy {}, actual {actual:?}",
                    expected.source
                );
                return false;
            }
        }

        true
    }
}

/// A named device profile: how to recognise the device and which entities
/// it exposes.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceProfile {
    pub name: String,
    #[serde(rename = "match")]
    pub match_rule: DeviceMatch,
    #[serde(default)]
    pub platforms: PlatformConfigMap,
}

/// Ordered store of device profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: Vec<DeviceProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the profiles shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_profiles(BUILTIN_PROFILES)?;
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut registry = Self::new();
        registry.register_file(path)?;
        Ok(registry)
    }

    pub fn register_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        self.register_profiles(&content)
    }

    /// Append profiles from a YAML list. Returns the number added.
    ///
    /// The whole document is rejected when one profile is invalid or reuses
    /// a registered name.
    pub fn register_profiles(&mut self, content: &str) -> Result<usize> {
        let items: Vec<DeviceProfile> = serde_yaml::from_str(content)?;
        for (index, item) in items.iter().enumerate() {
            let seen_before = items[..index].iter().any(|p| p.name == item.name);
            if seen_before || self.profile(&item.name).is_some() {
                return Err(ProfileError::DuplicateProfile(item.name.clone()));
            }
        }
        let added = items.len();
        self.profiles.extend(items);
        Ok(added)
    }

    /// Append every profile of `other`, after the ones already registered.
    pub fn extend(&mut self, other: ProfileRegistry) -> Result<usize> {
        if let Some(duplicate) = other.profiles.iter().find(|p| self.profile(&p.name).is_some()) {
            return Err(ProfileError::DuplicateProfile(duplicate.name.clone()));
        }
        let added = other.profiles.len();
        self.profiles.extend(other.profiles);
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profile(&self, name: &str) -> Option<&DeviceProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }

    /// First profile whose rule matches the JSON event.
    pub fn profile_for_event(&self, event: &Value) -> Option<&DeviceProfile> {
        if !event.is_object() {
            debug!("not matching: not a JSON RfPlayer event");
            return None;
        }
        let profile = self
            .profiles
            .iter()
            .find(|p| p.match_rule.matches(&p.name, event));
        if profile.is_none() {
            warn!("No matching profile for event {event}");
        }
        profile
    }

    pub fn profile_name_for_event(&self, event: &Value) -> Option<&str> {
        self.profile_for_event(event).map(|p| p.name.as_str())
    }

    /// Entity configurations of `profile_name` for one platform. Unknown
    /// profiles and unsupported platforms yield an empty list.
    pub fn platform_configs(
        &self,
        profile_name: Option<&str>,
        platform: Platform,
    ) -> Vec<AnyPlatformConfig<'_>> {
        let Some(profile_name) = profile_name else {
            debug!("No profile name provided");
            return Vec::new();
        };
        let Some(profile) = self.profile(profile_name) else {
            warn!("Profile name {profile_name} not supported");
            return Vec::new();
        };
        let configs = profile.platforms.get(platform);
        if configs.is_empty() {
            debug!(
                "Platform {platform} not supported by profile {}",
                profile.name
            );
        }
        configs
    }
}

static SHARED_REGISTRY: OnceCell<ProfileRegistry> = OnceCell::new();

/// Built-in registry, parsed on first use.
pub fn shared_registry() -> Result<&'static ProfileRegistry> {
    SHARED_REGISTRY.get_or_try_init(ProfileRegistry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PROFILES: &str = r#"
- name: Specific Oregon
  match:
    protocol: OREGON
    info_type: 4
    id_phy: "0xEA4C"
  platforms:
    sensor:
      - name: Temperature
        state:
          value_path: $.frame.infos.temp
- name: Any Oregon
  match:
    protocol: OREG
    info_type: "4"
  platforms:
    sensor:
      - name: Temperature
        state:
          value_path: $.frame.infos.temp
      - name: Humidity
        state:
          value_path: $.frame.infos.hum
- name: Shutter
  match:
    protocol: RTS
    info_type: "3"
    sub_type: "0"
  platforms:
    cover:
      - name: Shutter
        cmd_open: ON ID {address} RTS
        cmd_close: OFF ID {address} RTS
"#;

    fn registry() -> ProfileRegistry {
        let mut registry = ProfileRegistry::new();
        registry.register_profiles(PROFILES).unwrap();
        registry
    }

    fn oregon(id_phy: &str) -> Value {
        json!({
            "frame": {
                "header": {"protocolMeaning": "OREGON", "infoType": "4"},
                "infos": {"id_PHY": id_phy}
            }
        })
    }

    #[test]
    fn first_matching_profile_wins() {
        let registry = registry();
        assert_eq!(
            registry.profile_name_for_event(&oregon("0xEA4C")),
            Some("Specific Oregon")
        );
        assert_eq!(
            registry.profile_name_for_event(&oregon("0x1A2D")),
            Some("Any Oregon")
        );
    }

    #[test]
    fn protocol_regex_is_anchored_at_start_only() {
        let registry = registry();
        let event = json!({
            "frame": {"header": {"protocolMeaning": "XOREGON", "infoType": "4"}, "infos": {}}
        });
        assert_eq!(registry.profile_name_for_event(&event), None);
    }

    #[test]
    fn sub_type_must_be_equal_and_present() {
        let registry = registry();
        let open = json!({
            "frame": {"header": {"protocolMeaning": "RTS", "infoType": "3"}, "infos": {"subType": "0"}}
        });
        let portal = json!({
            "frame": {"header": {"protocolMeaning": "RTS", "infoType": "3"}, "infos": {"subType": "1"}}
        });
        let missing = json!({
            "frame": {"header": {"protocolMeaning": "RTS", "infoType": "3"}, "infos": {}}
        });
        assert_eq!(registry.profile_name_for_event(&open), Some("Shutter"));
        assert_eq!(registry.profile_name_for_event(&portal), None);
        assert_eq!(registry.profile_name_for_event(&missing), None);
    }

    #[test]
    fn non_object_events_never_match() {
        assert_eq!(registry().profile_name_for_event(&json!("ZIA--hello")), None);
    }

    #[test]
    fn platform_configs_by_profile_name() {
        let registry = registry();
        let sensors = registry.platform_configs(Some("Any Oregon"), Platform::Sensor);
        let names: Vec<&str> = sensors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Temperature", "Humidity"]);
        assert!(registry
            .platform_configs(Some("Any Oregon"), Platform::Switch)
            .is_empty());
        assert!(registry
            .platform_configs(Some("Nope"), Platform::Sensor)
            .is_empty());
        assert!(registry.platform_configs(None, Platform::Sensor).is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        let err = registry
            .register_profiles("- name: Shutter\n  match:\n    info_type: \"3\"\n")
            .unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateProfile(name) if name == "Shutter"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn extend_keeps_earlier_profiles_first() {
        let mut custom = ProfileRegistry::new();
        custom
            .register_profiles("- name: Any RTS\n  match:\n    protocol: RTS\n    info_type: \"3\"\n")
            .unwrap();
        assert_eq!(custom.extend(registry()).unwrap(), 3);
        let shutter = json!({
            "frame": {"header": {"protocolMeaning": "RTS", "infoType": "3"}, "infos": {"subType": "0"}}
        });
        assert_eq!(custom.profile_name_for_event(&shutter), Some("Any RTS"));
        assert!(matches!(
            custom.extend(registry()),
            Err(ProfileError::DuplicateProfile(_))
        ));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = ProfileRegistry::new()
            .register_profiles("- name: Bad\n  match:\n    protocol: \"(\"\n    info_type: \"1\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Invalid regex"), "{err}");
    }

    #[test]
    fn builtin_profiles_load() {
        let registry = ProfileRegistry::builtin().unwrap();
        assert!(registry.profile("Jamming Detector").is_some());
        assert!(registry.profile_names().contains(&"X2D Thermostat"));
        assert!(std::ptr::eq(
            shared_registry().unwrap(),
            shared_registry().unwrap()
        ));
    }
}
