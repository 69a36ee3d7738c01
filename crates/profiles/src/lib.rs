//! Device profiles for RfPlayer events.
//!
//! A profile recognises a device from its JSON frame (protocol, info type,
//! sub type, physical id) and lists the entities it exposes per platform.
//! Entity values are read from the frame with JSON paths and converted with
//! bit masks, code maps and factors; commands are rendered from templates.

mod error;
mod ordered;
mod platform;
mod registry;
mod template;
mod value;

pub use error::{ProfileError, Result};
pub use ordered::OrderedMap;
pub use platform::{
    AnyPlatformConfig, ClimateConfig, ClimateEventType, CoverConfig, CoverState, EntityCategory,
    EntityInfo, LightConfig, Platform, PlatformConfigMap, SensorConfig, SwitchConfig,
};
pub use registry::{shared_registry, DeviceMatch, DeviceProfile, ProfileRegistry};
pub use template::{CommandParams, CommandTemplate, KNOWN_PLACEHOLDERS};
pub use value::{format_float, JsonValueConfig, UNDEFINED_VALUE};
