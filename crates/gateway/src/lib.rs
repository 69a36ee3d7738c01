//! RfPlayer gateway runtime.
//!
//! [`Gateway`] owns the client connection and reconnects it, registers
//! devices seen on air (optionally resolving their profile), rewrites
//! redirected addresses, keeps [`Entity`] states current and broadcasts
//! [`GatewaySignal`]s. The device list lives in a TOML [`GatewayConfig`].

mod config;
mod entity;
mod error;
mod gateway;

pub use config::{
    DeviceConfig, GatewayConfig, DEFAULT_RECONNECT_INTERVAL, JAMMING_ADDRESS, JAMMING_DEVICE_ID,
    JAMMING_PROFILE, JAMMING_PROTOCOL,
};
pub use entity::{
    build_entities, slugify, Entity, EntityCommand, EntityConfig, EntitySnapshot, EntityState,
    COMMAND_GROUP_LIST, COMMAND_OFF_LIST, COMMAND_ON_LIST, HVAC_MODE_HEAT, HVAC_MODE_OFF,
};
pub use error::{GatewayError, Result};
pub use gateway::{
    load_registry, Connector, Gateway, GatewaySignal, SerialConnector, CONNECTION_TIMEOUT,
};
