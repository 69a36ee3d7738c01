use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] rfplayer_protocol::ProtocolError),

    #[error("Profile error: {0}")]
    Profile(#[from] rfplayer_profiles::ProfileError),

    #[error("Client error: {0}")]
    Client(#[from] rfplayer_client::ClientError),

    #[error("RfPlayer not connected")]
    NotConnected,

    #[error("Connection timed out after {0} seconds")]
    ConnectTimeout(u64),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Device {0} cannot be removed")]
    ProtectedDevice(String),

    #[error("Entity {entity} does not support {command}")]
    UnsupportedCommand { entity: String, command: String },
}
