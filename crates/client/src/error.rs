use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to open {port}: {message}")]
    Connection { port: String, message: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(#[from] rfplayer_protocol::ProtocolError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
