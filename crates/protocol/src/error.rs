use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing field in JSON frame: {0}")]
    MissingField(&'static str),

    #[error("Unsupported receiver protocol: {0}")]
    UnknownReceiverProtocol(String),

    #[error("Unsupported command protocol: {0}")]
    UnknownCommandProtocol(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}
