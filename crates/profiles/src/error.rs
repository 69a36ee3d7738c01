use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid JSON path {path:?}: {message}")]
    InvalidJsonPath { path: String, message: String },

    #[error("Invalid bit offset {0}: must be below 64")]
    InvalidBitOffset(u32),

    #[error("Invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Unknown placeholder {{{placeholder}}} in command template {template:?}")]
    UnknownPlaceholder {
        template: String,
        placeholder: String,
    },

    #[error("Missing value for {{{placeholder}}} in command template {template:?}")]
    MissingParameter {
        template: String,
        placeholder: String,
    },

    #[error("Command {0} is not supported by this profile")]
    UnsupportedCommand(&'static str),

    #[error("Unknown preset mode: {0}")]
    UnknownPresetMode(String),

    #[error("Duplicate profile name: {0}")]
    DuplicateProfile(String),
}
