use thiserror::Error;

use crate::device::Role;

/// Common error type for register map operations.
///
/// Every variant is recoverable: the operation that produced it left the
/// configuration exactly as it was before the call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Tag name \"{0}\" already exists")]
    DuplicateTag(String),

    #[error("Register {mapped} ({label}) already exists")]
    DuplicateAddress { mapped: u32, label: &'static str },

    #[error("Slave ID {0} already exists")]
    DuplicateSlave(u8),

    #[error("No slave selected")]
    NoSelection,

    #[error("Index {index} is out of range ({len} registers)")]
    OutOfRange { index: usize, len: usize },

    #[error("Invalid tag name \"{0}\": only uppercase letters, digits and underscores are allowed")]
    InvalidTagFormat(String),

    #[error("Slave ID {0} is outside 1-247")]
    InvalidSlaveId(u16),

    #[error("Operation requires {required} role")]
    WrongRole { required: Role },

    #[error("Register {0} is not a write register; mode only applies to writes")]
    ModeRequiresWrite(String),

    #[error("Invalid value \"{value}\" for {name}: {reason}")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a malformed persisted configuration error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedConfig(msg.into())
    }

    /// Create a setting validation error.
    pub fn invalid_setting(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedConfig(e.to_string())
    }
}

impl From<json5::Error> for Error {
    fn from(e: json5::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::MalformedConfig(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::MalformedConfig(e.to_string())
    }
}

/// Result type alias using the register map [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
