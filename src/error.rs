use crate::bay::BayId;
use thiserror::Error;

/// Failure reported by a hardware adapter (sensor board, reader, drive lines,
/// alarm outputs, radio or display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PeripheralError {
    #[error("{0} not responding")]
    NotResponding(&'static str),
    #[error("{0} bus error")]
    Bus(&'static str),
    #[error("no such bay: {0}")]
    UnknownBay(BayId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential identifier is empty")]
    Empty,
    #[error("credential identifier exceeds {max} characters")]
    TooLong { max: usize },
    #[error("credential identifier contains non-printable characters")]
    InvalidCharacter,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config validation: {0}")]
    Validation(String),
    #[error("invalid credential in config: {0}")]
    Credential(#[from] CredentialError),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("command queue full")]
    CommandQueueFull,
    #[error("credential queue full")]
    CredentialQueueFull,
    #[error("no drive lines wired for bay {0}")]
    MissingDriveLines(BayId),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),
}

/// Failure decoding a `"Space {id}: {status}"` telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame does not start with \"Space \"")]
    MissingPrefix,
    #[error("frame has no ':' separator")]
    MissingSeparator,
    #[error("invalid bay number in frame")]
    InvalidBay,
    #[error("unknown status in frame")]
    UnknownStatus,
    #[error("frame exceeds {max} bytes")]
    TooLong { max: usize },
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// A status name that is not one of `available`, `occupied` or `stolen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown bay status")]
pub struct UnknownStatus;

/// Why a maintenance actuator command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MaintenanceError {
    #[error("no such bay: {0}")]
    UnknownBay(BayId),
    #[error("bay {0} is not available")]
    NotAvailable(BayId),
    #[error("bay {0} mechanism is still retracting")]
    Retracting(BayId),
    #[error("bay {0} is holding a bike")]
    Occupied(BayId),
    #[error("bay {0} has a latched fault")]
    Faulted(BayId),
    #[error("actuator command failed: {0}")]
    Actuator(#[from] PeripheralError),
}
