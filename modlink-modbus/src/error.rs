//! Error types for Modbus links.

use modlink_common::CoercionError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;

/// Result type alias using [`ModbusError`].
pub type Result<T> = std::result::Result<T, ModbusError>;

/// Failure of a single transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// I/O or protocol framing failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The device answered with a Modbus exception.
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// No response within the configured timeout.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The transport has no open connection.
    #[error("Not connected")]
    NotConnected,

    /// The device returned no data for a read.
    #[error("Empty response")]
    EmptyResponse,
}

/// Errors raised by the Modbus link core.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Connecting to the device failed during startup.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A read or write call failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The register space does not support the requested operation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The supplied value cannot be written.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A decoded value does not fit the attribute's declared type.
    #[error("Coercion failed: {0}")]
    Coercion(#[from] CoercionError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ModbusError {
    /// Create an unsupported operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<CodecError> for ModbusError {
    fn from(err: CodecError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
