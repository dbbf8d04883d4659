//! Configuration for Modbus device links.

use modlink_common::{AttributeRef, AttributeType, LoggingConfig};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete agent configuration: one device and the attributes linked to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusAgentConfig {
    /// The device to connect to
    pub device: DeviceConfig,

    /// Attributes linked to the device
    #[serde(default)]
    pub links: Vec<AttributeLink>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for a single Modbus device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used in log spans and health reports)
    pub name: String,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Default Modbus unit/slave ID
    #[serde(default = "default_unit_id", deserialize_with = "truncate::to_u8")]
    pub unit_id: u8,

    /// Poll interval in milliseconds for links without their own refresh
    #[serde(
        default = "default_poll_interval_ms",
        deserialize_with = "truncate::to_u64"
    )]
    pub poll_interval_ms: u64,

    /// Connect and request timeout in milliseconds
    #[serde(default = "default_timeout_ms", deserialize_with = "truncate::to_u64")]
    pub timeout_ms: u64,
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    3000
}

impl DeviceConfig {
    /// Create a TCP device with default settings.
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            connection: ConnectionConfig::Tcp {
                host: host.into(),
                port,
            },
            unit_id: default_unit_id(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Poll interval used by links that do not set `refresh_ms`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout applied to connecting and to each request.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// URI identifying this device instance.
    pub fn instance_uri(&self) -> String {
        match &self.connection {
            ConnectionConfig::Tcp { host, port } => format!("modbus-tcp://{}:{}", host, port),
            ConnectionConfig::Rtu { port, .. } => format!("modbus-rtu://{}", port),
        }
    }

    /// Validate the device settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Validation(
                "Device name cannot be empty".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "Device '{}': poll_interval_ms must be greater than 0",
                self.name
            )));
        }

        match &self.connection {
            ConnectionConfig::Tcp { host, .. } => {
                if host.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': host cannot be empty",
                        self.name
                    )));
                }
            }
            ConnectionConfig::Rtu { parity, .. } => match parity.to_lowercase().as_str() {
                "none" | "even" | "odd" => {}
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': invalid parity '{}' (use none, even, or odd)",
                        self.name, parity
                    )));
                }
            },
        }

        Ok(())
    }
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

/// An attribute bound to a register by a [`LinkConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeLink {
    /// Asset owning the attribute
    pub asset_id: String,

    /// Attribute name
    pub attribute: String,

    /// Declared type that decoded values are coerced to
    #[serde(default)]
    pub value_type: AttributeType,

    /// Register mapping
    pub link: LinkConfig,
}

impl AttributeLink {
    /// The attribute's identity.
    pub fn attribute_ref(&self) -> AttributeRef {
        AttributeRef::new(&self.asset_id, &self.attribute)
    }
}

/// Register mapping for one attribute.
///
/// Immutable once built; a relink replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Modbus unit/slave ID (falls back to the device unit id)
    #[serde(default, deserialize_with = "truncate::to_opt_u8")]
    pub unit_id: Option<u8>,

    /// Polling interval in milliseconds (falls back to the device interval)
    #[serde(
        default,
        alias = "refresh",
        deserialize_with = "truncate::to_opt_u64"
    )]
    pub refresh_ms: Option<u64>,

    /// Register space to read from
    #[serde(alias = "read_type")]
    pub read_space: RegisterSpace,

    /// Interpretation of the read value
    #[serde(default, alias = "read_value_type")]
    pub read_encoding: Option<ValueEncoding>,

    /// Zero-based read address
    #[serde(default)]
    pub read_address: u16,

    /// Register space to write to (absent for read-only attributes)
    #[serde(default, alias = "write_type")]
    pub write_space: Option<WriteSpace>,

    /// Zero-based write address
    #[serde(default)]
    pub write_address: u16,

    /// Encoding of written values
    #[serde(default, alias = "write_value_type")]
    pub write_encoding: Option<WriteValueEncoding>,
}

impl LinkConfig {
    /// Create a read-only link to `unit_id` with default encoding and refresh.
    pub fn read(unit_id: u8, read_space: RegisterSpace, read_address: u16) -> Self {
        Self::read_device(read_space, read_address).with_unit_id(unit_id)
    }

    /// Create a read-only link addressing the device's own unit id.
    pub fn read_device(read_space: RegisterSpace, read_address: u16) -> Self {
        Self {
            unit_id: None,
            refresh_ms: None,
            read_space,
            read_encoding: None,
            read_address,
            write_space: None,
            write_address: 0,
            write_encoding: None,
        }
    }

    /// Set the unit id.
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    /// Set the read encoding.
    pub fn with_read_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.read_encoding = Some(encoding);
        self
    }

    /// Set the refresh interval in milliseconds.
    pub fn with_refresh_ms(mut self, refresh_ms: u64) -> Self {
        self.refresh_ms = Some(refresh_ms);
        self
    }

    /// Make the link writable.
    pub fn with_write(
        mut self,
        space: WriteSpace,
        address: u16,
        encoding: WriteValueEncoding,
    ) -> Self {
        self.write_space = Some(space);
        self.write_address = address;
        self.write_encoding = Some(encoding);
        self
    }

    /// Effective read encoding: `bit` for bit spaces, `uint16` for registers.
    pub fn read_encoding(&self) -> ValueEncoding {
        self.read_encoding.unwrap_or(if self.read_space.is_bit() {
            ValueEncoding::Bit
        } else {
            ValueEncoding::UInt16
        })
    }

    /// Number of units requested per read.
    pub fn read_quantity(&self) -> u16 {
        if self.read_space.is_bit() {
            1
        } else {
            self.read_encoding().word_count()
        }
    }

    /// Effective write encoding (`int16` when unset).
    pub fn write_encoding(&self) -> WriteValueEncoding {
        self.write_encoding.unwrap_or_default()
    }

    /// Effective unit id.
    pub fn unit_id(&self, default: u8) -> u8 {
        self.unit_id.unwrap_or(default)
    }

    /// Effective refresh interval.
    pub fn refresh_interval(&self, default: Duration) -> Duration {
        self.refresh_ms.map(Duration::from_millis).unwrap_or(default)
    }

    /// Validate the link.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_ms == Some(0) {
            return Err(ConfigError::Validation(
                "refresh_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Modbus register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterSpace {
    /// Discrete output coils (read/write, 1-bit)
    Coil,
    /// Discrete input contacts (read-only, 1-bit)
    Discrete,
    /// Holding registers (read/write, 16-bit)
    Holding,
    /// Input registers (read-only, 16-bit)
    Input,
}

impl RegisterSpace {
    /// Return the string name for this register space.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterSpace::Coil => "coil",
            RegisterSpace::Discrete => "discrete",
            RegisterSpace::Holding => "holding",
            RegisterSpace::Input => "input",
        }
    }

    /// Whether the space holds single bits rather than 16-bit words.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterSpace::Coil | RegisterSpace::Discrete)
    }
}

impl std::fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Register spaces that accept writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteSpace {
    Coil,
    Holding,
}

impl From<WriteSpace> for RegisterSpace {
    fn from(space: WriteSpace) -> Self {
        match space {
            WriteSpace::Coil => RegisterSpace::Coil,
            WriteSpace::Holding => RegisterSpace::Holding,
        }
    }
}

/// Interpretation of raw register contents.
///
/// `*Swap` variants store their 16-bit words in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueEncoding {
    Int8,
    #[serde(rename = "uint8")]
    UInt8,
    Int16,
    #[serde(rename = "uint16")]
    UInt16,
    Int32,
    Int32Swap,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint32_swap")]
    UInt32Swap,
    Int64,
    Int64Swap,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(rename = "uint64_swap")]
    UInt64Swap,
    Float32,
    Float32Swap,
    Bit,
}

impl ValueEncoding {
    /// Number of 16-bit words occupied by one value.
    pub fn word_count(&self) -> u16 {
        match self {
            ValueEncoding::Int8
            | ValueEncoding::UInt8
            | ValueEncoding::Int16
            | ValueEncoding::UInt16
            | ValueEncoding::Bit => 1,
            ValueEncoding::Int32
            | ValueEncoding::Int32Swap
            | ValueEncoding::UInt32
            | ValueEncoding::UInt32Swap
            | ValueEncoding::Float32
            | ValueEncoding::Float32Swap => 2,
            ValueEncoding::Int64
            | ValueEncoding::Int64Swap
            | ValueEncoding::UInt64
            | ValueEncoding::UInt64Swap => 4,
        }
    }

    /// Whether the word order is reversed.
    pub fn is_swapped(&self) -> bool {
        matches!(
            self,
            ValueEncoding::Int32Swap
                | ValueEncoding::UInt32Swap
                | ValueEncoding::Int64Swap
                | ValueEncoding::UInt64Swap
                | ValueEncoding::Float32Swap
        )
    }
}

/// Encodings accepted for writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteValueEncoding {
    Int64,
    Int64Swap,
    Float32,
    Float32Swap,
    Int32,
    Int32Swap,
    #[default]
    Int16,
    Bit,
}

impl From<WriteValueEncoding> for ValueEncoding {
    fn from(encoding: WriteValueEncoding) -> Self {
        match encoding {
            WriteValueEncoding::Int64 => ValueEncoding::Int64,
            WriteValueEncoding::Int64Swap => ValueEncoding::Int64Swap,
            WriteValueEncoding::Float32 => ValueEncoding::Float32,
            WriteValueEncoding::Float32Swap => ValueEncoding::Float32Swap,
            WriteValueEncoding::Int32 => ValueEncoding::Int32,
            WriteValueEncoding::Int32Swap => ValueEncoding::Int32Swap,
            WriteValueEncoding::Int16 => ValueEncoding::Int16,
            WriteValueEncoding::Bit => ValueEncoding::Bit,
        }
    }
}

impl ModbusAgentConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ModbusAgentConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.validate()?;

        let mut seen = HashSet::new();
        for link in &self.links {
            let attribute_ref = link.attribute_ref();
            if !seen.insert(attribute_ref.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Attribute '{}' is linked more than once",
                    attribute_ref
                )));
            }

            link.link.validate().map_err(|e| {
                ConfigError::Validation(format!("Attribute '{}': {}", attribute_ref, e))
            })?;
        }

        Ok(())
    }
}

/// Deserializers for integer settings that may be written as floating-point
/// numbers. Values are truncated toward zero.
mod truncate {
    use super::*;

    fn toward_zero<E: de::Error>(value: f64, max: u64) -> Result<u64, E> {
        if !value.is_finite() {
            return Err(E::custom(format!("expected a finite number, got {}", value)));
        }
        let truncated = value.trunc();
        if truncated < 0.0 {
            return Err(E::custom(format!(
                "expected a non-negative number, got {}",
                value
            )));
        }
        if truncated > max as f64 {
            return Err(E::custom(format!("{} exceeds maximum {}", value, max)));
        }
        Ok(truncated as u64)
    }

    pub fn to_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let value = f64::deserialize(deserializer)?;
        toward_zero(value, u8::MAX as u64).map(|v| v as u8)
    }

    pub fn to_opt_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|value| toward_zero(value, u8::MAX as u64).map(|v| v as u8))
            .transpose()
    }

    pub fn to_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = f64::deserialize(deserializer)?;
        toward_zero(value, u64::MAX)
    }

    pub fn to_opt_u64<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|value| toward_zero(value, u64::MAX))
            .transpose()
    }
}
