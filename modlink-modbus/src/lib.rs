//! Modbus attribute links.
//!
//! Maps application attributes onto coils and registers of a Modbus device
//! (TCP or RTU/serial), keeps them up to date by periodic polling and turns
//! attribute writes into coil or register writes.
//!
//! # Link configuration
//!
//! ```text
//! {
//!   unit_id: 1,
//!   read_space: "holding",      // coil | discrete | holding | input
//!   read_address: 10,
//!   read_encoding: "int16",     // defaults to bit / uint16
//!   refresh_ms: 1000,           // defaults to the device poll interval
//!   write_space: "holding",     // coil | holding, absent for read-only
//!   write_address: 10,
//!   write_encoding: "int16",
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod protocol;
pub mod scheduler;
pub mod sink;
pub mod transport;

pub use config::{DeviceConfig, LinkConfig, ModbusAgentConfig, RegisterSpace, ValueEncoding};
pub use connection::ConnectionStatus;
pub use error::{ModbusError, Result, TransportError};
pub use protocol::ModbusProtocol;
pub use sink::{AttributeSink, ChannelSink, LogSink};
pub use transport::{ModbusTransport, TokioModbusTransport};
