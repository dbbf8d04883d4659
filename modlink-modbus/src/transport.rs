//! The Modbus client boundary.
//!
//! [`ModbusTransport`] is everything the link core needs from a Modbus
//! client. [`TokioModbusTransport`] implements it with `tokio-modbus` over
//! TCP or a serial line.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, DeviceConfig};
use crate::error::TransportError;

/// Modbus client operations used by the dispatchers.
///
/// Implementations must be safe to call concurrently; all polling tasks of a
/// device share one transport.
pub trait ModbusTransport: Send + Sync + 'static {
    /// Open the connection.
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Close the connection if open.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Read coils (FC01).
    fn read_coils(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = Result<Vec<bool>, TransportError>> + Send;

    /// Read discrete inputs (FC02).
    fn read_discrete_inputs(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = Result<Vec<bool>, TransportError>> + Send;

    /// Read holding registers (FC03).
    fn read_holding_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = Result<Vec<u16>, TransportError>> + Send;

    /// Read input registers (FC04).
    fn read_input_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = Result<Vec<u16>, TransportError>> + Send;

    /// Write a single coil (FC05).
    fn write_single_coil(
        &self,
        unit_id: u8,
        address: u16,
        value: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write a single holding register (FC06).
    fn write_single_register(
        &self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write consecutive holding registers (FC16).
    fn write_multiple_registers(
        &self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// [`ModbusTransport`] backed by a single `tokio-modbus` client context.
///
/// Requests are serialized through a mutex; the unit id is set per request
/// and every request is bounded by the device timeout.
pub struct TokioModbusTransport {
    device_name: String,
    connection: ConnectionConfig,
    unit_id: u8,
    timeout: Duration,
    context: Mutex<Option<Context>>,
    connected: AtomicBool,
}

impl TokioModbusTransport {
    /// Create an unconnected transport for a device.
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            device_name: device.name.clone(),
            connection: device.connection.clone(),
            unit_id: device.unit_id,
            timeout: device.timeout(),
            context: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Open a client context for the configured connection.
    async fn open(&self) -> Result<Context, TransportError> {
        let slave = Slave(self.unit_id);

        match &self.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| TransportError::Io(format!("Invalid address: {}", e)))?
                    .next()
                    .ok_or_else(|| {
                        TransportError::Io(format!("No address found for {}:{}", host, port))
                    })?;

                info!(device = %self.device_name, %addr, "Connecting to Modbus TCP server");

                let ctx = tokio::time::timeout(self.timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| TransportError::Timeout(self.timeout_ms()))?
                    .map_err(|e| TransportError::Io(e.to_string()))?;

                Ok(ctx)
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let parity = match parity.to_lowercase().as_str() {
                    "even" => tokio_serial::Parity::Even,
                    "odd" => tokio_serial::Parity::Odd,
                    _ => tokio_serial::Parity::None,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                let builder = tokio_serial::new(port, *baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits)
                    .timeout(self.timeout);

                info!(device = %self.device_name, port = %port, "Opening Modbus RTU port");

                let serial = tokio_serial::SerialStream::open(&builder)
                    .map_err(|e| TransportError::Io(format!("Serial open failed: {}", e)))?;

                Ok(rtu::attach_slave(serial, slave))
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Flatten a timed-out / transport / exception result.
    fn settle<T, E: Display, X: Debug>(
        &self,
        response: Result<Result<Result<T, X>, E>, Elapsed>,
    ) -> Result<T, TransportError> {
        response
            .map_err(|_| TransportError::Timeout(self.timeout_ms()))?
            .map_err(|e| TransportError::Io(e.to_string()))?
            .map_err(|e| TransportError::Exception(format!("{:?}", e)))
    }
}

impl ModbusTransport for TokioModbusTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let ctx = self.open().await?;
        *self.context.lock().await = Some(ctx);
        self.connected.store(true, Ordering::Release);
        info!(device = %self.device_name, "Modbus connection established");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let ctx = self.context.lock().await.take();
        self.connected.store(false, Ordering::Release);

        if let Some(mut ctx) = ctx {
            debug!(device = %self.device_name, "Closing Modbus connection");
            if let Err(e) = ctx.disconnect().await {
                warn!(device = %self.device_name, error = %e, "Error while disconnecting");
                return Err(TransportError::Io(e.to_string()));
            }
        }
        Ok(())
    }

    async fn read_coils(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response = tokio::time::timeout(self.timeout, ctx.read_coils(address, quantity)).await;
        self.settle(response)
    }

    async fn read_discrete_inputs(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response =
            tokio::time::timeout(self.timeout, ctx.read_discrete_inputs(address, quantity)).await;
        self.settle(response)
    }

    async fn read_holding_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response =
            tokio::time::timeout(self.timeout, ctx.read_holding_registers(address, quantity))
                .await;
        self.settle(response)
    }

    async fn read_input_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response =
            tokio::time::timeout(self.timeout, ctx.read_input_registers(address, quantity)).await;
        self.settle(response)
    }

    async fn write_single_coil(
        &self,
        unit_id: u8,
        address: u16,
        value: bool,
    ) -> Result<(), TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response =
            tokio::time::timeout(self.timeout, ctx.write_single_coil(address, value)).await;
        self.settle(response)
    }

    async fn write_single_register(
        &self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response =
            tokio::time::timeout(self.timeout, ctx.write_single_register(address, value)).await;
        self.settle(response)
    }

    async fn write_multiple_registers(
        &self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        let response =
            tokio::time::timeout(self.timeout, ctx.write_multiple_registers(address, values))
                .await;
        self.settle(response)
    }
}
