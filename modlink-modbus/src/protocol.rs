//! Host-facing entry point for one Modbus device.
//!
//! [`ModbusProtocol`] ties together the connection lifecycle, the polling
//! scheduler and the write path. The host calls [`start`](ModbusProtocol::start)
//! once, links attributes, forwards writes, and finally calls
//! [`stop`](ModbusProtocol::stop).

use std::sync::Arc;

use modlink_common::{AttributeRef, AttributeType, Value};
use tokio::sync::watch;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::config::{ConnectionConfig, DeviceConfig, LinkConfig};
use crate::connection::{ConnectionLifecycle, ConnectionStatus};
use crate::dispatch::{WriteAck, WriteDispatcher};
use crate::error::Result;
use crate::health::{HealthSnapshot, LinkHealth};
use crate::scheduler::PollingScheduler;
use crate::sink::AttributeSink;
use crate::transport::{ModbusTransport, TokioModbusTransport};

/// A Modbus device with its linked attributes.
pub struct ModbusProtocol<T: ModbusTransport, S: AttributeSink> {
    device: DeviceConfig,
    connection: ConnectionLifecycle<T>,
    scheduler: PollingScheduler<T, S>,
    health: Arc<LinkHealth>,
    span: Span,
}

impl<S: AttributeSink> ModbusProtocol<TokioModbusTransport, S> {
    /// Create a protocol talking to the device through `tokio-modbus`.
    pub fn connect_to(device: DeviceConfig, sink: S) -> Self {
        let transport = TokioModbusTransport::new(&device);
        Self::new(device, transport, sink)
    }
}

impl<T: ModbusTransport, S: AttributeSink> ModbusProtocol<T, S> {
    pub fn new(device: DeviceConfig, transport: T, sink: S) -> Self {
        let span = info_span!("modbus", device = %device.name);
        let health = Arc::new(LinkHealth::new(device.name.clone()));
        let connection = ConnectionLifecycle::new(transport);
        let scheduler = PollingScheduler::new(
            connection.transport(),
            Arc::new(sink),
            Arc::clone(&health),
            device.unit_id,
            device.poll_interval(),
            span.clone(),
        );

        Self {
            device,
            connection,
            scheduler,
            health,
            span,
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    /// Human-readable protocol name.
    pub fn protocol_name(&self) -> &'static str {
        match self.device.connection {
            ConnectionConfig::Tcp { .. } => "Modbus TCP Client",
            ConnectionConfig::Rtu { .. } => "Modbus RTU Client",
        }
    }

    /// URI identifying this device, e.g. `modbus-tcp://10.0.0.5:502`.
    pub fn instance_uri(&self) -> String {
        self.device.instance_uri()
    }

    /// Connect to the device.
    ///
    /// On failure nothing should be linked; the status is left at `Error`.
    pub async fn start(&self) -> Result<ConnectionStatus> {
        self.connection.start().instrument(self.span.clone()).await
    }

    /// Stop all polling and close the connection.
    pub async fn stop(&self) {
        let span = self.span.clone();
        async {
            self.scheduler.shutdown().await;
            self.connection.stop().await;
        }
        .instrument(span)
        .await
    }

    /// Start polling an attribute. Relinking replaces the previous link.
    ///
    /// An invalid config is rejected and leaves the attribute unlinked.
    pub fn on_link(
        &self,
        attribute_ref: AttributeRef,
        value_type: AttributeType,
        config: LinkConfig,
    ) -> Result<()> {
        let _entered = self.span.enter();
        if let Err(e) = config.validate() {
            if self.scheduler.unlink(&attribute_ref) {
                warn!(attribute = %attribute_ref, error = %e, "Rejected relink, attribute unlinked");
            }
            return Err(e.into());
        }
        self.scheduler.link(attribute_ref, value_type, config);
        Ok(())
    }

    /// Stop polling an attribute. Unknown attributes are ignored.
    pub fn on_unlink(&self, attribute_ref: &AttributeRef) {
        let _entered = self.span.enter();
        if !self.scheduler.unlink(attribute_ref) {
            debug!(attribute = %attribute_ref, "Unlink of attribute that was not linked");
        }
    }

    pub fn is_linked(&self, attribute_ref: &AttributeRef) -> bool {
        self.scheduler.is_linked(attribute_ref)
    }

    /// Write a value to the device through the link's write mapping.
    ///
    /// Links without a write space are read-only; the write is dropped with a
    /// warning and `Ok(None)` is returned.
    pub async fn on_write(
        &self,
        attribute_ref: &AttributeRef,
        config: &LinkConfig,
        value: &Value,
    ) -> Result<Option<WriteAck>> {
        let Some(space) = config.write_space else {
            let _entered = self.span.enter();
            warn!(attribute = %attribute_ref, "Write type is not configured, ignoring write");
            return Ok(None);
        };

        let transport = self.connection.transport();
        let result = WriteDispatcher::new(transport.as_ref())
            .write(
                config.unit_id(self.device.unit_id),
                space.into(),
                config.write_address,
                config.write_encoding(),
                value,
            )
            .instrument(self.span.clone())
            .await;

        match result {
            Ok(ack) => {
                self.health.record_write_ok();
                Ok(Some(ack))
            }
            Err(e) => {
                self.health.record_write_failed();
                let _entered = self.span.enter();
                warn!(attribute = %attribute_ref, error = %e, "Write failed");
                Err(e)
            }
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health
            .snapshot(self.connection.status(), self.scheduler.len())
    }
}
