//! Connection lifecycle and status for one device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{ModbusError, Result};
use crate::transport::ModbusTransport;

/// Connection status of a device.
///
/// Advisory only: it reflects the outcome of the last start/stop, and is
/// not updated when individual requests fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Owns the transport of one device and its connection status.
pub struct ConnectionLifecycle<T: ModbusTransport> {
    transport: Arc<T>,
    status: watch::Sender<ConnectionStatus>,
    started: AtomicBool,
}

impl<T: ModbusTransport> ConnectionLifecycle<T> {
    pub fn new(transport: T) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport: Arc::new(transport),
            status,
            started: AtomicBool::new(false),
        }
    }

    /// Shared handle to the transport, for dispatchers.
    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Connect the transport.
    ///
    /// A connect failure sets the status to `Error` and is returned; the
    /// device must not start polling in that case.
    pub async fn start(&self) -> Result<ConnectionStatus> {
        self.set_status(ConnectionStatus::Connecting);
        self.started.store(true, Ordering::Release);

        if let Err(e) = self.transport.connect().await {
            error!(error = %e, "Failed to connect to Modbus device");
            self.set_status(ConnectionStatus::Error);
            return Err(ModbusError::Connection(e.to_string()));
        }

        let status = if self.transport.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        self.set_status(status);
        info!(status = %status, "Modbus connection started");

        Ok(status)
    }

    /// Close the transport. Safe to call when never started, or repeatedly.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Error closing Modbus connection");
        }
        self.set_status(ConnectionStatus::Disconnected);
        info!("Modbus connection stopped");
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }
}
