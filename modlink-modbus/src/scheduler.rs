//! Periodic polling of linked attributes.
//!
//! Each linked attribute gets its own task: poll, then wait the refresh
//! interval, then poll again. The wait starts after the previous poll
//! finished, so slow devices never see overlapping requests for the same
//! attribute. Tasks are cancelled between polls; a poll already in flight
//! runs to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use modlink_common::{AttributeRef, AttributeType, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::codec;
use crate::config::LinkConfig;
use crate::dispatch::ReadDispatcher;
use crate::error::Result;
use crate::health::LinkHealth;
use crate::sink::AttributeSink;
use crate::transport::ModbusTransport;

/// A running polling task.
struct PollingTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollingTask {
    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Registry of polling tasks for one device, keyed by attribute.
pub struct PollingScheduler<T: ModbusTransport, S: AttributeSink> {
    transport: Arc<T>,
    sink: Arc<S>,
    health: Arc<LinkHealth>,
    default_unit_id: u8,
    default_interval: Duration,
    span: Span,
    tasks: Mutex<HashMap<AttributeRef, PollingTask>>,
}

impl<T: ModbusTransport, S: AttributeSink> PollingScheduler<T, S> {
    pub fn new(
        transport: Arc<T>,
        sink: Arc<S>,
        health: Arc<LinkHealth>,
        default_unit_id: u8,
        default_interval: Duration,
        span: Span,
    ) -> Self {
        Self {
            transport,
            sink,
            health,
            default_unit_id,
            default_interval,
            span,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling an attribute, replacing any task already registered for it.
    ///
    /// The first poll runs immediately.
    pub fn link(&self, attribute_ref: AttributeRef, value_type: AttributeType, config: LinkConfig) {
        let mut tasks = self.tasks();

        if let Some(previous) = tasks.remove(&attribute_ref) {
            previous.cancel();
            debug!(attribute = %attribute_ref, "Replacing existing polling task");
        }

        let cancel = CancellationToken::new();
        let poll = PollLoop {
            unit_id: config.unit_id(self.default_unit_id),
            interval: config.refresh_interval(self.default_interval),
            attribute_ref: attribute_ref.clone(),
            value_type,
            config,
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            health: Arc::clone(&self.health),
        };

        let handle = tokio::spawn(poll.run(cancel.clone()).instrument(self.span.clone()));
        tasks.insert(attribute_ref, PollingTask { cancel, handle });
    }

    /// Stop polling an attribute. Returns false if it was not linked.
    pub fn unlink(&self, attribute_ref: &AttributeRef) -> bool {
        match self.tasks().remove(attribute_ref) {
            Some(task) => {
                task.cancel();
                debug!(attribute = %attribute_ref, "Polling task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_linked(&self, attribute_ref: &AttributeRef) -> bool {
        self.tasks().contains_key(attribute_ref)
    }

    /// Number of registered polling tasks.
    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Cancel every polling task and wait for them to wind down.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.tasks().drain().map(|(_, task)| task).collect();
        if drained.is_empty() {
            return;
        }

        for task in &drained {
            task.cancel();
        }
        for task in drained {
            if let Err(e) = task.handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Polling task panicked");
                }
            }
        }
        info!("All polling tasks stopped");
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<AttributeRef, PollingTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ModbusTransport, S: AttributeSink> Drop for PollingScheduler<T, S> {
    fn drop(&mut self) {
        for task in self.tasks().values() {
            task.cancel();
        }
    }
}

/// State owned by one polling task.
struct PollLoop<T: ModbusTransport, S: AttributeSink> {
    attribute_ref: AttributeRef,
    value_type: AttributeType,
    config: LinkConfig,
    unit_id: u8,
    interval: Duration,
    transport: Arc<T>,
    sink: Arc<S>,
    health: Arc<LinkHealth>,
}

impl<T: ModbusTransport, S: AttributeSink> PollLoop<T, S> {
    async fn run(self, cancel: CancellationToken) {
        info!(
            attribute = %self.attribute_ref,
            unit_id = self.unit_id,
            space = %self.config.read_space,
            address = self.config.read_address,
            interval_ms = self.interval.as_millis() as u64,
            "Polling started"
        );

        while !cancel.is_cancelled() {
            self.poll_once().await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(attribute = %self.attribute_ref, "Polling stopped");
    }

    /// Read, decode and publish once. Failures are logged and counted.
    async fn poll_once(&self) {
        let value = match self.read_value().await {
            Ok(value) => value,
            Err(e) => {
                self.health.record_poll_failed();
                warn!(attribute = %self.attribute_ref, error = %e, "Poll failed");
                return;
            }
        };
        self.health.record_poll_ok();

        match value.coerce(self.value_type) {
            Ok(value) => {
                debug!(attribute = %self.attribute_ref, value = %value, "Polled value");
                self.sink.publish(&self.attribute_ref, value);
            }
            Err(e) => {
                self.health.record_update_dropped();
                warn!(attribute = %self.attribute_ref, error = %e, "Dropping polled value");
            }
        }
    }

    async fn read_value(&self) -> Result<Value> {
        let raw = ReadDispatcher::new(self.transport.as_ref())
            .read(
                self.unit_id,
                self.config.read_space,
                self.config.read_address,
                self.config.read_quantity(),
            )
            .await?;
        Ok(codec::decode(&raw, self.config.read_encoding()))
    }
}
