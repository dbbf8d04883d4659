//! Per-device poll and write counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use modlink_common::current_timestamp_millis;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionStatus;

/// Counters for one device, shared by its polling tasks and writes.
#[derive(Debug)]
pub struct LinkHealth {
    /// Device name.
    device: String,
    /// Start time for uptime calculation.
    start_time: Instant,
    /// Polls that returned a value.
    polls_ok: AtomicU64,
    /// Polls that failed in transport or dispatch.
    polls_failed: AtomicU64,
    /// Decoded values dropped because they did not fit the attribute type.
    updates_dropped: AtomicU64,
    /// Completed writes.
    writes_ok: AtomicU64,
    /// Rejected or failed writes.
    writes_failed: AtomicU64,
    /// Millis since epoch of the last successful poll, 0 if none.
    last_success: AtomicI64,
}

/// Health snapshot for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub device: String,
    pub status: ConnectionStatus,
    pub uptime_secs: u64,
    pub linked_attributes: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub updates_dropped: u64,
    pub writes_ok: u64,
    pub writes_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<i64>,
}

impl LinkHealth {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            start_time: Instant::now(),
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            updates_dropped: AtomicU64::new(0),
            writes_ok: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            last_success: AtomicI64::new(0),
        }
    }

    pub fn record_poll_ok(&self) {
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
        self.last_success
            .store(current_timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_poll_failed(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_dropped(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_ok(&self) {
        self.writes_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters.
    pub fn snapshot(&self, status: ConnectionStatus, linked_attributes: usize) -> HealthSnapshot {
        let last_success = self.last_success.load(Ordering::Relaxed);
        HealthSnapshot {
            device: self.device.clone(),
            status,
            uptime_secs: self.start_time.elapsed().as_secs(),
            linked_attributes: linked_attributes as u64,
            polls_ok: self.polls_ok.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            writes_ok: self.writes_ok.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            last_success: (last_success > 0).then_some(last_success),
        }
    }
}
