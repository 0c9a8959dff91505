//! Shared run counters
//!
//! Cumulative counters shared by the rate controller, the connections and
//! the driver. Updated with relaxed atomics on the hot paths; read once a
//! run for the final summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Engine-wide counters for one run.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Requests the rate controller asked connections to send
    pub dispatched: AtomicU64,

    /// Requests actually handed to a session
    pub sent: AtomicU64,

    /// Responses resolved against an outstanding request
    pub resolved: AtomicU64,

    /// Connections that hit a protocol fault
    pub faulted_connections: AtomicU64,

    /// Run start, set by the driver
    start_time: RwLock<Option<Instant>>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    pub fn record_dispatched(&self, n: u64) {
        self.dispatched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faulted_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed_secs = self
            .start_time
            .read()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let sent = self.sent.load(Ordering::Relaxed);

        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            sent,
            resolved: self.resolved.load(Ordering::Relaxed),
            faulted_connections: self.faulted_connections.load(Ordering::Relaxed),
            elapsed_secs,
            achieved_rps: if elapsed_secs > 0.0 {
                sent as f64 / elapsed_secs
            } else {
                0.0
            },
        }
    }
}

/// Serializable counter snapshot for the final run summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub sent: u64,
    pub resolved: u64,
    pub faulted_connections: u64,
    pub elapsed_secs: f64,
    pub achieved_rps: f64,
}
