//! # Volley Engine
//!
//! The rate-controlled request injection engine behind the `volley` binary:
//! - `session` - newline-framed TCP sessions behind a small transport seam
//! - `connection` - connection clients with request/response correlation
//! - `rate` - the discretized-accumulator rate controller
//! - `aggregator` - the 1 Hz latency/in-flight report tick
//! - `metrics` - shared run counters
//! - `driver` - fleet construction and the blocking run loop
//!
//! Connections share one tokio runtime. Per-connection state is guarded by
//! per-connection locks and is never touched across an await point; the
//! aggregator observes it only through synchronized snapshots.

pub mod aggregator;
pub mod connection;
pub mod driver;
pub mod metrics;
pub mod rate;
pub mod session;

pub use aggregator::Aggregator;
pub use connection::{ConnState, Connection, ConnectionReport};
pub use driver::{LoadTestDriver, RunSummary};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use rate::{RateController, RatePacer};
pub use session::{Session, SessionSender, TcpTransport, Transport};
