//! Load test driver
//!
//! Owns the configuration, builds the connection fleet, arms the rate
//! controller and aggregator ticks, and blocks until every connection's
//! run loop has exited (or the process is interrupted). Per-connection
//! faults stay isolated here: a failed run loop is logged and the rest of
//! the fleet keeps going.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use volley_core::{Corpus, LatencySummary, LoadConfig, Result};

use crate::aggregator::Aggregator;
use crate::connection::Connection;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::rate::RateController;
use crate::session::{TcpTransport, Transport};

/// Final state of a finished run: the cumulative counters plus one last
/// aggregation pass over the fleet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub counters: MetricsSnapshot,
    pub latency: LatencySummary,
}

/// Wires N connections, the rate controller and the aggregator together.
pub struct LoadTestDriver {
    config: LoadConfig,
    transport: Arc<dyn Transport>,
    connections: Vec<Arc<Connection>>,
    metrics: Arc<EngineMetrics>,
}

impl LoadTestDriver {
    /// Build a driver over plain TCP.
    pub fn new(config: LoadConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(TcpTransport))
    }

    /// Build a driver with an injected transport.
    pub fn with_transport(config: LoadConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let corpus = Corpus::load(&config.corpus_path)?;
        let metrics = Arc::new(EngineMetrics::new());

        let connections = (0..config.connections)
            .map(|i| {
                Connection::new(
                    format!("conn{i}"),
                    corpus.clone(),
                    config.report_mode,
                    metrics.clone(),
                )
            })
            .collect();

        Ok(Self {
            config,
            transport,
            connections,
            metrics,
        })
    }

    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Run to completion: returns once every connection's run loop has
    /// exited, or early on Ctrl-C.
    pub async fn run(&self) -> Result<RunSummary> {
        info!(
            "starting load test: {} connections to {} at {} rps each ({} Hz ticks)",
            self.config.connections,
            self.config.server_addr,
            self.config.target_rps,
            self.config.tick_hz
        );
        self.metrics.mark_started();

        let mut fleet = JoinSet::new();
        for connection in &self.connections {
            let connection = connection.clone();
            let transport = self.transport.clone();
            let addr = self.config.server_addr.clone();
            fleet.spawn(connection.run(transport, addr));
        }

        let rate = RateController::spawn(
            self.config.target_rps,
            self.config.tick_hz,
            self.connections.clone(),
            self.metrics.clone(),
        );
        let aggregator = Aggregator::spawn(self.connections.clone());

        tokio::select! {
            _ = Self::drain(&mut fleet) => {
                info!("all connections finished");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, shutting down");
            }
        }

        rate.abort();
        aggregator.abort();
        fleet.shutdown().await;

        Ok(self.finish())
    }

    /// Wait for every member of the fleet. Faults were already logged with
    /// the connection name inside the run loop; panics should never happen.
    async fn drain(fleet: &mut JoinSet<Result<()>>) {
        while let Some(joined) = fleet.join_next().await {
            match joined {
                Ok(_) => {}
                Err(e) if e.is_panic() => error!("connection task panicked: {}", e),
                Err(_) => {}
            }
        }
    }

    fn finish(&self) -> RunSummary {
        RunSummary {
            counters: self.metrics.snapshot(),
            latency: Aggregator::collect(&self.connections),
        }
    }
}
