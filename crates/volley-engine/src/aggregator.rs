//! Periodic latency aggregation
//!
//! Once per second, pull every connection's recorded samples and in-flight
//! count, merge them, and hand the merged view to the report renderer in
//! `volley_core::report`. This module never interprets the numbers; it only
//! collects and logs the rendered line.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use volley_core::LatencySummary;

use crate::connection::Connection;

/// Interval between report ticks.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Aggregator;

impl Aggregator {
    /// Arm the 1 Hz report tick. The returned handle is aborted at
    /// shutdown.
    pub fn spawn(connections: Vec<Arc<Connection>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(REPORT_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // skip the immediate first tick; it would report an empty run
            interval.tick().await;
            loop {
                interval.tick().await;
                let summary = Self::collect(&connections);
                info!("{}", summary);
            }
        })
    }

    /// One aggregation pass over all connections: combined samples plus the
    /// combined in-flight count.
    pub fn collect(connections: &[Arc<Connection>]) -> LatencySummary {
        let mut samples = Vec::new();
        let mut in_flight = 0u64;

        for connection in connections {
            let report = connection.report();
            samples.extend(report.latencies);
            in_flight += report.in_flight as u64;
        }

        LatencySummary::from_samples(&samples, in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::EngineMetrics;
    use volley_core::{Corpus, ReportMode};

    fn fleet(mode: ReportMode) -> Vec<Arc<Connection>> {
        let metrics = Arc::new(EngineMetrics::new());
        let corpus = Corpus::from_lines(vec!["x".into()]).unwrap();
        vec![
            Connection::new("conn0", corpus.clone(), mode, metrics.clone()),
            Connection::new("conn1", corpus, mode, metrics),
        ]
    }

    #[tokio::test]
    async fn test_collect_merges_all_connections() {
        let connections = fleet(ReportMode::Cumulative);
        connections[0].seed_for_test(&[100, 200], 2);
        connections[1].seed_for_test(&[300], 1);

        let summary = Aggregator::collect(&connections);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.in_flight, 3);
        assert_eq!(summary.min_us, 100);
        assert_eq!(summary.max_us, 300);
    }

    #[tokio::test]
    async fn test_cumulative_mode_re_reports_history() {
        let connections = fleet(ReportMode::Cumulative);
        connections[0].seed_for_test(&[500], 0);

        assert_eq!(Aggregator::collect(&connections).samples, 1);
        assert_eq!(Aggregator::collect(&connections).samples, 1);
    }

    #[tokio::test]
    async fn test_windowed_mode_drains_samples() {
        let connections = fleet(ReportMode::Windowed);
        connections[0].seed_for_test(&[500], 4);

        let first = Aggregator::collect(&connections);
        assert_eq!(first.samples, 1);
        assert_eq!(first.in_flight, 4);

        // drained, but in-flight remains instantaneous
        let second = Aggregator::collect(&connections);
        assert_eq!(second.samples, 0);
        assert_eq!(second.in_flight, 4);
    }
}
