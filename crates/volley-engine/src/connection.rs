//! Connection clients and correlation tracking
//!
//! One [`Connection`] owns one persistent session. The rate controller
//! pushes send batches in, the session delivers response frames back, and
//! the correlation tracker matches the two to produce latency samples.
//!
//! The outstanding map and sample sequence are touched from three places
//! (the rate controller's tick, the connection's own reader loop, the
//! aggregator's report tick), so each connection guards its state with its
//! own locks; none are ever held across an await point. Faults are
//! terminal and isolated: a faulted connection stops its transport, keeps
//! its outstanding entries abandoned in place (they stay counted as
//! in-flight), and from then on ignores rate dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use volley_core::{encode_request, parse_response_bytes, Corpus, ReportMode, Result, VolleyError};

use crate::metrics::EngineMetrics;
use crate::session::{SessionSender, Transport};

/// Connection lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    /// Not yet started
    Disconnected,
    /// Transport establishment in progress
    Connecting,
    /// Session attached, participating in rate dispatch
    Connected,
    /// Protocol fault; permanently out of the run
    Faulted,
    /// Transport ended without a fault
    Closed,
}

/// Correlation tracker: sequence assignment, outstanding set, samples.
#[derive(Debug, Default)]
struct Correlator {
    /// Next sequence id to assign
    count: u64,
    /// id -> send timestamp for every unresolved request
    outstanding: HashMap<u64, Instant>,
    /// Recorded latency samples, microseconds
    latencies: Vec<u64>,
}

impl Correlator {
    fn next_seq(&self) -> u64 {
        self.count
    }

    /// Record a sent request under the current id and advance the counter.
    fn begin(&mut self, now: Instant) -> u64 {
        let seq = self.count;
        self.outstanding.insert(seq, now);
        self.count += 1;
        seq
    }

    /// Resolve a response id against the outstanding set, producing a
    /// latency sample in microseconds. An id with no outstanding entry
    /// (duplicate delivery, corruption, already resolved) is a fault.
    fn resolve(&mut self, seq: u64, now: Instant) -> Result<u64> {
        let sent_at = self
            .outstanding
            .remove(&seq)
            .ok_or(VolleyError::UnknownId(seq))?;
        let latency_us = now.duration_since(sent_at).as_micros() as u64;
        self.latencies.push(latency_us);
        Ok(latency_us)
    }

    fn in_flight(&self) -> usize {
        self.outstanding.len()
    }
}

/// Snapshot handed to the aggregator each report tick.
#[derive(Clone, Debug)]
pub struct ConnectionReport {
    /// Latency samples, microseconds
    pub latencies: Vec<u64>,
    /// Requests sent but not yet resolved
    pub in_flight: usize,
}

/// One persistent load-generating connection.
pub struct Connection {
    name: String,
    corpus: Corpus,
    report_mode: ReportMode,
    state: Mutex<ConnState>,
    correlator: Mutex<Correlator>,
    session: Mutex<Option<SessionSender>>,
    metrics: Arc<EngineMetrics>,
}

impl Connection {
    pub fn new(
        name: impl Into<String>,
        corpus: Corpus,
        report_mode: ReportMode,
        metrics: Arc<EngineMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            corpus,
            report_mode,
            state: Mutex::new(ConnState::Disconnected),
            correlator: Mutex::new(Correlator::default()),
            session: Mutex::new(None),
            metrics,
        })
    }

    /// Stable connection name; namespaces this connection's request ids.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock()
    }

    /// Emit `n` new requests through the session.
    ///
    /// A no-op unless the connection is `Connected`: the rate controller
    /// keeps dispatching to every slot and relies on this guard for
    /// connections that are still connecting or already out of the run.
    /// All `n` requests share one captured timestamp.
    pub fn send(&self, n: u64) {
        if self.state() != ConnState::Connected {
            trace!("{}: dropping dispatch of {} (not connected)", self.name, n);
            return;
        }
        let session = self.session.lock();
        let Some(sender) = session.as_ref() else {
            return;
        };
        let mut correlator = self.correlator.lock();

        let now = Instant::now();
        let mut written = 0;
        for _ in 0..n {
            let seq = correlator.next_seq();
            let frame = encode_request(&self.name, seq, self.corpus.line(seq));
            if sender.send(frame).is_err() {
                // writer is gone; the reader path will observe the close
                debug!("{}: session stopped mid-batch", self.name);
                break;
            }
            correlator.begin(now);
            written += 1;
        }
        self.metrics.record_sent(written);
    }

    /// Response-delivery entry point. Any error is a protocol fault that
    /// permanently stops this connection.
    fn on_frame(&self, frame: &[u8], received_at: Instant) -> Result<()> {
        let head = parse_response_bytes(frame)?;
        let latency_us = self.correlator.lock().resolve(head.seq, received_at)?;
        self.metrics.record_resolved();
        trace!("{}: resolved {} in {}us", self.name, head.seq, latency_us);
        Ok(())
    }

    /// Synchronized snapshot for the aggregator. Faulted and closed
    /// connections keep answering with their frozen outstanding count.
    pub fn report(&self) -> ConnectionReport {
        let mut correlator = self.correlator.lock();
        let latencies = match self.report_mode {
            ReportMode::Cumulative => correlator.latencies.clone(),
            ReportMode::Windowed => std::mem::take(&mut correlator.latencies),
        };
        ConnectionReport {
            latencies,
            in_flight: correlator.in_flight(),
        }
    }

    /// Terminal fault transition: stop the transport, leave the
    /// outstanding entries abandoned in place.
    fn fault(&self) {
        *self.state.lock() = ConnState::Faulted;
        self.session.lock().take();
        self.metrics.record_fault();
    }

    /// Connect, attach the session, and pump inbound frames until the
    /// transport ends or a protocol fault stops the connection.
    pub async fn run(self: Arc<Self>, transport: Arc<dyn Transport>, addr: String) -> Result<()> {
        *self.state.lock() = ConnState::Connecting;

        let mut session = match transport.connect(&addr).await {
            Ok(session) => session,
            Err(e) => {
                error!("{}: {}", self.name, e);
                *self.state.lock() = ConnState::Closed;
                return Err(e);
            }
        };

        *self.session.lock() = Some(session.sender());
        *self.state.lock() = ConnState::Connected;
        info!("{} connected to {}", self.name, addr);

        while let Some(frame) = session.recv().await {
            let received_at = Instant::now();
            if let Err(e) = self.on_frame(&frame, received_at) {
                error!("{}: {}; stopping connection", self.name, e);
                self.fault();
                return Err(e);
            }
        }

        if self.state() == ConnState::Connected {
            *self.state.lock() = ConnState::Closed;
            self.session.lock().take();
            info!("{} closed", self.name);
        }
        Ok(())
    }

    /// Test hook: seed recorded samples and outstanding entries directly.
    #[cfg(test)]
    pub(crate) fn seed_for_test(&self, latencies: &[u64], outstanding: u64) {
        let mut correlator = self.correlator.lock();
        correlator.latencies.extend_from_slice(latencies);
        for _ in 0..outstanding {
            correlator.begin(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::Mutex as AsyncMutex;

    /// Transport yielding one pre-built in-memory stream.
    struct DuplexTransport {
        stream: AsyncMutex<Option<DuplexStream>>,
    }

    impl DuplexTransport {
        fn pair() -> (Arc<Self>, DuplexStream) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            (
                Arc::new(Self {
                    stream: AsyncMutex::new(Some(client)),
                }),
                server,
            )
        }
    }

    #[async_trait]
    impl Transport for DuplexTransport {
        async fn connect(&self, _addr: &str) -> Result<Session> {
            let stream = self.stream.lock().await.take().expect("single-use transport");
            Ok(Session::from_stream(stream))
        }
    }

    fn test_corpus() -> Corpus {
        Corpus::from_lines(vec!["1..2..3...".into(), "...4.5.6..".into()]).unwrap()
    }

    fn test_connection(mode: ReportMode) -> (Arc<Connection>, Arc<EngineMetrics>) {
        let metrics = Arc::new(EngineMetrics::new());
        let conn = Connection::new("conn0", test_corpus(), mode, metrics.clone());
        (conn, metrics)
    }

    async fn wait_until(mut probe: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if probe() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_correlator_assigns_monotonic_ids() {
        let mut correlator = Correlator::default();
        let now = Instant::now();

        assert_eq!(correlator.begin(now), 0);
        assert_eq!(correlator.begin(now), 1);
        assert_eq!(correlator.begin(now), 2);
        assert_eq!(correlator.next_seq(), 3);
        assert_eq!(correlator.in_flight(), 3);
    }

    #[test]
    fn test_correlator_resolve_round_trip() {
        let mut correlator = Correlator::default();
        let sent_at = Instant::now();
        let seq = correlator.begin(sent_at);

        let latency = correlator
            .resolve(seq, sent_at + Duration::from_micros(1500))
            .unwrap();
        assert_eq!(latency, 1500);
        assert_eq!(correlator.in_flight(), 0);
        assert_eq!(correlator.latencies, vec![1500]);

        // an id cannot be resolved twice
        let err = correlator.resolve(seq, Instant::now()).unwrap_err();
        assert!(matches!(err, VolleyError::UnknownId(0)));
    }

    #[test]
    fn test_correlator_rejects_unknown_id() {
        let mut correlator = Correlator::default();
        let err = correlator.resolve(99, Instant::now()).unwrap_err();
        assert!(matches!(err, VolleyError::UnknownId(99)));
        assert!(correlator.latencies.is_empty());
    }

    #[tokio::test]
    async fn test_send_writes_framed_requests_and_cycles_corpus() {
        let (transport, server) = DuplexTransport::pair();
        let (conn, metrics) = test_connection(ReportMode::Cumulative);

        let runner = tokio::spawn(conn.clone().run(transport, "mem".to_string()));
        wait_until(|| conn.state() == ConnState::Connected).await;

        conn.send(4);

        let mut lines = BufReader::new(server).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "conn0-00000000:1..2..3..."
        );
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "conn0-00000001:...4.5.6.."
        );
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "conn0-00000002:1..2..3..."
        );
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "conn0-00000003:...4.5.6.."
        );

        assert_eq!(metrics.sent.load(std::sync::atomic::Ordering::Relaxed), 4);
        assert_eq!(conn.report().in_flight, 4);

        drop(lines);
        runner.abort();
    }

    #[tokio::test]
    async fn test_send_before_connect_is_a_noop() {
        let (conn, metrics) = test_connection(ReportMode::Cumulative);

        conn.send(10);

        assert_eq!(conn.state(), ConnState::Disconnected);
        assert_eq!(conn.report().in_flight, 0);
        assert_eq!(metrics.sent.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_valid_response_resolves_and_records_latency() {
        let (transport, mut server) = DuplexTransport::pair();
        let (conn, metrics) = test_connection(ReportMode::Cumulative);

        let runner = tokio::spawn(conn.clone().run(transport, "mem".to_string()));
        wait_until(|| conn.state() == ConnState::Connected).await;

        conn.send(2);
        server
            .write_all(b"conn0-00000001:solved\n")
            .await
            .unwrap();

        wait_until(|| conn.report().in_flight == 1).await;

        let report = conn.report();
        assert_eq!(report.latencies.len(), 1);
        assert_eq!(
            metrics.resolved.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        assert_eq!(conn.state(), ConnState::Connected);

        runner.abort();
    }

    #[tokio::test]
    async fn test_malformed_response_faults_connection() {
        let (transport, mut server) = DuplexTransport::pair();
        let (conn, metrics) = test_connection(ReportMode::Cumulative);

        let runner = tokio::spawn(conn.clone().run(transport, "mem".to_string()));
        wait_until(|| conn.state() == ConnState::Connected).await;

        conn.send(3);
        server.write_all(b"no delimiters here\n").await.unwrap();

        wait_until(|| conn.state() == ConnState::Faulted).await;

        // no sample recorded, in-flight frozen at its pre-fault value
        let report = conn.report();
        assert!(report.latencies.is_empty());
        assert_eq!(report.in_flight, 3);
        assert_eq!(
            metrics
                .faulted_connections
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );

        // the run loop surfaced the fault
        let err = runner.await.unwrap().unwrap_err();
        assert!(err.is_connection_fault());

        // further dispatch is a no-op
        conn.send(5);
        assert_eq!(conn.report().in_flight, 3);
    }

    #[tokio::test]
    async fn test_unknown_id_faults_connection() {
        let (transport, mut server) = DuplexTransport::pair();
        let (conn, _metrics) = test_connection(ReportMode::Cumulative);

        let runner = tokio::spawn(conn.clone().run(transport, "mem".to_string()));
        wait_until(|| conn.state() == ConnState::Connected).await;

        // id 5 was never sent
        server.write_all(b"conn0-00000005:garbage\n").await.unwrap();

        wait_until(|| conn.state() == ConnState::Faulted).await;
        let err = runner.await.unwrap().unwrap_err();
        assert!(matches!(err, VolleyError::UnknownId(5)));
    }

    #[tokio::test]
    async fn test_fault_isolation_between_connections() {
        let (transport_a, mut server_a) = DuplexTransport::pair();
        let (transport_b, mut server_b) = DuplexTransport::pair();

        let metrics = Arc::new(EngineMetrics::new());
        let conn_a = Connection::new("conn0", test_corpus(), ReportMode::Cumulative, metrics.clone());
        let conn_b = Connection::new("conn1", test_corpus(), ReportMode::Cumulative, metrics.clone());

        let runner_a = tokio::spawn(conn_a.clone().run(transport_a, "mem".to_string()));
        let runner_b = tokio::spawn(conn_b.clone().run(transport_b, "mem".to_string()));
        wait_until(|| conn_a.state() == ConnState::Connected).await;
        wait_until(|| conn_b.state() == ConnState::Connected).await;

        conn_a.send(2);
        conn_b.send(2);

        server_a.write_all(b"garbage\n").await.unwrap();
        wait_until(|| conn_a.state() == ConnState::Faulted).await;

        // B is untouched and still resolves normally
        assert_eq!(conn_b.state(), ConnState::Connected);
        server_b.write_all(b"conn1-00000000:fine\n").await.unwrap();
        wait_until(|| conn_b.report().in_flight == 1).await;
        assert_eq!(conn_b.report().latencies.len(), 1);

        runner_a.abort();
        runner_b.abort();
    }

    #[tokio::test]
    async fn test_peer_close_marks_connection_closed() {
        let (transport, server) = DuplexTransport::pair();
        let (conn, _metrics) = test_connection(ReportMode::Cumulative);

        let runner = tokio::spawn(conn.clone().run(transport, "mem".to_string()));
        wait_until(|| conn.state() == ConnState::Connected).await;

        drop(server);
        wait_until(|| conn.state() == ConnState::Closed).await;
        assert!(runner.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_report_modes() {
        let (conn, _metrics) = test_connection(ReportMode::Cumulative);
        conn.seed_for_test(&[100, 200], 3);

        // cumulative: the history is re-reported every pull
        assert_eq!(conn.report().latencies, vec![100, 200]);
        assert_eq!(conn.report().latencies, vec![100, 200]);
        assert_eq!(conn.report().in_flight, 3);

        let (windowed, _metrics) = test_connection(ReportMode::Windowed);
        windowed.seed_for_test(&[100, 200], 3);

        // windowed: samples drain, in-flight stays instantaneous
        assert_eq!(windowed.report().latencies, vec![100, 200]);
        assert!(windowed.report().latencies.is_empty());
        assert_eq!(windowed.report().in_flight, 3);
    }
}
