//! Latency report rendering
//!
//! Consumes one report interval's combined latency samples plus the
//! in-flight count and renders a one-line distribution summary. Quantiles
//! come from an HDR histogram at 3 significant figures; the aggregator that
//! feeds this module never interprets the numbers itself.

use std::fmt;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Lowest latency the histogram tracks, in microseconds.
const LOWEST_LATENCY_US: u64 = 1;
/// Highest latency the histogram tracks, in microseconds (60 s).
const HIGHEST_LATENCY_US: u64 = 60_000_000;
/// Histogram precision in significant figures.
const SIGFIGS: u8 = 3;

/// Rendered latency distribution for one report interval.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LatencySummary {
    /// When the summary was rendered
    pub timestamp: DateTime<Utc>,
    /// Number of samples behind the distribution
    pub samples: u64,
    /// Requests sent but not yet resolved at render time
    pub in_flight: u64,
    pub min_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub max_us: u64,
}

impl LatencySummary {
    /// Build a summary from raw microsecond samples and the in-flight count.
    ///
    /// Samples outside the trackable range are clamped, never dropped, so
    /// the sample count always matches what the aggregator handed over.
    pub fn from_samples(samples: &[u64], in_flight: u64) -> Self {
        // bounds are static and known-valid, same unwrap as upstream examples
        let mut hist =
            Histogram::<u64>::new_with_bounds(LOWEST_LATENCY_US, HIGHEST_LATENCY_US, SIGFIGS)
                .unwrap();

        for &sample in samples {
            hist.saturating_record(sample.max(LOWEST_LATENCY_US));
        }

        if hist.is_empty() {
            return Self::empty(in_flight);
        }

        Self {
            timestamp: Utc::now(),
            samples: samples.len() as u64,
            in_flight,
            min_us: hist.min(),
            mean_us: hist.mean() as u64,
            p50_us: hist.value_at_quantile(0.50),
            p90_us: hist.value_at_quantile(0.90),
            p99_us: hist.value_at_quantile(0.99),
            p999_us: hist.value_at_quantile(0.999),
            max_us: hist.max(),
        }
    }

    fn empty(in_flight: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            samples: 0,
            in_flight,
            min_us: 0,
            mean_us: 0,
            p50_us: 0,
            p90_us: 0,
            p99_us: 0,
            p999_us: 0,
            max_us: 0,
        }
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "samples={} in-flight={} min={}us mean={}us p50={}us p90={}us p99={}us p99.9={}us max={}us",
            self.samples,
            self.in_flight,
            self.min_us,
            self.mean_us,
            self.p50_us,
            self.p90_us,
            self.p99_us,
            self.p999_us,
            self.max_us,
        )
    }
}
