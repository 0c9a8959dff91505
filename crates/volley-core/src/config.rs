//! Load test configuration types

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolleyError};

/// Rate controller tick frequency used when none is configured, in Hz.
pub const DEFAULT_TICK_HZ: u32 = 100;

/// How the aggregator hands latency samples to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Re-report the full sample history every interval.
    Cumulative,
    /// Drain samples at each report so every interval stands alone.
    Windowed,
}

impl Default for ReportMode {
    fn default() -> Self {
        Self::Cumulative
    }
}

impl FromStr for ReportMode {
    type Err = VolleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cumulative" => Ok(Self::Cumulative),
            "windowed" => Ok(Self::Windowed),
            other => Err(VolleyError::InvalidConfig(format!(
                "unknown report mode '{other}', expected 'cumulative' or 'windowed'"
            ))),
        }
    }
}

/// Complete load test configuration. Built once at startup, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Number of persistent connections
    pub connections: usize,

    /// Target requests per second, per connection
    pub target_rps: u64,

    /// Server address (`host:port`)
    pub server_addr: String,

    /// Path to the line-oriented request corpus
    pub corpus_path: PathBuf,

    /// Rate controller tick frequency in Hz
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Latency report accumulation mode
    #[serde(default)]
    pub report_mode: ReportMode,
}

fn default_tick_hz() -> u32 {
    DEFAULT_TICK_HZ
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            connections: 1,
            target_rps: 100,
            server_addr: "127.0.0.1:2007".to_string(),
            corpus_path: PathBuf::from("corpus.txt"),
            tick_hz: DEFAULT_TICK_HZ,
            report_mode: ReportMode::default(),
        }
    }
}

impl LoadConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.connections == 0 {
            return Err(VolleyError::InvalidConfig(
                "connection count must be at least 1".to_string(),
            ));
        }
        if self.tick_hz == 0 {
            return Err(VolleyError::InvalidConfig(
                "tick frequency must be at least 1 Hz".to_string(),
            ));
        }
        if self.server_addr.is_empty() {
            return Err(VolleyError::InvalidConfig(
                "server address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
