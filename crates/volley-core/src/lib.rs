//! # Volley Core
//!
//! Core building blocks for the Volley closed-loop load generator:
//! - `wire` - the request/response line grammar used for correlation
//! - `corpus` - the cyclically indexed request payload corpus
//! - `report` - the per-interval latency distribution renderer
//! - `config` - immutable load test configuration
//! - `error` - the error taxonomy shared across the workspace

pub mod config;
pub mod corpus;
pub mod error;
pub mod report;
pub mod wire;

pub use config::*;
pub use corpus::*;
pub use error::*;
pub use report::*;
pub use wire::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LoadConfig, ReportMode};
    pub use crate::corpus::Corpus;
    pub use crate::error::{Result, VolleyError};
    pub use crate::report::LatencySummary;
    pub use crate::wire::{encode_request, parse_response_bytes, ResponseHead};
}
