//! Request corpus loading
//!
//! The corpus is a line-oriented text file of request payloads. Requests
//! consume lines cyclically: request `i` uses `lines[i mod len]`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, VolleyError};

/// Immutable, cyclically indexed request corpus shared by all connections.
///
/// Cloning is cheap; all clones share the same backing lines.
#[derive(Clone, Debug)]
pub struct Corpus {
    lines: Arc<Vec<String>>,
}

impl Corpus {
    /// Load a corpus file, dropping empty lines and trailing whitespace.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| VolleyError::CorpusUnreadable {
            path: path.display().to_string(),
            source,
        })?;

        let lines: Vec<String> = raw
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        if lines.is_empty() {
            return Err(VolleyError::CorpusEmpty(path.display().to_string()));
        }

        info!("loaded {} corpus lines from {}", lines.len(), path.display());
        Ok(Self {
            lines: Arc::new(lines),
        })
    }

    /// Build a corpus from lines already in memory.
    pub fn from_lines(lines: Vec<String>) -> Result<Self> {
        if lines.is_empty() {
            return Err(VolleyError::CorpusEmpty("<memory>".to_string()));
        }
        Ok(Self {
            lines: Arc::new(lines),
        })
    }

    /// Number of lines in the corpus.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false for a constructed corpus; constructors reject empty input.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The payload used by the `i`-th request: `lines[i mod len]`.
    pub fn line(&self, i: u64) -> &str {
        &self.lines[(i % self.lines.len() as u64) as usize]
    }
}
