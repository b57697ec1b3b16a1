//! Workload Traces
//!
//! A trace is a sequence of decimal object IDs separated by whitespace or
//! newlines. Blank lines and everything after a `#` are ignored.
//!
//! ```text
//! # warm set
//! 1 2 3
//! 1 2 3   # repeated
//! 4
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::cache::ObjectId;
use crate::error::{Error, Result};

/// In-memory access trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    ids: Vec<ObjectId>,
}

impl Workload {
    /// Wrap an existing sequence
    pub fn new(ids: Vec<ObjectId>) -> Self {
        Self { ids }
    }

    /// Parse a trace from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut ids = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let content = line.split('#').next().unwrap_or_default();
            for token in content.split_whitespace() {
                let id = token.parse::<ObjectId>().map_err(|e| Error::Workload {
                    line: index + 1,
                    message: format!("invalid object id '{}': {}", token, e),
                })?;
                ids.push(id);
            }
        }
        debug!(accesses = ids.len(), "Workload parsed");
        Ok(Self { ids })
    }

    /// Parse a trace file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Accesses in order
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    /// Number of accesses
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the trace is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Distinct objects referenced
    pub fn distinct(&self) -> usize {
        self.ids.iter().collect::<HashSet<_>>().len()
    }

    /// Training prefix and test suffix; `train` is clamped to the length
    pub fn split(&self, train: usize) -> (&[ObjectId], &[ObjectId]) {
        self.ids.split_at(train.min(self.ids.len()))
    }
}

impl std::str::FromStr for Workload {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_reader(s.as_bytes())
    }
}
