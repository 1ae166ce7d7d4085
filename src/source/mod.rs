//! Abstractions for metrics backend access.
//!
//! The `MetricsSource` trait allows the engine to work with the real
//! Prometheus HTTP API and with mock implementations in tests. Fetch
//! failures are transient by design: the refresh loop logs them and keeps
//! rendering the previous sample set.

mod prom;

pub use prom::PromClient;

use std::collections::HashMap;

/// One instant-vector member returned by the backend.
///
/// The value is kept as raw text; the series indexer parses it and drops
/// the sample if it is not numeric.
#[derive(Debug, Clone)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: String,
}

impl Sample {
    pub fn new(labels: &[(&str, &str)], value: &str) -> Self {
        Sample {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value: value.to_string(),
        }
    }
}

/// Error type for sample fetching.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Transport-level failure (connection, timeout, non-2xx status).
    Http(String),
    /// Response body could not be decoded.
    Decode(String),
    /// The backend answered with a non-success status payload.
    Backend(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(msg) => write!(f, "fetch failed: {}", msg),
            FetchError::Decode(msg) => write!(f, "bad response: {}", msg),
            FetchError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Abstraction for executing instant queries against a metrics backend.
pub trait MetricsSource {
    /// Executes one query and returns all matching series.
    fn query(&self, query: &str) -> Result<Vec<Sample>, FetchError>;
}

/// Mock source for tests: canned samples per query text.
#[derive(Debug, Default)]
pub struct MockSource {
    responses: HashMap<String, Vec<Sample>>,
    fail_all: bool,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the samples returned for an exact query text.
    pub fn with_series(mut self, query: &str, samples: Vec<Sample>) -> Self {
        self.responses.insert(query.to_string(), samples);
        self
    }

    /// A source whose every query fails.
    pub fn failing() -> Self {
        MockSource {
            responses: HashMap::new(),
            fail_all: true,
        }
    }
}

impl MetricsSource for MockSource {
    fn query(&self, query: &str) -> Result<Vec<Sample>, FetchError> {
        if self.fail_all {
            return Err(FetchError::Http("mock source is failing".to_string()));
        }
        Ok(self.responses.get(query).cloned().unwrap_or_default())
    }
}
