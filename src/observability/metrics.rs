//! Metrics collection.
//!
//! # Metrics
//! - `backend_requests_total` (counter, requests): requests sent to a backend
//! - `backend_errors_total` (counter, errors): backend failures
//!
//! Both are labeled with `backend=<kind>`. The dispatcher only registers and
//! labels them; backends do the incrementing.
//!
//! # Design Decisions
//! - Sinks are injected, so tests substitute [`InMemorySink`]
//! - Registering the same name twice is an error, never a silent duplicate
//! - [`MetricsFacadeSink`] forwards to the `metrics` crate recorder

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

pub const BACKEND_REQUESTS_METRIC: &str = "backend_requests_total";
pub const BACKEND_REQUESTS_UNIT: &str = "requests";
pub const BACKEND_REQUESTS_HELP: &str = "The number of requests sent to the backend.";

pub const BACKEND_ERRORS_METRIC: &str = "backend_errors_total";
pub const BACKEND_ERRORS_UNIT: &str = "errors";
pub const BACKEND_ERRORS_HELP: &str = "The number of errors in the backend.";

/// Label carrying the backend kind.
pub const BACKEND_LABEL: &str = "backend";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("metric {0} is already registered")]
    Duplicate(String),
}

/// A monotonic counter, possibly pre-labeled.
pub trait Counter: Send + Sync + fmt::Debug {
    /// Add `value` to the series identified by this counter's labels.
    fn increment(&self, value: u64);

    /// Derive a counter with one more label.
    fn with_label(&self, key: &str, value: &str) -> Arc<dyn Counter>;
}

/// Registry that hands out counters.
pub trait MetricsSink: Send + Sync {
    fn create_counter(&self, name: &str, unit: &str, help: &str) -> Result<Arc<dyn Counter>, MetricsError>;
}

/// Names already registered with a sink.
#[derive(Debug, Default)]
struct Registered(Mutex<HashSet<String>>);

impl Registered {
    fn claim(&self, name: &str) -> Result<(), MetricsError> {
        let mut names = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if names.insert(name.to_string()) {
            Ok(())
        } else {
            Err(MetricsError::Duplicate(name.to_string()))
        }
    }
}

/// Sink backed by the global `metrics` recorder.
#[derive(Debug, Default)]
pub struct MetricsFacadeSink {
    registered: Registered,
}

impl MetricsFacadeSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for MetricsFacadeSink {
    fn create_counter(&self, name: &str, unit: &str, help: &str) -> Result<Arc<dyn Counter>, MetricsError> {
        self.registered.claim(name)?;

        ::metrics::describe_counter!(
            name.to_string(),
            ::metrics::Unit::Count,
            format!("{} ({})", help, unit)
        );

        Ok(Arc::new(FacadeCounter {
            name: name.to_string(),
            labels: Vec::new(),
        }))
    }
}

#[derive(Debug, Clone)]
struct FacadeCounter {
    name: String,
    labels: Vec<::metrics::Label>,
}

impl Counter for FacadeCounter {
    fn increment(&self, value: u64) {
        ::metrics::counter!(self.name.clone(), self.labels.clone()).increment(value);
    }

    fn with_label(&self, key: &str, value: &str) -> Arc<dyn Counter> {
        let mut labeled = self.clone();
        labeled
            .labels
            .push(::metrics::Label::new(key.to_string(), value.to_string()));
        Arc::new(labeled)
    }
}

/// In-process sink; values are readable back for assertions.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    registered: Arc<Registered>,
    values: Arc<DashMap<String, u64>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one labeled series.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.values
            .get(&series_key(name, &labels))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Sum over every series of a metric.
    pub fn total(&self, name: &str) -> u64 {
        self.values
            .iter()
            .filter(|entry| entry.key() == name || entry.key().starts_with(&format!("{}{{", name)))
            .map(|entry| *entry.value())
            .sum()
    }
}

impl MetricsSink for InMemorySink {
    fn create_counter(&self, name: &str, _unit: &str, _help: &str) -> Result<Arc<dyn Counter>, MetricsError> {
        self.registered.claim(name)?;
        Ok(Arc::new(InMemoryCounter {
            name: name.to_string(),
            labels: Vec::new(),
            values: Arc::clone(&self.values),
        }))
    }
}

#[derive(Clone)]
struct InMemoryCounter {
    name: String,
    labels: Vec<(String, String)>,
    values: Arc<DashMap<String, u64>>,
}

impl fmt::Debug for InMemoryCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCounter")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .finish()
    }
}

impl Counter for InMemoryCounter {
    fn increment(&self, value: u64) {
        *self
            .values
            .entry(series_key(&self.name, &self.labels))
            .or_insert(0) += value;
    }

    fn with_label(&self, key: &str, value: &str) -> Arc<dyn Counter> {
        let mut labeled = self.clone();
        labeled.labels.push((key.to_string(), value.to_string()));
        Arc::new(labeled)
    }
}

/// `name{k1="v1",k2="v2"}` with labels sorted by key.
fn series_key(name: &str, labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut sorted: Vec<_> = labels.iter().collect();
    sorted.sort();
    let rendered: Vec<String> = sorted
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{}{{{}}}", name, rendered.join(","))
}
