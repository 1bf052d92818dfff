//! Run metrics.
//!
//! [`MetricsCollector`] is a cheap-to-clone, thread-safe bag of named counters
//! and per-stage timings. The driver fills it while the stages run, logs a
//! summary at the end and saves it as JSON next to the corpus.
//!
//! # Example
//!
//! ```
//! use fnr_dataprep::metrics::MetricsCollector;
//!
//! let metrics = MetricsCollector::new();
//! metrics.increment_counter("rows_read", 10);
//! metrics.increment_counter("rows_read", 5);
//! assert_eq!(metrics.counter("rows_read"), Some(15));
//! ```

use crate::io::AtomicOutput;
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

#[derive(Default)]
struct MetricsCollectorInner {
    counters: BTreeMap<String, u64>,
    stage_times: BTreeMap<String, Duration>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsCollectorInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record the start time of the run.
    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    /// Record the end time of the run.
    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Elapsed run time, once both ends are recorded.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to a counter, creating it at zero if needed.
    pub fn increment_counter(&self, name: &str, value: u64) {
        *self.lock().counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().counters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock().counters.get(name).copied()
    }

    pub fn record_stage_time(&self, stage: &str, elapsed: Duration) {
        self.lock().stage_times.insert(stage.to_string(), elapsed);
    }

    #[must_use]
    pub fn stage_time(&self, stage: &str) -> Option<Duration> {
        self.lock().stage_times.get(stage).copied()
    }

    /// Everything as one JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let stages: serde_json::Map<String, Value> = inner
            .stage_times
            .iter()
            .map(|(k, v)| (k.clone(), json!(v.as_millis() as u64)))
            .collect();
        let mut out = json!({
            "counters": inner.counters,
            "stage_time_ms": stages,
        });
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            out["execution_time_ms"] = json!(end.duration_since(start).as_millis() as u64);
        }
        out
    }

    /// Log every counter and stage time at `info`.
    pub fn log_summary(&self) {
        let inner = self.lock();
        for (name, value) in &inner.counters {
            info!(metric = %name, value, "counter");
        }
        for (stage, elapsed) in &inner.stage_times {
            info!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "stage time");
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            info!(
                elapsed_s = format!("{:.3}", end.duration_since(start).as_secs_f64()),
                "run finished"
            );
        }
    }

    /// Save all metrics to a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut out = AtomicOutput::create(path)?;
        for line in formatted.lines() {
            out.write_line(line)?;
        }
        out.commit()?;
        Ok(())
    }
}
