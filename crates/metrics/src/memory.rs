use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::registry::MetricDefinition;
use crate::service::{Labels, RecordService};

/// Recorder that keeps the latest value of every gauge in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecorder {
    values: Arc<Mutex<BTreeMap<(String, Labels), f64>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    flushes: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
}

impl MemoryRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `record` of `metric` fail.
    pub fn fail_on(&self, metric: &str) {
        self.failing.lock().insert(metric.to_string());
    }

    /// Latest value of `metric` with exactly `labels`.
    #[must_use]
    pub fn get(&self, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let labels: Labels = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.values
            .lock()
            .get(&(metric.to_string(), labels))
            .copied()
    }

    /// Every sample of `metric`, keyed by label set.
    #[must_use]
    pub fn samples(&self, metric: &str) -> Vec<(Labels, f64)> {
        self.values
            .lock()
            .iter()
            .filter(|((name, _), _)| name == metric)
            .map(|((_, labels), value)| (labels.clone(), *value))
            .collect()
    }

    /// Number of recorded series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Number of completed flushes.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of resets. Recorded values are kept across resets.
    #[must_use]
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordService for MemoryRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        if self.failing.lock().contains(metric.name) {
            return Err(Error::Record {
                metric: metric.name,
                reason: "injected failure".to_string(),
            });
        }

        self.values
            .lock()
            .insert((metric.name.to_string(), labels.clone()), value);
        Ok(())
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
