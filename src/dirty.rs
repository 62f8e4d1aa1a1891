//! Collection of malformed ("dirty") records.
//!
//! A writer task never fails because of a single bad record. Instead it hands the
//! record and a reason to a [`DirtyRecordCollector`] and moves on. Collectors are
//! shared by every task of a job, so they must be `Send + Sync`.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Receives records a task could not write.
pub trait DirtyRecordCollector: Send + Sync {
    fn collect(&self, task_id: usize, record: &Record, reason: &str);
}

/// A rejected record with its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirtyRecord {
    pub task_id: usize,
    pub record: Record,
    pub reason: String,
}

/// Keeps every dirty record in memory for later inspection or export.
#[derive(Debug, Default)]
pub struct MemoryCollector {
    records: Mutex<Vec<DirtyRecord>>,
}

impl MemoryCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records collected so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().expect("collector mutex poisoned").len()
    }

    /// A copy of everything collected so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn records(&self) -> Vec<DirtyRecord> {
        self.records.lock().expect("collector mutex poisoned").clone()
    }

    /// Export collected records as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records())
    }

    /// Write collected records to `path` as JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl DirtyRecordCollector for MemoryCollector {
    fn collect(&self, task_id: usize, record: &Record, reason: &str) {
        self.records
            .lock()
            .expect("collector mutex poisoned")
            .push(DirtyRecord {
                task_id,
                record: record.clone(),
                reason: reason.to_string(),
            });
    }
}

impl fmt::Display for MemoryCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryCollector({} dirty records)", self.count())
    }
}

/// Logs each dirty record at `warn` and keeps only a count.
#[derive(Debug, Default)]
pub struct LoggingCollector {
    count: AtomicU64,
}

impl LoggingCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl DirtyRecordCollector for LoggingCollector {
    fn collect(&self, task_id: usize, record: &Record, reason: &str) {
        self.count.fetch_add(1, Ordering::Relaxed);
        warn!(task_id, ?record, reason, "dirty record skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn memory_collector_exports_json() {
        let c = MemoryCollector::new();
        c.collect(2, &record!["x"], "column [id]: [x] is not an integer");
        assert_eq!(c.count(), 1);
        let json = c.to_json().unwrap();
        assert!(json.contains("\"task_id\": 2"));
        assert!(json.contains("is not an integer"));
    }

    #[test]
    fn logging_collector_counts() {
        let c = LoggingCollector::new();
        c.collect(0, &record![1_i64], "bad");
        c.collect(1, &record![2_i64], "bad");
        assert_eq!(c.count(), 2);
    }
}
