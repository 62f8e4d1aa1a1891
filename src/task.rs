//! A single writer task.
//!
//! Each task owns one [`FilePathPair`]: it opens its own filesystem connection,
//! creates the temp file, streams records from its source through the format
//! writer and reports how it went. Tasks never touch the final path.

use crate::dirty::DirtyRecordCollector;
use crate::error::{Result, WriterError};
use crate::io::format::{RecordError, open_format_writer};
use crate::io::fs::{ConnectOptions, FileSystem, FileSystemConnector};
use crate::plan::WritePlan;
use crate::record::RecordSource;
use crate::split::FilePathPair;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Failed(String),
}

impl TaskStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub records_written: u64,
    pub dirty_records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: usize,
    pub pair: FilePathPair,
    pub status: TaskStatus,
    pub stats: TaskStats,
}

/// Run one task to completion. Never panics on I/O failure; every fault ends up
/// in the returned [`TaskStatus`].
pub fn execute_task(
    plan: &WritePlan,
    connector: &dyn FileSystemConnector,
    task_id: usize,
    pair: FilePathPair,
    source: &mut dyn RecordSource,
    collector: &dyn DirtyRecordCollector,
) -> TaskResult {
    info!(task_id, temp = %pair.temp(), "task started");
    let mut stats = TaskStats::default();

    let status = match connect(plan, connector) {
        Ok(mut fs) => {
            let outcome = write_file(
                plan,
                fs.as_ref(),
                task_id,
                &pair,
                source,
                collector,
                &mut stats,
            );
            if let Err(e) = fs.close() {
                warn!(task_id, error = %e, "closing task filesystem failed");
            }
            match outcome {
                Ok(()) => TaskStatus::Success,
                Err(e) => TaskStatus::Failed(e.to_string()),
            }
        }
        Err(e) => TaskStatus::Failed(e.to_string()),
    };

    match &status {
        TaskStatus::Success => info!(
            task_id,
            records = stats.records_written,
            dirty = stats.dirty_records,
            "task finished"
        ),
        TaskStatus::Failed(reason) => error!(
            task_id,
            records = stats.records_written,
            dirty = stats.dirty_records,
            reason = %reason,
            "task failed"
        ),
    }
    TaskResult {
        task_id,
        pair,
        status,
        stats,
    }
}

fn connect(plan: &WritePlan, connector: &dyn FileSystemConnector) -> Result<Box<dyn FileSystem>> {
    connector.connect(
        &plan.default_fs,
        &ConnectOptions {
            kerberos: plan.kerberos.clone(),
            ..ConnectOptions::default()
        },
    )
}

fn write_file(
    plan: &WritePlan,
    fs: &dyn FileSystem,
    task_id: usize,
    pair: &FilePathPair,
    source: &mut dyn RecordSource,
    collector: &dyn DirtyRecordCollector,
    stats: &mut TaskStats,
) -> Result<()> {
    let sink = fs.create(pair.temp())?;
    let mut writer = open_format_writer(plan, sink)?;
    while let Some(record) = source.next_record() {
        match writer.write(&record) {
            Ok(()) => stats.records_written += 1,
            Err(RecordError::Dirty(reason)) => {
                stats.dirty_records += 1;
                collector.collect(task_id, &record, &reason);
            }
            Err(RecordError::Fatal(e)) => return Err(fatal(pair, e)),
        }
    }
    writer.close().map_err(|e| fatal(pair, e))
}

fn fatal(pair: &FilePathPair, err: WriterError) -> WriterError {
    WriterError::new(err.kind, format!("writing {} failed: {}", pair.temp(), err.message))
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::MemoryCollector;
    use crate::io::fs::{FakeConnector, FakeFileSystem};
    use crate::record;
    use crate::testing::{pair, text_plan};

    #[test]
    fn writes_good_records_and_collects_bad_ones() {
        let connector = FakeConnector::new(FakeFileSystem::new());
        let plan = text_plan("/out", "part");
        let collector = MemoryCollector::new();
        let mut source = vec![record![1_i64, "a"], record!["nope", "b"], record![3_i64, "c"]]
            .into_iter();
        let result = execute_task(
            &plan,
            &connector,
            0,
            pair("/out__t/part__x", "/out/part__x"),
            &mut source,
            &collector,
        );
        assert!(result.status.is_success());
        assert_eq!(result.stats.records_written, 2);
        assert_eq!(result.stats.dirty_records, 1);
        assert_eq!(collector.count(), 1);
        let fs = connector.filesystem();
        assert_eq!(fs.read("/out__t/part__x").unwrap(), b"1,a\n3,c\n");
        assert!(!fs.exists("/out/part__x").unwrap());
        assert_eq!(fs.close_count(), 1);
    }

    #[test]
    fn create_failure_fails_the_task() {
        let fs = FakeFileSystem::new();
        fs.fail_create_with_prefix("part__");
        let connector = FakeConnector::new(fs);
        let plan = text_plan("/out", "part");
        let mut source = std::iter::empty::<crate::record::Record>();
        let result = execute_task(
            &plan,
            &connector,
            3,
            pair("/out__t/part__x", "/out/part__x"),
            &mut source,
            &MemoryCollector::new(),
        );
        assert!(matches!(result.status, TaskStatus::Failed(_)));
        assert_eq!(result.task_id, 3);
    }

    #[test]
    fn refused_connection_fails_the_task() {
        let connector = FakeConnector::new(FakeFileSystem::new());
        connector.set_refuse_connections(true);
        let plan = text_plan("/out", "part");
        let result = execute_task(
            &plan,
            &connector,
            0,
            pair("/out__t/part__x", "/out/part__x"),
            &mut std::iter::empty::<crate::record::Record>(),
            &MemoryCollector::new(),
        );
        assert!(!result.status.is_success());
    }
}
