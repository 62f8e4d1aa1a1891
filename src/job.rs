//! The write pipeline.
//!
//! A [`WriteJob`] walks through four phases, each of which must succeed before the
//! next may start:
//!
//! 1. [`WriteJob::plan`] validates the configuration and connects to the destination
//! 2. [`WriteJob::prepare`] applies the write mode to existing content
//! 3. [`WriteJob::split`] names one temp/final file pair per task
//! 4. [`WriteJob::commit`] promotes the temp files once every task succeeded
//!
//! Tasks in between are run with [`WriteJob::run_task`], or all at once on a rayon
//! pool by [`WriteJob::run`], which drives the whole pipeline.
//!
//! ```no_run
//! use stagewrite::{JobConfig, WriteJob, record};
//! use stagewrite::dirty::LoggingCollector;
//! use stagewrite::io::LocalConnector;
//! use std::sync::Arc;
//!
//! let config = JobConfig::from_path("job.json")?;
//! let job = WriteJob::plan(&config, Arc::new(LocalConnector))?;
//! let sources = vec![
//!     vec![record![1_i64, "alice"]].into_iter(),
//!     vec![record![2_i64, "bob"]].into_iter(),
//! ];
//! let report = job.run(sources, Arc::new(LoggingCollector::new()))?;
//! println!("committed {} files", report.committed.len());
//! # Ok::<(), stagewrite::WriterError>(())
//! ```

use crate::commit::{CommitReport, Committer};
use crate::config::JobConfig;
use crate::dirty::DirtyRecordCollector;
use crate::error::{ErrorKind, Result, WriterError};
use crate::io::fs::{ConnectOptions, FileSystem, FileSystemConnector};
use crate::io::query::QueryConnector;
use crate::io::retry::RetryConfig;
use crate::plan::WritePlan;
use crate::prepare::{DestinationSnapshot, prepare};
use crate::record::RecordSource;
use crate::split::{FilePathPair, SplitPlan, TokenGenerator, UuidTokens, split};
use crate::task::{TaskResult, execute_task};
use std::sync::Arc;
use tracing::{info, warn};

/// How [`WriteJob::run`] schedules tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    /// `threads: None` sizes the pool to the number of CPUs.
    Parallel { threads: Option<usize> },
}

impl Default for ExecMode {
    fn default() -> Self {
        if cfg!(feature = "parallel-io") {
            Self::Parallel { threads: None }
        } else {
            Self::Sequential
        }
    }
}

/// One staged write, from validated plan to commit.
///
/// The job holds the coordinator's filesystem connection from [`plan`](Self::plan)
/// until [`commit`](Self::commit) or drop, whichever comes first.
pub struct WriteJob {
    plan: WritePlan,
    connector: Arc<dyn FileSystemConnector>,
    fs: Box<dyn FileSystem>,
    fs_closed: bool,
    query: Option<Arc<dyn QueryConnector>>,
    tokens: Box<dyn TokenGenerator>,
    retry: RetryConfig,
    mode: ExecMode,
    snapshot: Option<DestinationSnapshot>,
    split: Option<SplitPlan>,
}

impl WriteJob {
    /// Validate `config` and connect to its filesystem.
    ///
    /// # Errors
    /// Returns configuration errors from [`WritePlan::from_config`] and connection
    /// errors from `connector`.
    pub fn plan(config: &JobConfig, connector: Arc<dyn FileSystemConnector>) -> Result<Self> {
        let plan = WritePlan::from_config(config)?;
        let fs = connector.connect(
            &plan.default_fs,
            &ConnectOptions {
                kerberos: plan.kerberos.clone(),
                ..ConnectOptions::default()
            },
        )?;
        info!(
            default_fs = %plan.default_fs,
            path = %plan.path,
            file_name = %plan.file_name,
            format = ?plan.format,
            write_mode = %plan.write_mode,
            "write planned"
        );
        Ok(Self {
            plan,
            connector,
            fs,
            fs_closed: false,
            query: None,
            tokens: Box::new(UuidTokens),
            retry: RetryConfig::default(),
            mode: ExecMode::default(),
            snapshot: None,
            split: None,
        })
    }

    /// Endpoint used for the post-commit statement.
    #[must_use]
    pub fn with_query_connector(mut self, connector: Arc<dyn QueryConnector>) -> Self {
        self.query = Some(connector);
        self
    }

    #[must_use]
    pub fn with_token_generator(mut self, tokens: impl TokenGenerator + 'static) -> Self {
        self.tokens = Box::new(tokens);
        self
    }

    /// Retry policy for the post-commit connection.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_exec_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn write_plan(&self) -> &WritePlan {
        &self.plan
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&DestinationSnapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn split_plan(&self) -> Option<&SplitPlan> {
        self.split.as_ref()
    }

    /// Reconcile the destination with the write mode.
    ///
    /// # Errors
    /// See [`prepare`](crate::prepare::prepare).
    pub fn prepare(&mut self) -> Result<&DestinationSnapshot> {
        let snapshot = prepare(&self.plan, self.fs.as_ref())?;
        Ok(self.snapshot.insert(snapshot))
    }

    /// Name `n` task outputs.
    ///
    /// # Errors
    /// [`ErrorKind::Runtime`] before [`prepare`](Self::prepare), otherwise see
    /// [`split`](crate::split::split).
    pub fn split(&mut self, n: usize) -> Result<&[FilePathPair]> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| WriterError::new(ErrorKind::Runtime, "split called before prepare"))?;
        let plan = split(&self.plan, snapshot, self.fs.as_ref(), n, self.tokens.as_ref())?;
        Ok(self.split.insert(plan).pairs.as_slice())
    }

    /// Run task `task_id` against the pair assigned to it by [`split`](Self::split).
    ///
    /// # Errors
    /// [`ErrorKind::Runtime`] if the job has not been split or `task_id` is out of range.
    /// Write failures are reported in the returned [`TaskResult`], not as errors.
    pub fn run_task(
        &self,
        task_id: usize,
        source: &mut dyn RecordSource,
        collector: &dyn DirtyRecordCollector,
    ) -> Result<TaskResult> {
        let pair = self
            .split
            .as_ref()
            .and_then(|s| s.pairs.get(task_id))
            .cloned()
            .ok_or_else(|| {
                WriterError::new(ErrorKind::Runtime, format!("no file pair for task {task_id}"))
            })?;
        Ok(execute_task(
            &self.plan,
            self.connector.as_ref(),
            task_id,
            pair,
            source,
            collector,
        ))
    }

    /// Promote every task's output and release the filesystem connection.
    ///
    /// The connection is closed whether or not the commit succeeds.
    ///
    /// # Errors
    /// See [`Committer::commit`]. Also [`ErrorKind::Runtime`] if the job was never
    /// split, and [`ErrorKind::ConfigInvalid`] if a post-commit statement is
    /// configured without a query connector.
    pub fn commit(mut self, results: &[TaskResult]) -> Result<CommitReport> {
        let outcome = self.commit_inner(results);
        let closed = self.close_fs();
        let report = outcome?;
        closed?;
        Ok(report)
    }

    fn commit_inner(&self, results: &[TaskResult]) -> Result<CommitReport> {
        let split = self
            .split
            .as_ref()
            .ok_or_else(|| WriterError::new(ErrorKind::Runtime, "commit called before split"))?;
        let mut committer = Committer::new(self.fs.as_ref(), &split.temp_dir).with_retry(self.retry);
        if let Some(action) = &self.plan.post_commit {
            let query = self.query.as_deref().ok_or_else(|| {
                WriterError::new(
                    ErrorKind::ConfigInvalid,
                    "a post-commit statement is configured but no query connector was given",
                )
            })?;
            committer = committer.with_post_commit(action, query);
        }
        let report = committer.commit(results)?;
        info!(
            files = report.committed.len(),
            records = report.records_written,
            dirty = report.dirty_records,
            "write committed"
        );
        Ok(report)
    }

    fn close_fs(&mut self) -> Result<()> {
        if self.fs_closed {
            return Ok(());
        }
        self.fs_closed = true;
        self.fs.close()
    }

    /// Prepare, split into one task per source, run every task, then commit.
    ///
    /// A failed task does not stop its siblings. Every result is collected before
    /// the commit decision is made.
    ///
    /// # Errors
    /// Any error from the individual phases.
    pub fn run<S: RecordSource>(
        mut self,
        sources: Vec<S>,
        collector: Arc<dyn DirtyRecordCollector>,
    ) -> Result<CommitReport> {
        if self.plan.post_commit.is_some() && self.query.is_none() {
            return Err(WriterError::new(
                ErrorKind::ConfigInvalid,
                "a post-commit statement is configured but no query connector was given",
            ));
        }
        self.prepare()?;
        self.split(sources.len())?;
        let results = self.execute_all(sources, collector.as_ref())?;
        self.commit(&results)
    }

    fn execute_all<S: RecordSource>(
        &self,
        sources: Vec<S>,
        collector: &dyn DirtyRecordCollector,
    ) -> Result<Vec<TaskResult>> {
        let pairs = self
            .split
            .as_ref()
            .map(|s| s.pairs.clone())
            .ok_or_else(|| WriterError::new(ErrorKind::Runtime, "tasks run before split"))?;
        let plan = &self.plan;
        let connector = self.connector.as_ref();
        let jobs: Vec<(usize, FilePathPair, S)> = pairs
            .into_iter()
            .zip(sources)
            .enumerate()
            .map(|(i, (pair, source))| (i, pair, source))
            .collect();
        let run_one = |(task_id, pair, mut source): (usize, FilePathPair, S)| {
            execute_task(plan, connector, task_id, pair, &mut source, collector)
        };

        match self.mode {
            #[cfg(feature = "parallel-io")]
            ExecMode::Parallel { threads } => {
                use rayon::prelude::*;
                let threads = threads.unwrap_or_else(num_cpus::get).max(1);
                info!(tasks = jobs.len(), threads, "running tasks in parallel");
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("stagewrite-task-{i}"))
                    .build()
                    .map_err(|e| {
                        WriterError::new(ErrorKind::Runtime, "cannot build task thread pool")
                            .with_source(e)
                    })?;
                Ok(pool.install(|| jobs.into_par_iter().map(run_one).collect()))
            }
            #[cfg(not(feature = "parallel-io"))]
            ExecMode::Parallel { .. } => {
                warn!("parallel-io feature disabled, running tasks sequentially");
                Ok(jobs.into_iter().map(run_one).collect())
            }
            ExecMode::Sequential => {
                info!(tasks = jobs.len(), "running tasks sequentially");
                Ok(jobs.into_iter().map(run_one).collect())
            }
        }
    }
}

impl Drop for WriteJob {
    fn drop(&mut self) {
        if let Err(e) = self.close_fs() {
            warn!(error = %e, "closing destination filesystem failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::MemoryCollector;
    use crate::io::fs::{FakeConnector, FakeFileSystem};
    use crate::record;
    use crate::testing::text_job_config;

    #[test]
    fn phases_must_run_in_order() {
        let connector = Arc::new(FakeConnector::new(FakeFileSystem::new()));
        let mut job = WriteJob::plan(&text_job_config("/out", "append"), connector).unwrap();
        assert_eq!(job.split(1).unwrap_err().kind, ErrorKind::Runtime);
        let err = job
            .run_task(0, &mut std::iter::empty::<crate::record::Record>(), &MemoryCollector::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Runtime);
    }

    #[test]
    fn drop_closes_the_connection_once() {
        let fs = FakeFileSystem::new();
        let connector = Arc::new(FakeConnector::new(fs.clone()));
        let job = WriteJob::plan(&text_job_config("/out", "append"), connector).unwrap();
        assert_eq!(fs.connect_count(), 1);
        drop(job);
        assert_eq!(fs.close_count(), 1);
    }

    #[test]
    fn commit_closes_even_when_refusing() {
        let fs = FakeFileSystem::new();
        fs.fail_create_with_prefix("part__");
        let connector = Arc::new(FakeConnector::new(fs.clone()));
        let mut job = WriteJob::plan(&text_job_config("/out", "append"), connector).unwrap();
        job.prepare().unwrap();
        job.split(1).unwrap();
        let result = job
            .run_task(0, &mut vec![record![1_i64, "a"]].into_iter(), &MemoryCollector::new())
            .unwrap();
        let err = job.commit(&[result]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskFailed);
        // one close for the task connection, one for the job's
        assert_eq!(fs.close_count(), 2);
    }

    #[test]
    fn sequential_mode_runs_every_source() {
        let fs = FakeFileSystem::new();
        let connector = Arc::new(FakeConnector::new(fs.clone()));
        let job = WriteJob::plan(&text_job_config("/out", "append"), connector)
            .unwrap()
            .with_exec_mode(ExecMode::Sequential);
        let sources = vec![
            vec![record![1_i64, "a"]].into_iter(),
            vec![record![2_i64, "b"]].into_iter(),
            vec![].into_iter(),
        ];
        let report = job.run(sources, Arc::new(MemoryCollector::new())).unwrap();
        assert_eq!(report.committed.len(), 3);
        assert_eq!(report.records_written, 2);
        assert_eq!(fs.files().len(), 3);
    }
}
