//! Promotion of staged files.
//!
//! The committer runs once every task has reported. It refuses to touch anything
//! unless every task succeeded, then renames temp files into the destination, tidies
//! the staging directory and runs the optional post-commit statement.
//!
//! Renames are not rolled back. If one fails, the others are still attempted and
//! the first failure is reported, so the destination may hold a partial result.

use crate::error::{ErrorKind, Result, WriterError};
use crate::io::fs::FileSystem;
use crate::io::query::QueryConnector;
use crate::io::retry::{RetryConfig, retry_fixed};
use crate::plan::PostCommitAction;
use crate::task::{TaskResult, TaskStatus};
use tracing::{error, info, warn};

/// What a successful commit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Final paths, in task order.
    pub committed: Vec<String>,
    pub records_written: u64,
    pub dirty_records: u64,
    /// Whether a post-commit statement ran.
    pub post_commit_executed: bool,
}

/// Renames staged files and runs the post-commit statement.
pub struct Committer<'a> {
    fs: &'a dyn FileSystem,
    temp_dir: &'a str,
    post_commit: Option<(&'a PostCommitAction, &'a dyn QueryConnector)>,
    retry: RetryConfig,
}

impl<'a> Committer<'a> {
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, temp_dir: &'a str) -> Self {
        Self {
            fs,
            temp_dir,
            post_commit: None,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_post_commit(
        mut self,
        action: &'a PostCommitAction,
        connector: &'a dyn QueryConnector,
    ) -> Self {
        self.post_commit = Some((action, connector));
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Commit `results`.
    ///
    /// # Errors
    /// - [`ErrorKind::TaskFailed`] if any task failed; nothing is renamed
    /// - [`ErrorKind::Rename`] for the first rename that failed
    /// - [`ErrorKind::ConnectDb`] / [`ErrorKind::Sql`] from the post-commit statement,
    ///   after all files are in place
    pub fn commit(&self, results: &[TaskResult]) -> Result<CommitReport> {
        let failed: Vec<String> = results
            .iter()
            .filter_map(|r| match &r.status {
                TaskStatus::Success => None,
                TaskStatus::Failed(reason) => Some(format!("task {}: {reason}", r.task_id)),
            })
            .collect();
        if !failed.is_empty() {
            error!(failed = failed.len(), total = results.len(), "refusing to commit");
            return Err(WriterError::new(
                ErrorKind::TaskFailed,
                format!(
                    "{} of {} tasks failed, nothing was committed: {}",
                    failed.len(),
                    results.len(),
                    failed.join("; ")
                ),
            ));
        }

        let mut report = CommitReport::default();
        let mut first_failure: Option<WriterError> = None;
        for result in results {
            let (from, to) = (result.pair.temp(), result.pair.final_path());
            match self.fs.rename(from, to) {
                Ok(()) => {
                    info!(from, to, "committed");
                    report.committed.push(to.to_string());
                }
                Err(e) => {
                    error!(from, to, error = %e, "rename failed");
                    first_failure.get_or_insert(e);
                }
            }
            report.records_written += result.stats.records_written;
            report.dirty_records += result.stats.dirty_records;
        }
        if let Some(e) = first_failure {
            return Err(WriterError::new(
                ErrorKind::Rename,
                format!(
                    "{} of {} files committed, first failure: {}",
                    report.committed.len(),
                    results.len(),
                    e.message
                ),
            )
            .with_source(e));
        }

        self.remove_temp_dir();

        if let Some((action, connector)) = self.post_commit {
            run_post_commit(action, connector, &self.retry)?;
            report.post_commit_executed = true;
        } else {
            info!("write finished, no post-commit statement");
        }
        Ok(report)
    }

    fn remove_temp_dir(&self) {
        match self.fs.exists(self.temp_dir) {
            Ok(true) => {
                if let Err(e) = self.fs.remove_dir(self.temp_dir) {
                    warn!(temp_dir = self.temp_dir, error = %e, "could not remove temp directory");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(temp_dir = self.temp_dir, error = %e, "could not check temp directory"),
        }
    }
}

/// Connect with retry, execute once, always close the session.
///
/// # Errors
/// [`ErrorKind::ConnectDb`] when every connection attempt failed, [`ErrorKind::Sql`]
/// when the statement failed, or the close error when only closing failed.
pub fn run_post_commit(
    action: &PostCommitAction,
    connector: &dyn QueryConnector,
    retry: &RetryConfig,
) -> Result<()> {
    let mut session = retry_fixed(retry, &[ErrorKind::ConnectDb], || {
        connector.connect(&action.url, &action.user, &action.password)
    })
    .map_err(|e| {
        if e.kind == ErrorKind::ConnectDb {
            e
        } else {
            WriterError::new(
                ErrorKind::ConnectDb,
                format!("cannot connect to {}: {}", action.url, e.message),
            )
            .with_source(e)
        }
    })?;

    let executed = session.execute(&action.statement).map_err(|e| {
        WriterError::new(
            ErrorKind::Sql,
            format!("post-commit statement failed [{}]: {}", action.statement, e.message),
        )
        .with_source(e)
    });
    let closed = session.close();

    executed?;
    closed?;
    info!(url = %action.url, statement = %action.statement, "post-commit statement executed");
    Ok(())
}
