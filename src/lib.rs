//! # stagewrite
//!
//! Parallel, staged writes of tabular records into a filesystem directory, made
//! visible all at once.
//!
//! One logical write is split into N independent tasks. Each task writes a single
//! file into a private staging directory next to the destination. Only when every
//! task has succeeded are the staged files renamed into the destination, after
//! which an optional statement (for example a table refresh) is run against a
//! query endpoint.
//!
//! ## Key Features
//!
//! - **Write modes** - `append`, `nonConflict`, `truncate` and `truncateAll`
//! - **Collision-free naming** - `<prefix>__<token>` names never clash with
//!   existing files or with each other
//! - **Formats** - delimited text (optionally gzip or bzip2 compressed, any output
//!   charset) and Parquet (optionally snappy compressed)
//! - **Dirty record handling** - malformed records are handed to a collector and
//!   skipped, they never fail a task
//! - **Pluggable edges** - filesystem, record source and query endpoint are traits
//!
//! ## Quick Start
//!
//! ```
//! use stagewrite::{WriteJob, record};
//! use stagewrite::dirty::MemoryCollector;
//! use stagewrite::io::{FakeConnector, FakeFileSystem};
//! use stagewrite::testing::text_job_config;
//! use std::sync::Arc;
//!
//! # fn main() -> stagewrite::Result<()> {
//! let fs = FakeFileSystem::new();
//! let job = WriteJob::plan(
//!     &text_job_config("/warehouse/users", "truncate"),
//!     Arc::new(FakeConnector::new(fs.clone())),
//! )?;
//!
//! let sources = vec![
//!     vec![record![1_i64, "alice"], record![2_i64, "bob"]].into_iter(),
//!     vec![record![3_i64, "carol"]].into_iter(),
//! ];
//! let report = job.run(sources, Arc::new(MemoryCollector::new()))?;
//!
//! assert_eq!(report.committed.len(), 2);
//! assert_eq!(report.records_written, 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Phases
//!
//! | phase    | module          | fails with                                   |
//! |----------|-----------------|----------------------------------------------|
//! | plan     | [`plan`]        | `RequiredValue`, `IllegalValue`, `CreatePath` |
//! | prepare  | [`prepare`]     | `CreatePath`, `IllegalValue`, `WriteIo`       |
//! | split    | [`split`]       | `IllegalValue`                               |
//! | task     | [`task`]        | reported in [`TaskResult`]                   |
//! | commit   | [`commit`]      | `TaskFailed`, `Rename`, `ConnectDb`, `Sql`    |
//!
//! ## Feature Flags
//!
//! - `io-parquet` - Parquet output via `arrow`/`parquet`
//! - `compression-gzip` / `compression-bzip2` - text codecs
//! - `parallel-io` - run tasks on a rayon pool
//!
//! All are enabled by default.

pub mod commit;
pub mod config;
pub mod dirty;
pub mod error;
pub mod io;
pub mod job;
pub mod logging;
pub mod plan;
pub mod prepare;
pub mod record;
pub mod split;
pub mod task;
pub mod testing;

pub use commit::{CommitReport, Committer};
pub use config::JobConfig;
pub use dirty::{DirtyRecordCollector, LoggingCollector, MemoryCollector};
pub use error::{ErrorKind, Result, WriterError};
pub use job::{ExecMode, WriteJob};
pub use plan::{Compression, FileFormat, WriteMode, WritePlan};
pub use prepare::DestinationSnapshot;
pub use record::{Record, RecordSource, Value};
pub use split::{FilePathPair, SplitPlan, TokenGenerator, UuidTokens};
pub use task::{TaskResult, TaskStats, TaskStatus};
