//! Test fixtures for stagewrite jobs.
//!
//! Builders for typical job configurations and plans, a deterministic
//! [`TokenGenerator`], and an in-memory sink. Used by the crate's own tests and
//! available to downstream crates that test code built on top of [`WriteJob`].
//!
//! ```
//! use stagewrite::testing::text_job_config;
//! use stagewrite::plan::WritePlan;
//!
//! let plan = WritePlan::from_config(&text_job_config("/out", "truncate")).unwrap();
//! assert_eq!(plan.file_name, "part");
//! ```
//!
//! [`WriteJob`]: crate::WriteJob

use crate::config::{DEFAULT_NULL_FORMAT, JobConfig};
use crate::plan::{Column, ColumnType, Compression, FileFormat, WriteMode, WritePlan};
use crate::split::{FilePathPair, TokenGenerator};
use serde_json::json;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Endpoint used by fixtures that run against [`FakeConnector`](crate::io::FakeConnector).
pub const FAKE_ENDPOINT: &str = "fake://cluster";

/// The two columns every fixture uses: `id: long, name: string`.
#[must_use]
pub fn sample_columns() -> Vec<Column> {
    vec![
        Column {
            name: "id".into(),
            column_type: ColumnType::Long,
        },
        Column {
            name: "name".into(),
            column_type: ColumnType::String,
        },
    ]
}

/// A text plan writing `<prefix>__*` files into `path`, comma separated, no codec.
#[must_use]
pub fn text_plan(path: &str, prefix: &str) -> WritePlan {
    WritePlan {
        default_fs: FAKE_ENDPOINT.into(),
        path: path.into(),
        file_name: prefix.into(),
        format: FileFormat::Text,
        field_delimiter: ',',
        encoding: encoding_rs::UTF_8,
        null_format: DEFAULT_NULL_FORMAT.into(),
        compression: Compression::None,
        write_mode: WriteMode::Append,
        create_path: false,
        columns: sample_columns(),
        kerberos: None,
        post_commit: None,
    }
}

/// Same as [`text_plan`] with the Parquet format.
#[must_use]
pub fn parquet_plan(path: &str, prefix: &str) -> WritePlan {
    WritePlan {
        format: FileFormat::Parquet,
        ..text_plan(path, prefix)
    }
}

/// A complete text job configuration with prefix `part` that creates `path` if needed.
#[must_use]
pub fn text_job_config(path: &str, write_mode: &str) -> JobConfig {
    job_config(FAKE_ENDPOINT, path, "text", write_mode)
}

/// A complete Parquet job configuration with prefix `part`.
#[must_use]
pub fn parquet_job_config(path: &str, write_mode: &str) -> JobConfig {
    job_config(FAKE_ENDPOINT, path, "parquet", write_mode)
}

/// A complete configuration against an arbitrary endpoint.
///
/// # Panics
/// Never in practice; the literal below is always a JSON object.
#[must_use]
pub fn job_config(default_fs: &str, path: &str, file_type: &str, write_mode: &str) -> JobConfig {
    JobConfig::from_value(json!({
        "defaultFS": default_fs,
        "fileType": file_type,
        "path": path,
        "fileName": "part",
        "column": [
            {"name": "id", "type": "bigint"},
            {"name": "name", "type": "string"}
        ],
        "writeMode": write_mode,
        "fieldDelimiter": ",",
        "isCreatePath": "true"
    }))
    .expect("fixture config is a JSON object")
}

/// A file pair for tests that bypass the splitter.
#[must_use]
pub fn pair(temp: &str, final_path: &str) -> FilePathPair {
    FilePathPair::new(temp, final_path)
}

/// Hands out a fixed script of tokens, then either repeats one token forever or
/// falls back to numbered tokens.
#[derive(Debug, Default)]
pub struct ScriptedTokens {
    script: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    counter: Mutex<usize>,
}

impl ScriptedTokens {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(script.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Always return `token`.
    #[must_use]
    pub fn repeating(token: &str) -> Self {
        Self {
            repeat: Some(token.to_string()),
            ..Self::default()
        }
    }
}

impl TokenGenerator for ScriptedTokens {
    fn next_token(&self) -> String {
        if let Some(token) = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return token;
        }
        if let Some(token) = &self.repeat {
            return token.clone();
        }
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        *counter += 1;
        format!("gen{counter}")
    }
}

/// A cloneable in-memory sink; every clone sees the same bytes.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A temporary directory usable as a `file://` filesystem root.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn local_root() -> std::io::Result<(tempfile::TempDir, String)> {
    let dir = tempfile::tempdir()?;
    let endpoint = format!("file://{}", dir.path().display());
    Ok((dir, endpoint))
}
