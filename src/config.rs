//! Raw job configuration.
//!
//! A job is described by a flat JSON object. [`JobConfig`] wraps that object and
//! exposes the typed getters the planner needs; it performs no validation of its
//! own beyond "is this present" and "is this a boolean". Unknown keys are ignored.
//!
//! ```
//! use stagewrite::config::{JobConfig, keys};
//!
//! let cfg: JobConfig = r#"{"path": "/warehouse/orders", "writeMode": "append"}"#.parse()?;
//! assert_eq!(cfg.string(keys::PATH).as_deref(), Some("/warehouse/orders"));
//! # Ok::<(), stagewrite::WriterError>(())
//! ```

use crate::error::{ErrorKind, Result, WriterError};
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration keys understood by the planner.
pub mod keys {
    pub const DEFAULT_FS: &str = "defaultFS";
    pub const FILE_TYPE: &str = "fileType";
    pub const PATH: &str = "path";
    pub const FILE_NAME: &str = "fileName";
    pub const COLUMN: &str = "column";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const WRITE_MODE: &str = "writeMode";
    pub const FIELD_DELIMITER: &str = "fieldDelimiter";
    pub const COMPRESS: &str = "compress";
    pub const ENCODING: &str = "encoding";
    pub const NULL_FORMAT: &str = "nullFormat";
    pub const HAVE_KERBEROS: &str = "haveKerberos";
    pub const KERBEROS_KEYTAB_FILE_PATH: &str = "kerberosKeytabFilePath";
    pub const KERBEROS_PRINCIPAL: &str = "kerberosPrincipal";
    pub const IS_CREATE_PATH: &str = "isCreatePath";
    pub const HIVE_URL: &str = "hiveUrl";
    pub const HIVE_USER: &str = "hiveUser";
    pub const HIVE_PASSWORD: &str = "hivePassword";
    pub const HQL: &str = "hql";
}

pub const DEFAULT_ENCODING: &str = "UTF-8";
pub const DEFAULT_NULL_FORMAT: &str = "\\N";

/// Connect/socket timeout handed to filesystem and query connectors.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Attempts made to open the post-commit query connection.
pub const POST_COMMIT_CONNECT_ATTEMPTS: u32 = 4;

/// Fixed pause between post-commit connection attempts.
pub const POST_COMMIT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// A job configuration object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobConfig {
    entries: Map<String, Value>,
}

impl JobConfig {
    /// Wrap a JSON value, which must be an object.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ConfigInvalid`] when `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(WriterError::new(
                ErrorKind::ConfigInvalid,
                format!("job configuration must be a JSON object, got {other}"),
            )),
        }
    }

    /// Load a job configuration from a JSON file.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ConfigInvalid`] when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            WriterError::new(
                ErrorKind::ConfigInvalid,
                format!("read job configuration {}", path.display()),
            )
            .with_source(e)
        })?;
        text.parse()
    }

    /// Set (or replace) a value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.entries.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_null())
    }

    /// The value under `key` rendered as a string. Strings are returned verbatim,
    /// numbers and booleans are stringified, `null` and containers yield `None`.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<String> {
        match self.entries.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Like [`string`](Self::string) but falls back to `default` when absent.
    #[must_use]
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    /// A value that must be present and non-blank.
    ///
    /// # Errors
    /// Returns an error of the given `kind` when the value is absent or blank.
    pub fn necessary_string(&self, key: &str, kind: ErrorKind) -> Result<String> {
        match self.string(key) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(WriterError::new(
                kind,
                format!("[{key}] is a required parameter and must not be blank"),
            )),
        }
    }

    /// A boolean flag. Accepts JSON booleans and the strings `true`/`false`
    /// in any case.
    ///
    /// # Errors
    /// Returns [`ErrorKind::IllegalValue`] for anything else.
    pub fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
            Some(other) => Err(WriterError::illegal(format!(
                "[{key}] must be true or false, got {other}"
            ))),
        }
    }

    /// A list of nested configuration objects. Non-object entries come back as
    /// empty configurations so that per-entry checks report them.
    #[must_use]
    pub fn configs(&self, key: &str) -> Option<Vec<JobConfig>> {
        let Value::Array(items) = self.entries.get(key)? else {
            return None;
        };
        Some(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Self {
                        entries: map.clone(),
                    },
                    _ => Self::default(),
                })
                .collect(),
        )
    }
}

impl FromStr for JobConfig {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s).map_err(|e| {
            WriterError::new(ErrorKind::ConfigInvalid, "parse job configuration").with_source(e)
        })?;
        Self::from_value(value)
    }
}

impl From<Map<String, Value>> for JobConfig {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}
