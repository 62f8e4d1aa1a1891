//! Filesystem client traits.
//!
//! Paths handed to a [`FileSystem`] are absolute, `/`-separated and relative to the
//! filesystem the connector was pointed at (the `defaultFS` endpoint), e.g.
//! `/warehouse/orders/part__abc`. Implementations translate them to whatever
//! their backend needs.

use crate::error::Result;
use crate::plan::KerberosAuth;
use std::io::Write;
use std::time::Duration;

/// Options applied when a connection is opened.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Upper bound on establishing the connection. Network backends must give up
    /// with [`ErrorKind::ConnectFs`](crate::ErrorKind::ConnectFs) once it elapses.
    /// The local-disk backend opens nothing remote and only logs it.
    pub timeout: Duration,
    pub kerberos: Option<KerberosAuth>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: crate::config::CONNECT_TIMEOUT,
            kerberos: None,
        }
    }
}

/// Opens [`FileSystem`] handles. Shared by the coordinator and every task, so
/// each task can hold a connection of its own.
pub trait FileSystemConnector: Send + Sync {
    /// Connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConnectFs`](crate::ErrorKind::ConnectFs) when the endpoint
    /// is unreachable or unsupported, and
    /// [`ErrorKind::KerberosLogin`](crate::ErrorKind::KerberosLogin) when authentication fails
    fn connect(&self, endpoint: &str, options: &ConnectOptions) -> Result<Box<dyn FileSystem>>;
}

/// A live connection to a filesystem.
pub trait FileSystem: Send {
    /// Check whether `path` exists (file or directory)
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be queried
    fn exists(&self, path: &str) -> Result<bool>;

    /// Check whether `path` exists and is a directory
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be queried
    fn is_dir(&self, path: &str) -> Result<bool>;

    /// Create `path` and any missing parents
    ///
    /// # Errors
    ///
    /// Returns an error if a component exists as a file or creation fails
    fn mkdirs(&self, path: &str) -> Result<()>;

    /// List the direct children of `dir` (files and directories) as absolute paths
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is not a directory or cannot be listed
    fn list_files(&self, dir: &str) -> Result<Vec<String>>;

    /// List the direct children of `dir` whose name starts with `prefix`
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is not a directory or cannot be listed
    fn list_files_with_prefix(&self, dir: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .list_files(dir)?
            .into_iter()
            .filter(|path| file_name(path).starts_with(prefix))
            .collect())
    }

    /// Delete every path, recursively for directories
    ///
    /// # Errors
    ///
    /// Returns an error on the first path that cannot be deleted
    fn delete(&self, paths: &[String]) -> Result<()>;

    /// Move a file. Fails if `to` already exists or its parent is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename cannot be performed
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Remove an empty directory
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not an empty directory
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// Create a new file (and missing parent directories) and return a sink for its bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the file already exists or cannot be created
    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>>;

    /// Release the connection. Further calls are not expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend reports a failure while closing
    fn close(&mut self) -> Result<()>;
}

/// Last path segment.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Parent directory of an absolute path, without a trailing separator (`/` for
/// top-level entries). `None` for the root itself.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Join a directory and a name with exactly one separator.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Strip a trailing separator, keeping `/` intact.
#[must_use]
pub fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}
