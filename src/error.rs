//! Error type shared by every phase of a staged write.
//!
//! All fallible operations return [`Result<T>`] where the error is a
//! [`WriterError`]: a message tagged with an [`ErrorKind`]. Each kind carries
//! a stable code (`StageWriter-NN`) so operators can tell a configuration
//! mistake from a half-finished commit without parsing messages.
//!
//! - Configuration: `RequiredValue`, `IllegalValue`, `ColumnRequiredValue`, `CreatePath`
//! - Filesystem: `ConnectFs`, `KerberosLogin`, `WriteIo`, `CharsetWrite`
//! - Commit: `Rename` (some files may already be promoted), `TaskFailed`
//! - Post-commit statement: `ConnectDb`, `Sql`

use std::fmt;
use thiserror::Error;

/// Category of a [`WriterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    RequiredValue,
    IllegalValue,
    CharsetWrite,
    WriteIo,
    Runtime,
    ConnectFs,
    ColumnRequiredValue,
    Rename,
    KerberosLogin,
    CreatePath,
    ConnectDb,
    Sql,
    TaskFailed,
}

impl ErrorKind {
    /// Stable error code, e.g. `StageWriter-02`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "StageWriter-00",
            Self::RequiredValue => "StageWriter-01",
            Self::IllegalValue => "StageWriter-02",
            Self::CharsetWrite => "StageWriter-03",
            Self::WriteIo => "StageWriter-04",
            Self::Runtime => "StageWriter-05",
            Self::ConnectFs => "StageWriter-06",
            Self::ColumnRequiredValue => "StageWriter-07",
            Self::Rename => "StageWriter-08",
            Self::KerberosLogin => "StageWriter-09",
            Self::CreatePath => "StageWriter-10",
            Self::ConnectDb => "StageWriter-11",
            Self::Sql => "StageWriter-12",
            Self::TaskFailed => "StageWriter-13",
        }
    }

    /// Short human-readable description of the category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "invalid job configuration",
            Self::RequiredValue => "a required value is missing",
            Self::IllegalValue => "a configured value is illegal",
            Self::CharsetWrite => "value could not be written in the configured encoding",
            Self::WriteIo => "I/O failure while writing",
            Self::Runtime => "unexpected runtime failure",
            Self::ConnectFs => "could not connect to the destination filesystem",
            Self::ColumnRequiredValue => "a column is missing a required value",
            Self::Rename => "could not move a staged file to its final location",
            Self::KerberosLogin => "kerberos authentication failed",
            Self::CreatePath => "destination path could not be created",
            Self::ConnectDb => "could not connect to the post-commit query endpoint",
            Self::Sql => "post-commit statement failed",
            Self::TaskFailed => "a writer task did not succeed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Error returned by planning, preparing, writing and committing.
#[derive(Debug, Error)]
#[error("[{}] {message}", .kind.code())]
pub struct WriterError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl WriterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn required(key: &str) -> Self {
        Self::new(
            ErrorKind::RequiredValue,
            format!("[{key}] is a required parameter and must not be blank"),
        )
    }

    pub fn illegal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalValue, message)
    }

    /// Wrap an `std::io::Error` as a [`ErrorKind::WriteIo`] failure.
    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        Self::new(ErrorKind::WriteIo, context).with_source(err)
    }
}

pub type Result<T, E = WriterError> = std::result::Result<T, E>;
