//! Format writers turn records into the bytes of one output file.

use crate::error::{ErrorKind, Result, WriterError};
use crate::plan::{FileFormat, WritePlan};
use crate::record::Record;
use std::io::Write;

/// Why a single record could not be written.
#[derive(Debug)]
pub enum RecordError {
    /// The record is malformed. Report it and keep going.
    Dirty(String),
    /// The file is no longer usable. The task must fail.
    Fatal(WriterError),
}

impl From<WriterError> for RecordError {
    fn from(err: WriterError) -> Self {
        Self::Fatal(err)
    }
}

/// Writes records into a single file.
pub trait FormatWriter: Send {
    /// Append one record.
    ///
    /// # Errors
    /// [`RecordError::Dirty`] for a record that does not fit the columns or the
    /// encoding, [`RecordError::Fatal`] when the sink fails.
    fn write(&mut self, record: &Record) -> std::result::Result<(), RecordError>;

    /// Flush buffered rows, write any footer or codec trailer and release the sink.
    ///
    /// # Errors
    /// Returns an error if the remaining bytes cannot be written.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Open the writer for `plan.format` on top of a freshly created file.
///
/// # Errors
/// Returns an error if the writer cannot be initialised, e.g. when the delimiter
/// cannot be represented in the configured encoding.
pub fn open_format_writer(
    plan: &WritePlan,
    sink: Box<dyn Write + Send>,
) -> Result<Box<dyn FormatWriter>> {
    match plan.format {
        FileFormat::Text => Ok(Box::new(crate::io::text::TextWriter::new(plan, sink)?)),
        #[cfg(feature = "io-parquet")]
        FileFormat::Parquet => Ok(Box::new(crate::io::parquet::ParquetWriter::new(
            plan, sink,
        )?)),
        #[cfg(not(feature = "io-parquet"))]
        FileFormat::Parquet => Err(WriterError::new(
            ErrorKind::IllegalValue,
            "PARQUET output requires the io-parquet feature",
        )),
    }
}

/// Map a sink failure into the write-I/O kind.
pub(crate) fn sink_error(path_hint: &str, err: impl Into<anyhow::Error>) -> WriterError {
    let err = err.into();
    WriterError::new(ErrorKind::WriteIo, format!("{path_hint}: {err:#}")).with_source(err)
}
