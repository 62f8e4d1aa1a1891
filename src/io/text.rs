//! Delimited text output.
//!
//! One record per line, fields joined by the plan's delimiter, `\n` terminated.
//! Nulls are written as the plan's null marker. Fields are not quoted or escaped.
//! Every line is encoded with the plan's charset before it reaches the codec, and a
//! record containing a character the charset cannot represent is rejected as dirty
//! instead of being written with substitutes.

use crate::error::{ErrorKind, Result, WriterError};
use crate::io::compression::{FinishingWrite, wrap_writer};
use crate::io::format::{FormatWriter, RecordError, sink_error};
use crate::plan::{Column, WritePlan};
use crate::record::{Cell, Record, conform};
use anyhow::Context;
use encoding_rs::Encoding;
use std::fmt::Write as _;
use std::io::Write;

pub struct TextWriter {
    out: Box<dyn FinishingWrite>,
    columns: Vec<Column>,
    delimiter: char,
    null_format: String,
    encoding: &'static Encoding,
    line: String,
}

impl TextWriter {
    /// # Errors
    /// Returns [`ErrorKind::CharsetWrite`] when the delimiter or null marker cannot be
    /// encoded, or an error from the compression codec.
    pub fn new(plan: &WritePlan, sink: Box<dyn Write + Send>) -> Result<Self> {
        for (what, text) in [
            ("field delimiter", plan.field_delimiter.to_string()),
            ("null format", plan.null_format.clone()),
        ] {
            let (_, _, unmappable) = plan.encoding.encode(&text);
            if unmappable {
                return Err(WriterError::new(
                    ErrorKind::CharsetWrite,
                    format!(
                        "{what} [{text}] cannot be written as {}",
                        plan.encoding.name()
                    ),
                ));
            }
        }
        Ok(Self {
            out: wrap_writer(sink, plan.compression)?,
            columns: plan.columns.clone(),
            delimiter: plan.field_delimiter,
            null_format: plan.null_format.clone(),
            encoding: plan.encoding,
            line: String::new(),
        })
    }

    fn render(&mut self, cells: &[Cell]) {
        self.line.clear();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                self.line.push(self.delimiter);
            }
            match cell {
                Cell::Null => self.line.push_str(&self.null_format),
                // Writing into a String cannot fail.
                other => {
                    let _ = write!(self.line, "{other}");
                }
            }
        }
        self.line.push('\n');
    }
}

impl FormatWriter for TextWriter {
    fn write(&mut self, record: &Record) -> std::result::Result<(), RecordError> {
        let cells = conform(&self.columns, record).map_err(RecordError::Dirty)?;
        self.render(&cells);
        let (bytes, _, unmappable) = self.encoding.encode(&self.line);
        if unmappable {
            return Err(RecordError::Dirty(format!(
                "record contains characters that cannot be written as {}",
                self.encoding.name()
            )));
        }
        self.out
            .write_all(&bytes)
            .context("write text line")
            .map_err(|e| RecordError::Fatal(sink_error("text output", e)))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.out
            .finish()
            .context("finish text output")
            .map_err(|e| sink_error("text output", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::testing::{SharedBuffer, text_plan};

    fn write_all(plan: &WritePlan, records: &[Record]) -> (Vec<u8>, Vec<String>) {
        let buf = SharedBuffer::default();
        let mut w: Box<dyn FormatWriter> =
            Box::new(TextWriter::new(plan, Box::new(buf.clone())).unwrap());
        let mut dirty = Vec::new();
        for r in records {
            match w.write(r) {
                Ok(()) => {}
                Err(RecordError::Dirty(reason)) => dirty.push(reason),
                Err(RecordError::Fatal(e)) => panic!("{e}"),
            }
        }
        w.close().unwrap();
        (buf.contents(), dirty)
    }

    #[test]
    fn joins_fields_and_marks_nulls() {
        let plan = text_plan("/out", "part");
        let (bytes, dirty) = write_all(
            &plan,
            &[record![1_i64, "alice"], record![2_i64, None::<String>]],
        );
        assert!(dirty.is_empty());
        assert_eq!(String::from_utf8(bytes).unwrap(), "1,alice\n2,\\N\n");
    }

    #[test]
    fn wrong_arity_is_dirty_not_fatal() {
        let plan = text_plan("/out", "part");
        let (bytes, dirty) = write_all(&plan, &[record![1_i64], record![2_i64, "bob"]]);
        assert_eq!(dirty.len(), 1);
        assert_eq!(String::from_utf8(bytes).unwrap(), "2,bob\n");
    }

    #[test]
    fn unencodable_characters_are_dirty() {
        let mut plan = text_plan("/out", "part");
        plan.encoding = encoding_rs::WINDOWS_1252;
        let (bytes, dirty) = write_all(&plan, &[record![1_i64, "日本"], record![2_i64, "café"]]);
        assert_eq!(dirty.len(), 1);
        assert_eq!(bytes, b"2,caf\xe9\n");
    }

    #[test]
    fn multibyte_delimiter() {
        let mut plan = text_plan("/out", "part");
        plan.field_delimiter = '\u{1}';
        let (bytes, _) = write_all(&plan, &[record![7_i64, "x"]]);
        assert_eq!(bytes, b"7\x01x\n");
    }

    #[test]
    fn unencodable_delimiter_is_a_charset_error() {
        let mut plan = text_plan("/out", "part");
        plan.encoding = encoding_rs::WINDOWS_1252;
        plan.field_delimiter = '，';
        let err = TextWriter::new(&plan, Box::new(SharedBuffer::default()))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::CharsetWrite);
    }
}
