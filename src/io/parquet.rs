//! Parquet output.
//!
//! Rows are buffered into one Arrow builder per column and flushed to
//! `parquet::arrow::ArrowWriter` as a `RecordBatch` every [`BATCH_ROWS`] rows. The
//! Arrow schema follows the plan's columns, every field nullable:
//!
//! | column type | Arrow type                    |
//! |-------------|-------------------------------|
//! | string      | `Utf8`                        |
//! | int         | `Int32`                       |
//! | long        | `Int64`                       |
//! | float       | `Float32`                     |
//! | double      | `Float64`                     |
//! | boolean     | `Boolean`                     |
//! | date        | `Date32`                      |
//! | timestamp   | `Timestamp(Millisecond, None)`|

use crate::error::Result;
use crate::io::format::{FormatWriter, RecordError, sink_error};
use crate::plan::{Column, ColumnType, Compression, WritePlan};
use crate::record::{Cell, Record, conform};
use anyhow::{Context, anyhow};
use arrow::array::{
    ArrayBuilder, ArrayRef, BooleanBuilder, Date32Builder, Float32Builder, Float64Builder,
    Int32Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression as ParquetCompression;
use parquet::file::properties::WriterProperties;
use std::io::Write;
use std::sync::Arc;

/// Rows buffered before a batch is handed to the Parquet writer.
pub const BATCH_ROWS: usize = 8192;

enum ColumnBuilder {
    String(StringBuilder),
    Int(Int32Builder),
    Long(Int64Builder),
    Float(Float32Builder),
    Double(Float64Builder),
    Boolean(BooleanBuilder),
    Date(Date32Builder),
    Timestamp(TimestampMillisecondBuilder),
}

impl ColumnBuilder {
    fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::String => Self::String(StringBuilder::new()),
            ColumnType::Int => Self::Int(Int32Builder::new()),
            ColumnType::Long => Self::Long(Int64Builder::new()),
            ColumnType::Float => Self::Float(Float32Builder::new()),
            ColumnType::Double => Self::Double(Float64Builder::new()),
            ColumnType::Boolean => Self::Boolean(BooleanBuilder::new()),
            ColumnType::Date => Self::Date(Date32Builder::new()),
            ColumnType::Timestamp => Self::Timestamp(TimestampMillisecondBuilder::new()),
        }
    }

    fn append(&mut self, cell: &Cell) -> anyhow::Result<()> {
        match (self, cell) {
            (Self::String(b), Cell::String(v)) => b.append_value(v),
            (Self::Int(b), Cell::Int(v)) => b.append_value(*v),
            (Self::Long(b), Cell::Long(v)) => b.append_value(*v),
            (Self::Float(b), Cell::Float(v)) => b.append_value(*v),
            (Self::Double(b), Cell::Double(v)) => b.append_value(*v),
            (Self::Boolean(b), Cell::Boolean(v)) => b.append_value(*v),
            (Self::Date(b), Cell::Date(d)) => b.append_value(days_since_epoch(*d)?),
            (Self::Timestamp(b), Cell::Timestamp(ts)) => {
                b.append_value(ts.and_utc().timestamp_millis());
            }
            (Self::String(b), Cell::Null) => b.append_null(),
            (Self::Int(b), Cell::Null) => b.append_null(),
            (Self::Long(b), Cell::Null) => b.append_null(),
            (Self::Float(b), Cell::Null) => b.append_null(),
            (Self::Double(b), Cell::Null) => b.append_null(),
            (Self::Boolean(b), Cell::Null) => b.append_null(),
            (Self::Date(b), Cell::Null) => b.append_null(),
            (Self::Timestamp(b), Cell::Null) => b.append_null(),
            (_, other) => return Err(anyhow!("cell {other:?} does not match its column builder")),
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::String(b) => Arc::new(b.finish()),
            Self::Int(b) => Arc::new(b.finish()),
            Self::Long(b) => Arc::new(b.finish()),
            Self::Float(b) => Arc::new(b.finish()),
            Self::Double(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
            Self::Date(b) => Arc::new(b.finish()),
            Self::Timestamp(b) => Arc::new(b.finish()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::String(b) => b.len(),
            Self::Int(b) => b.len(),
            Self::Long(b) => b.len(),
            Self::Float(b) => b.len(),
            Self::Double(b) => b.len(),
            Self::Boolean(b) => b.len(),
            Self::Date(b) => b.len(),
            Self::Timestamp(b) => b.len(),
        }
    }
}

fn days_since_epoch(date: NaiveDate) -> anyhow::Result<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("unix epoch")?;
    let days = (date - epoch).num_days();
    i32::try_from(days).with_context(|| format!("{date} is out of range for Date32"))
}

fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::String => DataType::Utf8,
        ColumnType::Int => DataType::Int32,
        ColumnType::Long => DataType::Int64,
        ColumnType::Float => DataType::Float32,
        ColumnType::Double => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
    }
}

/// Arrow schema for a list of columns.
#[must_use]
pub fn schema_for(columns: &[Column]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|c| Field::new(&c.name, arrow_type(c.column_type), true))
            .collect::<Vec<_>>(),
    ))
}

pub struct ParquetWriter {
    writer: ArrowWriter<Box<dyn Write + Send>>,
    schema: SchemaRef,
    columns: Vec<Column>,
    builders: Vec<ColumnBuilder>,
}

impl ParquetWriter {
    /// # Errors
    /// Returns an error if the Parquet writer cannot be created on `sink`.
    pub fn new(plan: &WritePlan, sink: Box<dyn Write + Send>) -> Result<Self> {
        let schema = schema_for(&plan.columns);
        let codec = match plan.compression {
            Compression::Snappy => ParquetCompression::SNAPPY,
            _ => ParquetCompression::UNCOMPRESSED,
        };
        let props = WriterProperties::builder().set_compression(codec).build();
        let writer = ArrowWriter::try_new(sink, schema.clone(), Some(props))
            .context("create ArrowWriter")
            .map_err(|e| sink_error("parquet output", e))?;
        Ok(Self {
            writer,
            schema,
            columns: plan.columns.clone(),
            builders: plan
                .columns
                .iter()
                .map(|c| ColumnBuilder::new(c.column_type))
                .collect(),
        })
    }

    fn buffered(&self) -> usize {
        self.builders.first().map_or(0, ColumnBuilder::len)
    }

    fn flush_batch(&mut self) -> anyhow::Result<()> {
        if self.buffered() == 0 {
            return Ok(());
        }
        let arrays = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays).context("build RecordBatch")?;
        self.writer.write(&batch).context("write RecordBatch")?;
        Ok(())
    }
}

impl FormatWriter for ParquetWriter {
    fn write(&mut self, record: &Record) -> std::result::Result<(), RecordError> {
        let cells = conform(&self.columns, record).map_err(RecordError::Dirty)?;
        // A failed append would leave the builders with uneven lengths.
        for (builder, cell) in self.builders.iter_mut().zip(&cells) {
            builder
                .append(cell)
                .map_err(|e| RecordError::Fatal(sink_error("parquet output", e)))?;
        }
        if self.buffered() >= BATCH_ROWS {
            self.flush_batch()
                .map_err(|e| RecordError::Fatal(sink_error("parquet output", e)))?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush_batch()
            .map_err(|e| sink_error("parquet output", e))?;
        let mut sink = self
            .writer
            .into_inner()
            .context("close ArrowWriter")
            .map_err(|e| sink_error("parquet output", e))?;
        sink.flush()
            .context("flush parquet output")
            .map_err(|e| sink_error("parquet output", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::testing::{SharedBuffer, parquet_plan};
    use arrow::array::{Array, Int64Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn read_back(buf: &SharedBuffer) -> Vec<RecordBatch> {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&buf.contents()).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        reader.map(|b| b.unwrap()).collect()
    }

    #[test]
    fn writes_rows_and_nulls() {
        let plan = parquet_plan("/out", "part");
        let buf = SharedBuffer::default();
        let mut w: Box<dyn FormatWriter> =
            Box::new(ParquetWriter::new(&plan, Box::new(buf.clone())).unwrap());
        w.write(&record![1_i64, "alice"]).unwrap();
        w.write(&record![2_i64, None::<String>]).unwrap();
        assert!(matches!(
            w.write(&record!["x", "y"]),
            Err(RecordError::Dirty(_))
        ));
        w.close().unwrap();

        let batches = read_back(&buf);
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 2);
        let ids = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids.values(), &[1, 2]);
        let names = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(names.value(0), "alice");
        assert!(names.is_null(1));
    }

    #[test]
    fn flushes_in_batches() {
        let plan = parquet_plan("/out", "part");
        let buf = SharedBuffer::default();
        let mut w: Box<dyn FormatWriter> =
            Box::new(ParquetWriter::new(&plan, Box::new(buf.clone())).unwrap());
        for i in 0..(BATCH_ROWS as i64 + 5) {
            w.write(&record![i, "n"]).unwrap();
        }
        w.close().unwrap();
        let rows: usize = read_back(&buf).iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, BATCH_ROWS + 5);
    }

    #[test]
    fn schema_maps_every_type() {
        use ColumnType as T;
        let cols: Vec<Column> = [
            T::String,
            T::Int,
            T::Long,
            T::Float,
            T::Double,
            T::Boolean,
            T::Date,
            T::Timestamp,
        ]
        .into_iter()
        .enumerate()
        .map(|(i, column_type)| Column {
            name: format!("c{i}"),
            column_type,
        })
        .collect();
        let schema = schema_for(&cols);
        assert_eq!(schema.fields().len(), 8);
        assert_eq!(schema.field(6).data_type(), &DataType::Date32);
        assert!(schema.fields().iter().all(|f| f.is_nullable()));
    }

    #[test]
    fn epoch_days() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 11).unwrap();
        assert_eq!(days_since_epoch(d).unwrap(), 10);
    }
}
