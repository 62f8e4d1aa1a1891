//! Records flowing from an upstream source into a writer task.
//!
//! A [`Record`] is an ordered list of loosely typed [`Value`]s. Before a record is
//! written it is checked against the plan's columns with [`conform`], which either
//! produces one typed [`Cell`] per column or explains why the record is dirty.

use crate::plan::{Column, ColumnType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field as delivered by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// Build a [`Record`] from anything convertible into [`Value`].
///
/// ```
/// use stagewrite::record;
/// let r = record![1_i64, "alice", None::<f64>];
/// assert_eq!(r.len(), 3);
/// ```
#[macro_export]
macro_rules! record {
    ($($v:expr),* $(,)?) => {
        $crate::record::Record::new(vec![$($crate::record::Value::from($v)),*])
    };
}

/// Pull-based stream of records. `None` means the stream is exhausted.
pub trait RecordSource: Send {
    fn next_record(&mut self) -> Option<Record>;
}

impl<I> RecordSource for I
where
    I: Iterator<Item = Record> + Send,
{
    fn next_record(&mut self) -> Option<Record> {
        self.next()
    }
}

/// A field converted to its column's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl fmt::Display for Cell {
    /// Text rendering; `Null` renders as the empty string, callers substitute
    /// their null marker.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Check a record against `columns` and convert each field.
///
/// # Errors
/// Returns a human-readable reason when the field count differs from the column
/// count or a field cannot be represented as its column's type.
pub fn conform(columns: &[Column], record: &Record) -> Result<Vec<Cell>, String> {
    if record.len() != columns.len() {
        return Err(format!(
            "record has {} fields but {} columns are configured",
            record.len(),
            columns.len()
        ));
    }
    columns
        .iter()
        .zip(record.values())
        .map(|(column, value)| {
            convert(column.column_type, value)
                .map_err(|reason| format!("column [{}]: {reason}", column.name))
        })
        .collect()
}

fn convert(column_type: ColumnType, value: &Value) -> Result<Cell, String> {
    if matches!(value, Value::Null) {
        return Ok(Cell::Null);
    }
    match column_type {
        ColumnType::String => to_string(value).map(Cell::String),
        ColumnType::Int => {
            let v = to_long(value)?;
            i32::try_from(v)
                .map(Cell::Int)
                .map_err(|_| format!("{v} does not fit in an int"))
        }
        ColumnType::Long => to_long(value).map(Cell::Long),
        #[allow(clippy::cast_possible_truncation)]
        ColumnType::Float => to_double(value).map(|v| Cell::Float(v as f32)),
        ColumnType::Double => to_double(value).map(Cell::Double),
        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(Cell::Boolean(*b)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Cell::Boolean(true)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => {
                Ok(Cell::Boolean(false))
            }
            other => Err(format!("{other:?} is not a boolean")),
        },
        ColumnType::Date => match value {
            Value::Date(d) => Ok(Cell::Date(*d)),
            Value::Timestamp(ts) => Ok(Cell::Date(ts.date())),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(Cell::Date)
                .map_err(|e| format!("[{s}] is not a date: {e}")),
            other => Err(format!("{other:?} is not a date")),
        },
        ColumnType::Timestamp => match value {
            Value::Timestamp(ts) => Ok(Cell::Timestamp(*ts)),
            Value::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(Cell::Timestamp)
                .ok_or_else(|| format!("{d} has no midnight")),
            Value::Long(millis) => DateTime::from_timestamp_millis(*millis)
                .map(|dt| Cell::Timestamp(dt.naive_utc()))
                .ok_or_else(|| format!("{millis} is out of range for a timestamp")),
            Value::String(s) => parse_timestamp(s.trim())
                .map(Cell::Timestamp)
                .ok_or_else(|| format!("[{s}] is not a timestamp")),
            other => Err(format!("{other:?} is not a timestamp")),
        },
    }
}

fn to_string(value: &Value) -> Result<String, String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|e| e.to_string())?,
        Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
    })
}

fn to_long(value: &Value) -> Result<i64, String> {
    match value {
        Value::Long(v) => Ok(*v),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("[{s}] is not an integer: {e}")),
        other => Err(format!("{other:?} is not an integer")),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_double(value: &Value) -> Result<f64, String> {
    match value {
        Value::Double(v) => Ok(*v),
        Value::Long(v) => Ok(*v as f64),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("[{s}] is not a number: {e}")),
        other => Err(format!("{other:?} is not a number")),
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    s.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
}
