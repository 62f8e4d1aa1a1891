//! Validated write plan.
//!
//! [`WritePlan::from_config`] turns a raw [`JobConfig`] into an immutable plan.
//! Checks run in a fixed order and stop at the first failure, so a job with
//! several mistakes always reports the same one first.

use crate::config::{DEFAULT_ENCODING, DEFAULT_NULL_FORMAT, JobConfig, keys};
use crate::error::{ErrorKind, Result, WriterError};
use encoding_rs::Encoding;
use std::fmt;
use tracing::info;

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Delimited text, one record per line.
    Text,
    /// Apache Parquet.
    Parquet,
}

impl FileFormat {
    /// Case-insensitive parse of the `fileType` value.
    ///
    /// # Errors
    /// Returns [`ErrorKind::IllegalValue`] for anything but `text` or `parquet`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "parquet" => Ok(Self::Parquet),
            _ => Err(WriterError::illegal(format!(
                "only TEXT and PARQUET files are supported, [{}] was given as {}",
                raw,
                keys::FILE_TYPE
            ))),
        }
    }
}

/// Policy applied to pre-existing destination content before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Keep everything, add new files next to it.
    Append,
    /// Refuse to run if any file with the configured prefix exists.
    NonConflict,
    /// Delete files with the configured prefix, leave the rest.
    Truncate,
    /// Delete every file in the destination.
    TruncateAll,
}

impl WriteMode {
    /// Parse after trimming and lower-casing.
    ///
    /// # Errors
    /// Returns [`ErrorKind::IllegalValue`] for unknown modes.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "nonconflict" => Ok(Self::NonConflict),
            "truncate" => Ok(Self::Truncate),
            "truncateall" => Ok(Self::TruncateAll),
            _ => Err(WriterError::illegal(format!(
                "only append, nonConflict, truncate and truncateAll are supported, not [{raw}]"
            ))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Append => "append",
            Self::NonConflict => "nonConflict",
            Self::Truncate => "truncate",
            Self::TruncateAll => "truncateAll",
        })
    }
}

/// Compression applied to output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Snappy,
}

impl Compression {
    /// Resolve the `compress` value for `format`.
    ///
    /// Text accepts `GZIP` and `BZIP2`; Parquet accepts `NONE` and `SNAPPY`. For both
    /// formats a blank or missing value means no compression. Matching is
    /// case-insensitive.
    ///
    /// # Errors
    /// Returns [`ErrorKind::IllegalValue`] for a codec the format does not support.
    pub fn parse_for(format: FileFormat, raw: Option<&str>) -> Result<Self> {
        let normalized = raw.map(|s| s.trim().to_ascii_uppercase()).unwrap_or_default();
        if normalized.is_empty() {
            return Ok(Self::None);
        }
        match (format, normalized.as_str()) {
            (FileFormat::Text, "GZIP") => Ok(Self::Gzip),
            (FileFormat::Text, "BZIP2") => Ok(Self::Bzip2),
            (FileFormat::Text, _) => Err(WriterError::illegal(format!(
                "TEXT files only support GZIP and BZIP2 compression, not [{normalized}]"
            ))),
            (FileFormat::Parquet, "NONE") => Ok(Self::None),
            (FileFormat::Parquet, "SNAPPY") => Ok(Self::Snappy),
            (FileFormat::Parquet, _) => Err(WriterError::illegal(format!(
                "PARQUET files only support NONE and SNAPPY compression, not [{normalized}]"
            ))),
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    /// # Errors
    /// Returns [`ErrorKind::IllegalValue`] for an unknown type name.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" | "varchar" | "char" => Ok(Self::String),
            "tinyint" | "smallint" | "int" => Ok(Self::Int),
            "bigint" | "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "timestamp" => Ok(Self::Timestamp),
            _ => Err(WriterError::illegal(format!(
                "unsupported column type [{raw}]"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Credentials for a secured filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosAuth {
    pub keytab_path: String,
    pub principal: String,
}

/// Statement run against an external query endpoint once every file is committed.
#[derive(Clone, PartialEq, Eq)]
pub struct PostCommitAction {
    pub url: String,
    pub user: String,
    pub password: String,
    pub statement: String,
}

impl fmt::Debug for PostCommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostCommitAction")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"***")
            .field("statement", &self.statement)
            .finish()
    }
}

/// Everything a job needs to know, validated once.
#[derive(Debug, Clone)]
pub struct WritePlan {
    pub default_fs: String,
    pub path: String,
    pub file_name: String,
    pub format: FileFormat,
    pub field_delimiter: char,
    pub encoding: &'static Encoding,
    pub null_format: String,
    pub compression: Compression,
    pub write_mode: WriteMode,
    pub create_path: bool,
    pub columns: Vec<Column>,
    pub kerberos: Option<KerberosAuth>,
    pub post_commit: Option<PostCommitAction>,
}

impl WritePlan {
    /// Validate `config` and build a plan.
    ///
    /// # Errors
    /// Returns the first failed check as [`ErrorKind::RequiredValue`],
    /// [`ErrorKind::IllegalValue`], [`ErrorKind::ColumnRequiredValue`] or
    /// [`ErrorKind::CreatePath`].
    pub fn from_config(config: &JobConfig) -> Result<Self> {
        let default_fs = config.necessary_string(keys::DEFAULT_FS, ErrorKind::RequiredValue)?;

        let format = FileFormat::parse(
            &config.necessary_string(keys::FILE_TYPE, ErrorKind::RequiredValue)?,
        )?;

        let path = config.necessary_string(keys::PATH, ErrorKind::RequiredValue)?;
        validate_path(&path)?;

        let file_name = config.necessary_string(keys::FILE_NAME, ErrorKind::RequiredValue)?;

        let columns = parse_columns(config)?;

        let write_mode = WriteMode::parse(
            &config.necessary_string(keys::WRITE_MODE, ErrorKind::RequiredValue)?,
        )?;

        let field_delimiter = parse_delimiter(config.string(keys::FIELD_DELIMITER))?;

        let compression =
            Compression::parse_for(format, config.string(keys::COMPRESS).as_deref())?;

        let kerberos = if config.bool(keys::HAVE_KERBEROS, false)? {
            Some(KerberosAuth {
                keytab_path: config
                    .necessary_string(keys::KERBEROS_KEYTAB_FILE_PATH, ErrorKind::RequiredValue)?,
                principal: config
                    .necessary_string(keys::KERBEROS_PRINCIPAL, ErrorKind::RequiredValue)?,
            })
        } else {
            None
        };

        let encoding = resolve_encoding(&config.string_or(keys::ENCODING, DEFAULT_ENCODING))?;

        let create_path = parse_create_path(&config.string_or(keys::IS_CREATE_PATH, "false"))?;

        let post_commit = parse_post_commit(config)?;
        match &post_commit {
            Some(action) => info!(
                url = %action.url,
                statement = %action.statement,
                "post-commit statement configured"
            ),
            None => info!("no post-commit statement configured"),
        }

        let null_format = config.string_or(keys::NULL_FORMAT, DEFAULT_NULL_FORMAT);

        Ok(Self {
            default_fs,
            path,
            file_name,
            format,
            field_delimiter,
            encoding,
            null_format,
            compression,
            write_mode,
            create_path,
            columns,
            kerberos,
            post_commit,
        })
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(WriterError::illegal(format!(
            "[{}] must be an absolute path, got [{path}]",
            keys::PATH
        )));
    }
    if path.contains('*') || path.contains('?') {
        return Err(WriterError::illegal(format!(
            "[{}] must not contain wildcards such as * or ?, got [{path}]",
            keys::PATH
        )));
    }
    Ok(())
}

fn parse_columns(config: &JobConfig) -> Result<Vec<Column>> {
    let entries = config.configs(keys::COLUMN).unwrap_or_default();
    if entries.is_empty() {
        return Err(WriterError::new(
            ErrorKind::RequiredValue,
            format!("[{}] must list at least one column", keys::COLUMN),
        ));
    }
    entries
        .iter()
        .map(|entry| {
            let name = entry.necessary_string(keys::NAME, ErrorKind::ColumnRequiredValue)?;
            let raw_type = entry.necessary_string(keys::TYPE, ErrorKind::ColumnRequiredValue)?;
            Ok(Column {
                name,
                column_type: ColumnType::parse(&raw_type)?,
            })
        })
        .collect()
}

/// Exactly one character, counted as a `char`, not as bytes.
pub(crate) fn parse_delimiter(raw: Option<String>) -> Result<char> {
    let raw = raw.ok_or_else(|| WriterError::required(keys::FIELD_DELIMITER))?;
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(WriterError::illegal(format!(
            "only single-character field delimiters are supported, got [{raw}]"
        ))),
    }
}

/// Resolve a charset label. Encodings that cannot be produced as output
/// (UTF-16 and the replacement encoding) are rejected.
pub(crate) fn resolve_encoding(raw: &str) -> Result<&'static Encoding> {
    let label = raw.trim();
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) if encoding.output_encoding() == encoding => Ok(encoding),
        _ => Err(WriterError::illegal(format!(
            "unsupported encoding [{label}]"
        ))),
    }
}

fn parse_create_path(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(WriterError::new(
            ErrorKind::CreatePath,
            format!(
                "[{}] only accepts true or false, got [{raw}]",
                keys::IS_CREATE_PATH
            ),
        )),
    }
}

/// The post-commit tuple is all-or-nothing.
fn parse_post_commit(config: &JobConfig) -> Result<Option<PostCommitAction>> {
    let url = config.string(keys::HIVE_URL);
    let user = config.string(keys::HIVE_USER);
    let password = config.string(keys::HIVE_PASSWORD);
    let statement = config.string(keys::HQL);
    match (url, user, password, statement) {
        (Some(url), Some(user), Some(password), Some(statement)) => Ok(Some(PostCommitAction {
            url,
            user,
            password,
            statement,
        })),
        (None, None, None, None) => Ok(None),
        _ => Err(WriterError::illegal(format!(
            "[{}], [{}], [{}] and [{}] must be configured together",
            keys::HIVE_URL,
            keys::HIVE_USER,
            keys::HIVE_PASSWORD,
            keys::HQL
        ))),
    }
}
