//! I/O edges: filesystem clients, format writers, codecs and the post-commit endpoint.

pub mod compression;
pub mod format;
pub mod fs;
pub mod query;
pub mod retry;
pub mod text;

#[cfg_attr(docsrs, doc(cfg(feature = "io-parquet")))]
#[cfg(feature = "io-parquet")]
pub mod parquet;

pub use format::{FormatWriter, RecordError, open_format_writer};
pub use fs::{
    ConnectOptions, FakeConnector, FakeFileSystem, FileSystem, FileSystemConnector,
    LocalConnector, LocalFileSystem,
};
pub use query::{FakeQueryConnector, QueryConnector, QuerySession};
