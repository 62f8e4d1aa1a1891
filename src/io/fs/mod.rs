//! Destination filesystem access.
//!
//! - [`traits`] - the [`FileSystem`] / [`FileSystemConnector`] contract and path helpers
//! - [`local`] - a client for local disks (`file://` endpoints)
//! - [`fake`] - an in-memory client with failure injection for tests

pub mod fake;
pub mod local;
pub mod traits;

pub use fake::{FakeConnector, FakeFileSystem};
pub use local::{LocalConnector, LocalFileSystem};
pub use traits::*;
